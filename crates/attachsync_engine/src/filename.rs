use attachsync_core::decode_or_raw;
use sha2::{Digest, Sha256};

const MAX_STEM_LEN: usize = 80;

/// Deterministic storage key: `{prefix}/{stem}-{short_hash(bytes)}.{ext}`.
///
/// Uploading the same bytes twice yields the same key, so a retried upload
/// overwrites instead of duplicating.
pub fn storage_key_for(prefix: &str, file_name: &str, bytes: &[u8]) -> String {
    let sanitized = sanitize_file_name(file_name);
    let (stem, ext) = split_name(&sanitized);
    let stem = stem.replace(' ', "-");
    let hash = short_hash(bytes);
    let name = match ext {
        Some(ext) => format!("{stem}-{hash}.{}", ext.to_ascii_lowercase()),
        None => format!("{stem}-{hash}"),
    };
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        name
    } else {
        format!("{prefix}/{name}")
    }
}

/// Local file name for a downloaded URL.
///
/// Uses the last path segment; when it has no extension one is guessed
/// from the response content type.
pub fn file_name_from_url(url: &str, content_type: Option<&str>) -> String {
    let path = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .trim_end_matches('/');
    let segment = path.rsplit('/').next().unwrap_or("");
    let segment = if segment.contains(':') || segment.is_empty() {
        "attachment"
    } else {
        segment
    };
    let mut name = sanitize_file_name(&decode_or_raw(segment));
    if split_name(&name).1.is_none() {
        if let Some(ext) = content_type.and_then(extension_for_mime) {
            name.push('.');
            name.push_str(ext);
        }
    }
    name
}

/// Windows-safe file name; the extension is kept when present.
pub fn sanitize_file_name(input: &str) -> String {
    let (stem, ext) = split_name(input.trim());
    let stem = sanitize_stem(stem);
    match ext.map(sanitize_stem) {
        Some(ext) if ext != "untitled" => format!("{stem}.{ext}"),
        _ => stem,
    }
}

fn sanitize_stem(input: &str) -> String {
    let mut cleaned: String = input
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    cleaned = cleaned.trim_matches(&['_', ' ', '.'][..]).to_string();
    if cleaned.is_empty() {
        cleaned = "untitled".to_string();
    }
    let mut compacted = String::with_capacity(cleaned.len());
    let mut prev_underscore = false;
    for c in cleaned.chars() {
        if c == '_' {
            if !prev_underscore {
                compacted.push(c);
            }
            prev_underscore = true;
        } else {
            compacted.push(c);
            prev_underscore = false;
        }
    }
    if compacted.len() > MAX_STEM_LEN {
        let mut cut = MAX_STEM_LEN;
        while !compacted.is_char_boundary(cut) {
            cut -= 1;
        }
        compacted.truncate(cut);
    }
    if is_reserved_windows_name(&compacted) {
        compacted.push('_');
    }
    compacted
}

fn split_name(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < name.len() => (&name[..dot], Some(&name[dot + 1..])),
        _ => (name, None),
    }
}

fn extension_for_mime(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next()?.trim();
    mime_guess::get_mime_extensions_str(essence)?.first().copied()
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '[' | ']' | '#' | '^' | '\0'..='\u{1F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

fn short_hash(input: &[u8]) -> String {
    let digest = Sha256::digest(input);
    let mut hex = String::with_capacity(8);
    for byte in digest.iter().take(4) {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_stable_and_content_addressed() {
        let a = storage_key_for("notes/", "My Diagram.PNG", b"one");
        let b = storage_key_for("notes/", "My Diagram.PNG", b"one");
        let c = storage_key_for("notes/", "My Diagram.PNG", b"two");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("notes/My-Diagram-"));
        assert!(a.ends_with(".png"));
    }

    #[test]
    fn keys_use_the_sanitized_name() {
        let key = storage_key_for("up", "a:b?.JPG", b"x");
        assert!(key.starts_with("up/a_b-"), "{key}");
        assert!(key.ends_with(".jpg"), "{key}");
    }

    #[test]
    fn empty_prefix_yields_bare_name() {
        let key = storage_key_for("", "a.pdf", b"x");
        assert!(!key.contains('/'));
    }

    #[test]
    fn url_names_are_decoded_and_sanitized() {
        assert_eq!(
            file_name_from_url("https://cdn.example.com/a/My%20File.png?v=2", None),
            "My File.png"
        );
        assert_eq!(
            file_name_from_url("https://cdn.example.com/a/blob", Some("image/png")),
            "blob.png"
        );
        assert_eq!(sanitize_file_name("con"), "con_");
        assert_eq!(sanitize_file_name("a:b?.jpg"), "a_b.jpg");
    }
}
