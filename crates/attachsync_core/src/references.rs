//! Selects the links in a document that an upload, download or delete should act on.

use std::collections::HashSet;
use std::path::Path;

use crate::keys::is_own_link;
use crate::links::{inside_any_link, scan_links, MarkdownLink};

/// Extensions offered for upload when the configuration does not narrow them.
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "svg", "bmp", "avif", "mp4", "webm", "mov", "mkv", "mp3",
    "wav", "ogg", "m4a", "flac", "pdf", "zip",
];

/// A plain `http(s)://` URL found outside link syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedUrl {
    pub start: usize,
    pub end: usize,
    pub url: String,
}

/// Local link targets with an allowed extension, first-seen order, no repeats.
pub fn find_upload_candidates<S: AsRef<str>>(text: &str, allowed_extensions: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    scan_links(text, true)
        .filter_map(|link| {
            let target = link.target();
            if target.is_empty() || is_remote(target) {
                return None;
            }
            has_allowed_extension(target, allowed_extensions).then(|| target.to_string())
        })
        .filter(|target| seen.insert(target.clone()))
        .collect()
}

/// Remote URLs served from `public_domain`, first-seen order, no repeats.
///
/// Bracketed links and bare URLs are both considered. A URL inside a link's
/// span belongs to that link and is not read a second time as a bare URL.
pub fn find_download_candidates(text: &str, public_domain: &str) -> Vec<String> {
    let links: Vec<MarkdownLink> = scan_links(text, false).collect();
    let mut located: Vec<(usize, String)> = links
        .iter()
        .filter(|link| is_own_link(link.target(), public_domain))
        .map(|link| (link.start, link.target().to_string()))
        .collect();
    located.extend(
        find_bare_urls(text)
            .into_iter()
            .filter(|bare| !inside_any_link(&links, bare.start))
            .filter(|bare| is_own_link(&bare.url, public_domain))
            .map(|bare| (bare.start, bare.url)),
    );
    located.sort_by_key(|(start, _)| *start);

    let mut seen = HashSet::new();
    located
        .into_iter()
        .map(|(_, url)| url)
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Linear scan for `http://` and `https://` runs.
///
/// A URL ends at whitespace, quotes, angle brackets or a closing bracket or paren;
/// trailing sentence punctuation is not part of it.
pub fn find_bare_urls(text: &str) -> Vec<LocatedUrl> {
    let lowered = text.to_ascii_lowercase();
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut pos = 0;

    while pos < text.len() {
        let Some(offset) = lowered[pos..].find("http") else {
            break;
        };
        let start = pos + offset;
        let rest = &lowered[start..];
        if !(rest.starts_with("http://") || rest.starts_with("https://")) {
            pos = start + 4;
            continue;
        }

        let mut end = start;
        while end < bytes.len() && !ends_bare_url(bytes[end]) {
            end += 1;
        }
        while end > start && matches!(bytes[end - 1], b'.' | b',' | b';' | b':' | b'!' | b'?') {
            end -= 1;
        }

        let url = &text[start..end];
        if url.len() > "https://".len() {
            found.push(LocatedUrl {
                start,
                end,
                url: url.to_string(),
            });
        }
        pos = end.max(start + 4);
    }
    found
}

pub fn is_remote(target: &str) -> bool {
    let lowered = target.trim_start().to_ascii_lowercase();
    lowered.starts_with("http://") || lowered.starts_with("https://")
}

/// Case-insensitive extension check; allow-list entries may carry a leading dot.
pub fn has_allowed_extension<S: AsRef<str>>(target: &str, allowed_extensions: &[S]) -> bool {
    let Some(ext) = Path::new(target).extension().and_then(|ext| ext.to_str()) else {
        return false;
    };
    allowed_extensions
        .iter()
        .any(|allowed| allowed.as_ref().trim_start_matches('.').eq_ignore_ascii_case(ext))
}

fn ends_bare_url(byte: u8) -> bool {
    byte.is_ascii_whitespace() || matches!(byte, b'<' | b'>' | b'"' | b'\'' | b')' | b']' | b'`')
}

#[cfg(test)]
mod tests {
    use super::has_allowed_extension;

    #[test]
    fn extension_match_ignores_case_and_leading_dot() {
        assert!(has_allowed_extension("a/B.PNG", &[".png"]));
        assert!(!has_allowed_extension("a/b", &["png"]));
        assert!(!has_allowed_extension("a/b.png.txt", &["png"]));
    }
}
