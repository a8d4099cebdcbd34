//! Rewrites document text after a remote operation settles.
//!
//! Every function rescans the text it is given; offsets from an earlier scan
//! are never reused across a mutation.

use std::path::Path;

use crate::item::ItemId;
use crate::keys::decode_or_raw;
use crate::links::{inside_any_link, scan_links, MarkdownLink};
use crate::references::find_bare_urls;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("no link to {target} in the current text")]
    TargetNotFound { target: String },
    #[error("download placeholder for item {id} is gone")]
    MarkerNotFound { id: ItemId },
}

/// Replaces every link whose target is `target` with `replacement`, verbatim.
pub fn replace_link(text: &str, target: &str, replacement: &str) -> Result<String, ReconcileError> {
    let edits: Vec<Edit> = scan_links(text, true)
        .filter(|link| targets_match(link.target(), target))
        .map(|link| Edit::new(&link, replacement.to_string()))
        .collect();
    if edits.is_empty() {
        return Err(not_found(target));
    }
    Ok(splice(text, &edits).0)
}

/// Points every link at `target` to `new_url`, keeping label and embed marker.
///
/// Wiki links become markdown links, since a wiki target cannot hold a URL.
pub fn relink(text: &str, target: &str, new_url: &str) -> Result<String, ReconcileError> {
    let edits: Vec<Edit> = scan_links(text, true)
        .filter(|link| targets_match(link.target(), target))
        .map(|link| {
            let replacement = link_with_url(&link, new_url);
            Edit::new(&link, replacement)
        })
        .collect();
    if edits.is_empty() {
        return Err(not_found(target));
    }
    Ok(splice(text, &edits).0)
}

/// Removes links and bare URLs pointing at `target`.
///
/// Where a removal leaves three or more consecutive newlines, that run is cut
/// to two. Nothing else in the text is touched.
pub fn remove_link(text: &str, target: &str) -> Result<String, ReconcileError> {
    let links: Vec<MarkdownLink> = scan_links(text, true).collect();
    let mut edits: Vec<Edit> = links
        .iter()
        .filter(|link| targets_match(link.target(), target))
        .map(|link| Edit::new(link, String::new()))
        .collect();
    edits.extend(
        find_bare_urls(text)
            .into_iter()
            .filter(|bare| targets_match(&bare.url, target))
            .filter(|bare| !inside_any_link(&links, bare.start))
            .map(|bare| Edit {
                start: bare.start,
                end: bare.end,
                replacement: String::new(),
            }),
    );
    if edits.is_empty() {
        return Err(not_found(target));
    }
    edits.sort_by_key(|edit| edit.start);

    let (mut result, junctions) = splice(text, &edits);
    for junction in junctions.into_iter().rev() {
        collapse_newlines_at(&mut result, junction);
    }
    Ok(result)
}

/// `remove_link` on a selected region, with the region's outer whitespace trimmed.
pub fn remove_link_in_region(region: &str, target: &str) -> Result<String, ReconcileError> {
    remove_link(region, target).map(|text| text.trim().to_string())
}

/// Destination used for the in-flight download placeholder of `id`.
///
/// An HTML comment renders as nothing, and the item id keeps it unique.
pub fn placeholder_url(id: ItemId) -> String {
    format!("<!-- attachsync:{id} -->")
}

/// Text with download placeholders in place, plus the slices they replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub text: String,
    /// Replaced source text, one entry per placeholder in document order.
    pub originals: Vec<String>,
}

/// Swaps each occurrence of `url` for a placeholder link carrying `id`.
pub fn insert_placeholder(text: &str, url: &str, id: ItemId) -> Result<Placeholder, ReconcileError> {
    let marker = placeholder_url(id);
    let links: Vec<MarkdownLink> = scan_links(text, false).collect();
    let mut edits: Vec<Edit> = links
        .iter()
        .filter(|link| targets_match(link.target(), url))
        .map(|link| Edit::new(link, link_with_url(link, &marker)))
        .collect();
    edits.extend(
        find_bare_urls(text)
            .into_iter()
            .filter(|bare| targets_match(&bare.url, url))
            .filter(|bare| !inside_any_link(&links, bare.start))
            .map(|bare| Edit {
                start: bare.start,
                end: bare.end,
                replacement: format!("![{}]({marker})", file_label(&bare.url)),
            }),
    );
    if edits.is_empty() {
        return Err(not_found(url));
    }
    edits.sort_by_key(|edit| edit.start);
    let originals = edits
        .iter()
        .map(|edit| text[edit.start..edit.end].to_string())
        .collect();
    Ok(Placeholder {
        text: splice(text, &edits).0,
        originals,
    })
}

/// Puts back the text the placeholders of `id` replaced, as it was written.
///
/// Placeholders pair with `originals` in order; a copy the user made of a
/// placeholder gets the last original.
pub fn restore_placeholder(
    text: &str,
    id: ItemId,
    originals: &[String],
) -> Result<String, ReconcileError> {
    let Some(last) = originals.last() else {
        return Err(ReconcileError::MarkerNotFound { id });
    };
    let marker = placeholder_url(id);
    let edits: Vec<Edit> = scan_links(text, false)
        .filter(|link| link.url == marker)
        .enumerate()
        .map(|(index, link)| Edit::new(&link, originals.get(index).unwrap_or(last).clone()))
        .collect();
    if edits.is_empty() {
        return Err(ReconcileError::MarkerNotFound { id });
    }
    Ok(splice(text, &edits).0)
}

/// Replaces the placeholder of `id` with a link to `final_url`.
///
/// Returns `MarkerNotFound` when the placeholder has been edited away; the
/// caller must not guess another location.
pub fn resolve_placeholder(text: &str, id: ItemId, final_url: &str) -> Result<String, ReconcileError> {
    let marker = placeholder_url(id);
    let edits: Vec<Edit> = scan_links(text, false)
        .filter(|link| link.url == marker)
        .map(|link| {
            let replacement = link_with_url(&link, final_url);
            Edit::new(&link, replacement)
        })
        .collect();
    if edits.is_empty() {
        return Err(ReconcileError::MarkerNotFound { id });
    }
    Ok(splice(text, &edits).0)
}

/// True when two link targets name the same resource, allowing for percent-encoding.
pub fn targets_match(candidate: &str, target: &str) -> bool {
    let candidate = candidate.trim();
    let target = target.trim();
    candidate == target || decode_or_raw(candidate) == decode_or_raw(target)
}

/// Markdown for a link shaped like `link` but pointing at `url`.
fn link_with_url(link: &MarkdownLink, url: &str) -> String {
    let bang = if link.is_embed() { "!" } else { "" };
    let label = if link.is_wiki() {
        let alias = link.display_text();
        if alias.is_empty() {
            file_label(link.target())
        } else {
            alias.to_string()
        }
    } else {
        link.label.clone()
    };
    format!("{bang}[{label}]({url})")
}

fn file_label(target: &str) -> String {
    let decoded = decode_or_raw(target);
    let without_query = decoded.split(['?', '#']).next().unwrap_or("");
    Path::new(without_query)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("")
        .to_string()
}

fn not_found(target: &str) -> ReconcileError {
    ReconcileError::TargetNotFound {
        target: target.to_string(),
    }
}

struct Edit {
    start: usize,
    end: usize,
    replacement: String,
}

impl Edit {
    fn new(link: &MarkdownLink, replacement: String) -> Self {
        Self {
            start: link.start,
            end: link.end,
            replacement,
        }
    }
}

/// Applies sorted, non-overlapping edits. Also returns, for every edit, the
/// offset in the output just after its replacement.
fn splice(text: &str, edits: &[Edit]) -> (String, Vec<usize>) {
    let mut out = String::with_capacity(text.len());
    let mut junctions = Vec::with_capacity(edits.len());
    let mut cursor = 0;
    for edit in edits {
        if edit.start < cursor {
            continue;
        }
        out.push_str(&text[cursor..edit.start]);
        out.push_str(&edit.replacement);
        junctions.push(out.len());
        cursor = edit.end;
    }
    out.push_str(&text[cursor..]);
    (out, junctions)
}

fn collapse_newlines_at(text: &mut String, junction: usize) {
    let bytes = text.as_bytes();
    let mut left = junction.min(bytes.len());
    while left > 0 && bytes[left - 1] == b'\n' {
        left -= 1;
    }
    let mut right = junction.min(bytes.len());
    while right < bytes.len() && bytes[right] == b'\n' {
        right += 1;
    }
    if right - left >= 3 {
        text.replace_range(left..right, "\n\n");
    }
}
