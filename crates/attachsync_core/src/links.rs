//! Link tokenizer for markdown text.
//!
//! Recognizes inline links `[label](dest)`, images `![label](dest)` and, when
//! asked to, wiki links `[[target]]` / `![[target]]`. Labels and destinations
//! are matched by counting bracket and paren depth, so `[a[b]c](x.png)` is one
//! link. A start position that does not close cleanly is skipped by a single
//! byte, which keeps an unbalanced bracket from swallowing later links.
//!
//! Offsets are byte offsets into the scanned `&str`. Every offset produced lies
//! on an ASCII delimiter, so slicing with them is always valid.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// `[label](dest)`
    Inline,
    /// `![label](dest)`
    Image,
    /// `[[target]]`
    Wiki,
    /// `![[target]]`
    WikiEmbed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownLink {
    /// Literal `text[start..end]`.
    pub full_match: String,
    pub start: usize,
    pub end: usize,
    /// Raw destination: paren interior (trimmed) or wiki interior.
    pub url: String,
    /// Label text between the outer brackets; empty for wiki links.
    pub label: String,
    pub kind: LinkKind,
}

impl MarkdownLink {
    pub fn is_embed(&self) -> bool {
        matches!(self.kind, LinkKind::Image | LinkKind::WikiEmbed)
    }

    pub fn is_wiki(&self) -> bool {
        matches!(self.kind, LinkKind::Wiki | LinkKind::WikiEmbed)
    }

    /// The destination a reader would follow.
    ///
    /// Drops a wiki alias (`[[a.png|300]]`), angle brackets (`(<a b.png>)`) and
    /// a trailing quoted title (`(a.png "Title")`). Bare spaces stay, since
    /// pasted local paths often contain them.
    pub fn target(&self) -> &str {
        if self.is_wiki() {
            return self.url.split('|').next().unwrap_or("").trim();
        }
        let dest = self.url.as_str();
        if let Some(inner) = dest.strip_prefix('<').and_then(|d| d.strip_suffix('>')) {
            return inner.trim();
        }
        if dest.ends_with('"') {
            if let Some(idx) = dest.find(" \"") {
                return dest[..idx].trim_end();
            }
        }
        dest
    }

    /// Wiki alias or markdown label, whichever the link carries.
    pub fn display_text(&self) -> &str {
        if self.is_wiki() {
            return self.url.split_once('|').map(|(_, alias)| alias.trim()).unwrap_or("");
        }
        &self.label
    }
}

/// Lazily scans `text` for links. Each call starts over from the beginning.
pub fn scan_links(text: &str, include_wiki_links: bool) -> LinkScanner<'_> {
    LinkScanner {
        text,
        pos: 0,
        include_wiki_links,
    }
}

/// True when `offset` falls inside one of `links`.
pub(crate) fn inside_any_link(links: &[MarkdownLink], offset: usize) -> bool {
    links
        .iter()
        .any(|link| offset >= link.start && offset < link.end)
}

pub struct LinkScanner<'a> {
    text: &'a str,
    pos: usize,
    include_wiki_links: bool,
}

impl Iterator for LinkScanner<'_> {
    type Item = MarkdownLink;

    fn next(&mut self) -> Option<Self::Item> {
        let len = self.text.len();
        while self.pos < len {
            if let Some(link) = self.link_at(self.pos) {
                self.pos = link.end;
                return Some(link);
            }
            self.pos += 1;
        }
        None
    }
}

impl LinkScanner<'_> {
    fn link_at(&self, start: usize) -> Option<MarkdownLink> {
        let bytes = self.text.as_bytes();
        let bang = bytes[start] == b'!';
        let open = if bang { start + 1 } else { start };
        if bytes.get(open) != Some(&b'[') {
            return None;
        }

        if self.include_wiki_links && bytes.get(open + 1) == Some(&b'[') {
            return self.wiki_link_at(start, open, bang);
        }

        let label_close = matching_close(bytes, open, b'[', b']')?;
        let paren_open = label_close + 1;
        if bytes.get(paren_open) != Some(&b'(') {
            return None;
        }
        let paren_close = matching_close(bytes, paren_open, b'(', b')')?;
        let end = paren_close + 1;

        Some(MarkdownLink {
            full_match: self.text[start..end].to_string(),
            start,
            end,
            url: self.text[paren_open + 1..paren_close].trim().to_string(),
            label: self.text[open + 1..label_close].to_string(),
            kind: if bang { LinkKind::Image } else { LinkKind::Inline },
        })
    }

    fn wiki_link_at(&self, start: usize, open: usize, bang: bool) -> Option<MarkdownLink> {
        let inner_start = open + 2;
        let inner_len = self.text.get(inner_start..)?.find("]]")?;
        if inner_len == 0 {
            return None;
        }
        let inner_end = inner_start + inner_len;
        let end = inner_end + 2;

        Some(MarkdownLink {
            full_match: self.text[start..end].to_string(),
            start,
            end,
            url: self.text[inner_start..inner_end].to_string(),
            label: String::new(),
            kind: if bang { LinkKind::WikiEmbed } else { LinkKind::Wiki },
        })
    }
}

/// Index of the delimiter that brings depth back to zero, starting at `open`.
fn matching_close(bytes: &[u8], open: usize, open_ch: u8, close_ch: u8) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, &byte) in bytes.iter().enumerate().skip(open) {
        if byte == open_ch {
            depth += 1;
        } else if byte == close_ch {
            depth -= 1;
            if depth == 0 {
                return Some(idx);
            }
        }
    }
    None
}
