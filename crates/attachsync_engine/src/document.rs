//! Editable text the sync engine reconciles against.
//!
//! Handlers never hold a document across an await point: they reach it
//! through a [`DocumentHandle`], read or write in one short critical
//! section, and treat a detached handle as "the user closed the document".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use attachsync_logging::sync_warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub from: usize,
    pub to: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorKind {
    From,
    To,
}

/// Minimal editor surface: whole text, current selection, ranged replace.
pub trait Document {
    fn text(&self) -> String;

    fn selection(&self) -> Option<Selection>;

    /// Replaces bytes `from..to` with `text`.
    fn replace_range(&mut self, text: &str, from: usize, to: usize);

    fn cursor(&self, kind: CursorKind) -> usize;
}

/// In-memory document used by the CLI and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextDocument {
    text: String,
    selection: Option<(usize, usize)>,
    cursor: usize,
}

impl TextDocument {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let cursor = text.len();
        Self {
            text,
            selection: None,
            cursor,
        }
    }

    /// Selects bytes `from..to`; out-of-range or split characters clear the selection.
    pub fn select(&mut self, from: usize, to: usize) {
        if self.valid_range(from, to) {
            self.selection = Some((from, to));
            self.cursor = to;
        } else {
            sync_warn!("ignoring invalid selection {}..{}", from, to);
            self.selection = None;
        }
    }

    pub fn set_cursor(&mut self, at: usize) {
        if self.valid_range(at, at) {
            self.cursor = at;
            self.selection = None;
        }
    }

    fn valid_range(&self, from: usize, to: usize) -> bool {
        from <= to
            && to <= self.text.len()
            && self.text.is_char_boundary(from)
            && self.text.is_char_boundary(to)
    }
}

impl Document for TextDocument {
    fn text(&self) -> String {
        self.text.clone()
    }

    fn selection(&self) -> Option<Selection> {
        let (from, to) = self.selection?;
        Some(Selection {
            from,
            to,
            text: self.text[from..to].to_string(),
        })
    }

    fn replace_range(&mut self, text: &str, from: usize, to: usize) {
        if !self.valid_range(from, to) {
            sync_warn!("ignoring replace of invalid range {}..{}", from, to);
            return;
        }
        self.text.replace_range(from..to, text);
        let shift = |pos: usize| -> usize {
            if pos <= from {
                pos
            } else if pos >= to {
                pos - (to - from) + text.len()
            } else {
                from + text.len()
            }
        };
        self.cursor = shift(self.cursor);
        self.selection = match self.selection {
            // A replace overlapping the selection consumes it.
            Some((sel_from, sel_to)) if sel_to <= from || sel_from >= to => {
                Some((shift(sel_from), shift(sel_to)))
            }
            _ => None,
        };
    }

    fn cursor(&self, kind: CursorKind) -> usize {
        match (kind, self.selection) {
            (CursorKind::From, Some((from, _))) => from,
            (CursorKind::To, Some((_, to))) => to,
            _ => self.cursor,
        }
    }
}

pub type SharedDocument = Arc<Mutex<dyn Document + Send>>;

/// Weakly tied access to the active document.
#[derive(Clone)]
pub struct DocumentHandle {
    document: SharedDocument,
    attached: Arc<AtomicBool>,
}

impl DocumentHandle {
    pub fn new(document: SharedDocument) -> Self {
        Self {
            document,
            attached: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Runs `f` on the document, or returns `None` once detached.
    pub fn with<R>(&self, f: impl FnOnce(&mut dyn Document) -> R) -> Option<R> {
        if !self.is_attached() {
            return None;
        }
        let mut guard = self
            .document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Some(f(&mut *guard))
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    pub fn detach(&self) {
        self.attached.store(false, Ordering::Release);
    }
}
