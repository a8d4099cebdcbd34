//! Units of queued work.
//!
//! Items are built once, when the user triggers an event, and are read-only
//! afterwards; fields are private and exposed through accessors.

use std::fmt;

use uuid::Uuid;

/// Process-unique correlation token for progress and placeholder markers.
pub type ItemId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventType {
    Upload,
    Download,
    Delete,
}

impl EventType {
    pub const ALL: [EventType; 3] = [EventType::Upload, EventType::Download, EventType::Delete];
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Upload => write!(f, "upload"),
            EventType::Download => write!(f, "download"),
            EventType::Delete => write!(f, "delete"),
        }
    }
}

/// A file handed to an uploader.
#[derive(Clone, PartialEq, Eq)]
pub struct FilePayload {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl FilePayload {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

impl fmt::Debug for FilePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePayload")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("size", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadItem {
    id: ItemId,
    file: FilePayload,
    local_path: String,
    key: Option<String>,
}

impl UploadItem {
    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn file(&self) -> &FilePayload {
        &self.file
    }

    /// Link target, as written in the document, that the upload replaces.
    pub fn local_path(&self) -> &str {
        &self.local_path
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadItem {
    id: ItemId,
    url: String,
}

impl DownloadItem {
    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteItem {
    id: ItemId,
    file_link: String,
    file_key: String,
    original_selection: Option<String>,
}

impl DeleteItem {
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// URL as it appears in the text.
    pub fn file_link(&self) -> &str {
        &self.file_link
    }

    pub fn file_key(&self) -> &str {
        &self.file_key
    }

    /// Selected text at enqueue time; fallback scope when the live selection is gone.
    pub fn original_selection(&self) -> Option<&str> {
        self.original_selection.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessItem {
    Upload(UploadItem),
    Download(DownloadItem),
    Delete(DeleteItem),
}

impl ProcessItem {
    pub fn upload(file: FilePayload, local_path: impl Into<String>, key: Option<String>) -> Self {
        ProcessItem::Upload(UploadItem {
            id: Uuid::new_v4(),
            file,
            local_path: local_path.into(),
            key,
        })
    }

    pub fn download(url: impl Into<String>) -> Self {
        ProcessItem::Download(DownloadItem {
            id: Uuid::new_v4(),
            url: url.into(),
        })
    }

    pub fn delete(
        file_link: impl Into<String>,
        file_key: impl Into<String>,
        original_selection: Option<String>,
    ) -> Self {
        ProcessItem::Delete(DeleteItem {
            id: Uuid::new_v4(),
            file_link: file_link.into(),
            file_key: file_key.into(),
            original_selection,
        })
    }

    pub fn id(&self) -> ItemId {
        match self {
            ProcessItem::Upload(item) => item.id,
            ProcessItem::Download(item) => item.id,
            ProcessItem::Delete(item) => item.id,
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            ProcessItem::Upload(_) => EventType::Upload,
            ProcessItem::Download(_) => EventType::Download,
            ProcessItem::Delete(_) => EventType::Delete,
        }
    }

    /// Path or URL the user would recognize this item by.
    pub fn reference(&self) -> &str {
        match self {
            ProcessItem::Upload(item) => &item.local_path,
            ProcessItem::Download(item) => &item.url,
            ProcessItem::Delete(item) => &item.file_link,
        }
    }

    pub fn summary(&self) -> crate::ItemSummary {
        crate::ItemSummary {
            id: self.id(),
            event_type: self.event_type(),
            reference: self.reference().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EventType, FilePayload, ProcessItem};

    #[test]
    fn constructors_tag_items_and_assign_distinct_ids() {
        let upload = ProcessItem::upload(
            FilePayload::new("a.png", "image/png", vec![1, 2, 3]),
            "./a.png",
            None,
        );
        let download = ProcessItem::download("https://cdn.example.com/a.png");

        assert_eq!(upload.event_type(), EventType::Upload);
        assert_eq!(download.event_type(), EventType::Download);
        assert_ne!(upload.id(), download.id());
        assert_eq!(upload.reference(), "./a.png");
    }

    #[test]
    fn payload_debug_omits_bytes() {
        let payload = FilePayload::new("a.png", "image/png", vec![0; 1024]);
        let rendered = format!("{payload:?}");
        assert!(rendered.contains("size: 1024"));
        assert!(!rendered.contains("[0, 0"));
    }
}
