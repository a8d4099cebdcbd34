//! Long-lived owner of settings, uploaders, the document handle and the queue.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use attachsync_core::{
    extract_key, find_download_candidates, find_upload_candidates, is_own_link, FilePayload,
    ProcessItem, QueueView,
};
use attachsync_logging::{sync_debug, sync_info, sync_warn};

use crate::config::{ConfigError, SyncSettings};
use crate::document::{CursorKind, DocumentHandle, SharedDocument};
use crate::events::EventSink;
use crate::fetch::{ReqwestFetcher, RemoteFetcher};
use crate::filename::sanitize_file_name;
use crate::handlers::{SyncError, SyncHandlers};
use crate::providers::UploaderCache;
use crate::queue::{ProcessingQueue, TeardownReport};
use crate::store::AttachmentStore;
use crate::{Notice, NoticeLevel};

pub struct SyncService {
    settings: Arc<RwLock<SyncSettings>>,
    uploaders: Arc<UploaderCache>,
    document: DocumentHandle,
    store: AttachmentStore,
    queue: ProcessingQueue,
    sink: Arc<dyn EventSink>,
}

impl SyncService {
    /// Service for one document whose relative links resolve against `root`.
    ///
    /// Starts the queue's lanes, so it must be called inside a tokio runtime.
    pub fn new(
        settings: SyncSettings,
        document: SharedDocument,
        root: impl Into<PathBuf>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let fetcher = Arc::new(ReqwestFetcher::new(settings.fetch.into()));
        Self::with_parts(
            settings,
            document,
            AttachmentStore::new(root),
            Arc::new(UploaderCache::new()),
            fetcher,
            sink,
        )
    }

    pub fn with_parts(
        settings: SyncSettings,
        document: SharedDocument,
        store: AttachmentStore,
        uploaders: Arc<UploaderCache>,
        fetcher: Arc<dyn RemoteFetcher>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let concurrency = settings.concurrency;
        let settings = Arc::new(RwLock::new(settings));
        let document = DocumentHandle::new(document);
        let handlers = Arc::new(SyncHandlers {
            document: document.clone(),
            uploaders: uploaders.clone(),
            fetcher,
            store: store.clone(),
            settings: settings.clone(),
        });
        let queue = ProcessingQueue::new(handlers, concurrency, sink.clone());
        Self {
            settings,
            uploaders,
            document,
            store,
            queue,
            sink,
        }
    }

    pub fn settings(&self) -> SyncSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swaps in new settings and drops cached uploaders built from the old ones.
    ///
    /// Lane concurrency is fixed when the service starts.
    pub fn apply_settings(&self, settings: SyncSettings) {
        let mut current = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        if current.concurrency != settings.concurrency {
            sync_warn!("concurrency changes take effect on the next start");
        }
        *current = settings;
        drop(current);
        self.uploaders.invalidate();
        sync_info!("settings updated; uploader cache cleared");
    }

    /// Local validation of the storage settings. No network traffic.
    pub fn check_config(&self) -> Result<(), ConfigError> {
        let storage = self.settings().storage;
        storage.validate()?;
        self.uploaders.get(&storage)?.check_connection_config()
    }

    /// Round-trips a probe object through the configured backend.
    pub async fn test_connection(&self) -> Result<(), SyncError> {
        self.check_config()?;
        let uploader = self.uploaders.get(&self.settings().storage)?;
        match uploader.test_connection().await {
            Ok(()) => {
                self.notify(NoticeLevel::Success, "Connection test passed");
                Ok(())
            }
            Err(err) => {
                self.notify(NoticeLevel::Error, format!("Connection test failed: {err}"));
                Err(err.into())
            }
        }
    }

    /// Queues every local attachment the document links to. Returns the number queued.
    pub fn upload_document_attachments(&self) -> usize {
        if !self.config_ready() {
            return 0;
        }
        let Some(text) = self.document.with(|doc| doc.text()) else {
            return 0;
        };
        let settings = self.settings();
        let candidates = find_upload_candidates(&text, &settings.allowed_extensions);
        if candidates.is_empty() {
            self.notify(NoticeLevel::Info, "No local attachments to upload");
            return 0;
        }

        let mut items = Vec::with_capacity(candidates.len());
        for target in candidates {
            let path = self.locate_local(&target, &settings.attachment_folder);
            match self.store.read_binary(&path) {
                Ok(bytes) => {
                    let file = payload_for(&path, bytes);
                    items.push(ProcessItem::upload(file, target, None));
                }
                Err(err) => {
                    self.notify(NoticeLevel::Error, format!("Failed to read {target}: {err}"));
                }
            }
        }
        self.queue.enqueue(items)
    }

    /// Saves pasted files beside the document, links them at the cursor and queues their upload.
    pub fn paste_files(&self, files: Vec<FilePayload>) -> Result<usize, SyncError> {
        if !self.config_ready() {
            return Ok(0);
        }
        if !self.document.is_attached() {
            return Err(SyncError::DocumentClosed);
        }
        let folder = self.settings().attachment_folder;
        let mut links = Vec::with_capacity(files.len());
        let mut items = Vec::with_capacity(files.len());
        for file in files {
            let name = sanitize_file_name(&file.name);
            let relative = self.store.available_path(&folder, &name);
            self.store.write_binary(&relative, &file.bytes)?;
            let target = self.store.link_for(&relative);
            sync_debug!("pasted {} as {}", file.name, target);
            links.push(format!("![{name}]({target})"));
            items.push(ProcessItem::upload(file, target, None));
        }

        let inserted = self
            .document
            .with(|doc| {
                let at = doc.cursor(CursorKind::To);
                doc.replace_range(&links.join("\n"), at, at);
            })
            .is_some();
        if !inserted {
            return Err(SyncError::DocumentClosed);
        }
        Ok(self.queue.enqueue(items))
    }

    /// Queues a download for every link into the configured public domain.
    pub fn download_remote_attachments(&self) -> usize {
        let Some(domain) = self.public_domain() else {
            return 0;
        };
        let Some(text) = self.document.with(|doc| doc.text()) else {
            return 0;
        };
        let items: Vec<ProcessItem> = find_download_candidates(&text, &domain)
            .into_iter()
            .map(ProcessItem::download)
            .collect();
        if items.is_empty() {
            self.notify(NoticeLevel::Info, "No remote attachments to download");
            return 0;
        }
        self.queue.enqueue(items)
    }

    /// Queues a remote delete for each stored attachment inside the current selection.
    pub fn delete_selected_attachments(&self) -> usize {
        if !self.config_ready() {
            return 0;
        }
        let Some(domain) = self.public_domain() else {
            return 0;
        };
        let Some(selection) = self.document.with(|doc| doc.selection()).flatten() else {
            self.notify(NoticeLevel::Info, "Select the attachments to delete first");
            return 0;
        };
        let items: Vec<ProcessItem> = find_download_candidates(&selection.text, &domain)
            .into_iter()
            .map(|url| {
                let key = extract_key(&url, &domain);
                ProcessItem::delete(url, key, Some(selection.text.clone()))
            })
            .collect();
        if items.is_empty() {
            self.notify(NoticeLevel::Info, "No stored attachments in the selection");
            return 0;
        }
        self.queue.enqueue(items)
    }

    /// Queues a remote delete for each given URL; foreign URLs are skipped.
    pub fn delete_links(&self, urls: &[String]) -> usize {
        if !self.config_ready() {
            return 0;
        }
        let Some(domain) = self.public_domain() else {
            return 0;
        };
        let mut items = Vec::with_capacity(urls.len());
        for url in urls {
            if is_own_link(url, &domain) {
                items.push(ProcessItem::delete(url.clone(), extract_key(url, &domain), None));
            } else {
                self.notify(
                    NoticeLevel::Warning,
                    format!("{url} is not served from {domain}; skipped"),
                );
            }
        }
        self.queue.enqueue(items)
    }

    pub fn status(&self) -> QueueView {
        self.queue.status()
    }

    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await
    }

    /// Drops queued work and detaches the document so in-flight items leave it alone.
    pub fn teardown(&self) -> TeardownReport {
        let report = self.queue.teardown();
        self.document.detach();
        report
    }

    fn config_ready(&self) -> bool {
        match self.check_config() {
            Ok(()) => true,
            Err(err) => {
                self.notify(
                    NoticeLevel::Error,
                    format!("Storage is not configured: {err}"),
                );
                false
            }
        }
    }

    fn public_domain(&self) -> Option<String> {
        let domain = self.settings().storage.public_domain();
        if domain.is_none() {
            self.notify(NoticeLevel::Error, "No public domain configured for storage");
        }
        domain
    }

    /// Resolves a link target; bare names fall back to the attachment folder.
    fn locate_local(&self, target: &str, attachment_folder: &str) -> PathBuf {
        let direct = self.store.resolve_link(target);
        if direct.exists() || target.contains('/') {
            return direct;
        }
        let in_folder = self.store.resolve_link(&format!("{attachment_folder}/{target}"));
        if in_folder.exists() {
            in_folder
        } else {
            direct
        }
    }

    fn notify(&self, level: NoticeLevel, message: impl Into<String>) {
        self.sink.notice(Notice::new(level, message));
    }
}

/// Payload for a file read from disk; MIME type guessed from the extension.
pub fn payload_for(path: &Path, bytes: Vec<u8>) -> FilePayload {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());
    let mime = mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    FilePayload::new(name, mime, bytes)
}
