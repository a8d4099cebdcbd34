//! Attachsync engine: storage backends, downloads, the local store and the
//! async queue driving `attachsync_core`.
mod config;
mod document;
mod events;
mod fetch;
mod filename;
mod handlers;
mod providers;
mod queue;
mod service;
mod store;
mod types;
mod uploader;

pub use config::{
    ConcurrencySettings, ConfigError, FetchConfig, ProviderKind, StorageConfig, SyncSettings,
    ENV_ACCESS_KEY_ID, ENV_SECRET_ACCESS_KEY, ENV_WEBDAV_PASSWORD,
};
pub use document::{CursorKind, Document, DocumentHandle, Selection, SharedDocument, TextDocument};
pub use events::{ChannelEventSink, EventSink, NoProgress, ProgressSink, RecordingEventSink};
pub use fetch::{FetchSettings, RemoteFetcher, ReqwestFetcher};
pub use filename::{file_name_from_url, sanitize_file_name, storage_key_for};
pub use handlers::{SyncError, SyncHandlers};
pub use providers::{create_uploader, S3Uploader, UploaderCache, UploaderFactory, WebDavUploader};
pub use queue::{ItemHandler, ProcessingQueue, ProgressReporter, TeardownReport};
pub use service::{payload_for, SyncService};
pub use store::{ensure_dir, write_atomic, AttachmentStore, StoreError};
pub use types::{
    FailureKind, FetchError, FetchMetadata, FetchOutput, Notice, NoticeLevel, SyncEvent,
};
pub use uploader::{UploadError, UploadedFile, Uploader, PROBE_FILE_NAME};
