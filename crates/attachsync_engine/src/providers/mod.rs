//! Storage backends and the cache that hands them out.

mod s3;
mod webdav;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use attachsync_logging::sync_debug;

use crate::config::{ConfigError, ProviderKind, StorageConfig};
use crate::uploader::Uploader;

pub use s3::S3Uploader;
pub use webdav::WebDavUploader;

pub type UploaderFactory =
    dyn Fn(&StorageConfig) -> Result<Arc<dyn Uploader>, ConfigError> + Send + Sync;

/// Builds the backend selected by `config.provider`.
pub fn create_uploader(config: &StorageConfig) -> Result<Arc<dyn Uploader>, ConfigError> {
    match config.provider {
        ProviderKind::WebDav => Ok(Arc::new(WebDavUploader::new(config.clone())?)),
        ProviderKind::S3 | ProviderKind::R2 | ProviderKind::Oss | ProviderKind::Cos => {
            Ok(Arc::new(S3Uploader::new(config.clone())?))
        }
    }
}

/// One uploader per provider, built on first use.
///
/// Entries are built from the settings current at that time, so callers
/// must `invalidate` whenever settings change.
pub struct UploaderCache {
    factory: Box<UploaderFactory>,
    entries: Mutex<HashMap<ProviderKind, Arc<dyn Uploader>>>,
}

impl Default for UploaderCache {
    fn default() -> Self {
        Self::with_factory(create_uploader)
    }
}

impl UploaderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_factory(
        factory: impl Fn(&StorageConfig) -> Result<Arc<dyn Uploader>, ConfigError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            factory: Box::new(factory),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, config: &StorageConfig) -> Result<Arc<dyn Uploader>, ConfigError> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(uploader) = entries.get(&config.provider) {
            return Ok(uploader.clone());
        }
        sync_debug!("building {:?} uploader", config.provider);
        let uploader = (self.factory)(config)?;
        entries.insert(config.provider, uploader.clone());
        Ok(uploader)
    }

    pub fn invalidate(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}
