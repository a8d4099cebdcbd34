use attachsync_core::FilePayload;

use crate::config::{ConfigError, ProviderKind};
use crate::events::{NoProgress, ProgressSink};

pub const PROBE_FILE_NAME: &str = "attachsync-connection-probe.txt";

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("delete failed: {0}")]
    Delete(String),
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Where an uploaded file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub url: String,
    pub key: String,
}

/// A remote storage backend.
///
/// Implementations are shared between concurrently running items and must
/// not keep per-upload state.
#[async_trait::async_trait]
pub trait Uploader: Send + Sync {
    fn provider(&self) -> ProviderKind;

    /// Stores `file` under `key`, or under a key derived from its name and
    /// content when `key` is `None`.
    async fn upload_file(
        &self,
        file: &FilePayload,
        key: Option<&str>,
        progress: &dyn ProgressSink,
    ) -> Result<UploadedFile, UploadError>;

    async fn delete_file(&self, key: &str) -> Result<(), UploadError>;

    /// Validates settings without touching the network.
    fn check_connection_config(&self) -> Result<(), ConfigError>;

    /// Base of the URLs this backend hands out.
    fn public_domain(&self) -> Option<String>;

    fn public_url(&self, key: &str) -> String {
        match self.public_domain() {
            Some(domain) => attachsync_core::to_public_url(key, &domain),
            None => attachsync_core::encode_key_path(key),
        }
    }

    /// Round-trips a tiny probe file.
    async fn test_connection(&self) -> Result<(), UploadError> {
        self.check_connection_config()?;
        let probe = FilePayload::new(
            PROBE_FILE_NAME,
            "text/plain",
            b"attachsync connection probe".to_vec(),
        );
        let uploaded = self.upload_file(&probe, None, &NoProgress).await?;
        self.delete_file(&uploaded.key).await
    }
}
