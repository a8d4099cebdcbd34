use std::time::Duration;

use attachsync_core::{encode_key_path, FilePayload};
use attachsync_logging::{sync_debug, sync_info, sync_warn};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};

use crate::config::{ConfigError, ProviderKind, StorageConfig};
use crate::events::ProgressSink;
use crate::filename::storage_key_for;
use crate::uploader::{UploadError, UploadedFile, Uploader};

/// Plain HTTP WebDAV backend: `PUT` to store, `DELETE` to remove.
pub struct WebDavUploader {
    client: reqwest::Client,
    config: StorageConfig,
}

impl WebDavUploader {
    pub fn new(config: StorageConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| ConfigError::Invalid {
                field: "webdav_url",
                message: e.to_string(),
            })?;
        Ok(Self { client, config })
    }

    fn base(&self) -> &str {
        self.config.webdav_url.trim().trim_end_matches('/')
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base(), encode_key_path(key.trim_start_matches('/')))
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.config.username, Some(&self.config.password))
    }

    /// Creates each parent collection of `key`. Existing ones answer 405.
    async fn ensure_collections(&self, key: &str) -> Result<(), UploadError> {
        let mkcol = Method::from_bytes(b"MKCOL").map_err(|e| UploadError::Backend(e.to_string()))?;
        let segments: Vec<&str> = key.split('/').filter(|s| !s.is_empty()).collect();
        let Some((_, parents)) = segments.split_last() else {
            return Ok(());
        };
        let mut path = String::new();
        for segment in parents {
            if !path.is_empty() {
                path.push('/');
            }
            path.push_str(segment);
            let url = format!("{}/{}/", self.base(), encode_key_path(&path));
            let response = self
                .request(mkcol.clone(), &url)
                .send()
                .await
                .map_err(|e| UploadError::Upload(e.to_string()))?;
            let status = response.status();
            if status.is_success() || status == StatusCode::METHOD_NOT_ALLOWED {
                sync_debug!("collection {} ready ({})", path, status);
            } else {
                return Err(UploadError::Upload(format!(
                    "could not create collection {path}: {status}"
                )));
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Uploader for WebDavUploader {
    fn provider(&self) -> ProviderKind {
        ProviderKind::WebDav
    }

    async fn upload_file(
        &self,
        file: &FilePayload,
        key: Option<&str>,
        progress: &dyn ProgressSink,
    ) -> Result<UploadedFile, UploadError> {
        let key = match key {
            Some(key) => key.to_string(),
            None => storage_key_for(&self.config.key_prefix, &file.name, &file.bytes),
        };
        progress.report(0);
        self.ensure_collections(&key).await?;

        let response = self
            .request(Method::PUT, &self.url_for(&key))
            .header(CONTENT_TYPE, file.mime.as_str())
            .body(file.bytes.clone())
            .send()
            .await
            .map_err(|e| UploadError::Upload(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Upload(format!("PUT {key} returned {status}")));
        }
        progress.report(100);
        sync_info!("uploaded {} ({} bytes) to webdav {}", file.name, file.size(), key);

        Ok(UploadedFile {
            url: self.public_url(&key),
            key,
        })
    }

    async fn delete_file(&self, key: &str) -> Result<(), UploadError> {
        let response = self
            .request(Method::DELETE, &self.url_for(key))
            .send()
            .await
            .map_err(|e| UploadError::Delete(e.to_string()))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            sync_warn!("{} was already gone from webdav", key);
            return Ok(());
        }
        if !status.is_success() {
            return Err(UploadError::Delete(format!("DELETE {key} returned {status}")));
        }
        sync_info!("deleted {} from webdav", key);
        Ok(())
    }

    fn check_connection_config(&self) -> Result<(), ConfigError> {
        self.config.validate()
    }

    fn public_domain(&self) -> Option<String> {
        self.config.public_domain()
    }
}
