use std::time::Instant;

use attachsync_core::FilePayload;
use attachsync_logging::{sync_error, sync_info};
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::{
    Attribute, Attributes, Error as ObjectStoreError, ObjectStore, ObjectStoreExt, PutOptions,
    PutPayload,
};
use url::Url;

use crate::config::{ConfigError, ProviderKind, StorageConfig};
use crate::events::ProgressSink;
use crate::filename::storage_key_for;
use crate::uploader::{UploadError, UploadedFile, Uploader};

/// S3-protocol backend for AWS S3, Cloudflare R2, Aliyun OSS and Tencent COS.
pub struct S3Uploader {
    store: AmazonS3,
    config: StorageConfig,
}

impl S3Uploader {
    pub fn new(config: StorageConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let region = match config.provider {
            ProviderKind::R2 if config.region.trim().is_empty() => "auto".to_string(),
            _ => config.region.clone(),
        };

        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(config.bucket.clone())
            .with_region(region)
            .with_access_key_id(config.access_key_id.clone())
            .with_secret_access_key(config.secret_access_key.clone());

        if let Some(endpoint) = config.endpoint_url() {
            let virtual_hosted = matches!(config.provider, ProviderKind::Oss | ProviderKind::Cos);
            let endpoint = if virtual_hosted {
                bucket_endpoint(&endpoint, &config.bucket)?
            } else {
                endpoint
            };
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(allow_http)
                .with_virtual_hosted_style_request(virtual_hosted);
        }

        let store = builder.build().map_err(|e| ConfigError::Invalid {
            field: "storage",
            message: e.to_string(),
        })?;
        Ok(Self { store, config })
    }
}

/// Virtual-hosted endpoints carry the bucket as the first host label.
fn bucket_endpoint(endpoint: &str, bucket: &str) -> Result<String, ConfigError> {
    let invalid = |message: String| ConfigError::Invalid {
        field: "endpoint",
        message,
    };
    let mut url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| invalid(format!("no host in {endpoint}")))?
        .to_string();
    if host.starts_with(&format!("{bucket}.")) {
        return Ok(endpoint.to_string());
    }
    url.set_host(Some(&format!("{bucket}.{host}")))
        .map_err(|e| invalid(e.to_string()))?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}

#[async_trait::async_trait]
impl Uploader for S3Uploader {
    fn provider(&self) -> ProviderKind {
        self.config.provider
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
        let location = Path::from(key.clone());
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, file.mime.clone().into());
        let options = PutOptions {
            attributes,
            ..PutOptions::default()
        };

        let start = Instant::now();
        progress.report(0);
        self.store
            .put_opts(&location, PutPayload::from(Bytes::from(file.bytes.clone())), options)
            .await
            .map_err(|e| {
                sync_error!(
                    "{:?} upload of {} to bucket {} failed after {:.0} ms: {}",
                    self.config.provider,
                    key,
                    self.config.bucket,
                    start.elapsed().as_secs_f64() * 1000.0,
                    e
                );
                UploadError::Upload(e.to_string())
            })?;
        progress.report(100);

        sync_info!(
            "uploaded {} ({} bytes) to {} in {:.0} ms",
            file.name,
            file.size(),
            key,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(UploadedFile {
            url: self.public_url(&key),
            key,
        })
    }

    async fn delete_file(&self, key: &str) -> Result<(), UploadError> {
        let location = Path::from(key.to_string());
        match self.store.delete(&location).await {
            Ok(()) => {
                sync_info!("deleted {} from bucket {}", key, self.config.bucket);
                Ok(())
            }
            Err(ObjectStoreError::NotFound { .. }) => {
                sync_info!("{} was already gone from bucket {}", key, self.config.bucket);
                Ok(())
            }
            Err(e) => {
                sync_error!("delete of {} failed: {}", key, e);
                Err(UploadError::Delete(e.to_string()))
            }
        }
    }

    fn check_connection_config(&self) -> Result<(), ConfigError> {
        self.config.validate()
    }

    fn public_domain(&self) -> Option<String> {
        self.config.public_domain()
    }
}
