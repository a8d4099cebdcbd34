use std::fs;
use std::path::Path;
use std::time::Duration;

use attachsync_core::{EventType, DEFAULT_ALLOWED_EXTENSIONS};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::fetch::FetchSettings;

pub const ENV_ACCESS_KEY_ID: &str = "ATTACHSYNC_ACCESS_KEY_ID";
pub const ENV_SECRET_ACCESS_KEY: &str = "ATTACHSYNC_SECRET_ACCESS_KEY";
pub const ENV_WEBDAV_PASSWORD: &str = "ATTACHSYNC_WEBDAV_PASSWORD";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing setting `{0}`")]
    Missing(&'static str),
    #[error("invalid setting `{field}`: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },
    #[error("failed to parse settings: {0}")]
    Parse(String),
}

/// Storage providers. S3, R2, OSS and COS all speak the S3 protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProviderKind {
    #[default]
    S3,
    R2,
    Oss,
    Cos,
    WebDav,
}

impl ProviderKind {
    pub fn is_s3_compatible(self) -> bool {
        !matches!(self, ProviderKind::WebDav)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub provider: ProviderKind,
    pub bucket: String,
    pub region: String,
    /// Overrides the provider's default S3 endpoint.
    pub endpoint: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Custom domain fronting the bucket; provider default when absent.
    pub public_domain: Option<String>,
    /// Folder prepended to generated keys.
    pub key_prefix: String,
    pub webdav_url: String,
    pub username: String,
    pub password: String,
}

impl StorageConfig {
    /// Base URL public links are built from.
    pub fn public_domain(&self) -> Option<String> {
        if let Some(custom) = self.public_domain.as_deref().map(str::trim) {
            if !custom.is_empty() {
                let with_scheme = if custom.contains("://") {
                    custom.to_string()
                } else {
                    format!("https://{custom}")
                };
                return Some(with_scheme.trim_end_matches('/').to_string());
            }
        }
        let bucket = &self.bucket;
        let region = &self.region;
        match self.provider {
            ProviderKind::S3 => Some(format!("https://{bucket}.s3.{region}.amazonaws.com")),
            ProviderKind::Oss => Some(format!("https://{bucket}.{region}.aliyuncs.com")),
            ProviderKind::Cos => Some(format!("https://{bucket}.cos.{region}.myqcloud.com")),
            ProviderKind::R2 => None,
            ProviderKind::WebDav => {
                let base = self.webdav_url.trim().trim_end_matches('/');
                (!base.is_empty()).then(|| base.to_string())
            }
        }
    }

    /// S3 API endpoint; `None` means the AWS default.
    pub fn endpoint_url(&self) -> Option<String> {
        if let Some(endpoint) = self.endpoint.as_deref().map(str::trim) {
            if !endpoint.is_empty() {
                return Some(endpoint.trim_end_matches('/').to_string());
            }
        }
        match self.provider {
            ProviderKind::Oss => Some(format!("https://{}.aliyuncs.com", self.region)),
            ProviderKind::Cos => Some(format!("https://cos.{}.myqcloud.com", self.region)),
            ProviderKind::S3 | ProviderKind::R2 | ProviderKind::WebDav => None,
        }
    }

    /// Local checks only; nothing here touches the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.provider {
            ProviderKind::WebDav => {
                require("webdav_url", &self.webdav_url)?;
                require("username", &self.username)?;
                parse_http_url("webdav_url", &self.webdav_url)?;
            }
            provider => {
                require("bucket", &self.bucket)?;
                require("access_key_id", &self.access_key_id)?;
                require("secret_access_key", &self.secret_access_key)?;
                if provider == ProviderKind::R2 {
                    let endpoint = self.endpoint.as_deref().unwrap_or("");
                    require("endpoint", endpoint)?;
                    parse_http_url("endpoint", endpoint)?;
                    if self.public_domain.as_deref().unwrap_or("").trim().is_empty() {
                        return Err(ConfigError::Missing("public_domain"));
                    }
                } else {
                    require("region", &self.region)?;
                }
            }
        }
        if let Some(domain) = self.public_domain() {
            parse_http_url("public_domain", &domain)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencySettings {
    pub upload: usize,
    pub download: usize,
    pub delete: usize,
}

impl Default for ConcurrencySettings {
    fn default() -> Self {
        Self {
            upload: 1,
            download: 3,
            delete: 1,
        }
    }
}

impl ConcurrencySettings {
    pub fn for_kind(&self, event_type: EventType) -> usize {
        let limit = match event_type {
            EventType::Upload => self.upload,
            EventType::Download => self.download,
            EventType::Delete => self.delete,
        };
        limit.max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub max_bytes: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            request_timeout_secs: 120,
            max_bytes: 512 * 1024 * 1024,
        }
    }
}

impl From<FetchConfig> for FetchSettings {
    fn from(config: FetchConfig) -> Self {
        FetchSettings {
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            max_bytes: config.max_bytes,
            ..FetchSettings::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub storage: StorageConfig,
    pub allowed_extensions: Vec<String>,
    pub concurrency: ConcurrencySettings,
    pub fetch: FetchConfig,
    /// Folder, relative to the document, that downloads and pasted files land in.
    pub attachment_folder: String,
    pub delete_local_after_upload: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            concurrency: ConcurrencySettings::default(),
            fetch: FetchConfig::default(),
            attachment_folder: "attachments".to_string(),
            delete_local_after_upload: false,
        }
    }
}

impl SyncSettings {
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        ron::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Reads a RON settings file, then applies secrets from the environment.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        let mut settings = Self::from_ron_str(&text)?;
        settings.apply_overrides(|name| std::env::var(name).ok());
        Ok(settings)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let storage = &mut self.storage;
        if let Some(value) = lookup(ENV_ACCESS_KEY_ID) {
            storage.access_key_id = value;
        }
        if let Some(value) = lookup(ENV_SECRET_ACCESS_KEY) {
            storage.secret_access_key = value;
        }
        if let Some(value) = lookup(ENV_WEBDAV_PASSWORD) {
            storage.password = value;
        }
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Missing(field))
    } else {
        Ok(())
    }
}

fn parse_http_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value.trim()).map_err(|err| ConfigError::Invalid {
        field,
        message: err.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ConfigError::Invalid {
            field,
            message: format!("expected an http(s) url, got {value}"),
        });
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s3() -> StorageConfig {
        StorageConfig {
            provider: ProviderKind::S3,
            bucket: "notes".into(),
            region: "eu-west-1".into(),
            access_key_id: "AKIA".into(),
            secret_access_key: "secret".into(),
            ..StorageConfig::default()
        }
    }

    #[test]
    fn default_public_domains_follow_provider() {
        assert_eq!(
            s3().public_domain().as_deref(),
            Some("https://notes.s3.eu-west-1.amazonaws.com")
        );
        let cos = StorageConfig {
            provider: ProviderKind::Cos,
            region: "ap-shanghai".into(),
            ..s3()
        };
        assert_eq!(
            cos.public_domain().as_deref(),
            Some("https://notes.cos.ap-shanghai.myqcloud.com")
        );
        assert_eq!(
            cos.endpoint_url().as_deref(),
            Some("https://cos.ap-shanghai.myqcloud.com")
        );
    }

    #[test]
    fn custom_domain_gets_scheme_and_loses_trailing_slash() {
        let config = StorageConfig {
            public_domain: Some("img.example.com/".into()),
            ..s3()
        };
        assert_eq!(config.public_domain().as_deref(), Some("https://img.example.com"));
    }

    #[test]
    fn validation_names_the_missing_field() {
        assert_eq!(s3().validate(), Ok(()));
        let missing = StorageConfig {
            secret_access_key: String::new(),
            ..s3()
        };
        assert_eq!(missing.validate(), Err(ConfigError::Missing("secret_access_key")));

        let r2 = StorageConfig {
            provider: ProviderKind::R2,
            endpoint: Some("https://acct.r2.cloudflarestorage.com".into()),
            ..s3()
        };
        assert_eq!(r2.validate(), Err(ConfigError::Missing("public_domain")));
    }

    #[test]
    fn webdav_requires_a_parsable_url() {
        let config = StorageConfig {
            provider: ProviderKind::WebDav,
            webdav_url: "not a url".into(),
            username: "me".into(),
            ..StorageConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "webdav_url", .. })
        ));
    }

    #[test]
    fn ron_settings_fill_defaults_and_take_env_secrets() {
        let text = r#"(
            storage: (
                provider: WebDav,
                webdav_url: "https://dav.example.com/files",
                username: "me",
            ),
            concurrency: (download: 5),
        )"#;
        let mut settings = SyncSettings::from_ron_str(text).unwrap();
        settings.apply_overrides(|name| (name == ENV_WEBDAV_PASSWORD).then(|| "pw".to_string()));

        assert_eq!(settings.storage.provider, ProviderKind::WebDav);
        assert_eq!(settings.storage.password, "pw");
        assert_eq!(settings.concurrency.download, 5);
        assert_eq!(settings.concurrency.upload, 1);
        assert_eq!(settings.attachment_folder, "attachments");
        assert!(settings.allowed_extensions.iter().any(|ext| ext == "png"));
    }

    #[test]
    fn zero_concurrency_is_raised_to_one() {
        let settings = ConcurrencySettings {
            upload: 0,
            ..ConcurrencySettings::default()
        };
        assert_eq!(settings.for_kind(EventType::Upload), 1);
        assert_eq!(settings.for_kind(EventType::Download), 3);
    }
}
