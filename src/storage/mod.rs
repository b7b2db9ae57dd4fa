pub mod local;
pub mod memory;
pub mod s3;

use crate::config::{BackendConfig, MediasyncConfig};
use crate::error::ConfigError;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub use local::LocalStorage;
pub use memory::{MemoryStorage, StoredObject};
pub use s3::S3Storage;

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- list 等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- put
pub const IO_TIMEOUT_SECS: u64 = 300;

/// 保存压缩前摘要的自定义元数据键
pub const CHECKSUM_METADATA_KEY: &str = "mediasync-checksum";

/// 已注册的后端
pub const BACKENDS: &[&str] = &["s3", "local", "memory"];

/// 远端已有对象
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub path: String,
    /// ETag 或等价的内容摘要（hex）
    pub fingerprint: Option<String>,
}

/// 上传时附带的元数据
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutHeaders {
    pub cache_control: String,
    /// HTTP 日期格式的过期时间
    pub expires: String,
    /// 压缩时为 "gzip"
    pub content_encoding: Option<String>,
    /// 传输内容（压缩后）的 base64 MD5
    pub content_md5: String,
    /// 压缩前内容的 base64 摘要，用于后续变更检测
    pub identity_digest: String,
}

impl PutHeaders {
    pub fn new(
        expiration_days: u32,
        now: DateTime<Utc>,
        content_encoding: Option<&str>,
        content_md5: &str,
        identity_digest: &str,
    ) -> Self {
        let then = now + chrono::Duration::days(i64::from(expiration_days));
        Self {
            cache_control: format!("max-age={}", u64::from(expiration_days) * 24 * 3600),
            expires: then.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
            content_encoding: content_encoding.map(str::to_string),
            content_md5: content_md5.to_string(),
            identity_digest: identity_digest.to_string(),
        }
    }
}

/// 存储抽象接口
#[async_trait]
pub trait Storage: Send + Sync {
    /// 建立连接（默认无操作）
    async fn open(&self) -> Result<()> {
        Ok(())
    }

    /// 递归列出远端已有文件，每个会话调用一次
    async fn list_existing(&self, prefix: Option<&str>) -> Result<Vec<RemoteObject>>;

    /// 写入整个文件
    async fn put(
        &self,
        path: &str,
        data: Bytes,
        content_type: &str,
        headers: &PutHeaders,
        force: bool,
    ) -> Result<()>;

    /// 对外访问的基础 URL（不带结尾 `/`）
    fn public_url(&self, with_ssl: bool) -> String;

    /// 关闭连接（默认无操作）
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}

/// 检查后端名称及其必填项，不做任何 IO
pub fn validate_backend(config: &BackendConfig) -> Result<(), ConfigError> {
    let backend = config
        .backend
        .as_deref()
        .ok_or(ConfigError::MissingBackend)?;

    match backend {
        "s3" => {
            if config.bucket.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::MissingField {
                    backend: "s3",
                    field: "bucket",
                });
            }
        }
        "local" => {
            if config.path.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::MissingField {
                    backend: "local",
                    field: "path",
                });
            }
        }
        "memory" => {}
        other => return Err(ConfigError::UnknownBackend(other.to_string())),
    }

    Ok(())
}

/// 根据配置创建存储实例
pub fn create_storage(config: &MediasyncConfig) -> Result<Arc<dyn Storage>, ConfigError> {
    let backend_config = &config.storage;
    validate_backend(backend_config)?;

    match backend_config.backend.as_deref() {
        Some("s3") => {
            let storage = S3Storage::new(
                backend_config,
                config.op_timeout_secs,
                config.io_timeout_secs,
            )
            .map_err(|e| ConfigError::Backend(e.to_string()))?;
            tracing::info!("初始化S3存储: {}", storage.name());
            Ok(Arc::new(storage) as Arc<dyn Storage>)
        }
        Some("local") => {
            let path = backend_config.path.as_deref().unwrap_or_default();
            let storage = LocalStorage::new(path, backend_config.base_url.clone())
                .map_err(|e| ConfigError::Backend(e.to_string()))?;
            tracing::info!("初始化本地存储: {}", path);
            Ok(Arc::new(storage) as Arc<dyn Storage>)
        }
        Some("memory") => {
            let mut storage = MemoryStorage::new();
            if let Some(url) = &backend_config.base_url {
                storage = storage.with_base_url(url);
            }
            Ok(Arc::new(storage) as Arc<dyn Storage>)
        }
        Some(other) => Err(ConfigError::UnknownBackend(other.to_string())),
        None => Err(ConfigError::MissingBackend),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_put_headers() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let headers = PutHeaders::new(365, now, Some("gzip"), "md5==", "id==");

        assert_eq!(headers.cache_control, "max-age=31536000");
        assert_eq!(headers.expires, "Tue, 31 Dec 2024 12:00:00 GMT");
        assert_eq!(headers.content_encoding.as_deref(), Some("gzip"));
        assert_eq!(headers.identity_digest, "id==");
    }

    #[test]
    fn test_create_storage_registry() {
        let mut config = MediasyncConfig::default();
        assert!(matches!(
            create_storage(&config),
            Err(ConfigError::MissingBackend)
        ));

        config.storage.backend = Some("cloudfiles".to_string());
        assert!(matches!(
            create_storage(&config),
            Err(ConfigError::UnknownBackend(_))
        ));

        config.storage.backend = Some("memory".to_string());
        config.storage.base_url = Some("https://cdn.example.com/".to_string());
        let storage = create_storage(&config).unwrap();
        assert_eq!(storage.name(), "memory");
        assert_eq!(storage.public_url(false), "https://cdn.example.com");
    }

    #[test]
    fn test_local_requires_path() {
        let config = BackendConfig {
            backend: Some("local".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            validate_backend(&config),
            Err(ConfigError::MissingField { field: "path", .. })
        ));
    }
}
