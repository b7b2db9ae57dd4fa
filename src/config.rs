//! 应用配置模块

use crate::error::ConfigError;
use crate::logging::LogConfig;
use crate::storage::{IO_TIMEOUT_SECS, OP_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// JS 的 MIME 类型（text/javascript 已过时，见 RFC 4329）
pub const JS_MIMETYPES: &[&str] = &["application/javascript", "text/javascript"];
pub const CSS_MIMETYPES: &[&str] = &["text/css"];

/// 存储后端配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    /// 后端名称: "s3", "local", "memory"
    #[serde(default)]
    pub backend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// 远端路径前缀
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// 自定义域名（CNAME）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_cname: Option<String>,
    /// local 后端的目标目录
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// local / memory 后端对外的 URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl BackendConfig {
    /// 去掉首尾 `/` 的前缀，空字符串视为未设置
    pub fn normalized_prefix(&self) -> Option<String> {
        self.prefix
            .as_deref()
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty())
    }
}

/// mediasync 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediasyncConfig {
    #[serde(default)]
    pub storage: BackendConfig,
    /// 本地媒体根目录
    #[serde(default)]
    pub media_root: PathBuf,
    /// 本地服务时的媒体 URL
    #[serde(default = "default_media_url")]
    pub media_url: String,
    /// CSS 根目录（相对 media_root）
    #[serde(default)]
    pub css_path: String,
    /// JS 根目录（相对 media_root）
    #[serde(default)]
    pub js_path: String,
    /// 合并文件: 目标 -> 有序的源文件列表
    #[serde(default)]
    pub joined: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub serve_remote: bool,
    /// 本地开发时也使用合并后的文件
    #[serde(default)]
    pub emulate_combo: bool,
    #[serde(default)]
    pub use_ssl: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_buster: Option<String>,
    #[serde(default = "default_expiration_days")]
    pub expiration_days: u32,
    #[serde(default = "default_types_to_compress")]
    pub types_to_compress: Vec<String>,
    /// 压缩阈值（字节），超过才压缩
    #[serde(default = "default_compress_threshold")]
    pub compress_threshold: usize,
    /// 处理器名称，按顺序执行
    #[serde(default = "default_processors")]
    pub processors: Vec<String>,
    /// 忽略指纹，总是上传
    #[serde(default)]
    pub force: bool,
    #[serde(default = "default_max_concurrent_uploads")]
    pub max_concurrent_uploads: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// 非 IO 操作超时（秒）- list 等
    #[serde(default = "default_op_timeout_secs")]
    pub op_timeout_secs: u64,
    /// IO 操作超时（秒）- put
    #[serde(default = "default_io_timeout_secs")]
    pub io_timeout_secs: u64,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_media_url() -> String {
    "/media/".to_string()
}

fn default_expiration_days() -> u32 {
    365
}

fn default_types_to_compress() -> Vec<String> {
    ["application/json", "application/xml", "text/html", "text/plain", "text/xml"]
        .iter()
        .chain(JS_MIMETYPES)
        .chain(CSS_MIMETYPES)
        .map(|s| s.to_string())
        .collect()
}

fn default_compress_threshold() -> usize {
    crate::core::compress::DEFAULT_THRESHOLD
}

fn default_processors() -> Vec<String> {
    vec![
        crate::core::processors::CSS_MINIFIER.to_string(),
        crate::core::processors::JS_MINIFIER.to_string(),
    ]
}

fn default_max_concurrent_uploads() -> usize {
    4
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_op_timeout_secs() -> u64 {
    OP_TIMEOUT_SECS
}

fn default_io_timeout_secs() -> u64 {
    IO_TIMEOUT_SECS
}

impl Default for MediasyncConfig {
    fn default() -> Self {
        Self {
            storage: BackendConfig::default(),
            media_root: PathBuf::new(),
            media_url: default_media_url(),
            css_path: String::new(),
            js_path: String::new(),
            joined: BTreeMap::new(),
            serve_remote: false,
            emulate_combo: false,
            use_ssl: false,
            cache_buster: None,
            expiration_days: default_expiration_days(),
            types_to_compress: default_types_to_compress(),
            compress_threshold: default_compress_threshold(),
            processors: default_processors(),
            force: false,
            max_concurrent_uploads: default_max_concurrent_uploads(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            op_timeout_secs: default_op_timeout_secs(),
            io_timeout_secs: default_io_timeout_secs(),
            log: LogConfig::default(),
        }
    }
}

impl MediasyncConfig {
    /// 从 JSON 配置文件加载并校验
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        // 相对的 media_root 以配置文件所在目录为基准
        if config.media_root.is_relative() {
            if let Some(dir) = path.parent() {
                config.media_root = dir.join(&config.media_root);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// 校验配置；失败时不做任何同步工作
    pub fn validate(&self) -> Result<(), ConfigError> {
        crate::storage::validate_backend(&self.storage)?;

        for name in &self.processors {
            if !crate::core::processors::is_builtin(name) {
                return Err(ConfigError::UnknownProcessor(name.clone()));
            }
        }

        if !self.media_root.is_dir() {
            return Err(ConfigError::MediaRoot(self.media_root.clone()));
        }

        if self.max_concurrent_uploads == 0 {
            return Err(ConfigError::Invalid {
                field: "maxConcurrentUploads",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.op_timeout_secs == 0 || self.io_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "timeout",
                reason: "timeouts must be positive".to_string(),
            });
        }

        Ok(())
    }

    /// 处理器是否处于生效状态（远程服务或模拟合并）
    pub fn pipeline_active(&self) -> bool {
        self.serve_remote || self.emulate_combo
    }

    /// CSS 根目录，去掉首尾 `/`
    pub fn css_root(&self) -> &str {
        self.css_path.trim_matches('/')
    }

    /// JS 根目录，去掉首尾 `/`
    pub fn js_root(&self) -> &str {
        self.js_path.trim_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, json: &str) -> PathBuf {
        let path = dir.join("mediasync.json");
        fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn test_defaults_from_minimal_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("media")).unwrap();
        let path = write_config(
            dir.path(),
            r#"{"storage": {"backend": "memory"}, "mediaRoot": "media"}"#,
        );

        let config = MediasyncConfig::load(&path).unwrap();
        assert_eq!(config.media_root, dir.path().join("media"));
        assert_eq!(config.expiration_days, 365);
        assert_eq!(config.compress_threshold, 1024);
        assert!(config.types_to_compress.iter().any(|t| t == "text/css"));
        assert_eq!(config.processors, vec!["css_minifier", "js_minifier"]);
        assert!(!config.pipeline_active());
    }

    #[test]
    fn test_joined_keeps_source_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"{
                "storage": {"backend": "memory"},
                "mediaRoot": ".",
                "jsPath": "/js/",
                "joined": {"app.js": ["z.js", "a.js", "m.js"]}
            }"#,
        );

        let config = MediasyncConfig::load(&path).unwrap();
        assert_eq!(config.joined["app.js"], vec!["z.js", "a.js", "m.js"]);
        assert_eq!(config.js_root(), "js");
    }

    #[test]
    fn test_missing_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), r#"{"mediaRoot": "."}"#);

        let err = MediasyncConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::MissingBackend));
    }

    #[test]
    fn test_unknown_backend_and_processor() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MediasyncConfig {
            media_root: dir.path().to_path_buf(),
            ..Default::default()
        };

        config.storage.backend = Some("not.a.backend".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownBackend(name)) if name == "not.a.backend"
        ));

        config.storage.backend = Some("memory".to_string());
        config.processors.push("yui_compressor".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownProcessor(_))
        ));
    }

    #[test]
    fn test_s3_requires_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MediasyncConfig {
            media_root: dir.path().to_path_buf(),
            ..Default::default()
        };
        config.storage.backend = Some("s3".to_string());

        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField { field: "bucket", .. })
        ));
    }

    #[test]
    fn test_media_root_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MediasyncConfig {
            media_root: dir.path().join("missing"),
            ..Default::default()
        };
        config.storage.backend = Some("memory".to_string());

        assert!(matches!(config.validate(), Err(ConfigError::MediaRoot(_))));
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "{ not json");
        assert!(matches!(
            MediasyncConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
