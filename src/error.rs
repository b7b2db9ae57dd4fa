//! 错误类型

use std::path::PathBuf;
use thiserror::Error;

/// 配置错误，在任何 IO 之前一次性报告
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("must define a mediasync storage backend")]
    MissingBackend,

    #[error("{0} is not a valid mediasync backend")]
    UnknownBackend(String),

    #[error("{backend} storage requires {field}")]
    MissingField {
        backend: &'static str,
        field: &'static str,
    },

    #[error("{0} is not a valid mediasync processor")]
    UnknownProcessor(String),

    #[error("media root {0:?} is not a directory")]
    MediaRoot(PathBuf),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to initialize storage backend: {0}")]
    Backend(String),
}

/// 同步会话错误
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("processor {stage} failed on {path}: {source}")]
    Transform {
        stage: String,
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("storage error on {path}: {reason}")]
    Storage { path: String, reason: String },

    #[error("storage {name} unavailable: {reason}")]
    Unavailable { name: String, reason: String },

    #[error("sync was cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, SyncError>;
