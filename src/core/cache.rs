//! 远端状态缓存
//!
//! 会话开始时列一次远端文件，之后的比较都走内存，避免每个文件一次请求。
//! 上传成功后记录新的指纹；不落盘，会话结束即丢弃。

use super::fingerprint::Fingerprint;
use crate::storage::Storage;
use anyhow::Result;
use std::collections::HashMap;
use tracing::info;

/// 远端路径 -> 指纹（ETag 或等价摘要）
#[derive(Debug, Clone, Default)]
pub struct RemoteStateCache {
    entries: HashMap<String, String>,
}

impl RemoteStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 通过一次列表调用构建缓存
    pub async fn load(storage: &dyn Storage, prefix: Option<&str>) -> Result<Self> {
        let objects = storage.list_existing(prefix).await?;
        let total = objects.len();

        let entries: HashMap<String, String> = objects
            .into_iter()
            .filter_map(|o| {
                let fingerprint = o.fingerprint?;
                Some((o.path.trim_start_matches('/').to_string(), fingerprint))
            })
            .collect();

        info!(
            "从 {} 加载远端状态: {} 个对象, {} 个带指纹",
            storage.name(),
            total,
            entries.len()
        );

        Ok(Self { entries })
    }

    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn lookup(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    /// 上传成功后记录新指纹
    pub fn record(&mut self, path: &str, fingerprint: &Fingerprint) {
        self.entries
            .insert(path.to_string(), fingerprint.hex().to_string());
    }

    /// 强制模式、远端不存在或指纹不同时需要上传
    pub fn needs_upload(&self, path: &str, fingerprint: &Fingerprint, force: bool) -> bool {
        if force {
            return true;
        }
        match self.lookup(path) {
            Some(remote) => !fingerprint.matches(remote),
            None => true,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
