//! 内存存储，用于测试和试运行

use super::{PutHeaders, RemoteObject, Storage};
use crate::core::fingerprint::Fingerprint;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;

/// 已写入的对象
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: String,
    pub headers: PutHeaders,
}

pub struct MemoryStorage {
    base_url: String,
    objects: Mutex<HashMap<String, StoredObject>>,
    /// 按顺序记录每次写入的路径
    put_log: Mutex<Vec<String>>,
    /// 写入这些路径时返回错误
    failing: Mutex<HashSet<String>>,
    /// 剩余失败次数，耗尽后写入成功
    flaky: Mutex<HashMap<String, u32>>,
    /// 写入前等待的时间
    delays: Mutex<HashMap<String, Duration>>,
    listing_fails: Mutex<bool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            base_url: "memory://mediasync".to_string(),
            objects: Mutex::new(HashMap::new()),
            put_log: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            flaky: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            listing_fails: Mutex::new(false),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    pub async fn object(&self, path: &str) -> Option<StoredObject> {
        self.objects.lock().await.get(path).cloned()
    }

    pub async fn put_log(&self) -> Vec<String> {
        self.put_log.lock().await.clone()
    }

    /// 取出并清空写入记录
    pub async fn take_put_log(&self) -> Vec<String> {
        std::mem::take(&mut *self.put_log.lock().await)
    }

    pub async fn fail_on(&self, path: &str) {
        self.failing.lock().await.insert(path.to_string());
    }

    pub async fn recover(&self, path: &str) {
        self.failing.lock().await.remove(path);
    }

    /// 前 `times` 次写入失败
    pub async fn fail_times(&self, path: &str, times: u32) {
        self.flaky.lock().await.insert(path.to_string(), times);
    }

    pub async fn delay_on(&self, path: &str, delay: Duration) {
        self.delays.lock().await.insert(path.to_string(), delay);
    }

    /// 列表调用返回错误
    pub async fn fail_listing(&self, fail: bool) {
        *self.listing_fails.lock().await = fail;
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn list_existing(&self, prefix: Option<&str>) -> Result<Vec<RemoteObject>> {
        if *self.listing_fails.lock().await {
            return Err(anyhow::anyhow!("模拟列表失败"));
        }

        let prefix = prefix.unwrap_or("").trim_start_matches('/');
        let objects = self.objects.lock().await;

        Ok(objects
            .iter()
            .filter(|(path, _)| path.starts_with(prefix))
            .map(|(path, object)| RemoteObject {
                path: path.clone(),
                fingerprint: Some(Fingerprint::of(&object.data).hex().to_string()),
            })
            .collect())
    }

    async fn put(
        &self,
        path: &str,
        data: Bytes,
        content_type: &str,
        headers: &PutHeaders,
        _force: bool,
    ) -> Result<()> {
        let delay = self.delays.lock().await.get(path).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().await.contains(path) {
            return Err(anyhow::anyhow!("模拟写入失败: {}", path));
        }

        if let Some(remaining) = self.flaky.lock().await.get_mut(path) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(anyhow::anyhow!("模拟临时写入失败: {}", path));
            }
        }

        self.objects.lock().await.insert(
            path.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                headers: headers.clone(),
            },
        );
        self.put_log.lock().await.push(path.to_string());
        Ok(())
    }

    fn public_url(&self, _with_ssl: bool) -> String {
        self.base_url.trim_end_matches('/').to_string()
    }

    fn name(&self) -> &str {
        "memory"
    }
}
