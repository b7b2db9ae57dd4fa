use super::{PutHeaders, RemoteObject, Storage};
use crate::core::fingerprint::Fingerprint;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

/// 同步到本地目录（例如由 Web 服务器直接提供的目录）
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: Option<String>,
    name: String,
}

impl LocalStorage {
    pub fn new(path: &str, base_url: Option<String>) -> Result<Self> {
        let base_path = PathBuf::from(path);
        if !base_path.exists() {
            std::fs::create_dir_all(&base_path)?;
        }
        let name = format!("local:{}", path);
        Ok(Self {
            base_path,
            base_url,
            name,
        })
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        let path = path.trim_start_matches('/').trim_start_matches('\\');
        if path.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(path)
        }
    }

    /// 规范化路径分隔符（统一使用 /）
    fn normalize_path(path: &str) -> String {
        path.replace('\\', "/")
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn list_existing(&self, prefix: Option<&str>) -> Result<Vec<RemoteObject>> {
        let base = prefix.map_or_else(|| self.base_path.clone(), |p| self.resolve_path(p));

        if !base.exists() {
            return Ok(Vec::new());
        }

        let base_path = self.base_path.clone();

        // 使用 spawn_blocking 避免阻塞 async runtime；
        // 本地没有 ETag，用已存内容的 MD5 代替
        let objects = tokio::task::spawn_blocking(move || {
            WalkDir::new(&base)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter_map(|entry| {
                    let relative = entry
                        .path()
                        .strip_prefix(&base_path)
                        .ok()?
                        .to_str()?
                        .to_string();
                    let data = std::fs::read(entry.path()).ok()?;
                    Some(RemoteObject {
                        path: Self::normalize_path(&relative),
                        fingerprint: Some(Fingerprint::of(&data).hex().to_string()),
                    })
                })
                .collect::<Vec<_>>()
        })
        .await?;

        Ok(objects)
    }

    async fn put(
        &self,
        path: &str,
        data: Bytes,
        content_type: &str,
        headers: &PutHeaders,
        _force: bool,
    ) -> Result<()> {
        let full_path = self.resolve_path(path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // 使用临时文件写入，然后原子重命名
        let file_name = full_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid path: {}", path))?;
        let temp_path = full_path.with_file_name(format!(".{}.tmp", file_name));
        fs::write(&temp_path, &data).await?;
        fs::rename(&temp_path, &full_path).await?;

        debug!(
            "写入完成: {} ({}, encoding={:?})",
            path, content_type, headers.content_encoding
        );
        Ok(())
    }

    fn public_url(&self, _with_ssl: bool) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("file://{}", Self::normalize_path(&self.base_path.to_string_lossy()))
                .trim_end_matches('/')
                .to_string(),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_list() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().to_str().unwrap(), None).unwrap();

        storage
            .put("css/site.css", Bytes::from_static(b"body{}"), "text/css", &PutHeaders::default(), false)
            .await
            .unwrap();

        let objects = storage.list_existing(None).await.unwrap();
        assert_eq!(
            objects,
            vec![RemoteObject {
                path: "css/site.css".to_string(),
                fingerprint: Some(Fingerprint::of(b"body{}").hex().to_string()),
            }]
        );
        assert_eq!(std::fs::read(dir.path().join("css/site.css")).unwrap(), b"body{}");
    }

    #[tokio::test]
    async fn test_list_missing_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().to_str().unwrap(), None).unwrap();
        assert!(storage.list_existing(Some("nope")).await.unwrap().is_empty());
    }

    #[test]
    fn test_public_url() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(
            dir.path().to_str().unwrap(),
            Some("https://static.example.com/media/".to_string()),
        )
        .unwrap();
        assert_eq!(storage.public_url(true), "https://static.example.com/media");
    }
}
