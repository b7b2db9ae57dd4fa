use crate::config::MediasyncConfig;
use crate::core::cache::RemoteStateCache;
use crate::core::combine::BundleCombiner;
use crate::core::compress::Compressor;
use crate::core::fingerprint::Fingerprint;
use crate::core::pipeline::TransformPipeline;
use crate::core::scanner::{MediaScanner, StaticFile};
use crate::error::{ConfigError, Result, SyncError};
use crate::storage::{PutHeaders, Storage};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// 无法识别扩展名时使用的内容类型
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// 根据扩展名推断内容类型
pub fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncStatus {
    Completed,
    /// 部分文件失败
    PartialSuccess,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub path: String,
    pub reason: String,
}

/// 同步报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub status: SyncStatus,
    pub force: bool,
    /// 已上传的远端路径
    pub uploaded: Vec<String>,
    /// 指纹相同而跳过的文件数
    pub unchanged: usize,
    /// 处理时已不是普通文件的条目数
    pub ignored: usize,
    pub failed: Vec<FailedFile>,
    pub bytes_uploaded: u64,
    pub start_time: i64,
    pub duration_ms: u64,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Completed
    }

    pub fn failed_paths(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.path.as_str()).collect()
    }
}

/// 单个文件的处理结果
#[derive(Debug)]
enum FileOutcome {
    Uploaded { path: String, bytes: u64 },
    Unchanged,
    Ignored,
    Failed(FailedFile),
    /// 会话取消后未处理的文件
    Cancelled(FailedFile),
}

/// 经过处理、压缩，准备上传的内容
#[derive(Debug, Clone)]
pub struct PreparedAsset {
    pub remote_path: String,
    pub content_type: String,
    pub data: Bytes,
    pub content_encoding: Option<&'static str>,
    /// 压缩前的摘要，写入自定义元数据
    pub identity: Fingerprint,
    /// 实际传输内容的摘要，用于变更检测
    pub transport: Fingerprint,
}

/// 同步引擎
pub struct SyncEngine {
    config: MediasyncConfig,
    storage: Arc<dyn Storage>,
    pipeline: Arc<TransformPipeline>,
    compressor: Arc<Compressor>,
    combiner: BundleCombiner,
    cancelled: Arc<AtomicBool>,
}

impl SyncEngine {
    /// 处理器按配置中的名称从注册表创建
    pub fn new(config: MediasyncConfig, storage: Arc<dyn Storage>) -> std::result::Result<Self, ConfigError> {
        let pipeline = TransformPipeline::from_names(&config.processors)?;
        let compressor = Compressor::new(&config.types_to_compress, config.compress_threshold);
        let combiner = BundleCombiner::from_config(&config);

        Ok(Self {
            config,
            storage,
            pipeline: Arc::new(pipeline),
            compressor: Arc::new(compressor),
            combiner,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// 替换处理管线
    pub fn with_pipeline(mut self, pipeline: TransformPipeline) -> Self {
        self.pipeline = Arc::new(pipeline);
        self
    }

    pub fn config(&self) -> &MediasyncConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// 取消同步
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// 供其他任务持有的取消标志
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// 检查是否已取消
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// 运行一次同步会话
    pub async fn run(&self, force: bool) -> Result<SyncReport> {
        let force = force || self.config.force;
        let start = Instant::now();
        let start_time = chrono::Utc::now().timestamp();

        // 重置取消标志
        self.cancelled.store(false, Ordering::SeqCst);

        info!("开始同步: {} (force={})", self.storage.name(), force);

        self.with_op_timeout(self.storage.open())
            .await
            .map_err(|e| self.unavailable(e))?;

        let cache = match self
            .with_op_timeout(RemoteStateCache::load(self.storage.as_ref(), None))
            .await
        {
            Ok(cache) => RwLock::new(cache),
            Err(e) => {
                error!("列出远端文件失败: {}", e);
                let _ = self.storage.close().await;
                return Err(self.unavailable(e));
            }
        };

        let mut outcomes = Vec::new();

        // 合并文件，逐个顺序处理
        for (target, sources) in &self.config.joined {
            if let Some(outcome) = self.sync_bundle(target, sources, force, &cache).await {
                outcomes.push(outcome);
            }
        }

        // 静态文件
        let scanner = MediaScanner::new(self.config.media_root.clone());
        let candidates = tokio::task::spawn_blocking(move || scanner.scan())
            .await
            .unwrap_or_else(|e| {
                warn!("扫描任务失败: {}", e);
                Vec::new()
            });

        let static_outcomes: Vec<FileOutcome> = stream::iter(candidates)
            .map(|file| self.sync_static(file, force, &cache))
            .buffer_unordered(self.config.max_concurrent_uploads.max(1))
            .collect()
            .await;
        outcomes.extend(static_outcomes);

        if let Err(e) = self.storage.close().await {
            warn!("关闭存储连接失败: {}", e);
        }

        let report = self.build_report(outcomes, force, start_time, start.elapsed());

        info!(
            "同步完成: 上传 {}, 未变化 {}, 失败 {} ({} 字节, {}ms)",
            report.uploaded.len(),
            report.unchanged,
            report.failed.len(),
            report.bytes_uploaded,
            report.duration_ms
        );

        Ok(report)
    }

    /// 执行处理管线、计算指纹并按需压缩。
    /// 压缩和处理器都是 CPU 密集操作，放到阻塞线程池执行。
    pub async fn prepare(
        &self,
        remote_path: String,
        content_type: String,
        raw: Vec<u8>,
    ) -> Result<PreparedAsset> {
        let pipeline = self.pipeline.clone();
        let compressor = self.compressor.clone();
        let active = self.config.pipeline_active();
        let path = remote_path.clone();

        tokio::task::spawn_blocking(move || {
            prepare_asset(&pipeline, &compressor, active, remote_path, content_type, raw)
        })
        .await
        .map_err(|e| SyncError::Transform {
            stage: "prepare".to_string(),
            path,
            source: e.into(),
        })?
    }

    async fn sync_bundle(
        &self,
        target: &str,
        sources: &[String],
        force: bool,
        cache: &RwLock<RemoteStateCache>,
    ) -> Option<FileOutcome> {
        let combiner = self.combiner.clone();
        let (owned_target, owned_sources) = (target.to_string(), sources.to_vec());
        let combined = tokio::task::spawn_blocking(move || {
            combiner.combine(&owned_target, &owned_sources)
        })
        .await;

        let bundle = match combined {
            Ok(Some(bundle)) => bundle,
            Ok(None) => {
                debug!("只合并 CSS/JS 文件，跳过: {}", target);
                return None;
            }
            Err(e) => {
                return Some(self.fail(
                    target,
                    SyncError::Storage {
                        path: target.to_string(),
                        reason: format!("合并任务失败: {}", e),
                    },
                ))
            }
        };

        if !bundle.missing.is_empty() {
            debug!("合并 {} 时跳过不存在的源文件: {:?}", target, bundle.missing);
        }

        let content_type = content_type_for(Path::new(target));
        let remote_path = bundle.remote_path;
        let outcome = match self
            .prepare(remote_path.clone(), content_type, bundle.data)
            .await
        {
            Ok(asset) => self.upload(asset, force, cache).await,
            Err(e) => self.fail(&remote_path, e),
        };
        Some(outcome)
    }

    async fn sync_static(
        &self,
        file: StaticFile,
        force: bool,
        cache: &RwLock<RemoteStateCache>,
    ) -> FileOutcome {
        // 扫描之后可能被删除或并非普通文件
        match tokio::fs::metadata(&file.local_path).await {
            Ok(meta) if meta.is_file() => {}
            _ => {
                debug!("不是普通文件，跳过: {}", file.remote_path);
                return FileOutcome::Ignored;
            }
        }

        let raw = match tokio::fs::read(&file.local_path).await {
            Ok(data) => data,
            Err(e) => {
                debug!("读取文件失败，跳过: {} - {}", file.remote_path, e);
                return FileOutcome::Ignored;
            }
        };

        let content_type = content_type_for(&file.local_path);
        match self.prepare(file.remote_path.clone(), content_type, raw).await {
            Ok(asset) => self.upload(asset, force, cache).await,
            Err(e) => self.fail(&file.remote_path, e),
        }
    }

    /// 比较指纹并在需要时上传，成功后更新缓存
    async fn upload(
        &self,
        asset: PreparedAsset,
        force: bool,
        cache: &RwLock<RemoteStateCache>,
    ) -> FileOutcome {
        if self.is_cancelled() {
            return self.fail(&asset.remote_path, SyncError::Cancelled);
        }

        if !cache
            .read()
            .await
            .needs_upload(&asset.remote_path, &asset.transport, force)
        {
            debug!("文件未变化，跳过: {}", asset.remote_path);
            return FileOutcome::Unchanged;
        }

        let headers = PutHeaders::new(
            self.config.expiration_days,
            chrono::Utc::now(),
            asset.content_encoding,
            asset.transport.base64(),
            asset.identity.base64(),
        );

        match self.put_with_retry(&asset, &headers, force).await {
            Ok(()) => {
                cache
                    .write()
                    .await
                    .record(&asset.remote_path, &asset.transport);
                info!("[{}] {}", asset.content_type, asset.remote_path);
                FileOutcome::Uploaded {
                    bytes: asset.data.len() as u64,
                    path: asset.remote_path,
                }
            }
            Err(e) => self.fail(&asset.remote_path, e),
        }
    }

    /// 带重试的上传，指数退避
    async fn put_with_retry(
        &self,
        asset: &PreparedAsset,
        headers: &PutHeaders,
        force: bool,
    ) -> Result<()> {
        let max_retries = self.config.max_retries;
        let timeout_secs = self.config.io_timeout_secs;
        let mut last_error = String::new();

        for attempt in 0..=max_retries {
            if self.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let put = self.storage.put(
                &asset.remote_path,
                asset.data.clone(),
                &asset.content_type,
                headers,
                force,
            );

            match tokio::time::timeout(Duration::from_secs(timeout_secs), put).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => last_error = format!("写入超时 ({}s)", timeout_secs),
            }

            if attempt < max_retries {
                let delay = self
                    .config
                    .retry_base_delay_ms
                    .saturating_mul(2_u64.saturating_pow(attempt));
                warn!(
                    "上传失败，{}ms 后重试 ({}/{}): {} - {}",
                    delay,
                    attempt + 1,
                    max_retries,
                    asset.remote_path,
                    last_error
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
            } else {
                error!(
                    "上传最终失败 (已重试{}次): {} - {}",
                    max_retries, asset.remote_path, last_error
                );
            }
        }

        Err(SyncError::Storage {
            path: asset.remote_path.clone(),
            reason: last_error,
        })
    }

    async fn with_op_timeout<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        let secs = self.config.op_timeout_secs;
        tokio::time::timeout(Duration::from_secs(secs), fut)
            .await
            .map_err(|_| anyhow::anyhow!("操作超时 ({}s)", secs))?
    }

    fn unavailable(&self, e: anyhow::Error) -> SyncError {
        SyncError::Unavailable {
            name: self.storage.name().to_string(),
            reason: e.to_string(),
        }
    }

    fn fail(&self, path: &str, e: SyncError) -> FileOutcome {
        let failed = FailedFile {
            path: path.to_string(),
            reason: e.to_string(),
        };

        if matches!(e, SyncError::Cancelled) {
            debug!("已取消: {}", path);
            FileOutcome::Cancelled(failed)
        } else {
            warn!("同步失败: {}", e);
            FileOutcome::Failed(failed)
        }
    }

    fn build_report(
        &self,
        outcomes: Vec<FileOutcome>,
        force: bool,
        start_time: i64,
        elapsed: Duration,
    ) -> SyncReport {
        let mut report = SyncReport {
            status: SyncStatus::Completed,
            force,
            uploaded: Vec::new(),
            unchanged: 0,
            ignored: 0,
            failed: Vec::new(),
            bytes_uploaded: 0,
            start_time,
            duration_ms: elapsed.as_millis() as u64,
        };

        let mut cancelled = false;
        for outcome in outcomes {
            match outcome {
                FileOutcome::Uploaded { path, bytes } => {
                    report.uploaded.push(path);
                    report.bytes_uploaded += bytes;
                }
                FileOutcome::Unchanged => report.unchanged += 1,
                FileOutcome::Ignored => report.ignored += 1,
                FileOutcome::Failed(failed) => report.failed.push(failed),
                FileOutcome::Cancelled(failed) => {
                    cancelled = true;
                    report.failed.push(failed);
                }
            }
        }

        report.uploaded.sort();
        report.failed.sort_by(|a, b| a.path.cmp(&b.path));

        report.status = if cancelled {
            SyncStatus::Cancelled
        } else if !report.failed.is_empty() {
            SyncStatus::PartialSuccess
        } else {
            SyncStatus::Completed
        };

        report
    }
}

fn prepare_asset(
    pipeline: &TransformPipeline,
    compressor: &Compressor,
    active: bool,
    remote_path: String,
    content_type: String,
    raw: Vec<u8>,
) -> Result<PreparedAsset> {
    let processed = pipeline.apply(raw, &content_type, &remote_path, active)?;

    let identity = Fingerprint::of(&processed);
    let compressed = compressor
        .maybe_compress(processed, &content_type)
        .map_err(|e| SyncError::Transform {
            stage: "gzip".to_string(),
            path: remote_path.clone(),
            source: e.into(),
        })?;

    // 压缩后需要重新计算传输内容的摘要
    let transport = if compressed.encoding.is_some() {
        Fingerprint::of(&compressed.data)
    } else {
        identity.clone()
    };

    Ok(PreparedAsset {
        remote_path,
        content_type,
        data: Bytes::from(compressed.data),
        content_encoding: compressed.encoding,
        identity,
        transport,
    })
}
