use super::{PutHeaders, RemoteObject, Storage, CHECKSUM_METADATA_KEY};
use crate::config::BackendConfig;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use opendal::{layers::TimeoutLayer, Operator};
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_REGION: &str = "us-east-1";

/// 上传时附带校验和，由 S3 校验传输内容
const CHECKSUM_ALGORITHM: &str = "crc32c";

pub struct S3Storage {
    operator: Operator,
    name: String,
    bucket: String,
    prefix: Option<String>,
    bucket_cname: Option<String>,
}

impl S3Storage {
    /// 未配置密钥时由 opendal 从环境变量 / 配置文件读取
    pub fn new(config: &BackendConfig, op_timeout_secs: u64, io_timeout_secs: u64) -> Result<Self> {
        use opendal::services::S3;

        let bucket = config
            .bucket
            .clone()
            .ok_or_else(|| anyhow::anyhow!("S3 storage requires bucket"))?;
        let prefix = config.normalized_prefix();

        let mut builder = S3::default()
            .bucket(&bucket)
            .region(config.region.as_deref().unwrap_or(DEFAULT_REGION))
            .checksum_algorithm(CHECKSUM_ALGORITHM);

        if let Some(ref key) = config.access_key {
            builder = builder.access_key_id(key);
        }
        if let Some(ref secret) = config.secret_key {
            builder = builder.secret_access_key(secret);
        }
        if let Some(ref ep) = config.endpoint {
            builder = builder.endpoint(ep);
        }
        if let Some(ref p) = prefix {
            builder = builder.root(p);
        }

        // 添加超时层
        let operator = Operator::new(builder)?
            .layer(
                TimeoutLayer::default()
                    .with_timeout(Duration::from_secs(op_timeout_secs))
                    .with_io_timeout(Duration::from_secs(io_timeout_secs)),
            )
            .finish();

        let name = format!(
            "s3://{}{}",
            bucket,
            prefix
                .as_deref()
                .map(|p| format!("/{}", p))
                .unwrap_or_default()
        );

        Ok(Self {
            operator,
            name,
            bucket,
            prefix,
            bucket_cname: config.bucket_cname.clone(),
        })
    }
}

/// 自定义域名优先，否则使用标准 AWS 地址
pub fn s3_public_url(
    bucket: &str,
    bucket_cname: Option<&str>,
    prefix: Option<&str>,
    with_ssl: bool,
) -> String {
    let protocol = if with_ssl { "https" } else { "http" };

    let mut url = match bucket_cname.filter(|c| !c.is_empty()) {
        Some(cname) => format!("{}://{}", protocol, cname.trim_end_matches('/')),
        None => format!("{}://s3.amazonaws.com/{}", protocol, bucket),
    };

    if let Some(p) = prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        url = format!("{}/{}", url, p);
    }

    url
}

#[async_trait]
impl Storage for S3Storage {
    async fn list_existing(&self, prefix: Option<&str>) -> Result<Vec<RemoteObject>> {
        let mut objects = Vec::new();
        let path = prefix.unwrap_or("");

        let mut lister = self.operator.lister_with(path).recursive(true).await?;

        while let Some(entry) = lister.try_next().await? {
            let path_str = entry.path().trim_start_matches('/');

            // 跳过根目录和目录占位
            if path_str.is_empty() || entry.metadata().is_dir() {
                continue;
            }

            objects.push(RemoteObject {
                path: path_str.to_string(),
                fingerprint: entry
                    .metadata()
                    .etag()
                    .map(|s| s.trim_matches('"').to_string()),
            });
        }

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
        let metadata = HashMap::from([(
            CHECKSUM_METADATA_KEY.to_string(),
            headers.identity_digest.clone(),
        )]);

        let mut write = self
            .operator
            .write_with(path, data)
            .content_type(content_type)
            .cache_control(&headers.cache_control)
            .user_metadata(metadata);

        if let Some(ref encoding) = headers.content_encoding {
            write = write.content_encoding(encoding);
        }

        write.await?;
        Ok(())
    }

    fn public_url(&self, with_ssl: bool) -> String {
        s3_public_url(
            &self.bucket,
            self.bucket_cname.as_deref(),
            self.prefix.as_deref(),
            with_ssl,
        )
        .trim_end_matches('/')
        .to_string()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
