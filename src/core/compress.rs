//! 按内容类型和大小决定是否 gzip

use flate2::{Compression, GzBuilder};
use std::collections::HashSet;
use std::io::{self, Write};

/// 默认压缩阈值（字节）
pub const DEFAULT_THRESHOLD: usize = 1024;

/// 固定压缩级别，保证相同输入得到相同输出
const GZIP_LEVEL: u32 = 6;

pub const GZIP_ENCODING: &str = "gzip";

/// 压缩结果
#[derive(Debug, Clone)]
pub struct Compressed {
    pub data: Vec<u8>,
    /// 应用的 Content-Encoding，未压缩时为 None
    pub encoding: Option<&'static str>,
}

/// 压缩器
#[derive(Debug, Clone)]
pub struct Compressor {
    types: HashSet<String>,
    threshold: usize,
}

impl Compressor {
    pub fn new<I, S>(types: I, threshold: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            types: types
                .into_iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .collect(),
            threshold,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// 内容类型在允许列表中且大小超过阈值
    pub fn should_compress(&self, content_type: &str, len: usize) -> bool {
        len > self.threshold && self.types.contains(&essence(content_type))
    }

    pub fn maybe_compress(&self, data: Vec<u8>, content_type: &str) -> io::Result<Compressed> {
        if !self.should_compress(content_type, data.len()) {
            return Ok(Compressed {
                data,
                encoding: None,
            });
        }

        Ok(Compressed {
            data: gzip(&data)?,
            encoding: Some(GZIP_ENCODING),
        })
    }
}

/// 去掉 `; charset=...` 之类的参数
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

/// gzip 头中不写文件名，mtime 固定为 0
fn gzip(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzBuilder::new()
        .mtime(0)
        .write(Vec::with_capacity(data.len() / 2), Compression::new(GZIP_LEVEL));
    encoder.write_all(data)?;
    encoder.finish()
}
