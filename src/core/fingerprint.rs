//! 内容指纹（MD5，与 S3 ETag / Content-MD5 兼容）

use base64::{engine::general_purpose::STANDARD, Engine as _};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 内容摘要：hex 用于和 ETag 比较，base64 用于 Content-MD5 和元数据
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    hex: String,
    base64: String,
}

impl Fingerprint {
    /// 计算任意字节的指纹
    pub fn of(data: &[u8]) -> Self {
        let digest = Md5::digest(data);
        Self {
            hex: format!("{:x}", digest),
            base64: STANDARD.encode(digest),
        }
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    pub fn base64(&self) -> &str {
        &self.base64
    }

    /// 与远端记录比较。远端可能返回带引号的 hex ETag，
    /// 也可能是 base64（经 HTTP 头传输后 `+` 变成空格）
    pub fn matches(&self, remote: &str) -> bool {
        let remote = remote.trim().trim_matches('"');
        remote.eq_ignore_ascii_case(&self.hex) || remote.replace(' ', "+") == self.base64
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        let fp = Fingerprint::of(b"");
        assert_eq!(fp.hex(), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(fp.base64(), "1B2M2Y8AsgTpgAmY7PhCfg==");
    }

    #[test]
    fn test_known_digest() {
        let fp = Fingerprint::of(b"hello");
        assert_eq!(fp.hex(), "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(fp.to_string(), fp.hex());
    }

    #[test]
    fn test_different_content() {
        assert_ne!(Fingerprint::of(b"var a=1;"), Fingerprint::of(b"var a=2;"));
        assert_eq!(Fingerprint::of(b"same"), Fingerprint::of(b"same"));
    }

    #[test]
    fn test_matches_remote_forms() {
        let fp = Fingerprint::of(b"");
        assert!(fp.matches("\"d41d8cd98f00b204e9800998ecf8427e\""));
        assert!(fp.matches("D41D8CD98F00B204E9800998ECF8427E"));
        assert!(fp.matches("1B2M2Y8AsgTpgAmY7PhCfg=="));
        assert!(!fp.matches("5d41402abc4b2a76b9719d911017c592"));

        // 元数据中的 '+' 可能被还原成空格
        let plus = Fingerprint::of(b"hello world");
        if plus.base64().contains('+') {
            assert!(plus.matches(&plus.base64().replace('+', " ")));
        }
    }
}
