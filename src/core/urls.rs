//! 计算对外访问的媒体 URL

use super::combine::{join_remote, BundleKind};
use crate::config::MediasyncConfig;
use crate::storage::Storage;

/// 媒体 URL 计算
pub struct MediaUrls<'a> {
    config: &'a MediasyncConfig,
    storage: &'a dyn Storage,
}

impl<'a> MediaUrls<'a> {
    pub fn new(config: &'a MediasyncConfig, storage: &'a dyn Storage) -> Self {
        Self { config, storage }
    }

    /// 基础 URL：远程服务时交给后端，否则使用本地 media_url
    pub fn media_url(&self, with_ssl: bool) -> String {
        let url = if self.config.serve_remote {
            self.storage.public_url(with_ssl)
        } else {
            self.config.media_url.clone()
        };
        url.trim_end_matches('/').to_string()
    }

    /// 单个文件的 URL，设置了 cache_buster 时追加查询参数
    pub fn asset_url(&self, path: &str, with_ssl: bool) -> String {
        let encoded = path
            .trim_matches('/')
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");

        let mut url = format!("{}/{}", self.media_url(with_ssl), encoded);
        if let Some(buster) = self.config.cache_buster.as_deref().filter(|b| !b.is_empty()) {
            url.push('?');
            url.push_str(&urlencoding::encode(buster));
        }
        url
    }

    /// 合并文件的 URL 列表。
    /// 远程服务或模拟合并时返回合并后的单个文件，否则逐个返回源文件。
    /// 不是合并目标时按普通文件处理。
    pub fn bundle_urls(&self, target: &str, with_ssl: bool) -> Vec<String> {
        let target = target.trim_matches('/');
        let (Some(kind), Some(sources)) = (BundleKind::of(target), self.lookup_sources(target))
        else {
            return vec![self.asset_url(target, with_ssl)];
        };

        let root = match kind {
            BundleKind::Css => self.config.css_root(),
            BundleKind::Js => self.config.js_root(),
        };

        if self.config.pipeline_active() {
            vec![self.asset_url(&join_remote(root, target), with_ssl)]
        } else {
            sources
                .iter()
                .map(|s| self.asset_url(&join_remote(root, s.trim_matches('/')), with_ssl))
                .collect()
        }
    }

    fn lookup_sources(&self, target: &str) -> Option<&'a Vec<String>> {
        let config: &'a MediasyncConfig = self.config;
        config
            .joined
            .get(target)
            .or_else(|| config.joined.get(&format!("/{}", target)))
    }
}
