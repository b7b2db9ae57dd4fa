//! 合并文件（只支持 CSS / JS）

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 可合并的文件类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleKind {
    Css,
    Js,
}

impl BundleKind {
    /// 根据目标文件扩展名判断类别
    pub fn of(target: &str) -> Option<Self> {
        let target = target.trim_matches('/');
        if target.ends_with(".css") {
            Some(Self::Css)
        } else if target.ends_with(".js") {
            Some(Self::Js)
        } else {
            None
        }
    }
}

/// 合并后的虚拟文件
#[derive(Debug, Clone)]
pub struct CombinedBundle {
    /// 带类别根目录的远端路径
    pub remote_path: String,
    pub data: Vec<u8>,
    /// 实际读取到的源文件
    pub included: Vec<String>,
    /// 不存在而被跳过的源文件
    pub missing: Vec<String>,
}

/// 合并器
#[derive(Debug, Clone)]
pub struct BundleCombiner {
    media_root: PathBuf,
    css_root: String,
    js_root: String,
}

impl BundleCombiner {
    pub fn new(media_root: impl Into<PathBuf>, css_root: &str, js_root: &str) -> Self {
        Self {
            media_root: media_root.into(),
            css_root: css_root.trim_matches('/').to_string(),
            js_root: js_root.trim_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &crate::config::MediasyncConfig) -> Self {
        Self::new(&config.media_root, config.css_root(), config.js_root())
    }

    /// 类别对应的根目录
    pub fn root_for(&self, kind: BundleKind) -> &str {
        match kind {
            BundleKind::Css => &self.css_root,
            BundleKind::Js => &self.js_root,
        }
    }

    /// 目标文件的远端路径
    pub fn remote_path(&self, target: &str) -> Option<String> {
        let kind = BundleKind::of(target)?;
        Some(join_remote(self.root_for(kind), target.trim_matches('/')))
    }

    /// 源文件在本地的路径
    fn source_path(&self, kind: BundleKind, source: &str) -> PathBuf {
        let root = self.root_for(kind);
        let base: &Path = &self.media_root;
        let dir = if root.is_empty() {
            base.to_path_buf()
        } else {
            base.join(root)
        };
        dir.join(source.trim_start_matches('/'))
    }

    /// 按配置顺序拼接源文件，每个文件后追加一个换行。
    /// 目标不是 CSS/JS 时返回 None；缺失的源文件直接跳过。
    pub fn combine(&self, target: &str, sources: &[String]) -> Option<CombinedBundle> {
        let kind = BundleKind::of(target)?;
        let remote_path = join_remote(self.root_for(kind), target.trim_matches('/'));

        let mut data = Vec::new();
        let mut included = Vec::new();
        let mut missing = Vec::new();

        for source in sources {
            let path = self.source_path(kind, source);
            if !path.is_file() {
                debug!("合并源文件不存在，跳过: {:?}", path);
                missing.push(source.clone());
                continue;
            }

            match fs::read(&path) {
                Ok(content) => {
                    data.extend_from_slice(&content);
                    data.push(b'\n');
                    included.push(source.clone());
                }
                Err(e) => {
                    debug!("读取合并源文件失败，跳过: {:?} - {}", path, e);
                    missing.push(source.clone());
                }
            }
        }

        Some(CombinedBundle {
            remote_path,
            data,
            included,
            missing,
        })
    }
}

/// 拼接远端路径，根目录为空时省略
pub fn join_remote(root: &str, path: &str) -> String {
    if root.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", root, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, BundleCombiner) {
        let dir = tempfile::tempdir().unwrap();
        let css = dir.path().join("css");
        let js = dir.path().join("js");
        fs::create_dir_all(&css).unwrap();
        fs::create_dir_all(&js).unwrap();
        fs::write(css.join("a.css"), "A").unwrap();
        fs::write(css.join("b.css"), "B").unwrap();
        fs::write(js.join("jquery.js"), "var a=1;").unwrap();
        fs::write(js.join("app-core.js"), "var b=2;").unwrap();

        let combiner = BundleCombiner::new(dir.path(), "/css/", "js");
        (dir, combiner)
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_concatenates_in_configured_order() {
        let (_dir, combiner) = fixture();

        let ab = combiner.combine("all.css", &names(&["a.css", "b.css"])).unwrap();
        assert_eq!(ab.data, b"A\nB\n");
        assert_eq!(ab.remote_path, "css/all.css");

        let ba = combiner.combine("all.css", &names(&["b.css", "a.css"])).unwrap();
        assert_eq!(ba.data, b"B\nA\n");
    }

    #[test]
    fn test_js_bundle() {
        let (_dir, combiner) = fixture();
        let bundle = combiner
            .combine("/app.js", &names(&["jquery.js", "app-core.js"]))
            .unwrap();

        assert_eq!(bundle.data, b"var a=1;\nvar b=2;\n");
        assert_eq!(bundle.remote_path, "js/app.js");
        assert_eq!(bundle.included, names(&["jquery.js", "app-core.js"]));
    }

    #[test]
    fn test_missing_member_is_skipped() {
        let (_dir, combiner) = fixture();
        let bundle = combiner
            .combine("all.css", &names(&["a.css", "gone.css", "b.css"]))
            .unwrap();

        assert_eq!(bundle.data, b"A\nB\n");
        assert_eq!(bundle.missing, names(&["gone.css"]));
    }

    #[test]
    fn test_directory_source_is_skipped() {
        let (dir, combiner) = fixture();
        fs::create_dir(dir.path().join("css").join("sub.css")).unwrap();

        let bundle = combiner
            .combine("all.css", &names(&["sub.css", "a.css"]))
            .unwrap();
        assert_eq!(bundle.data, b"A\n");
    }

    #[test]
    fn test_unsupported_target() {
        let (_dir, combiner) = fixture();
        assert!(combiner.combine("sprites.png", &names(&["a.png"])).is_none());
        assert!(combiner.remote_path("feed.xml").is_none());
    }

    #[test]
    fn test_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("x.js"), "x").unwrap();
        let combiner = BundleCombiner::new(dir.path(), "", "");

        let bundle = combiner.combine("all.js", &names(&["x.js"])).unwrap();
        assert_eq!(bundle.remote_path, "all.js");
        assert_eq!(bundle.data, b"x\n");
    }
}
