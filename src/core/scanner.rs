use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// 以 `.` 或 `_` 开头的目录和文件不同步
pub fn is_syncable_name(name: &str) -> bool {
    !name.starts_with('.') && !name.starts_with('_')
}

/// 待同步的静态文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticFile {
    pub local_path: PathBuf,
    /// `<顶层目录>/<相对路径>`
    pub remote_path: String,
}

/// 媒体目录扫描器
#[derive(Debug, Clone)]
pub struct MediaScanner {
    media_root: PathBuf,
}

impl MediaScanner {
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        Self {
            media_root: media_root.into(),
        }
    }

    /// 扫描媒体根目录下的每个顶层目录。
    /// 隐藏目录在进入之前就被剪掉，其下的文件永远不会出现。
    pub fn scan(&self) -> Vec<StaticFile> {
        let entries = match fs::read_dir(&self.media_root) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("无法读取媒体目录 {:?}: {}", self.media_root, e);
                return Vec::new();
            }
        };

        let mut files = Vec::new();
        let mut excluded_count = 0;

        for entry in entries.flatten() {
            let Some(dir_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let dir_path = entry.path();

            // 根目录下的文件不同步，只处理目录
            if !dir_path.is_dir() {
                continue;
            }
            if !is_syncable_name(&dir_name) {
                debug!("排除目录: {}", dir_name);
                excluded_count += 1;
                continue;
            }

            files.extend(self.scan_dir(&dir_name, &dir_path, &mut excluded_count));
        }

        files.sort_by(|a, b| a.remote_path.cmp(&b.remote_path));

        info!(
            "扫描完成: {} 个文件, {} 个被排除",
            files.len(),
            excluded_count
        );

        files
    }

    fn scan_dir(&self, dir_name: &str, dir_path: &Path, excluded_count: &mut usize) -> Vec<StaticFile> {
        let mut files = Vec::new();

        let walker = WalkDir::new(dir_path)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0 || e.file_name().to_str().map_or(false, is_syncable_name)
            });

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!("遍历出错，跳过: {}", e);
                    continue;
                }
            };

            // 目录符号链接不会被进入，到处理阶段再确认是否为普通文件
            if entry.file_type().is_dir() {
                continue;
            }

            let Some(relative) = entry
                .path()
                .strip_prefix(dir_path)
                .ok()
                .and_then(|p| p.to_str())
            else {
                *excluded_count += 1;
                continue;
            };

            files.push(StaticFile {
                local_path: entry.path().to_path_buf(),
                remote_path: format!("{}/{}", dir_name, relative.replace('\\', "/")),
            });
        }

        files
    }
}
