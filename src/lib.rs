pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;

pub use config::{BackendConfig, MediasyncConfig};
pub use self::core::{MediaUrls, SyncEngine, SyncReport, SyncStatus};
pub use error::{ConfigError, Result, SyncError};
pub use storage::{create_storage, Storage};

/// 校验配置、创建后端并运行一次同步
pub async fn sync(config: MediasyncConfig, force: bool) -> Result<SyncReport> {
    config.validate()?;
    let storage = create_storage(&config)?;
    let engine = SyncEngine::new(config, storage)?;
    engine.run(force).await
}
