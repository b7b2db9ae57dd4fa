pub mod cache;
pub mod combine;
pub mod compress;
pub mod engine;
pub mod fingerprint;
pub mod pipeline;
pub mod processors;
pub mod scanner;
pub mod urls;

pub use cache::RemoteStateCache;
pub use combine::{BundleCombiner, BundleKind, CombinedBundle};
pub use compress::{Compressed, Compressor};
pub use engine::{FailedFile, PreparedAsset, SyncEngine, SyncReport, SyncStatus};
pub use fingerprint::Fingerprint;
pub use pipeline::{FnTransform, Transform, TransformPipeline};
pub use scanner::{MediaScanner, StaticFile};
pub use urls::MediaUrls;
