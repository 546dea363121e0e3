//! Snapshot archive backends.
//!
//! Raw pages are archived under hierarchical keys (see [`ArchiveLayout`]):
//!
//! ```text
//! {environment}/
//! └── YYYY/MM/DD/{run_start}/
//!     ├── crawler-log/{run_start}.json
//!     └── data/{sido}/{gugun}/{dong}/{category}/{subtype}/
//!         ├── {..}_statistics.html
//!         └── bid/
//!             └── {..}_bid.html
//! ```
//!
//! Backends only need delimiter-style listing plus whole-object reads and
//! writes.

pub mod layout;
pub mod local;
pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{StorageBackend, StorageConfig};

// Re-export for convenience
pub use layout::{ArchiveLayout, BID_DIR, RunSelector, child_name, data_prefix, kst};
pub use local::LocalStorage;
pub use memory::MemoryStorage;
#[cfg(feature = "s3")]
pub use s3::S3Storage;

/// Direct children of a prefix.
///
/// Both lists hold full keys, sorted. Child prefixes end with `/`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub prefixes: Vec<String>,
    pub objects: Vec<String>,
}

impl Listing {
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty() && self.objects.is_empty()
    }
}

/// Trait for snapshot archive backends.
#[async_trait]
pub trait ArchiveStorage: Send + Sync {
    /// List the direct children of `prefix` (which ends with `/`).
    async fn list(&self, prefix: &str) -> Result<Listing>;

    /// Read an object body. A missing object is [`AppError::MissingArchive`].
    async fn read(&self, key: &str) -> Result<Vec<u8>>;

    /// Create or replace an object.
    async fn write(&self, key: &str, body: &[u8], content_type: &str) -> Result<()>;
}

/// Read an object as UTF-8 text.
pub async fn read_text(storage: &dyn ArchiveStorage, key: &str) -> Result<String> {
    let bytes = storage.read(key).await?;
    String::from_utf8(bytes).map_err(|e| AppError::parse(format!("{key} is not UTF-8: {e}")))
}

/// Open the backend selected by `[storage]`.
pub async fn storage_from_config(config: &StorageConfig) -> Result<Box<dyn ArchiveStorage>> {
    match config.backend {
        StorageBackend::Local => {
            log::info!("Using local archive at {:?}", config.root_dir);
            Ok(Box::new(LocalStorage::new(&config.root_dir)))
        }
        #[cfg(feature = "s3")]
        StorageBackend::S3 => {
            let bucket = config
                .bucket
                .clone()
                .ok_or_else(|| AppError::config("storage.bucket is required for s3"))?;
            log::info!("Using S3 archive in bucket {}", bucket);
            Ok(Box::new(S3Storage::from_env(bucket).await))
        }
        #[cfg(not(feature = "s3"))]
        StorageBackend::S3 => Err(AppError::config(
            "the s3 backend requires building with the `s3` feature",
        )),
    }
}
