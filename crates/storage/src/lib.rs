//! Object storage abstraction and hashed spooling for depot.
//!
//! This crate provides:
//! - Content-addressed blob persistence with atomic writes
//! - `HashedBuffer`: single-pass multi-digest spooling of uploads
//! - Backends: local filesystem

pub mod backends;
pub mod error;
pub mod spool;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use error::{StorageError, StorageResult};
pub use spool::HashedBuffer;
pub use traits::{ByteStream, ObjectMeta, ObjectStore, StreamingUpload};

use depot_core::config::StorageConfig;
use std::sync::Arc;

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
    }
}
