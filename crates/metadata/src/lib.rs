//! Metadata store abstraction and SQLite implementation for depot.
//!
//! This crate provides the registry's control-plane data model:
//! - Packages, versions, files, blobs and properties
//! - Transactional version creation and cascading deletion
//! - Blob reference counting and unreferenced-blob reclamation

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use store::{MetadataStore, SqliteStore};

use depot_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite { path } => {
            let store = SqliteStore::new(path).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}
