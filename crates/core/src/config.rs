//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Registry behavior configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Maximum accepted upload size in bytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
    /// Spool threshold: uploads larger than this spill to a temp file.
    #[serde(default = "default_spool_memory_limit")]
    pub spool_memory_limit: usize,
    /// Garbage collection settings for unreferenced blobs.
    #[serde(default)]
    pub gc: GcConfig,
}

fn default_max_upload_size() -> u64 {
    crate::DEFAULT_MAX_UPLOAD_SIZE
}

fn default_spool_memory_limit() -> usize {
    crate::DEFAULT_SPOOL_MEMORY_LIMIT
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_upload_size: default_max_upload_size(),
            spool_memory_limit: default_spool_memory_limit(),
            gc: GcConfig::default(),
        }
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
        }
    }
}

/// Garbage collection configuration for unreferenced blobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GcConfig {
    /// Grace period in seconds before an unreferenced blob may be deleted.
    ///
    /// A blob orphaned by a failed upload stays reusable for dedup during
    /// this window instead of being reclaimed immediately.
    #[serde(default = "default_gc_grace_period_secs")]
    pub grace_period_secs: u64,
    /// Maximum blobs reclaimed per sweep invocation.
    #[serde(default = "default_gc_batch_size")]
    pub batch_size: u32,
}

fn default_gc_grace_period_secs() -> u64 {
    3600 // 1 hour
}

fn default_gc_batch_size() -> u32 {
    1000
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: default_gc_grace_period_secs(),
            batch_size: default_gc_batch_size(),
        }
    }
}

impl GcConfig {
    /// Get the grace period as a Duration.
    pub fn grace_period(&self) -> Duration {
        let secs = i64::try_from(self.grace_period_secs).unwrap_or(i64::MAX);
        Duration::seconds(secs)
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Registry behavior configuration.
    #[serde(default)]
    pub registry: RegistryConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses filesystem storage and SQLite metadata
    /// under the given root directory.
    pub fn for_testing(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            storage: StorageConfig::Filesystem {
                path: root.join("storage"),
            },
            metadata: MetadataConfig::Sqlite {
                path: root.join("metadata.db"),
            },
            registry: RegistryConfig::default(),
        }
    }
}
