//! Registry error taxonomy.

use depot_formats::ExtractError;
use depot_metadata::MetadataError;
use depot_storage::StorageError;
use thiserror::Error;

/// Errors surfaced by registry operations.
///
/// Extraction and validation failures carry their original message since
/// they are user-correctable; storage and metadata failures are wrapped
/// without exposing backend paths.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("malformed package: {0}")]
    Malformed(ExtractError),

    #[error("invalid identity: {0}")]
    InvalidIdentity(depot_core::Error),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported package type: {0}")]
    UnsupportedType(depot_core::PackageType),

    #[error("upload too large: {size} bytes exceeds limit of {limit}")]
    TooLarge { size: u64, limit: u64 },

    #[error("blob integrity violation: {0}")]
    Integrity(String),

    #[error("storage error: {0}")]
    Storage(StorageError),

    #[error("metadata error: {0}")]
    Metadata(MetadataError),

    #[error("core error: {0}")]
    Core(#[from] depot_core::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ExtractError> for RegistryError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::Identity(e) => Self::InvalidIdentity(e),
            other => Self::Malformed(other),
        }
    }
}

impl From<StorageError> for RegistryError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::TooLarge { size, limit } => Self::TooLarge { size, limit },
            StorageError::NotFound(key) => Self::NotFound(key),
            other => Self::Storage(other),
        }
    }
}

impl From<MetadataError> for RegistryError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::AlreadyExists(msg) => Self::Conflict(msg),
            MetadataError::NotFound(msg) => Self::NotFound(msg),
            other => Self::Metadata(other),
        }
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
