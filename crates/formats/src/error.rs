//! Extraction error taxonomy.
//!
//! Every variant is user-correctable and surfaced verbatim to the
//! uploader; nothing here is an internal fault.

use thiserror::Error;

/// Errors produced by format extractors.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("{0} file not found in archive")]
    MissingRequiredMember(&'static str),

    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    #[error("malformed archive: {0}")]
    MalformedArchive(String),

    #[error("invalid identity: {0}")]
    Identity(#[from] depot_core::Error),

    #[error("I/O error while reading package: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractError {
    /// Shorthand for field validation failures.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for extraction operations.
pub type ExtractResult<T> = std::result::Result<T, ExtractError>;
