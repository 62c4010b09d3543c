//! Upload lifecycle states and request types.

use crate::package::PackageType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// State of an upload as it moves through the coordinator.
///
/// `Rejected` can be entered from any non-terminal state; everything else
/// advances strictly forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    /// Raw bytes received and spooled.
    Received,
    /// Ecosystem metadata extracted from the payload.
    Extracted,
    /// Identity validated against the existing registry state.
    Validated,
    /// Content resolved to a (possibly pre-existing) blob.
    BlobResolved,
    /// All rows committed; the version is externally visible.
    Committed,
    /// Upload failed; no rows are visible.
    Rejected,
}

impl UploadState {
    /// Check if the upload reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Rejected)
    }

    /// The next state on the success path, if any.
    pub fn next(&self) -> Option<UploadState> {
        match self {
            Self::Received => Some(Self::Extracted),
            Self::Extracted => Some(Self::Validated),
            Self::Validated => Some(Self::BlobResolved),
            Self::BlobResolved => Some(Self::Committed),
            Self::Committed | Self::Rejected => None,
        }
    }
}

impl std::fmt::Display for UploadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::Extracted => "extracted",
            Self::Validated => "validated",
            Self::BlobResolved => "blob_resolved",
            Self::Committed => "committed",
            Self::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

/// An inbound upload, as handed over by the host's request layer.
///
/// The host is responsible for authentication; the core only receives the
/// resolved owner and creator references plus the declared package type.
#[derive(Clone, Debug)]
pub struct UploadRequest {
    /// Owning user or organization.
    pub owner_id: Uuid,
    /// The authenticated uploader.
    pub creator_id: Uuid,
    /// Declared ecosystem; selects the format extractor.
    pub package_type: PackageType,
}
