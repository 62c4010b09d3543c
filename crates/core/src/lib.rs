//! Core domain types and shared logic for the depot package registry.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Content hashes and multi-algorithm digest sets
//! - Package types, validated names and versions
//! - Ecosystem metadata as a closed tagged union
//! - Upload lifecycle states
//! - Configuration types

pub mod config;
pub mod error;
pub mod hash;
pub mod metadata;
pub mod package;
pub mod upload;

pub use error::{Error, Result};
pub use hash::{ContentHash, DigestSet, MultiHasher};
pub use metadata::Metadata;
pub use package::{PackageName, PackageType, PackageVersion};
pub use upload::{UploadRequest, UploadState};

/// Default in-memory spool threshold before uploads spill to disk: 32 MiB.
pub const DEFAULT_SPOOL_MEMORY_LIMIT: usize = 32 * 1024 * 1024;

/// Default maximum accepted upload size: 512 MiB.
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 512 * 1024 * 1024;
