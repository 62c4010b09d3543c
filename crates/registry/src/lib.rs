//! The depot registry service layer.
//!
//! Ties the storage, metadata and format crates together into the
//! package registry core: upload coordination with transactional commit,
//! content deduplication, the read-side descriptor assembler, downloads,
//! deletion and blob reclamation.

pub mod descriptor;
pub mod error;
pub mod service;

pub use descriptor::{load_descriptor, PackageDescriptor, PackageFileDescriptor};
pub use error::{RegistryError, RegistryResult};
pub use service::{DownloadedFile, RegistryService, SweepStats};
