//! Repository traits for metadata operations.

pub mod blobs;
pub mod files;
pub mod packages;
pub mod properties;
pub mod versions;

pub use blobs::BlobRepo;
pub use files::FileRepo;
pub use packages::PackageRepo;
pub use properties::PropertyRepo;
pub use versions::VersionRepo;
