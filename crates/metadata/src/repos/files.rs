//! Package file repository.

use crate::error::MetadataResult;
use crate::models::PackageFileRow;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for package file rows.
///
/// File creation and deletion only happen through the version lifecycle;
/// reads are what this trait exposes.
#[async_trait]
pub trait FileRepo: Send + Sync {
    /// List a version's files in name order.
    async fn get_files_by_version(
        &self,
        version_id: Uuid,
    ) -> MetadataResult<Vec<PackageFileRow>>;

    /// Look up a file by its identity within a version.
    async fn get_file(
        &self,
        version_id: Uuid,
        lower_name: &str,
        composite_key: &str,
    ) -> MetadataResult<Option<PackageFileRow>>;
}
