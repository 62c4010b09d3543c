//! Package version repository.

use crate::error::MetadataResult;
use crate::models::{CreatedVersion, DeletedVersion, PackageVersionRow, VersionCreation};
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for package version rows.
#[async_trait]
pub trait VersionRepo: Send + Sync {
    /// Create a version together with its package (if new), files,
    /// refcount increments and properties in a single transaction.
    ///
    /// Returns `AlreadyExists` when the `(package, version)` pair is
    /// taken; nothing is written in that case. Two concurrent calls for
    /// the same pair resolve to exactly one success.
    async fn create_version_with_files(
        &self,
        creation: VersionCreation,
    ) -> MetadataResult<CreatedVersion>;

    /// Look up a version by its case-insensitive identity.
    async fn get_version(
        &self,
        package_id: Uuid,
        lower_version: &str,
    ) -> MetadataResult<Option<PackageVersionRow>>;

    /// Look up a version by id.
    async fn get_version_by_id(
        &self,
        version_id: Uuid,
    ) -> MetadataResult<Option<PackageVersionRow>>;

    /// List a package's versions, newest first.
    async fn list_versions(&self, package_id: Uuid) -> MetadataResult<Vec<PackageVersionRow>>;

    /// Count a package's versions.
    async fn count_versions(&self, package_id: Uuid) -> MetadataResult<u64>;

    /// Increment the download counter.
    ///
    /// Deliberately non-transactional; lost updates under extreme
    /// concurrency are acceptable for this counter.
    async fn increment_download_count(&self, version_id: Uuid) -> MetadataResult<()>;

    /// Delete a version, cascading to its files and properties and
    /// decrementing blob refcounts. Removes the package row too when this
    /// was its last version. Blob rows themselves are left for the sweep.
    async fn delete_version(&self, version_id: Uuid) -> MetadataResult<DeletedVersion>;
}
