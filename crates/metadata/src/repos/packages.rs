//! Package repository.

use crate::error::MetadataResult;
use crate::models::PackageRow;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for package rows.
///
/// Package creation happens only inside the transactional version
/// creation (`VersionRepo::create_version_with_files`); a package without
/// versions is never externally visible.
#[async_trait]
pub trait PackageRepo: Send + Sync {
    /// Look up a package by its case-insensitive identity.
    async fn get_package(
        &self,
        owner_id: Uuid,
        package_type: &str,
        lower_name: &str,
    ) -> MetadataResult<Option<PackageRow>>;

    /// Look up a package by id.
    async fn get_package_by_id(&self, package_id: Uuid) -> MetadataResult<Option<PackageRow>>;

    /// List an owner's packages, optionally filtered by type.
    async fn list_packages(
        &self,
        owner_id: Uuid,
        package_type: Option<&str>,
    ) -> MetadataResult<Vec<PackageRow>>;
}
