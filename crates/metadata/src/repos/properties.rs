//! Package property repository.

use crate::error::MetadataResult;
use crate::models::{PackagePropertyRow, PropertyOwner};
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for generic key-value properties on versions and files.
#[async_trait]
pub trait PropertyRepo: Send + Sync {
    /// List an owner's properties. Multiple rows per name are permitted;
    /// order is unspecified.
    async fn get_properties(
        &self,
        owner: PropertyOwner,
        owner_id: Uuid,
    ) -> MetadataResult<Vec<PackagePropertyRow>>;

    /// Attach a property to an owner.
    async fn insert_property(
        &self,
        owner: PropertyOwner,
        owner_id: Uuid,
        name: &str,
        value: &str,
    ) -> MetadataResult<()>;

    /// Remove all of an owner's properties.
    async fn delete_properties(
        &self,
        owner: PropertyOwner,
        owner_id: Uuid,
    ) -> MetadataResult<()>;
}
