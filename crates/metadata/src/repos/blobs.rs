//! Package blob repository.

use crate::error::MetadataResult;
use crate::models::{BlobStats, PackageBlobRow};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for content-addressed blob rows.
#[async_trait]
pub trait BlobRepo: Send + Sync {
    /// Insert a blob row unless one with the same `(sha256, size)` already
    /// exists; returns the canonical row and whether this call created it.
    ///
    /// Safe under concurrent callers: losers of the insert race fetch the
    /// winner's row.
    async fn insert_blob_if_absent(
        &self,
        blob: &PackageBlobRow,
    ) -> MetadataResult<(PackageBlobRow, bool)>;

    /// Look up a blob by id.
    async fn get_blob_by_id(&self, blob_id: Uuid) -> MetadataResult<Option<PackageBlobRow>>;

    /// Look up a blob by its content identity.
    async fn get_blob_by_hash(
        &self,
        hash_sha256: &str,
        size: i64,
    ) -> MetadataResult<Option<PackageBlobRow>>;

    /// Get blobs with zero refcount created before `older_than`.
    async fn get_unreferenced_blobs(
        &self,
        older_than: OffsetDateTime,
        limit: u32,
    ) -> MetadataResult<Vec<PackageBlobRow>>;

    /// Atomically delete unreferenced blob rows and return what was
    /// actually deleted.
    ///
    /// The refcount is re-checked inside the deleting transaction so a
    /// concurrent upload that revived a blob never loses it. Storage
    /// cleanup happens after this call; an object orphaned by a failed
    /// storage delete is retried on the next sweep.
    async fn delete_unreferenced_blobs_atomic(
        &self,
        older_than: OffsetDateTime,
        limit: u32,
    ) -> MetadataResult<Vec<PackageBlobRow>>;

    /// Get blob count and size statistics.
    async fn get_blob_stats(&self) -> MetadataResult<BlobStats>;
}
