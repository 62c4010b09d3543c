//! Database models mapping to the registry schema.

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Owner kind of a package property row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyOwner {
    Version,
    File,
}

impl PropertyOwner {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Version => "version",
            Self::File => "file",
        }
    }
}

/// Package record.
///
/// Identity is `(owner_id, package_type, lower_name)`; `name` preserves the
/// case the first upload used.
#[derive(Debug, Clone, FromRow)]
pub struct PackageRow {
    pub package_id: Uuid,
    pub owner_id: Uuid,
    pub package_type: String,
    pub name: String,
    pub lower_name: String,
    pub semver_compatible: bool,
    pub created_at: OffsetDateTime,
}

/// Package version record.
///
/// `metadata_json` is the opaque ecosystem metadata; only the owning
/// format interprets it.
#[derive(Debug, Clone, FromRow)]
pub struct PackageVersionRow {
    pub version_id: Uuid,
    pub package_id: Uuid,
    pub creator_id: Uuid,
    pub version: String,
    pub lower_version: String,
    pub metadata_json: String,
    pub download_count: i64,
    pub created_at: OffsetDateTime,
}

/// Package blob record.
///
/// Identity is `(hash_sha256, size)`; a blob is shared by any number of
/// file rows and `refcount` tracks how many.
#[derive(Debug, Clone, FromRow)]
pub struct PackageBlobRow {
    pub blob_id: Uuid,
    pub size: i64,
    pub hash_md5: String,
    pub hash_sha1: String,
    pub hash_sha256: String,
    pub hash_sha512: String,
    pub refcount: i64,
    pub created_at: OffsetDateTime,
}

/// Package file record.
///
/// Identity is `(version_id, lower_name, composite_key)`. `size` mirrors
/// the blob size for cheap listings.
#[derive(Debug, Clone, FromRow)]
pub struct PackageFileRow {
    pub file_id: Uuid,
    pub version_id: Uuid,
    pub blob_id: Uuid,
    pub name: String,
    pub lower_name: String,
    pub composite_key: String,
    pub is_lead: bool,
    pub content_type: Option<String>,
    pub size: i64,
    pub created_at: OffsetDateTime,
}

/// Generic key-value property attached to a version or file.
#[derive(Debug, Clone, FromRow)]
pub struct PackagePropertyRow {
    pub property_id: Uuid,
    pub owner_type: String,
    pub owner_id: Uuid,
    pub name: String,
    pub value: String,
}

/// Input for the transactional creation of a version with its files.
#[derive(Debug, Clone)]
pub struct VersionCreation {
    /// Candidate package row; ignored if the package already exists.
    pub package: PackageRow,
    /// Version row; `package_id` is overwritten with the resolved package.
    pub version: PackageVersionRow,
    /// Files referencing already-resolved blobs.
    pub files: Vec<FileCreation>,
    /// Version-level properties.
    pub version_properties: Vec<(String, String)>,
}

/// A file row plus its properties, created together with the version.
#[derive(Debug, Clone)]
pub struct FileCreation {
    /// File row; `version_id` is overwritten with the created version.
    pub file: PackageFileRow,
    /// File-level properties.
    pub properties: Vec<(String, String)>,
}

/// Result of a successful transactional version creation.
#[derive(Debug, Clone)]
pub struct CreatedVersion {
    pub package: PackageRow,
    pub version: PackageVersionRow,
    pub files: Vec<PackageFileRow>,
}

/// Result of a version deletion cascade.
#[derive(Debug, Clone)]
pub struct DeletedVersion {
    /// True when the deleted version was the package's last and the
    /// package row was removed with it.
    pub package_deleted: bool,
    /// Blobs whose refcount was decremented.
    pub blob_ids: Vec<Uuid>,
}

/// Blob statistics.
#[derive(Debug, Clone, Default)]
pub struct BlobStats {
    /// Total number of blobs.
    pub count: u64,
    /// Total size in bytes.
    pub total_size: u64,
    /// Number of blobs with refcount > 0.
    pub referenced_count: u64,
    /// Number of blobs with refcount == 0.
    pub unreferenced_count: u64,
}
