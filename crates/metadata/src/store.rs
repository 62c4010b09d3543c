//! Metadata store trait and SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{BlobRepo, FileRepo, PackageRepo, PropertyRepo, VersionRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    PackageRepo + VersionRepo + FileRepo + BlobRepo + PropertyRepo + Send + Sync
{
    /// Create the schema if it does not exist yet.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS packages (
    package_id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    package_type TEXT NOT NULL,
    name TEXT NOT NULL,
    lower_name TEXT NOT NULL,
    semver_compatible INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_packages_owner_type_name
    ON packages(owner_id, package_type, lower_name);

CREATE TABLE IF NOT EXISTS package_versions (
    version_id TEXT PRIMARY KEY,
    package_id TEXT NOT NULL REFERENCES packages(package_id),
    creator_id TEXT NOT NULL,
    version TEXT NOT NULL,
    lower_version TEXT NOT NULL,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    download_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_package_versions_identity
    ON package_versions(package_id, lower_version);

CREATE TABLE IF NOT EXISTS package_blobs (
    blob_id TEXT PRIMARY KEY,
    size INTEGER NOT NULL,
    hash_md5 TEXT NOT NULL,
    hash_sha1 TEXT NOT NULL,
    hash_sha256 TEXT NOT NULL,
    hash_sha512 TEXT NOT NULL,
    refcount INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_package_blobs_sha256_size
    ON package_blobs(hash_sha256, size);

CREATE TABLE IF NOT EXISTS package_files (
    file_id TEXT PRIMARY KEY,
    version_id TEXT NOT NULL REFERENCES package_versions(version_id),
    blob_id TEXT NOT NULL REFERENCES package_blobs(blob_id),
    name TEXT NOT NULL,
    lower_name TEXT NOT NULL,
    composite_key TEXT NOT NULL DEFAULT '',
    is_lead INTEGER NOT NULL DEFAULT 0,
    content_type TEXT,
    size INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_package_files_identity
    ON package_files(version_id, lower_name, composite_key);
CREATE INDEX IF NOT EXISTS idx_package_files_blob ON package_files(blob_id);

CREATE TABLE IF NOT EXISTS package_properties (
    property_id TEXT PRIMARY KEY,
    owner_type TEXT NOT NULL,
    owner_id TEXT NOT NULL,
    name TEXT NOT NULL,
    value TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_package_properties_owner
    ON package_properties(owner_type, owner_id);
"#;

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store, running schema bootstrap.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MetadataError::Config(format!("cannot create database directory: {e}"))
            })?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))
            .map_err(MetadataError::Database)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection
            // avoids persistent lock failures under concurrent workers.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[async_trait]
    impl PackageRepo for SqliteStore {
        async fn get_package(
            &self,
            owner_id: Uuid,
            package_type: &str,
            lower_name: &str,
        ) -> MetadataResult<Option<PackageRow>> {
            let row = sqlx::query_as::<_, PackageRow>(
                "SELECT * FROM packages WHERE owner_id = ? AND package_type = ? AND lower_name = ?",
            )
            .bind(owner_id)
            .bind(package_type)
            .bind(lower_name)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_package_by_id(
            &self,
            package_id: Uuid,
        ) -> MetadataResult<Option<PackageRow>> {
            let row =
                sqlx::query_as::<_, PackageRow>("SELECT * FROM packages WHERE package_id = ?")
                    .bind(package_id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn list_packages(
            &self,
            owner_id: Uuid,
            package_type: Option<&str>,
        ) -> MetadataResult<Vec<PackageRow>> {
            let rows = match package_type {
                Some(ty) => {
                    sqlx::query_as::<_, PackageRow>(
                        "SELECT * FROM packages WHERE owner_id = ? AND package_type = ? ORDER BY lower_name",
                    )
                    .bind(owner_id)
                    .bind(ty)
                    .fetch_all(&self.pool)
                    .await?
                }
                None => {
                    sqlx::query_as::<_, PackageRow>(
                        "SELECT * FROM packages WHERE owner_id = ? ORDER BY package_type, lower_name",
                    )
                    .bind(owner_id)
                    .fetch_all(&self.pool)
                    .await?
                }
            };
            Ok(rows)
        }
    }

    #[async_trait]
    impl VersionRepo for SqliteStore {
        async fn create_version_with_files(
            &self,
            creation: VersionCreation,
        ) -> MetadataResult<CreatedVersion> {
            let VersionCreation {
                package: candidate,
                mut version,
                files,
                version_properties,
            } = creation;

            if files.is_empty() {
                // Invariant: a committed version always has at least one file.
                return Err(MetadataError::Constraint(
                    "version must be created with at least one file".to_string(),
                ));
            }

            let mut tx = self.pool.begin().await?;

            // Resolve the package row, creating it on first upload. A
            // concurrent creator losing the insert race falls back to the
            // winner's row.
            let existing = sqlx::query_as::<_, PackageRow>(
                "SELECT * FROM packages WHERE owner_id = ? AND package_type = ? AND lower_name = ?",
            )
            .bind(candidate.owner_id)
            .bind(&candidate.package_type)
            .bind(&candidate.lower_name)
            .fetch_optional(&mut *tx)
            .await?;

            let package = match existing {
                Some(row) => row,
                None => {
                    let insert = sqlx::query(
                        r#"
                        INSERT INTO packages (package_id, owner_id, package_type, name, lower_name, semver_compatible, created_at)
                        VALUES (?, ?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(candidate.package_id)
                    .bind(candidate.owner_id)
                    .bind(&candidate.package_type)
                    .bind(&candidate.name)
                    .bind(&candidate.lower_name)
                    .bind(candidate.semver_compatible)
                    .bind(candidate.created_at)
                    .execute(&mut *tx)
                    .await;

                    match insert {
                        Ok(_) => candidate,
                        Err(e) if is_unique_violation(&e) => {
                            sqlx::query_as::<_, PackageRow>(
                                "SELECT * FROM packages WHERE owner_id = ? AND package_type = ? AND lower_name = ?",
                            )
                            .bind(candidate.owner_id)
                            .bind(&candidate.package_type)
                            .bind(&candidate.lower_name)
                            .fetch_optional(&mut *tx)
                            .await?
                            .ok_or_else(|| {
                                MetadataError::Internal(
                                    "package vanished after unique violation".to_string(),
                                )
                            })?
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            };

            version.package_id = package.package_id;
            let insert = sqlx::query(
                r#"
                INSERT INTO package_versions (version_id, package_id, creator_id, version, lower_version, metadata_json, download_count, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(version.version_id)
            .bind(version.package_id)
            .bind(version.creator_id)
            .bind(&version.version)
            .bind(&version.lower_version)
            .bind(&version.metadata_json)
            .bind(version.download_count)
            .bind(version.created_at)
            .execute(&mut *tx)
            .await;

            if let Err(e) = insert {
                // Dropping the transaction rolls back the package insert,
                // so a conflicting upload leaves no trace.
                if is_unique_violation(&e) {
                    return Err(MetadataError::AlreadyExists(format!(
                        "version '{}' already exists for package '{}'",
                        version.version, package.name
                    )));
                }
                return Err(e.into());
            }

            let mut created_files = Vec::with_capacity(files.len());
            for FileCreation { mut file, properties } in files {
                file.version_id = version.version_id;
                let insert = sqlx::query(
                    r#"
                    INSERT INTO package_files (file_id, version_id, blob_id, name, lower_name, composite_key, is_lead, content_type, size, created_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(file.file_id)
                .bind(file.version_id)
                .bind(file.blob_id)
                .bind(&file.name)
                .bind(&file.lower_name)
                .bind(&file.composite_key)
                .bind(file.is_lead)
                .bind(&file.content_type)
                .bind(file.size)
                .bind(file.created_at)
                .execute(&mut *tx)
                .await;

                if let Err(e) = insert {
                    if is_unique_violation(&e) {
                        return Err(MetadataError::AlreadyExists(format!(
                            "file '{}' already exists for this version",
                            file.name
                        )));
                    }
                    return Err(e.into());
                }

                // Refcount moves with file creation inside the same
                // transaction; a rolled-back version never holds a
                // reference.
                sqlx::query("UPDATE package_blobs SET refcount = refcount + 1 WHERE blob_id = ?")
                    .bind(file.blob_id)
                    .execute(&mut *tx)
                    .await?;

                for (name, value) in properties {
                    sqlx::query(
                        "INSERT INTO package_properties (property_id, owner_type, owner_id, name, value) VALUES (?, 'file', ?, ?, ?)",
                    )
                    .bind(Uuid::new_v4())
                    .bind(file.file_id)
                    .bind(&name)
                    .bind(&value)
                    .execute(&mut *tx)
                    .await?;
                }

                created_files.push(file);
            }

            for (name, value) in version_properties {
                sqlx::query(
                    "INSERT INTO package_properties (property_id, owner_type, owner_id, name, value) VALUES (?, 'version', ?, ?, ?)",
                )
                .bind(Uuid::new_v4())
                .bind(version.version_id)
                .bind(&name)
                .bind(&value)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;

            Ok(CreatedVersion {
                package,
                version,
                files: created_files,
            })
        }

        async fn get_version(
            &self,
            package_id: Uuid,
            lower_version: &str,
        ) -> MetadataResult<Option<PackageVersionRow>> {
            let row = sqlx::query_as::<_, PackageVersionRow>(
                "SELECT * FROM package_versions WHERE package_id = ? AND lower_version = ?",
            )
            .bind(package_id)
            .bind(lower_version)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_version_by_id(
            &self,
            version_id: Uuid,
        ) -> MetadataResult<Option<PackageVersionRow>> {
            let row = sqlx::query_as::<_, PackageVersionRow>(
                "SELECT * FROM package_versions WHERE version_id = ?",
            )
            .bind(version_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_versions(
            &self,
            package_id: Uuid,
        ) -> MetadataResult<Vec<PackageVersionRow>> {
            let rows = sqlx::query_as::<_, PackageVersionRow>(
                "SELECT * FROM package_versions WHERE package_id = ? ORDER BY created_at DESC, lower_version DESC",
            )
            .bind(package_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn count_versions(&self, package_id: Uuid) -> MetadataResult<u64> {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM package_versions WHERE package_id = ?")
                    .bind(package_id)
                    .fetch_one(&self.pool)
                    .await?;
            Ok(count as u64)
        }

        async fn increment_download_count(&self, version_id: Uuid) -> MetadataResult<()> {
            sqlx::query(
                "UPDATE package_versions SET download_count = download_count + 1 WHERE version_id = ?",
            )
            .bind(version_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn delete_version(&self, version_id: Uuid) -> MetadataResult<DeletedVersion> {
            let mut tx = self.pool.begin().await?;

            let version = sqlx::query_as::<_, PackageVersionRow>(
                "SELECT * FROM package_versions WHERE version_id = ?",
            )
            .bind(version_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| MetadataError::NotFound(format!("version {version_id}")))?;

            let files = sqlx::query_as::<_, PackageFileRow>(
                "SELECT * FROM package_files WHERE version_id = ?",
            )
            .bind(version_id)
            .fetch_all(&mut *tx)
            .await?;

            let mut blob_ids = Vec::with_capacity(files.len());
            for file in &files {
                sqlx::query(
                    "DELETE FROM package_properties WHERE owner_type = 'file' AND owner_id = ?",
                )
                .bind(file.file_id)
                .execute(&mut *tx)
                .await?;

                sqlx::query(
                    "UPDATE package_blobs SET refcount = MAX(0, refcount - 1) WHERE blob_id = ?",
                )
                .bind(file.blob_id)
                .execute(&mut *tx)
                .await?;
                blob_ids.push(file.blob_id);
            }

            sqlx::query("DELETE FROM package_files WHERE version_id = ?")
                .bind(version_id)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                "DELETE FROM package_properties WHERE owner_type = 'version' AND owner_id = ?",
            )
            .bind(version_id)
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM package_versions WHERE version_id = ?")
                .bind(version_id)
                .execute(&mut *tx)
                .await?;

            let remaining: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM package_versions WHERE package_id = ?")
                    .bind(version.package_id)
                    .fetch_one(&mut *tx)
                    .await?;

            let package_deleted = remaining == 0;
            if package_deleted {
                sqlx::query("DELETE FROM packages WHERE package_id = ?")
                    .bind(version.package_id)
                    .execute(&mut *tx)
                    .await?;
            }

            tx.commit().await?;

            Ok(DeletedVersion {
                package_deleted,
                blob_ids,
            })
        }
    }

    #[async_trait]
    impl FileRepo for SqliteStore {
        async fn get_files_by_version(
            &self,
            version_id: Uuid,
        ) -> MetadataResult<Vec<PackageFileRow>> {
            let rows = sqlx::query_as::<_, PackageFileRow>(
                "SELECT * FROM package_files WHERE version_id = ? ORDER BY lower_name, composite_key",
            )
            .bind(version_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn get_file(
            &self,
            version_id: Uuid,
            lower_name: &str,
            composite_key: &str,
        ) -> MetadataResult<Option<PackageFileRow>> {
            let row = sqlx::query_as::<_, PackageFileRow>(
                "SELECT * FROM package_files WHERE version_id = ? AND lower_name = ? AND composite_key = ?",
            )
            .bind(version_id)
            .bind(lower_name)
            .bind(composite_key)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }
    }

    #[async_trait]
    impl BlobRepo for SqliteStore {
        async fn insert_blob_if_absent(
            &self,
            blob: &PackageBlobRow,
        ) -> MetadataResult<(PackageBlobRow, bool)> {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO package_blobs (blob_id, size, hash_md5, hash_sha1, hash_sha256, hash_sha512, refcount, created_at)
                VALUES (?, ?, ?, ?, ?, ?, 0, ?)
                "#,
            )
            .bind(blob.blob_id)
            .bind(blob.size)
            .bind(&blob.hash_md5)
            .bind(&blob.hash_sha1)
            .bind(&blob.hash_sha256)
            .bind(&blob.hash_sha512)
            .bind(blob.created_at)
            .execute(&self.pool)
            .await?;

            let created = result.rows_affected() > 0;
            let row = sqlx::query_as::<_, PackageBlobRow>(
                "SELECT * FROM package_blobs WHERE hash_sha256 = ? AND size = ?",
            )
            .bind(&blob.hash_sha256)
            .bind(blob.size)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| {
                MetadataError::Internal("blob vanished between insert and select".to_string())
            })?;

            Ok((row, created))
        }

        async fn get_blob_by_id(
            &self,
            blob_id: Uuid,
        ) -> MetadataResult<Option<PackageBlobRow>> {
            let row = sqlx::query_as::<_, PackageBlobRow>(
                "SELECT * FROM package_blobs WHERE blob_id = ?",
            )
            .bind(blob_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_blob_by_hash(
            &self,
            hash_sha256: &str,
            size: i64,
        ) -> MetadataResult<Option<PackageBlobRow>> {
            let row = sqlx::query_as::<_, PackageBlobRow>(
                "SELECT * FROM package_blobs WHERE hash_sha256 = ? AND size = ?",
            )
            .bind(hash_sha256)
            .bind(size)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_unreferenced_blobs(
            &self,
            older_than: OffsetDateTime,
            limit: u32,
        ) -> MetadataResult<Vec<PackageBlobRow>> {
            let rows = sqlx::query_as::<_, PackageBlobRow>(
                "SELECT * FROM package_blobs WHERE refcount = 0 AND created_at < ? ORDER BY created_at LIMIT ?",
            )
            .bind(older_than)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn delete_unreferenced_blobs_atomic(
            &self,
            older_than: OffsetDateTime,
            limit: u32,
        ) -> MetadataResult<Vec<PackageBlobRow>> {
            let mut tx = self.pool.begin().await?;

            let candidates = sqlx::query_as::<_, PackageBlobRow>(
                "SELECT * FROM package_blobs WHERE refcount = 0 AND created_at < ? ORDER BY created_at LIMIT ?",
            )
            .bind(older_than)
            .bind(limit)
            .fetch_all(&mut *tx)
            .await?;

            // Refcount is re-checked per row; a blob revived by a
            // concurrent upload between SELECT and DELETE is skipped and
            // its bytes stay intact.
            let mut deleted = Vec::new();
            for blob in candidates {
                let result = sqlx::query(
                    "DELETE FROM package_blobs WHERE blob_id = ? AND refcount = 0",
                )
                .bind(blob.blob_id)
                .execute(&mut *tx)
                .await?;

                if result.rows_affected() > 0 {
                    deleted.push(blob);
                } else {
                    tracing::debug!(
                        blob = %blob.hash_sha256,
                        "blob revived during sweep, skipping deletion"
                    );
                }
            }

            tx.commit().await?;
            Ok(deleted)
        }

        async fn get_blob_stats(&self) -> MetadataResult<BlobStats> {
            let total: (i64, i64) = sqlx::query_as(
                "SELECT COUNT(*), COALESCE(SUM(size), 0) FROM package_blobs",
            )
            .fetch_one(&self.pool)
            .await?;

            let referenced: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM package_blobs WHERE refcount > 0")
                    .fetch_one(&self.pool)
                    .await?;

            Ok(BlobStats {
                count: total.0 as u64,
                total_size: total.1 as u64,
                referenced_count: referenced as u64,
                unreferenced_count: (total.0 - referenced) as u64,
            })
        }
    }

    #[async_trait]
    impl PropertyRepo for SqliteStore {
        async fn get_properties(
            &self,
            owner: PropertyOwner,
            owner_id: Uuid,
        ) -> MetadataResult<Vec<PackagePropertyRow>> {
            let rows = sqlx::query_as::<_, PackagePropertyRow>(
                "SELECT * FROM package_properties WHERE owner_type = ? AND owner_id = ?",
            )
            .bind(owner.as_str())
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn insert_property(
            &self,
            owner: PropertyOwner,
            owner_id: Uuid,
            name: &str,
            value: &str,
        ) -> MetadataResult<()> {
            sqlx::query(
                "INSERT INTO package_properties (property_id, owner_type, owner_id, name, value) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4())
            .bind(owner.as_str())
            .bind(owner_id)
            .bind(name)
            .bind(value)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn delete_properties(
            &self,
            owner: PropertyOwner,
            owner_id: Uuid,
        ) -> MetadataResult<()> {
            sqlx::query("DELETE FROM package_properties WHERE owner_type = ? AND owner_id = ?")
                .bind(owner.as_str())
                .bind(owner_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }
    }
}
