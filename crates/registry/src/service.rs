//! The registry service: upload coordination, downloads, listing,
//! deletion and blob reclamation.

use crate::descriptor::{load_descriptor, PackageDescriptor};
use crate::error::{RegistryError, RegistryResult};
use depot_core::config::{AppConfig, RegistryConfig};
use depot_core::{DigestSet, PackageName, PackageType, PackageVersion, UploadRequest, UploadState};
use depot_formats::{ExtractedPackage, ExtractorSet, FilePayload};
use depot_metadata::models::{
    FileCreation, PackageBlobRow, PackageFileRow, PackageRow, PackageVersionRow,
};
use depot_metadata::MetadataStore;
use depot_storage::{ByteStream, HashedBuffer, ObjectStore, StorageError};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

/// Storage key for a blob, addressed by its primary hash.
fn blob_key(hash_sha256: &str) -> String {
    format!(
        "packages/{}/{}/{}",
        &hash_sha256[0..2],
        &hash_sha256[2..4],
        hash_sha256
    )
}

/// A downloadable file with its content stream.
pub struct DownloadedFile {
    pub file: PackageFileRow,
    pub blob: PackageBlobRow,
    pub stream: ByteStream,
}

/// Result of a blob sweep run.
#[derive(Debug, Clone, Default)]
pub struct SweepStats {
    /// Blob rows reclaimed.
    pub blobs_deleted: u64,
    /// Bytes reclaimed from storage.
    pub bytes_deleted: u64,
    /// Storage deletions that failed; the objects stay orphaned.
    pub storage_errors: u64,
}

/// The package registry storage core.
///
/// Stateless besides its injected collaborators; safe to share across
/// concurrent request workers.
pub struct RegistryService {
    metadata: Arc<dyn MetadataStore>,
    storage: Arc<dyn ObjectStore>,
    extractors: ExtractorSet,
    config: RegistryConfig,
}

impl RegistryService {
    /// Create a service from its collaborators.
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        storage: Arc<dyn ObjectStore>,
        extractors: ExtractorSet,
        config: RegistryConfig,
    ) -> Self {
        Self {
            metadata,
            storage,
            extractors,
            config,
        }
    }

    /// Build a service with the default extractor set from configuration.
    pub async fn from_config(config: &AppConfig) -> RegistryResult<Self> {
        let storage = depot_storage::from_config(&config.storage).await?;
        let metadata = depot_metadata::from_config(&config.metadata).await?;
        Ok(Self::new(
            metadata,
            storage,
            ExtractorSet::with_defaults(),
            config.registry.clone(),
        ))
    }

    /// Upload a package artifact.
    ///
    /// Runs the full coordinator pipeline: spool, extract, validate
    /// identity, resolve the blob, then commit all rows in one
    /// transaction. A duplicate `(package, version)` yields `Conflict`
    /// and leaves the registry untouched.
    #[tracing::instrument(skip(self, stream), fields(owner = %request.owner_id, package_type = %request.package_type))]
    pub async fn upload(
        &self,
        request: UploadRequest,
        stream: ByteStream,
    ) -> RegistryResult<PackageDescriptor> {
        let extractor = self
            .extractors
            .get(request.package_type)
            .ok_or(RegistryError::UnsupportedType(request.package_type))?;

        let upload = HashedBuffer::from_stream(
            stream,
            self.config.spool_memory_limit,
            self.config.max_upload_size,
        )
        .await?;
        tracing::debug!(state = %UploadState::Received, size = upload.size(), "upload spooled");

        // Extraction is synchronous and seek-heavy; run it off the runtime.
        let (upload, extracted) = tokio::task::spawn_blocking(
            move || -> RegistryResult<(HashedBuffer, ExtractedPackage)> {
                let mut upload = upload;
                upload.rewind().map_err(StorageError::Io)?;
                let extracted = extractor.extract(&mut upload)?;
                Ok((upload, extracted))
            },
        )
        .await
        .map_err(|e| RegistryError::Internal(format!("extraction task failed: {e}")))??;

        if extracted.metadata.package_type() != request.package_type {
            return Err(RegistryError::Internal(format!(
                "extractor for {} produced {} metadata",
                request.package_type,
                extracted.metadata.package_type()
            )));
        }
        tracing::debug!(
            state = %UploadState::Extracted,
            name = %extracted.name,
            version = %extracted.version,
            "metadata extracted"
        );

        // Fast-path conflict check before any blob work. The commit
        // transaction re-checks under the unique index, so a racing
        // upload still resolves to exactly one winner.
        if let Some(package) = self
            .metadata
            .get_package(
                request.owner_id,
                request.package_type.as_str(),
                &extracted.name.lowercase(),
            )
            .await?
        {
            if self
                .metadata
                .get_version(package.package_id, &extracted.version.lowercase())
                .await?
                .is_some()
            {
                return Err(RegistryError::Conflict(format!(
                    "version '{}' already exists for package '{}'",
                    extracted.version, extracted.name
                )));
            }
        }
        tracing::debug!(state = %UploadState::Validated, "identity validated");

        let ExtractedPackage {
            name,
            version,
            metadata,
            version_properties,
            file,
        } = extracted;

        let payload = match file.payload {
            FilePayload::Upload => upload,
            FilePayload::Detached(detached) => detached,
        };
        let blob = self.resolve_blob(payload).await?;
        tracing::debug!(state = %UploadState::BlobResolved, blob = %blob.hash_sha256, "blob resolved");

        let creation = self.build_creation(
            &request,
            &name,
            &version,
            &metadata,
            version_properties,
            file.name,
            file.content_type,
            file.composite_key,
            file.properties,
            &blob,
        )?;

        // Any failure inside this call rolls the whole transaction back;
        // the already-persisted blob stays for reuse or the sweep.
        let created = self.metadata.create_version_with_files(creation).await?;
        tracing::info!(
            state = %UploadState::Committed,
            package = %created.package.name,
            version = %created.version.version,
            "package version committed"
        );

        load_descriptor(self.metadata.as_ref(), created.version).await
    }

    #[allow(clippy::too_many_arguments)]
    fn build_creation(
        &self,
        request: &UploadRequest,
        name: &PackageName,
        version: &PackageVersion,
        metadata: &depot_core::Metadata,
        version_properties: Vec<(String, String)>,
        file_name: String,
        content_type: Option<String>,
        composite_key: String,
        file_properties: Vec<(String, String)>,
        blob: &PackageBlobRow,
    ) -> RegistryResult<depot_metadata::models::VersionCreation> {
        let now = OffsetDateTime::now_utc();
        Ok(depot_metadata::models::VersionCreation {
            package: PackageRow {
                package_id: Uuid::new_v4(),
                owner_id: request.owner_id,
                package_type: request.package_type.as_str().to_string(),
                name: name.as_str().to_string(),
                lower_name: name.lowercase(),
                semver_compatible: request.package_type.semver_compatible(),
                created_at: now,
            },
            version: PackageVersionRow {
                version_id: Uuid::new_v4(),
                package_id: Uuid::nil(),
                creator_id: request.creator_id,
                version: version.as_str().to_string(),
                lower_version: version.lowercase(),
                metadata_json: metadata.to_json()?,
                download_count: 0,
                created_at: now,
            },
            files: vec![FileCreation {
                file: PackageFileRow {
                    file_id: Uuid::new_v4(),
                    version_id: Uuid::nil(),
                    blob_id: blob.blob_id,
                    lower_name: file_name.to_lowercase(),
                    name: file_name,
                    composite_key,
                    is_lead: true,
                    content_type,
                    size: blob.size,
                    created_at: now,
                },
                properties: file_properties,
            }],
            version_properties,
        })
    }

    /// Resolve spooled content to a blob row, deduplicating by
    /// `(sha256, size)` and persisting the bytes when new.
    async fn resolve_blob(&self, payload: HashedBuffer) -> RegistryResult<PackageBlobRow> {
        let digests = payload.digests();
        let size = payload.size() as i64;
        let sha256 = digests.sha256.to_hex();
        let key = blob_key(&sha256);

        if let Some(existing) = self.metadata.get_blob_by_hash(&sha256, size).await? {
            self.verify_blob_digests(&existing, &digests)?;
            // Heal a row whose bytes went missing (interrupted sweep).
            if !self.storage.exists(&key).await? {
                tracing::warn!(blob = %sha256, "blob row present but bytes missing, re-persisting");
                self.persist_payload(&key, payload).await?;
            }
            return Ok(existing);
        }

        // Bytes go to storage before the row becomes visible so a visible
        // blob row always has content behind it. The write is atomic and
        // content-addressed; concurrent writers of the same key converge.
        self.persist_payload(&key, payload).await?;

        let candidate = PackageBlobRow {
            blob_id: Uuid::new_v4(),
            size,
            hash_md5: digests.md5.clone(),
            hash_sha1: digests.sha1.clone(),
            hash_sha256: sha256,
            hash_sha512: digests.sha512.clone(),
            refcount: 0,
            created_at: OffsetDateTime::now_utc(),
        };
        let (row, created) = self.metadata.insert_blob_if_absent(&candidate).await?;
        if !created {
            // Lost the insert race; the winner's row must describe the
            // same content.
            self.verify_blob_digests(&row, &digests)?;
        }
        Ok(row)
    }

    /// A dedup hit must agree on every digest. Same primary hash and size
    /// with differing content is a fatal integrity violation, never a
    /// silent pick-one.
    fn verify_blob_digests(
        &self,
        row: &PackageBlobRow,
        digests: &DigestSet,
    ) -> RegistryResult<()> {
        let matches = row.hash_md5 == digests.md5
            && row.hash_sha1 == digests.sha1
            && row.hash_sha256 == digests.sha256.to_hex()
            && row.hash_sha512 == digests.sha512;
        if !matches {
            tracing::error!(
                blob = %row.hash_sha256,
                "digest set mismatch on deduplicated blob; refusing upload"
            );
            return Err(RegistryError::Integrity(format!(
                "stored blob {} does not match uploaded content",
                row.hash_sha256
            )));
        }
        Ok(())
    }

    async fn persist_payload(&self, key: &str, payload: HashedBuffer) -> RegistryResult<()> {
        use futures::StreamExt;

        let mut upload = self.storage.put_stream(key).await?;
        let mut stream = payload.into_byte_stream();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) => {
                    if let Err(e) = upload.write(chunk).await {
                        let _ = upload.abort().await;
                        return Err(e.into());
                    }
                }
                Err(e) => {
                    let _ = upload.abort().await;
                    return Err(e.into());
                }
            }
        }
        upload.finish().await?;
        Ok(())
    }

    /// Resolve a package by identity, or `NotFound`.
    async fn require_package(
        &self,
        owner_id: Uuid,
        package_type: PackageType,
        name: &str,
    ) -> RegistryResult<PackageRow> {
        self.metadata
            .get_package(owner_id, package_type.as_str(), &name.to_lowercase())
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("package '{name}'")))
    }

    /// Resolve a version of a package, or `NotFound`.
    async fn require_version(
        &self,
        package: &PackageRow,
        version: &str,
    ) -> RegistryResult<PackageVersionRow> {
        self.metadata
            .get_version(package.package_id, &version.to_lowercase())
            .await?
            .ok_or_else(|| {
                RegistryError::NotFound(format!(
                    "version '{version}' of package '{}'",
                    package.name
                ))
            })
    }

    /// Open a file of a package version for download.
    ///
    /// Increments the version's download counter as a side effect; the
    /// increment is non-blocking and eventually consistent.
    #[tracing::instrument(skip(self))]
    pub async fn download(
        &self,
        owner_id: Uuid,
        package_type: PackageType,
        name: &str,
        version: &str,
        filename: &str,
    ) -> RegistryResult<DownloadedFile> {
        let package = self.require_package(owner_id, package_type, name).await?;
        let version_row = self.require_version(&package, version).await?;
        let file = self
            .metadata
            .get_file(version_row.version_id, &filename.to_lowercase(), "")
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("file '{filename}'")))?;
        let blob = self
            .metadata
            .get_blob_by_id(file.blob_id)
            .await?
            .ok_or_else(|| {
                RegistryError::Internal(format!(
                    "file {} references missing blob {}",
                    file.file_id, file.blob_id
                ))
            })?;

        let stream = self.storage.get_stream(&blob_key(&blob.hash_sha256)).await?;

        if let Err(e) = self
            .metadata
            .increment_download_count(version_row.version_id)
            .await
        {
            tracing::warn!(version = %version_row.version_id, error = %e, "download counter update failed");
        }

        Ok(DownloadedFile { file, blob, stream })
    }

    /// Assemble descriptors for all versions of a package, newest first.
    pub async fn list_versions(
        &self,
        owner_id: Uuid,
        package_type: PackageType,
        name: &str,
    ) -> RegistryResult<Vec<PackageDescriptor>> {
        let package = self.require_package(owner_id, package_type, name).await?;
        let versions = self.metadata.list_versions(package.package_id).await?;
        let mut descriptors = Vec::with_capacity(versions.len());
        for version in versions {
            descriptors.push(load_descriptor(self.metadata.as_ref(), version).await?);
        }
        Ok(descriptors)
    }

    /// Assemble the descriptor for one version.
    pub async fn get_descriptor(
        &self,
        owner_id: Uuid,
        package_type: PackageType,
        name: &str,
        version: &str,
    ) -> RegistryResult<PackageDescriptor> {
        let package = self.require_package(owner_id, package_type, name).await?;
        let version_row = self.require_version(&package, version).await?;
        load_descriptor(self.metadata.as_ref(), version_row).await
    }

    /// Delete a package version.
    ///
    /// Cascades to files and properties and removes the package when its
    /// last version goes; blob bytes are reclaimed later by the sweep.
    #[tracing::instrument(skip(self))]
    pub async fn delete_version(
        &self,
        owner_id: Uuid,
        package_type: PackageType,
        name: &str,
        version: &str,
    ) -> RegistryResult<()> {
        let package = self.require_package(owner_id, package_type, name).await?;
        let version_row = self.require_version(&package, version).await?;
        let outcome = self.metadata.delete_version(version_row.version_id).await?;
        tracing::info!(
            package = %package.name,
            version = %version_row.version,
            package_deleted = outcome.package_deleted,
            "package version deleted"
        );
        Ok(())
    }

    /// Reclaim unreferenced blobs older than the configured grace period.
    ///
    /// Rows are deleted transactionally first (with a refcount re-check),
    /// then the backing objects. An object whose deletion fails stays
    /// orphaned but harmless: it is content-addressed, so a future upload
    /// of the same bytes simply reuses it.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_blobs(&self) -> RegistryResult<SweepStats> {
        let cutoff = OffsetDateTime::now_utc() - self.config.gc.grace_period();
        let deleted = self
            .metadata
            .delete_unreferenced_blobs_atomic(cutoff, self.config.gc.batch_size)
            .await?;

        let mut stats = SweepStats::default();
        for blob in deleted {
            stats.blobs_deleted += 1;
            match self.storage.delete(&blob_key(&blob.hash_sha256)).await {
                Ok(()) => stats.bytes_deleted += blob.size as u64,
                Err(StorageError::NotFound(_)) => {}
                Err(e) => {
                    stats.storage_errors += 1;
                    tracing::warn!(blob = %blob.hash_sha256, error = %e, "blob object deletion failed");
                }
            }
        }

        if stats.blobs_deleted > 0 {
            tracing::info!(
                blobs = stats.blobs_deleted,
                bytes = stats.bytes_deleted,
                "blob sweep reclaimed storage"
            );
        }
        Ok(stats)
    }
}
