//! Read-side descriptor assembly.
//!
//! A descriptor is the fully joined, read-only view of one package
//! version: package, version, ecosystem metadata, properties and all
//! files with their blobs. Nothing here mutates registry state.

use crate::error::{RegistryError, RegistryResult};
use depot_core::{Metadata, PackageType};
use depot_metadata::models::{
    PackageBlobRow, PackageFileRow, PackagePropertyRow, PackageRow, PackageVersionRow,
    PropertyOwner,
};
use depot_metadata::MetadataStore;
use std::str::FromStr;

/// Assembled view of a package version.
#[derive(Debug, Clone)]
pub struct PackageDescriptor {
    pub package: PackageRow,
    pub version: PackageVersionRow,
    /// Parsed semantic version; present only when the package is
    /// semver-compatible and the raw string parses. A failed parse is
    /// non-fatal and leaves the raw string authoritative.
    pub semver: Option<semver::Version>,
    pub metadata: Metadata,
    pub properties: Vec<PackagePropertyRow>,
    pub files: Vec<PackageFileDescriptor>,
}

/// Assembled view of one file within a version.
#[derive(Debug, Clone)]
pub struct PackageFileDescriptor {
    pub file: PackageFileRow,
    pub blob: PackageBlobRow,
    pub properties: Vec<PackagePropertyRow>,
}

impl PackageDescriptor {
    /// Total blob size across all files, computed on demand.
    pub fn total_blob_size(&self) -> i64 {
        self.files.iter().map(|f| f.blob.size).sum()
    }

    /// First property value with the given name, if any.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}

/// Assemble the descriptor for a version.
pub async fn load_descriptor(
    store: &dyn MetadataStore,
    version: PackageVersionRow,
) -> RegistryResult<PackageDescriptor> {
    let package = store
        .get_package_by_id(version.package_id)
        .await?
        .ok_or_else(|| {
            RegistryError::Internal(format!(
                "version {} references missing package {}",
                version.version_id, version.package_id
            ))
        })?;

    let package_type = PackageType::from_str(&package.package_type)?;
    let metadata = Metadata::from_json(package_type, &version.metadata_json)?;

    let semver = if package.semver_compatible {
        semver::Version::parse(&version.version).ok()
    } else {
        None
    };

    let properties = store
        .get_properties(PropertyOwner::Version, version.version_id)
        .await?;

    let file_rows = store.get_files_by_version(version.version_id).await?;
    let mut files = Vec::with_capacity(file_rows.len());
    for file in file_rows {
        let blob = store.get_blob_by_id(file.blob_id).await?.ok_or_else(|| {
            RegistryError::Internal(format!(
                "file {} references missing blob {}",
                file.file_id, file.blob_id
            ))
        })?;
        let properties = store
            .get_properties(PropertyOwner::File, file.file_id)
            .await?;
        files.push(PackageFileDescriptor {
            file,
            blob,
            properties,
        });
    }

    Ok(PackageDescriptor {
        package,
        version,
        semver,
        metadata,
        properties,
        files,
    })
}
