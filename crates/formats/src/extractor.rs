//! Extractor trait and the explicit extractor registry.

use crate::error::ExtractResult;
use depot_core::{Metadata, PackageName, PackageType, PackageVersion};
use depot_storage::HashedBuffer;
use std::collections::HashMap;
use std::sync::Arc;

/// Where the stored bytes of the lead file come from.
pub enum FilePayload {
    /// The upload itself is the stored artifact (gems, Arch packages, ...).
    Upload,
    /// An artifact carved out of the upload envelope (npm's base64
    /// attachment inside the publish document).
    Detached(HashedBuffer),
}

impl std::fmt::Debug for FilePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upload => write!(f, "FilePayload::Upload"),
            Self::Detached(buf) => write!(f, "FilePayload::Detached({} bytes)", buf.size()),
        }
    }
}

/// The lead file produced by extraction.
#[derive(Debug)]
pub struct ExtractedFile {
    pub name: String,
    pub content_type: Option<String>,
    pub composite_key: String,
    pub payload: FilePayload,
    /// File-level properties (e.g. architecture).
    pub properties: Vec<(String, String)>,
}

/// The result of parsing an uploaded artifact.
#[derive(Debug)]
pub struct ExtractedPackage {
    pub name: PackageName,
    pub version: PackageVersion,
    pub metadata: Metadata,
    /// Version-level properties (e.g. dependency strings).
    pub version_properties: Vec<(String, String)>,
    pub file: ExtractedFile,
}

/// A format extractor for one ecosystem.
///
/// Extraction is synchronous and seek-heavy; callers run it off the async
/// runtime with the spooled upload.
pub trait FormatExtractor: Send + Sync {
    /// The ecosystem this extractor handles.
    fn package_type(&self) -> PackageType;

    /// Parse the spooled upload. The buffer is positioned at the start;
    /// implementations may read and seek freely.
    fn extract(&self, upload: &mut HashedBuffer) -> ExtractResult<ExtractedPackage>;
}

/// Explicit mapping from package type to extractor.
///
/// Constructed once at startup and handed to the upload coordinator;
/// there is no ambient global registry.
#[derive(Default)]
pub struct ExtractorSet {
    extractors: HashMap<PackageType, Arc<dyn FormatExtractor>>,
}

impl ExtractorSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extractor under its declared package type, replacing
    /// any previous registration.
    pub fn register(mut self, extractor: Arc<dyn FormatExtractor>) -> Self {
        self.extractors.insert(extractor.package_type(), extractor);
        self
    }

    /// The full set of built-in ecosystem extractors.
    pub fn with_defaults() -> Self {
        Self::new()
            .register(Arc::new(crate::npm::NpmExtractor))
            .register(Arc::new(crate::rubygems::RubyGemsExtractor))
            .register(Arc::new(crate::arch::ArchExtractor))
            .register(Arc::new(crate::composer::ComposerExtractor))
            .register(Arc::new(crate::conan::ConanExtractor))
            .register(Arc::new(crate::maven::MavenExtractor))
            .register(Arc::new(crate::nuget::NuGetExtractor))
            .register(Arc::new(crate::pypi::PyPiExtractor))
    }

    /// Look up the extractor for a package type.
    pub fn get(&self, package_type: PackageType) -> Option<Arc<dyn FormatExtractor>> {
        self.extractors.get(&package_type).cloned()
    }

    /// Registered package types.
    pub fn types(&self) -> Vec<PackageType> {
        self.extractors.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_set_covers_all_ecosystems() {
        let set = ExtractorSet::with_defaults();
        for ty in PackageType::ALL {
            assert!(set.get(ty).is_some(), "missing extractor for {ty}");
        }
        assert!(set.get(PackageType::Generic).is_none());
    }
}
