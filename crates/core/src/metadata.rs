//! Ecosystem metadata as a closed tagged union.
//!
//! Each package version persists its ecosystem metadata as an opaque JSON
//! blob; only the owning ecosystem's shape is used to interpret it. The
//! variant is selected by the package's declared type at read time, never
//! by inspecting the payload.

use crate::package::PackageType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// npm package metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NpmMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shasum: Option<String>,
}

/// RubyGems package metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RubyGemsMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub licenses: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

/// Arch package metadata (from `.PKGINFO`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packager: Option<String>,
    pub arch: String,
    #[serde(default)]
    pub installed_size: i64,
    #[serde(default)]
    pub build_date: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub licenses: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provides: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub opt_depends: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub make_depends: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub check_depends: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backup: Vec<String>,
}

/// Composer package metadata (from `composer.json`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposerMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub licenses: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub require: BTreeMap<String, String>,
}

/// Conan recipe metadata (from `conanfile.py` attributes).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConanMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,
}

/// Maven artifact metadata (from `pom.xml`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MavenMetadata {
    pub group_id: String,
    pub artifact_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub licenses: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

/// NuGet package metadata (from the `.nuspec`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NuGetMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

/// PyPI package metadata (from `PKG-INFO`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PyPiMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires_dist: Vec<String>,
}

/// Ecosystem metadata for a package version.
///
/// Persisted as the untagged JSON of the inner struct; the variant is
/// recovered from the owning package's declared type.
#[derive(Clone, Debug, PartialEq)]
pub enum Metadata {
    Npm(NpmMetadata),
    RubyGems(RubyGemsMetadata),
    Arch(ArchMetadata),
    Composer(ComposerMetadata),
    Conan(ConanMetadata),
    Maven(MavenMetadata),
    NuGet(NuGetMetadata),
    PyPi(PyPiMetadata),
    /// Fallback for package types without a first-class metadata shape.
    Generic(BTreeMap<String, String>),
}

impl Metadata {
    /// The package type this metadata belongs to.
    pub fn package_type(&self) -> PackageType {
        match self {
            Self::Npm(_) => PackageType::Npm,
            Self::RubyGems(_) => PackageType::RubyGems,
            Self::Arch(_) => PackageType::Arch,
            Self::Composer(_) => PackageType::Composer,
            Self::Conan(_) => PackageType::Conan,
            Self::Maven(_) => PackageType::Maven,
            Self::NuGet(_) => PackageType::NuGet,
            Self::PyPi(_) => PackageType::PyPi,
            Self::Generic(_) => PackageType::Generic,
        }
    }

    /// Serialize to the persisted JSON form.
    pub fn to_json(&self) -> crate::Result<String> {
        let result = match self {
            Self::Npm(m) => serde_json::to_string(m),
            Self::RubyGems(m) => serde_json::to_string(m),
            Self::Arch(m) => serde_json::to_string(m),
            Self::Composer(m) => serde_json::to_string(m),
            Self::Conan(m) => serde_json::to_string(m),
            Self::Maven(m) => serde_json::to_string(m),
            Self::NuGet(m) => serde_json::to_string(m),
            Self::PyPi(m) => serde_json::to_string(m),
            Self::Generic(m) => serde_json::to_string(m),
        };
        result.map_err(|e| crate::Error::Serialization(e.to_string()))
    }

    /// Deserialize from the persisted JSON form, selecting the variant by
    /// the owning package's declared type.
    pub fn from_json(package_type: PackageType, json: &str) -> crate::Result<Self> {
        let err = |e: serde_json::Error| crate::Error::Serialization(e.to_string());
        Ok(match package_type {
            PackageType::Npm => Self::Npm(serde_json::from_str(json).map_err(err)?),
            PackageType::RubyGems => Self::RubyGems(serde_json::from_str(json).map_err(err)?),
            PackageType::Arch => Self::Arch(serde_json::from_str(json).map_err(err)?),
            PackageType::Composer => Self::Composer(serde_json::from_str(json).map_err(err)?),
            PackageType::Conan => Self::Conan(serde_json::from_str(json).map_err(err)?),
            PackageType::Maven => Self::Maven(serde_json::from_str(json).map_err(err)?),
            PackageType::NuGet => Self::NuGet(serde_json::from_str(json).map_err(err)?),
            PackageType::PyPi => Self::PyPi(serde_json::from_str(json).map_err(err)?),
            PackageType::Generic => Self::Generic(serde_json::from_str(json).map_err(err)?),
        })
    }
}
