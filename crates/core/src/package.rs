//! Package types and validated identity newtypes.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported package ecosystems.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    Npm,
    RubyGems,
    Arch,
    Composer,
    Conan,
    Maven,
    NuGet,
    PyPi,
    Generic,
}

impl PackageType {
    /// All concrete ecosystem types (excludes Generic).
    pub const ALL: [PackageType; 8] = [
        PackageType::Npm,
        PackageType::RubyGems,
        PackageType::Arch,
        PackageType::Composer,
        PackageType::Conan,
        PackageType::Maven,
        PackageType::NuGet,
        PackageType::PyPi,
    ];

    /// Stable string identifier used in storage and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::RubyGems => "rubygems",
            Self::Arch => "arch",
            Self::Composer => "composer",
            Self::Conan => "conan",
            Self::Maven => "maven",
            Self::NuGet => "nuget",
            Self::PyPi => "pypi",
            Self::Generic => "generic",
        }
    }

    /// Whether versions of this ecosystem are ordered and validated as
    /// semantic versions.
    pub fn semver_compatible(&self) -> bool {
        matches!(
            self,
            Self::Npm | Self::Composer | Self::NuGet | Self::Conan
        )
    }
}

impl FromStr for PackageType {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "npm" => Ok(Self::Npm),
            "rubygems" => Ok(Self::RubyGems),
            "arch" => Ok(Self::Arch),
            "composer" => Ok(Self::Composer),
            "conan" => Ok(Self::Conan),
            "maven" => Ok(Self::Maven),
            "nuget" => Ok(Self::NuGet),
            "pypi" => Ok(Self::PyPi),
            "generic" => Ok(Self::Generic),
            other => Err(crate::Error::InvalidType(other.to_string())),
        }
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// Default identity grammar. Individual extractors apply stricter
// per-ecosystem rules before this check; the core pattern is the last
// line of defense against path traversal and header injection in
// generated file paths and response headers.
static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9@][a-zA-Z0-9.+_@/-]*$").unwrap());
static VERSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9.+:~_-]*$").unwrap());

const MAX_NAME_LENGTH: usize = 255;
const MAX_VERSION_LENGTH: usize = 255;

fn has_traversal_segment(s: &str) -> bool {
    s.split(['/', '\\']).any(|seg| seg == ".." || seg == ".")
}

/// A validated package name.
///
/// Accepts one optional `/` separator for scoped/namespaced ecosystems
/// (npm `@scope/name`, Composer `vendor/project`); every segment must be
/// non-empty and free of traversal sequences.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageName(String);

impl PackageName {
    pub fn new(name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        if name.is_empty() || name.len() > MAX_NAME_LENGTH {
            return Err(crate::Error::InvalidName(format!(
                "name length must be 1..={MAX_NAME_LENGTH}"
            )));
        }
        if !NAME_PATTERN.is_match(&name) {
            return Err(crate::Error::InvalidName(format!(
                "name contains invalid characters: {name}"
            )));
        }
        if has_traversal_segment(&name) {
            return Err(crate::Error::InvalidName(format!(
                "name contains path traversal: {name}"
            )));
        }
        if name.matches('/').count() > 1 || name.split('/').any(str::is_empty) {
            return Err(crate::Error::InvalidName(format!(
                "name has malformed namespace: {name}"
            )));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased form used for case-insensitive uniqueness.
    pub fn lowercase(&self) -> String {
        self.0.to_lowercase()
    }

    /// The name without its namespace prefix (`@scope/pkg` -> `pkg`).
    pub fn short(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Debug for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PackageName({})", self.0)
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated package version string.
///
/// The raw string is preserved; semantic-version interpretation happens at
/// descriptor assembly and only for semver-compatible package types.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageVersion(String);

impl PackageVersion {
    pub fn new(version: impl Into<String>) -> crate::Result<Self> {
        let version = version.into();
        if version.is_empty() || version.len() > MAX_VERSION_LENGTH {
            return Err(crate::Error::InvalidVersion(format!(
                "version length must be 1..={MAX_VERSION_LENGTH}"
            )));
        }
        if !VERSION_PATTERN.is_match(&version) {
            return Err(crate::Error::InvalidVersion(format!(
                "version contains invalid characters: {version}"
            )));
        }
        Ok(Self(version))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn lowercase(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Debug for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PackageVersion({})", self.0)
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
