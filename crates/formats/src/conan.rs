//! Conan recipe extractor.
//!
//! The upload is a `conanfile.py`. Recipe attributes are simple one-line
//! string assignments scanned textually; no Python evaluation happens
//! here, matching how registries read these files.

use crate::error::{ExtractError, ExtractResult};
use crate::extractor::{ExtractedFile, ExtractedPackage, FilePayload, FormatExtractor};
use depot_core::metadata::ConanMetadata;
use depot_core::{Metadata, PackageName, PackageType, PackageVersion};
use depot_storage::HashedBuffer;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Read;

/// Recipes are short Python files; refuse anything unreasonable.
const MAX_RECIPE_SIZE: u64 = 1024 * 1024;

static CONAN_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_][a-zA-Z0-9_+.-]*$").unwrap());
// `attr = "value"` with either quote style.
static ATTRIBUTE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*([a-z_]+)\s*=\s*["']([^"']*)["']\s*,?\s*$"#).unwrap()
});
static TOPICS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*topics\s*=\s*\(([^)]*)\)\s*,?\s*$").unwrap());

/// Extractor for Conan recipes.
pub struct ConanExtractor;

impl FormatExtractor for ConanExtractor {
    fn package_type(&self) -> PackageType {
        PackageType::Conan
    }

    fn extract(&self, upload: &mut HashedBuffer) -> ExtractResult<ExtractedPackage> {
        let mut recipe = String::new();
        upload
            .take(MAX_RECIPE_SIZE)
            .read_to_string(&mut recipe)
            .map_err(|e| ExtractError::MalformedArchive(format!("recipe is not UTF-8: {e}")))?;

        let mut name_attr = None;
        let mut version_attr = None;
        let mut metadata = ConanMetadata::default();

        for line in recipe.lines() {
            if let Some(captures) = TOPICS_PATTERN.captures(line) {
                metadata.topics = captures[1]
                    .split(',')
                    .map(|t| t.trim().trim_matches(['"', '\'']).to_string())
                    .filter(|t| !t.is_empty())
                    .collect();
                continue;
            }
            let Some(captures) = ATTRIBUTE_PATTERN.captures(line) else {
                continue;
            };
            let value = captures[2].to_string();
            match &captures[1] {
                "name" => name_attr.get_or_insert(value),
                "version" => version_attr.get_or_insert(value),
                "description" => metadata.description.get_or_insert(value),
                "license" => metadata.license.get_or_insert(value),
                "author" => metadata.author.get_or_insert(value),
                "url" | "homepage" => metadata.project_url.get_or_insert(value),
                _ => continue,
            };
        }

        let name_str = name_attr
            .ok_or_else(|| ExtractError::invalid_field("name", "attribute not found in recipe"))?;
        let version_str = version_attr.ok_or_else(|| {
            ExtractError::invalid_field("version", "attribute not found in recipe")
        })?;

        if !CONAN_NAME_PATTERN.is_match(&name_str) {
            return Err(
                depot_core::Error::InvalidName(format!("invalid recipe name: {name_str}")).into(),
            );
        }

        let name = PackageName::new(name_str)?;
        let version = PackageVersion::new(version_str)?;

        Ok(ExtractedPackage {
            name,
            version,
            metadata: Metadata::Conan(metadata),
            version_properties: vec![],
            file: ExtractedFile {
                name: "conanfile.py".to_string(),
                content_type: Some("text/plain".to_string()),
                composite_key: String::new(),
                payload: FilePayload::Upload,
                properties: vec![],
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECIPE: &str = r#"from conan import ConanFile

class ZlibConan(ConanFile):
    name = "zlib"
    version = "1.3.1"
    description = "A compression library"
    license = "Zlib"
    author = "Jean-loup Gailly"
    homepage = "https://zlib.net"
    topics = ("compression", "zlib")
    settings = "os", "arch"

    def build(self):
        pass
"#;

    fn buffer_of(content: &str) -> HashedBuffer {
        HashedBuffer::from_reader(content.as_bytes(), 1024 * 1024).unwrap()
    }

    #[test]
    fn test_extract_recipe_attributes() {
        let extracted = ConanExtractor.extract(&mut buffer_of(RECIPE)).unwrap();
        assert_eq!(extracted.name.as_str(), "zlib");
        assert_eq!(extracted.version.as_str(), "1.3.1");
        assert_eq!(extracted.file.name, "conanfile.py");

        let Metadata::Conan(metadata) = &extracted.metadata else {
            panic!("expected conan metadata");
        };
        assert_eq!(metadata.description.as_deref(), Some("A compression library"));
        assert_eq!(metadata.license.as_deref(), Some("Zlib"));
        assert_eq!(metadata.project_url.as_deref(), Some("https://zlib.net"));
        assert_eq!(metadata.topics, vec!["compression", "zlib"]);
    }

    #[test]
    fn test_first_assignment_wins() {
        let recipe = "name = \"first\"\nversion = \"1.0\"\nname = \"second\"\n";
        let extracted = ConanExtractor.extract(&mut buffer_of(recipe)).unwrap();
        assert_eq!(extracted.name.as_str(), "first");
    }

    #[test]
    fn test_missing_name_attribute() {
        let recipe = "version = \"1.0\"\n";
        let err = ConanExtractor.extract(&mut buffer_of(recipe)).unwrap_err();
        assert!(err.to_string().contains("'name'"));
    }

    #[test]
    fn test_missing_version_attribute() {
        let recipe = "name = \"pkg\"\n";
        let err = ConanExtractor.extract(&mut buffer_of(recipe)).unwrap_err();
        assert!(err.to_string().contains("'version'"));
    }

    #[test]
    fn test_rejects_invalid_recipe_name() {
        let recipe = "name = \"bad name\"\nversion = \"1.0\"\n";
        assert!(matches!(
            ConanExtractor.extract(&mut buffer_of(recipe)),
            Err(ExtractError::Identity(_))
        ));
    }
}
