//! Composer package extractor.
//!
//! A Composer upload is a zip archive with `composer.json` at the root or
//! inside a single top-level directory. The whole zip is the stored
//! artifact.

use crate::error::{ExtractError, ExtractResult};
use crate::extractor::{ExtractedFile, ExtractedPackage, FilePayload, FormatExtractor};
use depot_core::metadata::ComposerMetadata;
use depot_core::{Metadata, PackageName, PackageType, PackageVersion};
use depot_storage::HashedBuffer;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Read;

// Official composer name grammar: vendor/project, lowercase.
static COMPOSER_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([_.-]?[a-z0-9]+)*/[a-z0-9](([_.]?|-{0,2})[a-z0-9]+)*$").unwrap()
});

#[derive(Deserialize)]
struct ComposerJson {
    name: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "type", default)]
    package_type: Option<String>,
    #[serde(default)]
    homepage: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    license: Option<LicenseField>,
    #[serde(default)]
    authors: Vec<Author>,
    #[serde(default)]
    require: BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LicenseField {
    One(String),
    Many(Vec<String>),
}

impl LicenseField {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(license) => vec![license],
            Self::Many(licenses) => licenses,
        }
    }
}

#[derive(Deserialize)]
struct Author {
    #[serde(default)]
    name: Option<String>,
}

/// Extractor for Composer packages.
pub struct ComposerExtractor;

impl FormatExtractor for ComposerExtractor {
    fn package_type(&self) -> PackageType {
        PackageType::Composer
    }

    fn extract(&self, upload: &mut HashedBuffer) -> ExtractResult<ExtractedPackage> {
        let mut archive = zip::ZipArchive::new(upload)
            .map_err(|e| ExtractError::MalformedArchive(format!("not a zip archive: {e}")))?;

        let manifest_index = (0..archive.len())
            .find(|&i| {
                archive.name_for_index(i).is_some_and(|name| {
                    name == "composer.json"
                        || (name.ends_with("/composer.json") && name.matches('/').count() == 1)
                })
            })
            .ok_or(ExtractError::MissingRequiredMember("composer.json"))?;

        let mut manifest = String::new();
        archive
            .by_index(manifest_index)
            .map_err(|e| ExtractError::MalformedArchive(format!("bad zip entry: {e}")))?
            .read_to_string(&mut manifest)
            .map_err(|e| ExtractError::MalformedArchive(format!("unreadable composer.json: {e}")))?;

        let json: ComposerJson = serde_json::from_str(&manifest)
            .map_err(|e| ExtractError::invalid_field("composer.json", format!("invalid JSON: {e}")))?;

        if !COMPOSER_NAME_PATTERN.is_match(&json.name) {
            return Err(depot_core::Error::InvalidName(format!(
                "does not match vendor/project naming rules: {}",
                json.name
            ))
            .into());
        }
        let version_str = json
            .version
            .clone()
            .ok_or_else(|| ExtractError::invalid_field("version", "missing from composer.json"))?;

        let name = PackageName::new(json.name.clone())?;
        let version = PackageVersion::new(version_str)?;

        let metadata = Metadata::Composer(ComposerMetadata {
            description: json.description,
            package_type: json.package_type,
            homepage: json.homepage,
            keywords: json.keywords,
            licenses: json.license.map(LicenseField::into_vec).unwrap_or_default(),
            authors: json.authors.into_iter().filter_map(|a| a.name).collect(),
            require: json.require,
        });

        let file_name = format!("{}-{}.zip", name.short(), version);
        Ok(ExtractedPackage {
            name,
            version,
            metadata,
            version_properties: vec![],
            file: ExtractedFile {
                name: file_name,
                content_type: Some("application/zip".to_string()),
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
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_zip(entries: &[(&str, &str)]) -> HashedBuffer {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer
                .start_file(name.to_string(), SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        let cursor = writer.finish().unwrap();
        HashedBuffer::from_reader(cursor.into_inner().as_slice(), 1024 * 1024).unwrap()
    }

    const COMPOSER_JSON: &str = r#"{
        "name": "vendor/project",
        "version": "1.2.0",
        "description": "A library",
        "type": "library",
        "keywords": ["test"],
        "license": "MIT",
        "homepage": "https://example.com",
        "authors": [{ "name": "Alice" }],
        "require": { "php": ">=8.1" }
    }"#;

    #[test]
    fn test_extract_manifest_at_root() {
        let mut upload = build_zip(&[("composer.json", COMPOSER_JSON), ("src/A.php", "<?php")]);
        let extracted = ComposerExtractor.extract(&mut upload).unwrap();
        assert_eq!(extracted.name.as_str(), "vendor/project");
        assert_eq!(extracted.version.as_str(), "1.2.0");
        assert_eq!(extracted.file.name, "project-1.2.0.zip");

        let Metadata::Composer(metadata) = &extracted.metadata else {
            panic!("expected composer metadata");
        };
        assert_eq!(metadata.licenses, vec!["MIT"]);
        assert_eq!(metadata.authors, vec!["Alice"]);
        assert_eq!(metadata.require.get("php").map(String::as_str), Some(">=8.1"));
    }

    #[test]
    fn test_extract_manifest_in_top_level_directory() {
        let mut upload = build_zip(&[("project-1.2.0/composer.json", COMPOSER_JSON)]);
        let extracted = ComposerExtractor.extract(&mut upload).unwrap();
        assert_eq!(extracted.name.as_str(), "vendor/project");
    }

    #[test]
    fn test_missing_manifest() {
        let mut upload = build_zip(&[("src/A.php", "<?php"), ("a/b/composer.json", "{}")]);
        let err = ComposerExtractor.extract(&mut upload).unwrap_err();
        assert!(err.to_string().contains("composer.json file not found"));
    }

    #[test]
    fn test_rejects_bad_names() {
        for name in ["NoVendor", "Vendor/Project", "vendor/../escape", "vendor/"] {
            let json = format!(r#"{{ "name": "{name}", "version": "1.0.0" }}"#);
            let mut upload = build_zip(&[("composer.json", &json)]);
            assert!(
                ComposerExtractor.extract(&mut upload).is_err(),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_missing_version() {
        let json = r#"{ "name": "vendor/project" }"#;
        let mut upload = build_zip(&[("composer.json", json)]);
        let result = ComposerExtractor.extract(&mut upload);
        assert!(matches!(result, Err(ExtractError::InvalidField { .. })));
    }

    #[test]
    fn test_not_a_zip() {
        let mut upload = HashedBuffer::from_reader(&b"not zip"[..], 1024).unwrap();
        let result = ComposerExtractor.extract(&mut upload);
        assert!(matches!(result, Err(ExtractError::MalformedArchive(_))));
    }
}
