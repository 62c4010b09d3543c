//! NuGet package extractor.
//!
//! A `.nupkg` is a zip archive with a single `*.nuspec` manifest at the
//! root. The whole package is the stored artifact.

use crate::error::{ExtractError, ExtractResult};
use crate::extractor::{ExtractedFile, ExtractedPackage, FilePayload, FormatExtractor};
use depot_core::metadata::NuGetMetadata;
use depot_core::{Metadata, PackageName, PackageType, PackageVersion};
use depot_storage::HashedBuffer;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::io::Read;

static NUGET_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\w+(?:[._-]\w+)*$").unwrap());

const MAX_ID_LENGTH: usize = 100;

#[derive(Deserialize)]
struct Nuspec {
    metadata: NuspecMetadata,
}

#[derive(Deserialize)]
struct NuspecMetadata {
    id: String,
    version: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    authors: Option<String>,
    #[serde(rename = "projectUrl", default)]
    project_url: Option<String>,
    #[serde(default)]
    license: Option<String>,
    #[serde(default)]
    dependencies: Option<NuspecDependencies>,
}

#[derive(Deserialize, Default)]
struct NuspecDependencies {
    #[serde(rename = "dependency", default)]
    dependencies: Vec<NuspecDependency>,
    #[serde(rename = "group", default)]
    groups: Vec<NuspecGroup>,
}

#[derive(Deserialize)]
struct NuspecGroup {
    #[serde(rename = "dependency", default)]
    dependencies: Vec<NuspecDependency>,
}

#[derive(Deserialize)]
struct NuspecDependency {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@version", default)]
    version: Option<String>,
}

impl NuspecDependency {
    fn specifier(&self) -> String {
        match &self.version {
            Some(version) => format!("{}:{}", self.id, version),
            None => self.id.clone(),
        }
    }
}

/// Extractor for NuGet packages.
pub struct NuGetExtractor;

impl FormatExtractor for NuGetExtractor {
    fn package_type(&self) -> PackageType {
        PackageType::NuGet
    }

    fn extract(&self, upload: &mut HashedBuffer) -> ExtractResult<ExtractedPackage> {
        let mut archive = zip::ZipArchive::new(upload)
            .map_err(|e| ExtractError::MalformedArchive(format!("not a zip archive: {e}")))?;

        let nuspec_index = (0..archive.len())
            .find(|&i| {
                archive
                    .name_for_index(i)
                    .is_some_and(|name| name.ends_with(".nuspec") && !name.contains('/'))
            })
            .ok_or(ExtractError::MissingRequiredMember(".nuspec"))?;

        let mut manifest = String::new();
        archive
            .by_index(nuspec_index)
            .map_err(|e| ExtractError::MalformedArchive(format!("bad zip entry: {e}")))?
            .read_to_string(&mut manifest)
            .map_err(|e| ExtractError::MalformedArchive(format!("unreadable nuspec: {e}")))?;

        let nuspec: Nuspec = quick_xml::de::from_str(&manifest)
            .map_err(|e| ExtractError::invalid_field("nuspec", format!("invalid XML: {e}")))?;
        let meta = nuspec.metadata;

        if meta.id.len() > MAX_ID_LENGTH || !NUGET_ID_PATTERN.is_match(&meta.id) {
            return Err(
                depot_core::Error::InvalidName(format!("invalid package id: {}", meta.id)).into(),
            );
        }

        let name = PackageName::new(meta.id)?;
        let version = PackageVersion::new(meta.version)?;

        let mut dependencies = Vec::new();
        if let Some(deps) = meta.dependencies {
            dependencies.extend(deps.dependencies.iter().map(NuspecDependency::specifier));
            for group in &deps.groups {
                dependencies.extend(group.dependencies.iter().map(NuspecDependency::specifier));
            }
        }

        let metadata = Metadata::NuGet(NuGetMetadata {
            description: meta.description,
            authors: meta.authors,
            project_url: meta.project_url,
            license: meta.license,
            dependencies: dependencies.clone(),
        });

        let file_name = format!("{}.{}.nupkg", name.lowercase(), version.lowercase());
        Ok(ExtractedPackage {
            name,
            version,
            metadata,
            version_properties: dependencies
                .into_iter()
                .map(|d| ("dependency".to_string(), d))
                .collect(),
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

    const NUSPEC: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd">
  <metadata>
    <id>Test.Package</id>
    <version>1.0.3</version>
    <authors>KN4CK3R</authors>
    <description>Package Description</description>
    <projectUrl>https://example.com</projectUrl>
    <dependencies>
      <group targetFramework="net6.0">
        <dependency id="Newtonsoft.Json" version="13.0.1" />
      </group>
    </dependencies>
  </metadata>
</package>"#;

    fn build_nupkg(entries: &[(&str, &str)]) -> HashedBuffer {
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

    #[test]
    fn test_extract_valid_nupkg() {
        let mut upload = build_nupkg(&[
            ("Test.Package.nuspec", NUSPEC),
            ("lib/net6.0/Test.dll", "binary"),
        ]);
        let extracted = NuGetExtractor.extract(&mut upload).unwrap();
        assert_eq!(extracted.name.as_str(), "Test.Package");
        assert_eq!(extracted.version.as_str(), "1.0.3");
        assert_eq!(extracted.file.name, "test.package.1.0.3.nupkg");

        let Metadata::NuGet(metadata) = &extracted.metadata else {
            panic!("expected nuget metadata");
        };
        assert_eq!(metadata.authors.as_deref(), Some("KN4CK3R"));
        assert_eq!(metadata.dependencies, vec!["Newtonsoft.Json:13.0.1"]);
        assert_eq!(
            extracted.version_properties,
            vec![("dependency".to_string(), "Newtonsoft.Json:13.0.1".to_string())]
        );
    }

    #[test]
    fn test_missing_nuspec() {
        let mut upload = build_nupkg(&[("lib/net6.0/Test.dll", "binary")]);
        let err = NuGetExtractor.extract(&mut upload).unwrap_err();
        assert!(err.to_string().contains(".nuspec file not found"));
    }

    #[test]
    fn test_nested_nuspec_does_not_count() {
        let mut upload = build_nupkg(&[("sub/Test.nuspec", NUSPEC)]);
        assert!(matches!(
            NuGetExtractor.extract(&mut upload),
            Err(ExtractError::MissingRequiredMember(_))
        ));
    }

    #[test]
    fn test_rejects_invalid_id() {
        let nuspec = NUSPEC.replace("Test.Package", "in valid id");
        let mut upload = build_nupkg(&[("bad.nuspec", &nuspec)]);
        let result = NuGetExtractor.extract(&mut upload);
        assert!(matches!(result, Err(ExtractError::Identity(_))));
    }

    #[test]
    fn test_rejects_invalid_xml() {
        let mut upload = build_nupkg(&[("Test.nuspec", "<package><metadata>")]);
        let result = NuGetExtractor.extract(&mut upload);
        assert!(matches!(result, Err(ExtractError::InvalidField { .. })));
    }
}
