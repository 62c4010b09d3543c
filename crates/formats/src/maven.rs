//! Maven POM extractor.
//!
//! The upload is the `pom.xml` itself; group and artifact id form the
//! package name as `groupId-artifactId`, falling back to the parent
//! coordinates where the POM inherits them.

use crate::error::{ExtractError, ExtractResult};
use crate::extractor::{ExtractedFile, ExtractedPackage, FilePayload, FormatExtractor};
use depot_core::metadata::MavenMetadata;
use depot_core::{Metadata, PackageName, PackageType, PackageVersion};
use depot_storage::HashedBuffer;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::io::Read;

// Coordinates must start and end alphanumeric; bare dots cannot pass.
static COORDINATE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9](?:[a-zA-Z0-9._-]*[a-zA-Z0-9])?$").unwrap());

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PomProject {
    #[serde(default)]
    group_id: Option<String>,
    artifact_id: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    parent: Option<PomParent>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    licenses: Option<PomLicenses>,
    #[serde(default)]
    dependencies: Option<PomDependencies>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PomParent {
    #[serde(default)]
    group_id: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Deserialize, Default)]
struct PomLicenses {
    #[serde(rename = "license", default)]
    licenses: Vec<PomLicense>,
}

#[derive(Deserialize)]
struct PomLicense {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize, Default)]
struct PomDependencies {
    #[serde(rename = "dependency", default)]
    dependencies: Vec<PomDependency>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PomDependency {
    #[serde(default)]
    group_id: Option<String>,
    artifact_id: String,
    #[serde(default)]
    version: Option<String>,
}

fn validate_coordinate(field: &str, value: &str) -> ExtractResult<()> {
    if !COORDINATE_PATTERN.is_match(value) {
        return Err(depot_core::Error::InvalidName(format!(
            "invalid {field} coordinate: {value}"
        ))
        .into());
    }
    Ok(())
}

/// Extractor for Maven POM manifests.
pub struct MavenExtractor;

impl FormatExtractor for MavenExtractor {
    fn package_type(&self) -> PackageType {
        PackageType::Maven
    }

    fn extract(&self, upload: &mut HashedBuffer) -> ExtractResult<ExtractedPackage> {
        let mut content = String::new();
        upload
            .read_to_string(&mut content)
            .map_err(|e| ExtractError::MalformedArchive(format!("pom is not UTF-8: {e}")))?;

        let pom: PomProject = quick_xml::de::from_str(&content)
            .map_err(|e| ExtractError::invalid_field("pom.xml", format!("invalid XML: {e}")))?;

        let group_id = pom
            .group_id
            .or_else(|| pom.parent.as_ref().and_then(|p| p.group_id.clone()))
            .ok_or_else(|| ExtractError::invalid_field("groupId", "missing from pom"))?;
        let version_str = pom
            .version
            .or_else(|| pom.parent.as_ref().and_then(|p| p.version.clone()))
            .ok_or_else(|| ExtractError::invalid_field("version", "missing from pom"))?;

        validate_coordinate("groupId", &group_id)?;
        validate_coordinate("artifactId", &pom.artifact_id)?;

        let name = PackageName::new(format!("{group_id}-{}", pom.artifact_id))?;
        let version = PackageVersion::new(version_str)?;

        let dependencies = pom
            .dependencies
            .unwrap_or_default()
            .dependencies
            .into_iter()
            .map(|d| {
                format!(
                    "{}:{}:{}",
                    d.group_id.unwrap_or_default(),
                    d.artifact_id,
                    d.version.unwrap_or_default()
                )
            })
            .collect();

        let metadata = Metadata::Maven(MavenMetadata {
            group_id,
            artifact_id: pom.artifact_id.clone(),
            name: pom.name,
            description: pom.description,
            project_url: pom.url,
            licenses: pom
                .licenses
                .unwrap_or_default()
                .licenses
                .into_iter()
                .filter_map(|l| l.name)
                .collect(),
            dependencies,
        });

        let file_name = format!("{}-{}.pom", pom.artifact_id, version);
        Ok(ExtractedPackage {
            name,
            version,
            metadata,
            version_properties: vec![],
            file: ExtractedFile {
                name: file_name,
                content_type: Some("text/xml".to_string()),
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

    const POM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<project xmlns="http://maven.apache.org/POM/4.0.0">
  <modelVersion>4.0.0</modelVersion>
  <groupId>com.example</groupId>
  <artifactId>demo</artifactId>
  <version>1.4.2</version>
  <name>Demo</name>
  <description>A demo artifact</description>
  <url>https://example.com</url>
  <licenses>
    <license><name>Apache-2.0</name></license>
  </licenses>
  <dependencies>
    <dependency>
      <groupId>org.junit</groupId>
      <artifactId>junit</artifactId>
      <version>5.10.0</version>
    </dependency>
  </dependencies>
</project>"#;

    fn buffer_of(content: &str) -> HashedBuffer {
        HashedBuffer::from_reader(content.as_bytes(), 1024 * 1024).unwrap()
    }

    #[test]
    fn test_extract_valid_pom() {
        let extracted = MavenExtractor.extract(&mut buffer_of(POM)).unwrap();
        assert_eq!(extracted.name.as_str(), "com.example-demo");
        assert_eq!(extracted.version.as_str(), "1.4.2");
        assert_eq!(extracted.file.name, "demo-1.4.2.pom");

        let Metadata::Maven(metadata) = &extracted.metadata else {
            panic!("expected maven metadata");
        };
        assert_eq!(metadata.group_id, "com.example");
        assert_eq!(metadata.artifact_id, "demo");
        assert_eq!(metadata.licenses, vec!["Apache-2.0"]);
        assert_eq!(metadata.dependencies, vec!["org.junit:junit:5.10.0"]);
    }

    #[test]
    fn test_coordinates_inherited_from_parent() {
        let pom = r#"<project>
  <parent>
    <groupId>com.example</groupId>
    <artifactId>parent</artifactId>
    <version>2.0.0</version>
  </parent>
  <artifactId>child</artifactId>
</project>"#;
        let extracted = MavenExtractor.extract(&mut buffer_of(pom)).unwrap();
        assert_eq!(extracted.name.as_str(), "com.example-child");
        assert_eq!(extracted.version.as_str(), "2.0.0");
    }

    #[test]
    fn test_rejects_missing_group() {
        let pom = "<project><artifactId>demo</artifactId><version>1.0</version></project>";
        let result = MavenExtractor.extract(&mut buffer_of(pom));
        assert!(matches!(result, Err(ExtractError::InvalidField { .. })));
    }

    #[test]
    fn test_rejects_traversal_coordinates() {
        let pom = "<project><groupId>..</groupId><artifactId>demo</artifactId><version>1.0</version></project>";
        let result = MavenExtractor.extract(&mut buffer_of(pom));
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_invalid_xml() {
        let result = MavenExtractor.extract(&mut buffer_of("<project><groupId>"));
        assert!(matches!(result, Err(ExtractError::InvalidField { .. })));
    }
}
