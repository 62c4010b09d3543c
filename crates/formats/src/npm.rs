//! npm publish payload extractor.
//!
//! An npm upload is the registry publish document: package metadata with
//! exactly one version entry and the tarball embedded base64-encoded under
//! `_attachments`. The decoded tarball, not the envelope, is the stored
//! artifact.

use crate::error::{ExtractError, ExtractResult};
use crate::extractor::{ExtractedFile, ExtractedPackage, FilePayload, FormatExtractor};
use base64::Engine;
use depot_core::metadata::NpmMetadata;
use depot_core::{Metadata, PackageName, PackageType, PackageVersion, DEFAULT_SPOOL_MEMORY_LIMIT};
use depot_storage::HashedBuffer;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;

/// npm name grammar: optional @scope/, lowercase, no leading dot or dash.
static NPM_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:@[a-z0-9][a-z0-9._-]*/)?[a-z0-9][a-z0-9._-]*$").unwrap());

const MAX_NAME_LENGTH: usize = 214;

#[derive(Deserialize)]
struct PublishDocument {
    name: String,
    versions: BTreeMap<String, PublishVersion>,
    #[serde(rename = "_attachments", default)]
    attachments: BTreeMap<String, Attachment>,
}

#[derive(Deserialize)]
struct PublishVersion {
    name: String,
    version: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    author: Option<AuthorField>,
    #[serde(default)]
    license: Option<String>,
    #[serde(default)]
    homepage: Option<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default)]
    dist: Option<Dist>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AuthorField {
    Name(String),
    Object {
        name: String,
    },
}

impl AuthorField {
    fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Object { name } => name,
        }
    }
}

#[derive(Deserialize)]
struct Dist {
    #[serde(default)]
    integrity: Option<String>,
    #[serde(default)]
    shasum: Option<String>,
}

#[derive(Deserialize)]
struct Attachment {
    data: String,
}

fn validate_name(name: &str) -> ExtractResult<()> {
    if name.len() > MAX_NAME_LENGTH {
        return Err(depot_core::Error::InvalidName(format!(
            "name exceeds {MAX_NAME_LENGTH} characters"
        ))
        .into());
    }
    if !NPM_NAME_PATTERN.is_match(name) {
        return Err(depot_core::Error::InvalidName(format!(
            "does not match npm naming rules: {name}"
        ))
        .into());
    }
    Ok(())
}

/// Extractor for npm publish payloads.
pub struct NpmExtractor;

impl FormatExtractor for NpmExtractor {
    fn package_type(&self) -> PackageType {
        PackageType::Npm
    }

    fn extract(&self, upload: &mut HashedBuffer) -> ExtractResult<ExtractedPackage> {
        let doc: PublishDocument = serde_json::from_reader(upload)
            .map_err(|e| ExtractError::MalformedArchive(format!("invalid publish JSON: {e}")))?;

        if doc.versions.len() != 1 {
            return Err(ExtractError::invalid_field(
                "versions",
                format!("expected exactly one version, got {}", doc.versions.len()),
            ));
        }
        let (version_key, entry) = doc.versions.into_iter().next().unwrap();

        if entry.name != doc.name {
            return Err(ExtractError::invalid_field(
                "name",
                "version entry name differs from package name",
            ));
        }
        if entry.version != version_key {
            return Err(ExtractError::invalid_field(
                "version",
                "version entry differs from its key",
            ));
        }

        validate_name(&doc.name)?;
        let name = PackageName::new(doc.name)?;
        let version = PackageVersion::new(entry.version)?;

        if doc.attachments.len() != 1 {
            return Err(ExtractError::invalid_field(
                "_attachments",
                format!("expected exactly one attachment, got {}", doc.attachments.len()),
            ));
        }
        let attachment = doc.attachments.into_values().next().unwrap();
        let tarball = base64::engine::general_purpose::STANDARD
            .decode(attachment.data.as_bytes())
            .map_err(|e| ExtractError::invalid_field("_attachments", format!("invalid base64: {e}")))?;
        if tarball.is_empty() {
            return Err(ExtractError::invalid_field("_attachments", "attachment is empty"));
        }
        let payload = HashedBuffer::from_reader(tarball.as_slice(), DEFAULT_SPOOL_MEMORY_LIMIT)?;

        let (integrity, shasum) = match entry.dist {
            Some(dist) => (dist.integrity, dist.shasum),
            None => (None, None),
        };

        let metadata = Metadata::Npm(NpmMetadata {
            description: entry.description,
            author: entry.author.map(|a| a.name().to_string()),
            license: entry.license,
            project_url: entry.homepage,
            dependencies: entry.dependencies,
            integrity,
            shasum,
        });

        let file_name = format!("{}-{}.tgz", name.short(), version);
        Ok(ExtractedPackage {
            name,
            version,
            metadata,
            version_properties: vec![],
            file: ExtractedFile {
                name: file_name,
                content_type: Some("application/gzip".to_string()),
                composite_key: String::new(),
                payload: FilePayload::Detached(payload),
                properties: vec![],
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_core::DigestSet;

    fn publish_json(name: &str, version: &str, data: &str) -> String {
        format!(
            r#"{{
                "_id": "{name}",
                "name": "{name}",
                "versions": {{
                    "{version}": {{
                        "name": "{name}",
                        "version": "{version}",
                        "description": "Test Description",
                        "author": {{ "name": "KN4CK3R" }},
                        "dist": {{
                            "integrity": "sha512-test==",
                            "shasum": "aaa7eaf852a948b0aa05afeda35b1badca155d90"
                        }}
                    }}
                }},
                "_attachments": {{
                    "{name}-{version}.tgz": {{ "data": "{data}" }}
                }}
            }}"#
        )
    }

    fn buffer_of(content: &str) -> HashedBuffer {
        HashedBuffer::from_reader(content.as_bytes(), 1024 * 1024).unwrap()
    }

    #[test]
    fn test_extract_scoped_package() {
        let tarball = b"fake tarball bytes";
        let data = base64::engine::general_purpose::STANDARD.encode(tarball);
        let json = publish_json("@scope/test-package", "1.0.1-pre", &data);

        let extracted = NpmExtractor.extract(&mut buffer_of(&json)).unwrap();
        assert_eq!(extracted.name.as_str(), "@scope/test-package");
        assert_eq!(extracted.version.as_str(), "1.0.1-pre");
        assert_eq!(extracted.file.name, "test-package-1.0.1-pre.tgz");

        let Metadata::Npm(metadata) = &extracted.metadata else {
            panic!("expected npm metadata");
        };
        assert_eq!(metadata.description.as_deref(), Some("Test Description"));
        assert_eq!(metadata.author.as_deref(), Some("KN4CK3R"));
        assert_eq!(
            metadata.shasum.as_deref(),
            Some("aaa7eaf852a948b0aa05afeda35b1badca155d90")
        );

        let FilePayload::Detached(buf) = extracted.file.payload else {
            panic!("expected detached payload");
        };
        assert_eq!(buf.size(), tarball.len() as u64);
        assert_eq!(buf.digests(), DigestSet::compute(tarball));
    }

    #[test]
    fn test_rejects_uppercase_and_traversal_names() {
        let data = base64::engine::general_purpose::STANDARD.encode(b"x");
        for name in ["UpperCase", "../escape", ".hidden", "@scope/"] {
            let json = publish_json(name, "1.0.0", &data);
            let result = NpmExtractor.extract(&mut buffer_of(&json));
            assert!(result.is_err(), "{name} should be rejected");
        }
    }

    #[test]
    fn test_rejects_version_with_whitespace() {
        let data = base64::engine::general_purpose::STANDARD.encode(b"x");
        let json = publish_json("pkg", "1.0 .0", &data);
        assert!(matches!(
            NpmExtractor.extract(&mut buffer_of(&json)),
            Err(ExtractError::Identity(_))
        ));
    }

    #[test]
    fn test_rejects_missing_attachment() {
        let json = r#"{
            "name": "pkg",
            "versions": { "1.0.0": { "name": "pkg", "version": "1.0.0" } },
            "_attachments": {}
        }"#;
        let result = NpmExtractor.extract(&mut buffer_of(json));
        assert!(matches!(result, Err(ExtractError::InvalidField { .. })));
    }

    #[test]
    fn test_rejects_mismatched_version_entry() {
        let data = base64::engine::general_purpose::STANDARD.encode(b"x");
        let json = format!(
            r#"{{
                "name": "pkg",
                "versions": {{ "1.0.0": {{ "name": "pkg", "version": "2.0.0" }} }},
                "_attachments": {{ "pkg-1.0.0.tgz": {{ "data": "{data}" }} }}
            }}"#
        );
        assert!(NpmExtractor.extract(&mut buffer_of(&json)).is_err());
    }

    #[test]
    fn test_rejects_invalid_json() {
        let result = NpmExtractor.extract(&mut buffer_of("not json"));
        assert!(matches!(result, Err(ExtractError::MalformedArchive(_))));
    }
}
