//! RubyGems `.gem` extractor.
//!
//! A gem is an uncompressed tar archive carrying `metadata.gz` (the
//! gzipped gemspec document), `data.tar.gz` and `checksums.yaml.gz`. Only
//! the gemspec is interpreted; the whole gem is the stored artifact.

use crate::error::{ExtractError, ExtractResult};
use crate::extractor::{ExtractedFile, ExtractedPackage, FilePayload, FormatExtractor};
use depot_core::metadata::RubyGemsMetadata;
use depot_core::{Metadata, PackageName, PackageType, PackageVersion};
use depot_storage::HashedBuffer;
use flate2::read::GzDecoder;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Read;

/// Gemspec documents are small; anything bigger is hostile.
const MAX_GEMSPEC_SIZE: u64 = 10 * 1024 * 1024;

static GEM_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._-]+$").unwrap());

/// Extractor for RubyGems packages.
pub struct RubyGemsExtractor;

impl FormatExtractor for RubyGemsExtractor {
    fn package_type(&self) -> PackageType {
        PackageType::RubyGems
    }

    fn extract(&self, upload: &mut HashedBuffer) -> ExtractResult<ExtractedPackage> {
        let mut archive = tar::Archive::new(upload);
        let mut gemspec: Option<String> = None;
        let mut has_data = false;

        for entry in archive
            .entries()
            .map_err(|e| ExtractError::MalformedArchive(format!("not a tar archive: {e}")))?
        {
            let entry =
                entry.map_err(|e| ExtractError::MalformedArchive(format!("bad tar entry: {e}")))?;
            let path = entry
                .path()
                .map_err(|e| ExtractError::MalformedArchive(format!("bad entry path: {e}")))?
                .to_string_lossy()
                .into_owned();

            match path.as_str() {
                "metadata.gz" => {
                    let mut document = String::new();
                    GzDecoder::new(entry.take(MAX_GEMSPEC_SIZE))
                        .read_to_string(&mut document)
                        .map_err(|e| {
                            ExtractError::MalformedArchive(format!("corrupt metadata.gz: {e}"))
                        })?;
                    gemspec = Some(document);
                }
                "data.tar.gz" => has_data = true,
                _ => {}
            }
        }

        let gemspec = gemspec.ok_or(ExtractError::MissingRequiredMember("metadata.gz"))?;
        if !has_data {
            return Err(ExtractError::MissingRequiredMember("data.tar.gz"));
        }

        let spec = parse_gemspec(&gemspec)?;
        let name_str = spec
            .name
            .ok_or_else(|| ExtractError::invalid_field("name", "missing from gemspec"))?;
        if !GEM_NAME_PATTERN.is_match(&name_str) {
            return Err(
                depot_core::Error::InvalidName(format!("invalid gem name: {name_str}")).into(),
            );
        }
        let version_str = spec
            .version
            .ok_or_else(|| ExtractError::invalid_field("version", "missing from gemspec"))?;

        let name = PackageName::new(name_str)?;
        let version = PackageVersion::new(version_str)?;

        let metadata = Metadata::RubyGems(RubyGemsMetadata {
            summary: spec.summary,
            description: spec.description,
            homepage: spec.homepage,
            authors: spec.authors,
            licenses: spec.licenses,
            dependencies: spec.dependencies.clone(),
        });

        let file_name = format!("{name}-{version}.gem");
        Ok(ExtractedPackage {
            name,
            version,
            metadata,
            version_properties: spec
                .dependencies
                .into_iter()
                .map(|d| ("dependency".to_string(), d))
                .collect(),
            file: ExtractedFile {
                name: file_name,
                content_type: Some("application/x-tar".to_string()),
                composite_key: String::new(),
                payload: FilePayload::Upload,
                properties: vec![],
            },
        })
    }
}

#[derive(Default)]
struct GemSpec {
    name: Option<String>,
    version: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    homepage: Option<String>,
    authors: Vec<String>,
    licenses: Vec<String>,
    dependencies: Vec<String>,
}

/// Parse the subset of the gemspec YAML document the registry needs.
///
/// The document is machine-generated with a fixed layout: top-level
/// scalars, `- item` lists, and the version nested one level under a
/// `!ruby/object:Gem::Version` tag. A full YAML parser buys nothing here.
fn parse_gemspec(document: &str) -> ExtractResult<GemSpec> {
    let mut spec = GemSpec::default();
    let mut current_list: Option<&'static str> = None;
    let mut in_version = false;

    for line in document.lines() {
        if line.starts_with("--- ") || line.trim().is_empty() {
            continue;
        }

        if in_version {
            if let Some(rest) = line.strip_prefix("  version: ") {
                spec.version = Some(unquote(rest));
                in_version = false;
                continue;
            }
            if !line.starts_with("  ") {
                in_version = false;
            }
        }

        if let Some(item) = line.strip_prefix("- ") {
            match current_list {
                Some("authors") => spec.authors.push(unquote(item)),
                Some("licenses") => spec.licenses.push(unquote(item)),
                _ => {}
            }
            continue;
        }

        if !line.starts_with(' ') {
            current_list = None;
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key {
                "name" => spec.name = Some(unquote(value)),
                "version" => {
                    if value.starts_with("!ruby/object:Gem::Version") || value.is_empty() {
                        in_version = true;
                    } else {
                        spec.version = Some(unquote(value));
                    }
                }
                "summary" => spec.summary = non_empty(value),
                "description" => spec.description = non_empty(value),
                "homepage" => spec.homepage = non_empty(value),
                "authors" => current_list = Some("authors"),
                "licenses" => current_list = Some("licenses"),
                _ => {}
            }
        }
    }

    Ok(spec)
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))
        .unwrap_or(value)
        .to_string()
}

fn non_empty(value: &str) -> Option<String> {
    let value = unquote(value);
    (!value.is_empty()).then_some(value)
}
