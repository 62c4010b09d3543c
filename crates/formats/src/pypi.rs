//! PyPI source distribution extractor.
//!
//! An sdist is a gzipped tar archive with `PKG-INFO` (RFC 822 key-value
//! metadata) inside the top-level directory. The whole sdist is the
//! stored artifact. Names are normalized per PEP 503.

use crate::error::{ExtractError, ExtractResult};
use crate::extractor::{ExtractedFile, ExtractedPackage, FilePayload, FormatExtractor};
use depot_core::metadata::PyPiMetadata;
use depot_core::{Metadata, PackageName, PackageType, PackageVersion};
use depot_storage::HashedBuffer;
use flate2::read::GzDecoder;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Read;

static PYPI_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9](?:[a-zA-Z0-9._-]*[a-zA-Z0-9])?$").unwrap());

/// PEP 503: lowercase, runs of `-`, `_` and `.` collapse to `-`.
pub fn normalize_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            in_separator = true;
        } else {
            if in_separator {
                normalized.push('-');
                in_separator = false;
            }
            normalized.push(c.to_ascii_lowercase());
        }
    }
    normalized
}

/// Extractor for PyPI source distributions.
pub struct PyPiExtractor;

impl FormatExtractor for PyPiExtractor {
    fn package_type(&self) -> PackageType {
        PackageType::PyPi
    }

    fn extract(&self, upload: &mut HashedBuffer) -> ExtractResult<ExtractedPackage> {
        let mut archive = tar::Archive::new(GzDecoder::new(upload));
        let mut pkg_info: Option<String> = None;

        for entry in archive
            .entries()
            .map_err(|e| ExtractError::MalformedArchive(format!("not a tar.gz archive: {e}")))?
        {
            let mut entry =
                entry.map_err(|e| ExtractError::MalformedArchive(format!("bad tar entry: {e}")))?;
            let path = entry
                .path()
                .map_err(|e| ExtractError::MalformedArchive(format!("bad entry path: {e}")))?
                .to_string_lossy()
                .into_owned();

            // PKG-INFO sits directly inside the top-level sdist directory.
            let is_pkg_info = path == "PKG-INFO"
                || (path.ends_with("/PKG-INFO") && path.matches('/').count() == 1);
            if is_pkg_info {
                let mut content = String::new();
                entry.read_to_string(&mut content).map_err(|e| {
                    ExtractError::MalformedArchive(format!("unreadable PKG-INFO: {e}"))
                })?;
                pkg_info = Some(content);
                break;
            }
        }

        let pkg_info = pkg_info.ok_or(ExtractError::MissingRequiredMember("PKG-INFO"))?;
        let fields = parse_rfc822(&pkg_info);

        let raw_name = fields
            .value("Name")
            .ok_or_else(|| ExtractError::invalid_field("Name", "missing from PKG-INFO"))?;
        if !PYPI_NAME_PATTERN.is_match(raw_name) {
            return Err(
                depot_core::Error::InvalidName(format!("invalid project name: {raw_name}")).into(),
            );
        }
        let version_str = fields
            .value("Version")
            .ok_or_else(|| ExtractError::invalid_field("Version", "missing from PKG-INFO"))?;

        let name = PackageName::new(normalize_name(raw_name))?;
        let version = PackageVersion::new(version_str)?;

        let metadata = Metadata::PyPi(PyPiMetadata {
            summary: fields.value("Summary").map(str::to_string),
            author: fields.value("Author").map(str::to_string),
            license: fields.value("License").map(str::to_string),
            project_url: fields
                .value("Home-page")
                .or_else(|| fields.value("Project-URL"))
                .map(str::to_string),
            requires_dist: fields.values("Requires-Dist"),
        });

        let file_name = format!("{name}-{version}.tar.gz");
        Ok(ExtractedPackage {
            name,
            version,
            metadata,
            version_properties: vec![],
            file: ExtractedFile {
                name: file_name,
                content_type: Some("application/gzip".to_string()),
                composite_key: String::new(),
                payload: FilePayload::Upload,
                properties: vec![],
            },
        })
    }
}

struct Rfc822Fields(Vec<(String, String)>);

impl Rfc822Fields {
    fn value(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    fn values(&self, key: &str) -> Vec<String> {
        self.0
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.clone())
            .collect()
    }
}

/// Parse the RFC 822 header block of a PKG-INFO document. Continuation
/// lines fold into the preceding field; the body after the first blank
/// line (the long description) is ignored.
fn parse_rfc822(content: &str) -> Rfc822Fields {
    let mut fields: Vec<(String, String)> = Vec::new();
    for line in content.lines() {
        if line.is_empty() {
            break;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some((_, value)) = fields.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            fields.push((key.trim().to_string(), value.trim().to_string()));
        }
    }
    Rfc822Fields(fields)
}
