//! Arch Linux package extractor.
//!
//! An Arch package is a tar archive (plain, gzip or zstd compressed)
//! carrying `.PKGINFO` (a `key = value` manifest) and `.MTREE`. The whole
//! package is the stored artifact.

use crate::error::{ExtractError, ExtractResult};
use crate::extractor::{ExtractedFile, ExtractedPackage, FilePayload, FormatExtractor};
use depot_core::metadata::ArchMetadata;
use depot_core::{Metadata, PackageName, PackageType, PackageVersion};
use depot_storage::HashedBuffer;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{Read, Seek, SeekFrom};
use url::Url;

static NAME_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9@._+-]+$").unwrap());
// epoch:pkgver-pkgrel with a numeric pkgrel (optionally dotted).
static VERSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d+:)?[a-zA-Z0-9._+~]+-[0-9]+(?:\.[0-9]+)?$").unwrap());
// name with an optional comparison: zlib, gpg=1, curl>=3, git<=7, gzip>1.0, lz<1.0
static DEPENDS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9@._+-]+(?:(?:=|>=|<=|>|<)[a-zA-Z0-9@._+:~-]+)?$").unwrap()
});

/// Compression of the package envelope, detected by magic bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CompressKind {
    None,
    Gzip,
    Zstd,
}

impl CompressKind {
    fn detect(magic: &[u8]) -> Self {
        if magic.starts_with(&[0x1f, 0x8b]) {
            Self::Gzip
        } else if magic.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
            Self::Zstd
        } else {
            Self::None
        }
    }

    fn file_suffix(&self) -> &'static str {
        match self {
            Self::None => "pkg.tar",
            Self::Gzip => "pkg.tar.gz",
            Self::Zstd => "pkg.tar.zst",
        }
    }
}

/// Extractor for Arch packages.
pub struct ArchExtractor;

impl FormatExtractor for ArchExtractor {
    fn package_type(&self) -> PackageType {
        PackageType::Arch
    }

    fn extract(&self, upload: &mut HashedBuffer) -> ExtractResult<ExtractedPackage> {
        let mut magic = [0u8; 4];
        let read = upload.read(&mut magic)?;
        upload.seek(SeekFrom::Start(0))?;
        let kind = CompressKind::detect(&magic[..read]);

        let reader: Box<dyn Read + '_> = match kind {
            CompressKind::None => Box::new(upload),
            CompressKind::Gzip => Box::new(flate2::read::GzDecoder::new(upload)),
            CompressKind::Zstd => Box::new(
                zstd::stream::read::Decoder::new(upload)
                    .map_err(|e| ExtractError::MalformedArchive(format!("bad zstd stream: {e}")))?,
            ),
        };

        let mut archive = tar::Archive::new(reader);
        let mut pkginfo: Option<String> = None;
        let mut has_mtree = false;

        for entry in archive
            .entries()
            .map_err(|e| ExtractError::MalformedArchive(format!("not a tar archive: {e}")))?
        {
            let mut entry =
                entry.map_err(|e| ExtractError::MalformedArchive(format!("bad tar entry: {e}")))?;
            let path = entry
                .path()
                .map_err(|e| ExtractError::MalformedArchive(format!("bad entry path: {e}")))?
                .to_string_lossy()
                .into_owned();

            match path.as_str() {
                ".PKGINFO" => {
                    let mut content = String::new();
                    entry.read_to_string(&mut content).map_err(|e| {
                        ExtractError::MalformedArchive(format!("unreadable .PKGINFO: {e}"))
                    })?;
                    pkginfo = Some(content);
                }
                ".MTREE" => has_mtree = true,
                _ => {}
            }
            if pkginfo.is_some() && has_mtree {
                break;
            }
        }

        let pkginfo = pkginfo.ok_or(ExtractError::MissingRequiredMember(".PKGINFO"))?;
        if !has_mtree {
            return Err(ExtractError::MissingRequiredMember(".MTREE"));
        }

        let parsed = parse_package_info(&pkginfo)?;
        validate_package_info(&parsed)?;

        let name = PackageName::new(parsed.name.clone())?;
        let version = PackageVersion::new(parsed.version.clone())?;
        let arch = parsed.metadata.arch.clone();

        let file_name = format!("{name}-{version}-{arch}.{}", kind.file_suffix());
        let version_properties = parsed
            .metadata
            .depends
            .iter()
            .map(|d| ("depend".to_string(), d.clone()))
            .chain(
                parsed
                    .metadata
                    .provides
                    .iter()
                    .map(|p| ("provide".to_string(), p.clone())),
            )
            .collect();

        Ok(ExtractedPackage {
            name,
            version,
            metadata: Metadata::Arch(parsed.metadata),
            version_properties,
            file: ExtractedFile {
                name: file_name,
                content_type: Some("application/octet-stream".to_string()),
                composite_key: String::new(),
                payload: FilePayload::Upload,
                properties: vec![("arch".to_string(), arch)],
            },
        })
    }
}

/// A parsed `.PKGINFO` manifest.
#[derive(Debug, Default, PartialEq)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    pub metadata: ArchMetadata,
}

/// Parse a `.PKGINFO` manifest into a package description.
pub fn parse_package_info(content: &str) -> ExtractResult<PackageInfo> {
    let mut info = PackageInfo::default();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(ExtractError::MalformedArchive(format!(
                "malformed .PKGINFO line: {line}"
            )));
        };
        let key = key.trim();
        let value = value.trim().to_string();
        if value.is_empty() {
            continue;
        }

        let meta = &mut info.metadata;
        match key {
            "pkgname" => info.name = value,
            "pkgver" => info.version = value,
            "pkgbase" => meta.base = Some(value),
            "pkgdesc" => meta.description = Some(value),
            "url" => meta.project_url = Some(value),
            "packager" => meta.packager = Some(value),
            "arch" => meta.arch = value,
            "size" => {
                meta.installed_size = value.parse().map_err(|_| {
                    ExtractError::invalid_field("size", format!("not a number: {value}"))
                })?;
            }
            "builddate" => {
                meta.build_date = value.parse().map_err(|_| {
                    ExtractError::invalid_field("builddate", format!("not a number: {value}"))
                })?;
            }
            "group" => meta.groups.push(value),
            "license" => meta.licenses.push(value),
            "provides" => meta.provides.push(value),
            "depend" => meta.depends.push(value),
            "optdepend" => meta.opt_depends.push(value),
            "makedepend" => meta.make_depends.push(value),
            "checkdepend" => meta.check_depends.push(value),
            "backup" => meta.backup.push(value),
            _ => {}
        }
    }

    Ok(info)
}

/// Validate a parsed package description field by field.
pub fn validate_package_info(info: &PackageInfo) -> ExtractResult<()> {
    if !NAME_PATTERN.is_match(&info.name) {
        return Err(
            depot_core::Error::InvalidName(format!("invalid package name: {}", info.name)).into(),
        );
    }
    if let Some(base) = &info.metadata.base {
        if !NAME_PATTERN.is_match(base) {
            return Err(ExtractError::invalid_field(
                "pkgbase",
                format!("invalid package base: {base}"),
            ));
        }
    }
    if !VERSION_PATTERN.is_match(&info.version) {
        return Err(depot_core::Error::InvalidVersion(format!(
            "invalid package version: {}",
            info.version
        ))
        .into());
    }
    if info.metadata.arch.is_empty() {
        return Err(ExtractError::invalid_field(
            "arch",
            "architecture should be specified",
        ));
    }
    if let Some(url) = &info.metadata.project_url {
        if Url::parse(url).is_err() {
            return Err(ExtractError::invalid_field(
                "url",
                format!("invalid project URL: {url}"),
            ));
        }
    }

    let specifier_lists: [(&str, &[String]); 5] = [
        ("depend", &info.metadata.depends),
        ("makedepend", &info.metadata.make_depends),
        ("checkdepend", &info.metadata.check_depends),
        ("provides", &info.metadata.provides),
        ("optdepend", &info.metadata.opt_depends),
    ];
    for (field, values) in specifier_lists {
        for value in values {
            // Optional dependencies may carry a `: description` suffix.
            let specifier = if field == "optdepend" {
                value.split_once(':').map(|(s, _)| s).unwrap_or(value)
            } else {
                value.as_str()
            };
            if !DEPENDS_PATTERN.is_match(specifier) {
                return Err(ExtractError::invalid_field(
                    field,
                    format!("invalid dependency specifier: {value}"),
                ));
            }
        }
    }

    for backup in &info.metadata.backup {
        if backup.starts_with('/') {
            return Err(ExtractError::invalid_field(
                "backup",
                format!("backup file contains leading forward slash: {backup}"),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PKGINFO: &str = r#"# Generated by makepkg 6.0.2
# using fakeroot version 1.31
pkgname = zstd
pkgbase = zstd
pkgver = 1.5.5-1
pkgdesc = Zstandard - Fast real-time compression algorithm
url = https://example.com/
group = compression
builddate = 1681646714
packager = Jelle van der Waa <jelle@archlinux.org>
size = 1500453
arch = x86_64
license = BSD
provides = libzstd.so=1-64
depend = glibc
depend = zlib
optdepend = gzip: faster fallback
makedepend = cmake
checkdepend = gtest
backup = etc/zstd.conf
"#;

    fn build_package(kind: CompressKind, members: &[(&str, &[u8])]) -> HashedBuffer {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, content) in members {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *content).unwrap();
        }
        let tar_bytes = builder.into_inner().unwrap();
        let bytes = match kind {
            CompressKind::None => tar_bytes,
            CompressKind::Gzip => {
                let mut encoder =
                    flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(&tar_bytes).unwrap();
                encoder.finish().unwrap()
            }
            CompressKind::Zstd => zstd::stream::encode_all(tar_bytes.as_slice(), 0).unwrap(),
        };
        HashedBuffer::from_reader(bytes.as_slice(), 1024 * 1024).unwrap()
    }

    #[test]
    fn test_extract_all_compression_kinds() {
        for (kind, suffix) in [
            (CompressKind::None, "pkg.tar"),
            (CompressKind::Gzip, "pkg.tar.gz"),
            (CompressKind::Zstd, "pkg.tar.zst"),
        ] {
            let mut package = build_package(
                kind,
                &[(".PKGINFO", PKGINFO.as_bytes()), (".MTREE", b"mtree data")],
            );
            let extracted = ArchExtractor.extract(&mut package).unwrap();
            assert_eq!(extracted.name.as_str(), "zstd");
            assert_eq!(extracted.version.as_str(), "1.5.5-1");
            assert_eq!(extracted.file.name, format!("zstd-1.5.5-1-x86_64.{suffix}"));
            assert_eq!(
                extracted.file.properties,
                vec![("arch".to_string(), "x86_64".to_string())]
            );

            let Metadata::Arch(metadata) = &extracted.metadata else {
                panic!("expected arch metadata");
            };
            assert_eq!(metadata.arch, "x86_64");
            assert_eq!(metadata.depends, vec!["glibc", "zlib"]);
            assert_eq!(metadata.installed_size, 1500453);
            assert_eq!(metadata.build_date, 1681646714);
        }
    }

    #[test]
    fn test_missing_pkginfo() {
        let mut package = build_package(CompressKind::Zstd, &[(".MTREE", b"data")]);
        let err = ArchExtractor.extract(&mut package).unwrap_err();
        assert!(err.to_string().contains(".PKGINFO file not found"));
    }

    #[test]
    fn test_missing_mtree() {
        let mut package = build_package(CompressKind::Zstd, &[(".PKGINFO", PKGINFO.as_bytes())]);
        let err = ArchExtractor.extract(&mut package).unwrap_err();
        assert!(err.to_string().contains(".MTREE file not found"));
    }

    #[test]
    fn test_parse_package_info_fields() {
        let info = parse_package_info(PKGINFO).unwrap();
        assert_eq!(info.name, "zstd");
        assert_eq!(info.version, "1.5.5-1");
        assert_eq!(info.metadata.base.as_deref(), Some("zstd"));
        assert_eq!(
            info.metadata.description.as_deref(),
            Some("Zstandard - Fast real-time compression algorithm")
        );
        assert_eq!(info.metadata.opt_depends, vec!["gzip: faster fallback"]);
        assert_eq!(info.metadata.backup, vec!["etc/zstd.conf"]);
        assert_eq!(info.metadata.licenses, vec!["BSD"]);
    }

    fn valid_info() -> PackageInfo {
        parse_package_info(PKGINFO).unwrap()
    }

    #[test]
    fn test_validate_accepts_valid_package() {
        assert!(validate_package_info(&valid_info()).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_name() {
        let mut info = valid_info();
        info.name = "!$%@^!*&()".to_string();
        let err = validate_package_info(&info).unwrap_err();
        assert!(err.to_string().contains("invalid package name"));
    }

    #[test]
    fn test_validate_rejects_bad_base() {
        let mut info = valid_info();
        info.metadata.base = Some("una-luna?".to_string());
        let err = validate_package_info(&info).unwrap_err();
        assert!(err.to_string().contains("invalid package base"));
    }

    #[test]
    fn test_validate_rejects_version_without_pkgrel() {
        let mut info = valid_info();
        info.version = "una-luna".to_string();
        let err = validate_package_info(&info).unwrap_err();
        assert!(err.to_string().contains("invalid package version"));
    }

    #[test]
    fn test_validate_requires_architecture() {
        let mut info = valid_info();
        info.metadata.arch = String::new();
        let err = validate_package_info(&info).unwrap_err();
        assert!(err.to_string().contains("architecture should be specified"));
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut info = valid_info();
        info.metadata.project_url = Some("http%%$#".to_string());
        let err = validate_package_info(&info).unwrap_err();
        assert!(err.to_string().contains("invalid project URL"));
    }

    #[test]
    fn test_validate_dependency_grammar() {
        let mut info = valid_info();
        info.metadata.depends = vec![
            "go".to_string(),
            "gpg=1".to_string(),
            "curl>=3".to_string(),
            "git<=7".to_string(),
            "gzip>1.0".to_string(),
            "lz<1.0".to_string(),
        ];
        assert!(validate_package_info(&info).is_ok());

        info.metadata.depends = vec!["^^abc".to_string()];
        let err = validate_package_info(&info).unwrap_err();
        assert!(err.to_string().contains("invalid dependency specifier"));
    }

    #[test]
    fn test_validate_optdepend_description_suffix() {
        let mut info = valid_info();
        info.metadata.opt_depends = vec!["zstd>1.0:foo bar<test>".to_string()];
        assert!(validate_package_info(&info).is_ok());

        info.metadata.opt_depends = vec!["^m^:MM".to_string()];
        assert!(validate_package_info(&info).is_err());
    }

    #[test]
    fn test_validate_rejects_absolute_backup_path() {
        let mut info = valid_info();
        info.metadata.backup = vec!["/etc/passwd".to_string()];
        let err = validate_package_info(&info).unwrap_err();
        assert!(err.to_string().contains("leading forward slash"));
    }
}
