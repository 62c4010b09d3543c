//! Test fixtures: registry setup and sample package payloads.

use bytes::Bytes;
use depot_core::config::{GcConfig, RegistryConfig};
use depot_formats::ExtractorSet;
use depot_metadata::SqliteStore;
use depot_registry::RegistryService;
use depot_storage::{ByteStream, FilesystemBackend};
use std::io::Write;
use std::sync::Arc;

/// A 192-byte gzipped tarball, the attachment of the npm test package.
pub const NPM_TARBALL_BASE64: &str = "H4sIAAAAAAAA/ytITM5OTE/VL4DQelnF+XkMVAYGBgZmJiYK2MRBwNDcSIHB2NTMwNDQzMwAqA7IMDUxA9LUdgg2UFpcklgEdAql5kD8ogCnhwio5lJQUMpLzE1VslJQcihOzi9I1S9JLS7RhSYIJR2QgrLUouLM/DyQGkM9Az1D3YIiqExKanFyUWZBCVQ2BKhVwQVJDKwosbQkI78IJO/tZ+LsbRykxFXLNdA+HwWjYBSMgpENACgAbtAACAAA";

/// A registry wired to temp-dir storage and SQLite, with handles kept for
/// direct state assertions.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestRegistry {
    pub dir: tempfile::TempDir,
    pub service: RegistryService,
    pub metadata: Arc<SqliteStore>,
    pub storage: Arc<FilesystemBackend>,
}

/// Build a test registry. The GC grace period is zero so sweeps act
/// immediately.
pub async fn test_registry() -> TestRegistry {
    test_registry_with(RegistryConfig {
        gc: GcConfig {
            grace_period_secs: 0,
            batch_size: 100,
        },
        ..RegistryConfig::default()
    })
    .await
}

pub async fn test_registry_with(config: RegistryConfig) -> TestRegistry {
    let dir = tempfile::tempdir().unwrap();
    let metadata = Arc::new(
        SqliteStore::new(dir.path().join("metadata.db"))
            .await
            .unwrap(),
    );
    let storage = Arc::new(
        FilesystemBackend::new(dir.path().join("storage"))
            .await
            .unwrap(),
    );
    let service = RegistryService::new(
        metadata.clone(),
        storage.clone(),
        ExtractorSet::with_defaults(),
        config,
    );
    TestRegistry {
        dir,
        service,
        metadata,
        storage,
    }
}

/// Wrap bytes into an upload stream.
pub fn byte_stream(data: Vec<u8>) -> ByteStream {
    Box::pin(futures::stream::once(async move {
        Ok(Bytes::from(data))
    }))
}

/// Build an npm publish document with a single version and attachment.
pub fn npm_publish_payload(name: &str, version: &str, attachment_base64: &str) -> Vec<u8> {
    format!(
        r#"{{
            "_id": "{name}",
            "name": "{name}",
            "description": "Test Description",
            "versions": {{
                "{version}": {{
                    "name": "{name}",
                    "version": "{version}",
                    "description": "Test Description",
                    "author": {{ "name": "KN4CK3R" }},
                    "dist": {{
                        "integrity": "sha512-yA4FJsVhetynGfOC1jFf79BuS+jrHbm0fhh+aHzCQkOaOBXKf9oBnC4a6DnLLnEsHQDRLYd00cwj8sCXpC+wIg==",
                        "shasum": "aaa7eaf852a948b0aa05afeda35b1badca155d90"
                    }}
                }}
            }},
            "_attachments": {{
                "{name}-{version}.tgz": {{ "data": "{attachment_base64}" }}
            }}
        }}"#
    )
    .into_bytes()
}

/// Build an Arch package (zstd-compressed tar with .PKGINFO and .MTREE).
#[allow(dead_code)]
pub fn arch_package(name: &str, version: &str, arch: &str) -> Vec<u8> {
    let pkginfo = format!(
        "pkgname = {name}\npkgbase = {name}\npkgver = {version}\npkgdesc = test package\narch = {arch}\ndepend = glibc\n"
    );
    let mut builder = tar::Builder::new(Vec::new());
    for (member, content) in [(".PKGINFO", pkginfo.as_bytes()), (".MTREE", &b"mtree"[..])] {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, member, content).unwrap();
    }
    let tar_bytes = builder.into_inner().unwrap();
    zstd::stream::encode_all(tar_bytes.as_slice(), 0).unwrap()
}

/// Build a minimal gem (tar with gzipped gemspec, data and checksums).
#[allow(dead_code)]
pub fn gem_package(name: &str, version: &str) -> Vec<u8> {
    let gemspec = format!(
        "--- !ruby/object:Gem::Specification\nname: {name}\nversion: !ruby/object:Gem::Version\n  version: {version}\nsummary: test gem\n"
    );
    let mut encoder =
        flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(gemspec.as_bytes()).unwrap();
    let metadata_gz = encoder.finish().unwrap();

    let mut builder = tar::Builder::new(Vec::new());
    for (member, content) in [
        ("metadata.gz", metadata_gz.as_slice()),
        ("data.tar.gz", &b"data"[..]),
        ("checksums.yaml.gz", &b"sums"[..]),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, member, content).unwrap();
    }
    builder.into_inner().unwrap()
}
