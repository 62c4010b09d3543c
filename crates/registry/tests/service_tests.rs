//! Read path, deletion and sweep integration tests.

mod common;

use base64::Engine;
use common::*;
use depot_core::{PackageType, UploadRequest};
use depot_metadata::repos::BlobRepo;
use depot_registry::RegistryError;
use futures::StreamExt;
use uuid::Uuid;

fn npm_request() -> UploadRequest {
    UploadRequest {
        owner_id: Uuid::new_v4(),
        creator_id: Uuid::new_v4(),
        package_type: PackageType::Npm,
    }
}

async fn collect(mut stream: depot_storage::ByteStream) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk.unwrap());
    }
    out
}

#[tokio::test]
async fn test_download_returns_exact_bytes_and_counts() {
    let registry = test_registry().await;
    let request = npm_request();

    let payload = npm_publish_payload("@scope/pkg", "1.0.1-pre", NPM_TARBALL_BASE64);
    registry
        .service
        .upload(request.clone(), byte_stream(payload))
        .await
        .unwrap();

    let downloaded = registry
        .service
        .download(
            request.owner_id,
            PackageType::Npm,
            "@scope/pkg",
            "1.0.1-pre",
            "pkg-1.0.1-pre.tgz",
        )
        .await
        .unwrap();

    let expected = base64::engine::general_purpose::STANDARD
        .decode(NPM_TARBALL_BASE64)
        .unwrap();
    let body = collect(downloaded.stream).await;
    assert_eq!(body, expected);
    assert_eq!(downloaded.blob.size, 192);

    // The download counter went from 0 to 1.
    let descriptor = registry
        .service
        .get_descriptor(request.owner_id, PackageType::Npm, "@scope/pkg", "1.0.1-pre")
        .await
        .unwrap();
    assert_eq!(descriptor.version.download_count, 1);
}

#[tokio::test]
async fn test_download_unknown_file_is_not_found() {
    let registry = test_registry().await;
    let request = npm_request();

    let payload = npm_publish_payload("pkg", "1.0.0", NPM_TARBALL_BASE64);
    registry
        .service
        .upload(request.clone(), byte_stream(payload))
        .await
        .unwrap();

    for (name, version, file) in [
        ("other", "1.0.0", "pkg-1.0.0.tgz"),
        ("pkg", "9.9.9", "pkg-1.0.0.tgz"),
        ("pkg", "1.0.0", "nope.tgz"),
    ] {
        let result = registry
            .service
            .download(request.owner_id, PackageType::Npm, name, version, file)
            .await;
        assert!(
            matches!(result, Err(RegistryError::NotFound(_))),
            "{name}/{version}/{file} should be NotFound"
        );
    }
}

#[tokio::test]
async fn test_list_versions_newest_first() {
    let registry = test_registry().await;
    let request = npm_request();

    for version in ["1.0.0", "1.0.1"] {
        let payload = npm_publish_payload("pkg", version, NPM_TARBALL_BASE64);
        registry
            .service
            .upload(request.clone(), byte_stream(payload))
            .await
            .unwrap();
    }

    let versions = registry
        .service
        .list_versions(request.owner_id, PackageType::Npm, "pkg")
        .await
        .unwrap();
    assert_eq!(versions.len(), 2);
    for descriptor in &versions {
        assert_eq!(descriptor.package.name, "pkg");
        assert_eq!(descriptor.files.len(), 1);
        assert!(descriptor.semver.is_some());
    }

    // Case-insensitive lookup resolves the same package.
    let versions = registry
        .service
        .list_versions(request.owner_id, PackageType::Npm, "PKG")
        .await
        .unwrap();
    assert_eq!(versions.len(), 2);
}

#[tokio::test]
async fn test_list_versions_unknown_package() {
    let registry = test_registry().await;
    let result = registry
        .service
        .list_versions(Uuid::new_v4(), PackageType::Npm, "ghost")
        .await;
    assert!(matches!(result, Err(RegistryError::NotFound(_))));
}

#[tokio::test]
async fn test_delete_version_then_sweep_reclaims_blob() {
    let registry = test_registry().await;
    let request = npm_request();

    let payload = npm_publish_payload("pkg", "1.0.0", NPM_TARBALL_BASE64);
    let descriptor = registry
        .service
        .upload(request.clone(), byte_stream(payload))
        .await
        .unwrap();
    let blob_sha256 = descriptor.files[0].blob.hash_sha256.clone();
    let blob_key = format!(
        "packages/{}/{}/{}",
        &blob_sha256[0..2],
        &blob_sha256[2..4],
        blob_sha256
    );

    use depot_storage::ObjectStore;
    assert!(registry.storage.exists(&blob_key).await.unwrap());

    registry
        .service
        .delete_version(request.owner_id, PackageType::Npm, "pkg", "1.0.0")
        .await
        .unwrap();

    // The version (and the now-empty package) are gone.
    let result = registry
        .service
        .get_descriptor(request.owner_id, PackageType::Npm, "pkg", "1.0.0")
        .await;
    assert!(matches!(result, Err(RegistryError::NotFound(_))));

    // The orphaned blob survives until the sweep, then both the row and
    // the object go.
    let stats = registry.metadata.get_blob_stats().await.unwrap();
    assert_eq!(stats.unreferenced_count, 1);

    let swept = registry.service.sweep_blobs().await.unwrap();
    assert_eq!(swept.blobs_deleted, 1);
    assert_eq!(swept.bytes_deleted, 192);
    assert_eq!(swept.storage_errors, 0);
    assert!(!registry.storage.exists(&blob_key).await.unwrap());
    assert_eq!(registry.metadata.get_blob_stats().await.unwrap().count, 0);
}

#[tokio::test]
async fn test_delete_keeps_blob_shared_with_other_version() {
    let registry = test_registry().await;
    let request = npm_request();

    for version in ["1.0.0", "1.0.1"] {
        let payload = npm_publish_payload("pkg", version, NPM_TARBALL_BASE64);
        registry
            .service
            .upload(request.clone(), byte_stream(payload))
            .await
            .unwrap();
    }

    registry
        .service
        .delete_version(request.owner_id, PackageType::Npm, "pkg", "1.0.0")
        .await
        .unwrap();

    // Both versions shared one blob; the survivor still references it,
    // so the sweep must not touch it.
    let swept = registry.service.sweep_blobs().await.unwrap();
    assert_eq!(swept.blobs_deleted, 0);

    let downloaded = registry
        .service
        .download(
            request.owner_id,
            PackageType::Npm,
            "pkg",
            "1.0.1",
            "pkg-1.0.1.tgz",
        )
        .await
        .unwrap();
    assert_eq!(collect(downloaded.stream).await.len(), 192);
}

#[tokio::test]
async fn test_delete_unknown_version_is_not_found() {
    let registry = test_registry().await;
    let result = registry
        .service
        .delete_version(Uuid::new_v4(), PackageType::Npm, "ghost", "1.0.0")
        .await;
    assert!(matches!(result, Err(RegistryError::NotFound(_))));
}

#[tokio::test]
async fn test_reupload_after_delete_succeeds() {
    let registry = test_registry().await;
    let request = npm_request();

    let payload = npm_publish_payload("pkg", "1.0.0", NPM_TARBALL_BASE64);
    registry
        .service
        .upload(request.clone(), byte_stream(payload.clone()))
        .await
        .unwrap();
    registry
        .service
        .delete_version(request.owner_id, PackageType::Npm, "pkg", "1.0.0")
        .await
        .unwrap();

    // Deletion freed the identity; the orphaned blob gets reused.
    let descriptor = registry
        .service
        .upload(request.clone(), byte_stream(payload))
        .await
        .unwrap();
    assert_eq!(descriptor.version.version, "1.0.0");
    let stats = registry.metadata.get_blob_stats().await.unwrap();
    assert_eq!(stats.count, 1);
    assert_eq!(stats.referenced_count, 1);
}
