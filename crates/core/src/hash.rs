//! Content hash types and multi-digest hashing.

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::fmt;

/// A SHA-256 content hash represented as 32 bytes.
///
/// This is the primary hash: blobs are addressed and deduplicated by
/// `(sha256, size)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Create a new ContentHash from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Compute SHA-256 hash of data.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        if s.len() != 64 {
            return Err(crate::Error::InvalidHash(format!(
                "expected 64 hex chars, got {}",
                s.len()
            )));
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hex_str =
                std::str::from_utf8(chunk).map_err(|e| crate::Error::InvalidHash(e.to_string()))?;
            bytes[i] = u8::from_str_radix(hex_str, 16)
                .map_err(|e| crate::Error::InvalidHash(e.to_string()))?;
        }
        Ok(Self(bytes))
    }

    /// Encode as lowercase hex string.
    pub fn to_hex(&self) -> String {
        encode_hex(&self.0)
    }

    /// Encode as base64 string.
    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// The complete digest set computed for every stored blob.
///
/// MD5 and SHA-1 exist only for compatibility with ecosystem checksum
/// fields (npm shasum, Arch %MD5SUM%, NuGet legacy hashes); SHA-256 is
/// authoritative.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestSet {
    pub md5: String,
    pub sha1: String,
    pub sha256: ContentHash,
    pub sha512: String,
}

impl DigestSet {
    /// Compute all digests of data in one pass.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = MultiHasher::new();
        hasher.update(data);
        hasher.finalize()
    }
}

/// Incremental hasher computing MD5, SHA-1, SHA-256 and SHA-512 together.
#[derive(Clone)]
pub struct MultiHasher {
    md5: Md5,
    sha1: Sha1,
    sha256: Sha256,
    sha512: Sha512,
}

impl MultiHasher {
    /// Create a fresh hasher.
    pub fn new() -> Self {
        Self {
            md5: Md5::new(),
            sha1: Sha1::new(),
            sha256: Sha256::new(),
            sha512: Sha512::new(),
        }
    }

    /// Update all digests with data.
    pub fn update(&mut self, data: &[u8]) {
        self.md5.update(data);
        self.sha1.update(data);
        self.sha256.update(data);
        self.sha512.update(data);
    }

    /// Finalize and return the digest set.
    pub fn finalize(self) -> DigestSet {
        DigestSet {
            md5: encode_hex(&self.md5.finalize()),
            sha1: encode_hex(&self.sha1.finalize()),
            sha256: ContentHash(self.sha256.finalize().into()),
            sha512: encode_hex(&self.sha512.finalize()),
        }
    }

    /// Return the digest set without consuming the hasher.
    pub fn snapshot(&self) -> DigestSet {
        self.clone().finalize()
    }
}

impl Default for MultiHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_hex_roundtrip() {
        let hash = ContentHash::compute(b"hello world");
        let hex = hash.to_hex();
        let parsed = ContentHash::from_hex(&hex).unwrap();
        assert_eq!(hash, parsed);
        assert_eq!(
            hex,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_content_hash_rejects_bad_hex() {
        assert!(ContentHash::from_hex("abc").is_err());
        assert!(ContentHash::from_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn test_digest_set_known_vectors() {
        let digests = DigestSet::compute(b"abc");
        assert_eq!(digests.md5, "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(digests.sha1, "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(
            digests.sha256.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(digests.sha512.starts_with("ddaf35a193617aba"));
    }

    #[test]
    fn test_multi_hasher_incremental_matches_oneshot() {
        let mut hasher = MultiHasher::new();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.finalize(), DigestSet::compute(b"hello world"));
    }

    #[test]
    fn test_multi_hasher_snapshot_does_not_consume() {
        let mut hasher = MultiHasher::new();
        hasher.update(b"partial");
        let snap = hasher.snapshot();
        assert_eq!(snap, DigestSet::compute(b"partial"));
        hasher.update(" more".as_bytes());
        assert_eq!(hasher.finalize(), DigestSet::compute(b"partial more"));
    }
}
