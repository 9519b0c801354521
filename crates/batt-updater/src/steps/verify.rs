//! SHA-256 verification for downloaded disk images.

use sha2::{Digest, Sha256};

use crate::error::{Result, UpdateError};

/// Checks a computed hash against the digest published with the release.
///
/// Accepts both "sha256:abc123" and plain "abc123" digests, case-insensitive.
pub fn verify_sha256(actual_hash: &str, expected_digest: &str) -> Result<()> {
    let expected_hash = expected_digest
        .strip_prefix("sha256:")
        .unwrap_or(expected_digest)
        .trim()
        .to_lowercase();
    let actual_hash = actual_hash.to_lowercase();

    if actual_hash != expected_hash {
        return Err(UpdateError::ChecksumMismatch {
            expected: expected_hash,
            actual: actual_hash,
        });
    }

    tracing::info!("SHA256 verification passed: {}", actual_hash);
    Ok(())
}

/// Incremental SHA-256 over a download stream.
#[derive(Default)]
pub struct StreamingHasher {
    hasher: Sha256,
}

impl StreamingHasher {
    /// Feeds the next chunk.
    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    /// Returns the lowercase hex digest.
    #[must_use]
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}
