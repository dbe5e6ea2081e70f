//! SHA-256 checksums for persisted model artifacts.
//!
//! Each artifact's digest is recorded in `model_info.json` when it is written
//! and checked again when the bundle is loaded. A mismatch means the file was
//! edited or truncated after training and is rejected.

use crate::errors::ModelError;
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Checks `data` against the recorded digest for `artifact`.
pub fn verify_digest(artifact: &str, data: &[u8], expected: &str) -> Result<(), ModelError> {
    let computed = sha256_hex(data);
    if computed.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        tracing::warn!(
            "Artifact validation failed for {}: checksum mismatch. Expected: {}, Data length: {}",
            artifact,
            expected,
            data.len()
        );
        Err(ModelError::ChecksumMismatch {
            artifact: artifact.to_string(),
        })
    }
}
