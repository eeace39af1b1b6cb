//! Payload checksums for aggregated tables

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of a table payload (64 characters)
///
/// # Examples
///
/// ```
/// use corridor::core::checksum::payload_checksum;
///
/// let checksum = payload_checksum(b"[2021,1500.5]\n");
/// assert_eq!(checksum.len(), 64);
/// ```
pub fn payload_checksum(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    let result = hasher.finalize();
    format!("{result:x}")
}

/// Whether `payload` still matches the checksum recorded at publish time
pub fn verify_checksum(payload: &[u8], expected: &str) -> bool {
    payload_checksum(payload).eq_ignore_ascii_case(expected)
}
