//! SHA-256 integrity digests
//!
//! Digests are lowercase hex. Comparison against an expected digest is
//! constant-time over the decoded bytes.

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use vseal_core::{Algorithm, IntegrityValidationResult};

use crate::error::Result;

/// Hex SHA-256 of an in-memory buffer.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Streaming SHA-256 over a reader. Returns the hex digest and the number of
/// bytes read.
pub fn digest_reader<R: Read>(reader: &mut R) -> std::io::Result<(String, u64)> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024]; // 64KB read buffer
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        total += n as u64;
    }

    Ok((hex::encode(hasher.finalize()), total))
}

/// Hash a file from disk using the streaming interface.
pub fn digest_file(path: &Path) -> Result<(String, u64)> {
    let mut file = std::fs::File::open(path)?;
    Ok(digest_reader(&mut file)?)
}

/// Constant-time digest comparison. Malformed hex never matches.
pub fn digests_match(computed: &str, expected: &str) -> bool {
    match (hex::decode(computed.trim()), hex::decode(expected.trim())) {
        (Ok(a), Ok(b)) => a.len() == b.len() && bool::from(a.ct_eq(&b)),
        _ => false,
    }
}

/// Hash `data` and compare it with `expected` when one is given.
///
/// Without an expected digest the result is always valid; it then only
/// reports the computed hash.
pub fn validate_integrity(
    data: &[u8],
    algorithm: Algorithm,
    expected: Option<&str>,
) -> IntegrityValidationResult {
    let computed_hash = sha256_hex(data);
    let is_valid = expected.map_or(true, |e| digests_match(&computed_hash, e));
    if !is_valid {
        tracing::warn!(%algorithm, "integrity digest mismatch");
    }
    IntegrityValidationResult {
        is_valid,
        computed_hash,
        expected_hash: expected.map(str::to_owned),
        algorithm,
    }
}
