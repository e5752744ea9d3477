//! Key generation and the rules a key must satisfy before use

use std::time::Duration;

use rand::RngCore;
use uuid::Uuid;
use vseal_core::{now_epoch, Algorithm, AlgorithmFamily, CryptographicKey};

use crate::error::{CryptoError, Result};
use crate::KEY_SIZE;

/// Largest key the generator will produce.
pub const MAX_KEY_BITS: u32 = 16_384;

/// Fill a fresh buffer from the thread-local CSPRNG.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Key size for `algorithm`, defaulting to the catalog size.
///
/// Symmetric ciphers only take 256-bit keys. Other families accept any
/// whole-byte size up to [`MAX_KEY_BITS`].
pub fn resolve_key_bits(algorithm: Algorithm, requested: Option<u32>) -> Result<u32> {
    let bits = requested.unwrap_or_else(|| algorithm.default_key_bits());
    if bits == 0 || bits % 8 != 0 || bits > MAX_KEY_BITS {
        return Err(CryptoError::InvalidKey(format!(
            "{bits}-bit keys are not valid: size must be a positive multiple of 8 up to {MAX_KEY_BITS}"
        )));
    }
    if algorithm.family() == AlgorithmFamily::Symmetric && bits as usize != KEY_SIZE * 8 {
        return Err(CryptoError::InvalidKey(format!(
            "{algorithm} requires a {}-bit key, got {bits}",
            KEY_SIZE * 8
        )));
    }
    Ok(bits)
}

/// Generate a random key for `algorithm`.
///
/// `max_key_age` sets `expires_at`; a zero age issues a key that never
/// expires.
pub fn generate_key(
    algorithm: Algorithm,
    key_bits: Option<u32>,
    max_key_age: Duration,
) -> Result<CryptographicKey> {
    let bits = resolve_key_bits(algorithm, key_bits)?;
    let created_at = now_epoch();
    let expires_at = (!max_key_age.is_zero())
        .then(|| created_at.saturating_add(max_key_age.as_secs()));

    let key = CryptographicKey::from_parts(
        Uuid::new_v4(),
        algorithm,
        random_bytes(bits as usize / 8),
        created_at,
        expires_at,
    );
    tracing::debug!(key_id = %key.id, %algorithm, bits, "generated key");
    Ok(key)
}

/// Check that `key` was issued for `algorithm` and has a usable size.
pub fn check_key(key: &CryptographicKey, algorithm: Algorithm) -> Result<()> {
    if key.algorithm != algorithm {
        return Err(CryptoError::InvalidKey(format!(
            "key {} was issued for {}, not {algorithm}",
            key.id, key.algorithm
        )));
    }
    if algorithm.family() == AlgorithmFamily::Symmetric && key.as_bytes().len() != KEY_SIZE {
        return Err(CryptoError::InvalidKey(format!(
            "{algorithm} requires a {KEY_SIZE}-byte key, got {} bytes",
            key.as_bytes().len()
        )));
    }
    Ok(())
}

/// [`check_key`] plus expiry: expired keys may still decrypt, never encrypt.
pub fn check_key_for_encryption(
    key: &CryptographicKey,
    algorithm: Algorithm,
    now: u64,
) -> Result<()> {
    check_key(key, algorithm)?;
    if key.is_expired(now) {
        return Err(CryptoError::InvalidKey(format!(
            "key {} expired at {}",
            key.id,
            key.expires_at.unwrap_or_default()
        )));
    }
    Ok(())
}
