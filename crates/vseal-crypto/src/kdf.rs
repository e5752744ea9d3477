//! Key derivation: PBKDF2-HMAC-SHA256 for caller passwords, Argon2id for the
//! engine master key

use argon2::{Algorithm as Argon2Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use vseal_core::{now_epoch, DerivedKey, KdfConfig};
use zeroize::Zeroize;

use crate::error::{CryptoError, Result};
use crate::KEY_SIZE;

pub const DEFAULT_KEY_LEN: usize = KEY_SIZE;

/// Longest output `derive_key` produces (two SHA-256 blocks).
pub const MAX_KEY_LEN: usize = 64;

/// Derive `key_len` bytes from `password` with PBKDF2-HMAC-SHA256.
///
/// Deterministic: the same password, salt, iterations and length always
/// produce the same bytes. The password must be non-empty UTF-8.
pub fn derive_key(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    key_len: usize,
) -> Result<DerivedKey> {
    if std::str::from_utf8(password).is_err() {
        return Err(CryptoError::Kdf("password is not valid UTF-8".into()));
    }
    if password.is_empty() {
        return Err(CryptoError::Kdf("password must not be empty".into()));
    }
    if salt.is_empty() {
        return Err(CryptoError::Kdf("salt must not be empty".into()));
    }
    if iterations == 0 {
        return Err(CryptoError::Kdf("iterations must be at least 1".into()));
    }
    if key_len == 0 || key_len > MAX_KEY_LEN {
        return Err(CryptoError::Kdf(format!(
            "key length must be between 1 and {MAX_KEY_LEN} bytes, got {key_len}"
        )));
    }

    let mut out = vec![0u8; key_len];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
    tracing::debug!(iterations, key_len, "derived key from password");

    Ok(DerivedKey::new(out, salt.to_vec(), iterations, now_epoch()))
}

/// A 256-bit master key derived from a passphrase via Argon2id.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct MasterKey {
    bytes: [u8; KEY_SIZE],
}

impl MasterKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argon2Params {
    pub mem_cost_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self::from(&KdfConfig::default())
    }
}

impl From<&KdfConfig> for Argon2Params {
    fn from(config: &KdfConfig) -> Self {
        Self {
            mem_cost_kib: config.mem_cost_kib,
            time_cost: config.time_cost,
            parallelism: config.parallelism,
        }
    }
}

/// Derive a 256-bit master key from a passphrase and salt using Argon2id.
///
/// The salt does not need to be secret but must be kept to re-derive.
pub fn derive_master_key(
    passphrase: &SecretString,
    salt: &[u8; crate::SALT_SIZE],
    params: &Argon2Params,
) -> Result<MasterKey> {
    let argon2_params = Params::new(
        params.mem_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| CryptoError::Kdf(format!("invalid Argon2id params: {e}")))?;

    let argon2 = Argon2::new(Argon2Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(passphrase.expose_secret().as_bytes(), salt, &mut key)
        .map_err(|e| CryptoError::Kdf(format!("Argon2id failed: {e}")))?;

    let master = MasterKey::from_bytes(key);
    key.zeroize();
    Ok(master)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Fast params for testing
    const TEST_PARAMS: Argon2Params = Argon2Params {
        mem_cost_kib: 1024,
        time_cost: 1,
        parallelism: 1,
    };

    #[test]
    fn test_pbkdf2_deterministic() {
        let k1 = derive_key(b"hunter2", b"salt-0123456789a", 1000, 32).unwrap();
        let k2 = derive_key(b"hunter2", b"salt-0123456789a", 1000, 32).unwrap();

        assert_eq!(k1.as_bytes(), k2.as_bytes(), "PBKDF2 must be deterministic");
        assert_eq!(k1.as_bytes().len(), 32);
        assert_eq!(k1.iterations, 1000);
        assert_eq!(k1.salt, b"salt-0123456789a");
    }

    #[test]
    fn test_pbkdf2_rfc7914_vector() {
        // RFC 7914 section 11: PBKDF2-HMAC-SHA256("passwd", "salt", 1, 64)
        let key = derive_key(b"passwd", b"salt", 1, 64).unwrap();
        assert_eq!(
            hex::encode(key.as_bytes()),
            "55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc\
             49ca9cccf179b645991664b39d77ef317c71b845b1e30bd509112041d3a19783"
        );
    }

    #[test]
    fn test_pbkdf2_inputs_change_output() {
        let base = derive_key(b"password", b"salt-a", 10, 32).unwrap();
        let other_salt = derive_key(b"password", b"salt-b", 10, 32).unwrap();
        let other_iter = derive_key(b"password", b"salt-a", 11, 32).unwrap();

        assert_ne!(base.as_bytes(), other_salt.as_bytes());
        assert_ne!(base.as_bytes(), other_iter.as_bytes());
    }

    #[test]
    fn test_pbkdf2_rejects_bad_input() {
        assert!(matches!(
            derive_key(&[0xff, 0xfe], b"salt", 10, 32),
            Err(CryptoError::Kdf(_))
        ));
        assert!(derive_key(b"", b"salt", 10, 32).is_err());
        assert!(derive_key(b"pw", b"", 10, 32).is_err());
        assert!(derive_key(b"pw", b"salt", 0, 32).is_err());
        assert!(derive_key(b"pw", b"salt", 10, 0).is_err());
        assert!(derive_key(b"pw", b"salt", 10, MAX_KEY_LEN + 1).is_err());
    }

    #[test]
    fn test_argon2_deterministic() {
        let passphrase = SecretString::from("test-passphrase-123");
        let salt = [1u8; 16];

        let key1 = derive_master_key(&passphrase, &salt, &TEST_PARAMS).unwrap();
        let key2 = derive_master_key(&passphrase, &salt, &TEST_PARAMS).unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes(), "KDF must be deterministic");
    }

    #[test]
    fn test_argon2_different_salts() {
        let passphrase = SecretString::from("same-passphrase");

        let key1 = derive_master_key(&passphrase, &[1u8; 16], &TEST_PARAMS).unwrap();
        let key2 = derive_master_key(&passphrase, &[2u8; 16], &TEST_PARAMS).unwrap();

        assert_ne!(
            key1.as_bytes(),
            key2.as_bytes(),
            "different salts must produce different keys"
        );
    }

    #[test]
    fn test_argon2_rejects_invalid_params() {
        let params = Argon2Params {
            mem_cost_kib: 1,
            ..TEST_PARAMS
        };
        let err = derive_master_key(&SecretString::from("pw"), &[0u8; 16], &params).unwrap_err();
        assert!(matches!(err, CryptoError::Kdf(_)));
    }

    #[test]
    fn test_master_key_debug_redacted() {
        let key = MasterKey::from_bytes([0x42; KEY_SIZE]);
        let debug = format!("{key:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("66"));
    }
}
