//! Engine key store: master key, default derivation salt, key wrapping
//!
//! Every sub-key is domain-separated from the master via HKDF-SHA256:
//! ```text
//! master ──HKDF("vitalseal-key-wrap")──────▶ wrapping key (XChaCha20-Poly1305)
//!        ──HKDF("vitalseal-derive-salt")───▶ default PBKDF2 salt
//! ```
//! Wrapped key blob: `[24-byte nonce][ciphertext + 16-byte tag]`, with the
//! key's metadata as AAD so a blob cannot be re-labelled.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;
use vseal_core::{Algorithm, CryptographicKey};
use zeroize::Zeroize;

use crate::error::{CryptoError, Result};
use crate::kdf::{derive_master_key, Argon2Params, MasterKey};
use crate::{KEY_SIZE, SALT_SIZE, TAG_SIZE, XNONCE_SIZE};

/// Secrets the engine is constructed with.
///
/// Nothing in here is ever handed to a caller. Zeroized on drop.
pub struct KeyStore {
    master: MasterKey,
    default_salt: [u8; SALT_SIZE],
}

impl KeyStore {
    pub fn new(master: MasterKey, default_salt: [u8; SALT_SIZE]) -> Self {
        Self {
            master,
            default_salt,
        }
    }

    /// Random master key and salt; wrapped keys do not survive the process.
    pub fn generate() -> Self {
        let mut master = [0u8; KEY_SIZE];
        let mut salt = [0u8; SALT_SIZE];
        let mut rng = rand::thread_rng();
        rng.fill_bytes(&mut master);
        rng.fill_bytes(&mut salt);
        let store = Self::new(MasterKey::from_bytes(master), salt);
        master.zeroize();
        store
    }

    /// Deterministic store from a passphrase: the same passphrase, salt and
    /// params always unwrap the same keys and derive the same defaults.
    pub fn from_passphrase(
        passphrase: &SecretString,
        salt: &[u8; SALT_SIZE],
        params: &Argon2Params,
    ) -> Result<Self> {
        let master = derive_master_key(passphrase, salt, params)?;
        let mut okm = hkdf_derive(master.as_bytes(), b"vitalseal-derive-salt")?;
        let mut default_salt = [0u8; SALT_SIZE];
        default_salt.copy_from_slice(&okm[..SALT_SIZE]);
        okm.zeroize();
        Ok(Self::new(master, default_salt))
    }

    /// Salt used by `derive_key` when the caller supplies none.
    pub fn default_salt(&self) -> &[u8] {
        &self.default_salt
    }

    /// Encrypt `key` under the store's wrapping key.
    pub fn wrap_key(&self, key: &CryptographicKey) -> Result<WrappedKey> {
        let mut wrapping = self.wrapping_key()?;
        let cipher = XChaCha20Poly1305::new((&wrapping).into());
        wrapping.zeroize();

        let mut nonce_bytes = [0u8; XNONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let mut wrapped = WrappedKey {
            key_id: key.id,
            algorithm: key.algorithm,
            created_at: key.created_at,
            expires_at: key.expires_at,
            blob: String::new(),
        };
        let aad = wrapped.aad();
        let ciphertext = cipher
            .encrypt(
                XNonce::from_slice(&nonce_bytes),
                Payload {
                    msg: key.as_bytes(),
                    aad: &aad,
                },
            )
            .map_err(|e| CryptoError::Aead(format!("key wrapping failed: {e}")))?;

        let mut blob = Vec::with_capacity(XNONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        wrapped.blob = STANDARD.encode(&blob);

        tracing::debug!(key_id = %key.id, "wrapped key");
        Ok(wrapped)
    }

    /// Recover a key wrapped by a store with the same master key.
    pub fn unwrap_key(&self, wrapped: &WrappedKey) -> Result<CryptographicKey> {
        let blob = STANDARD
            .decode(&wrapped.blob)
            .map_err(|e| CryptoError::Format(format!("wrapped key is not base64: {e}")))?;
        if blob.len() < XNONCE_SIZE + 1 + TAG_SIZE {
            return Err(CryptoError::Format(format!(
                "wrapped key too short: {} bytes (expected at least {})",
                blob.len(),
                XNONCE_SIZE + 1 + TAG_SIZE
            )));
        }

        let (nonce_bytes, ciphertext) = blob.split_at(XNONCE_SIZE);
        let mut wrapping = self.wrapping_key()?;
        let cipher = XChaCha20Poly1305::new((&wrapping).into());
        wrapping.zeroize();

        let aad = wrapped.aad();
        let material = cipher
            .decrypt(
                XNonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| {
                CryptoError::Authentication(
                    "key unwrapping failed: wrong master key or altered blob".into(),
                )
            })?;

        Ok(CryptographicKey::from_parts(
            wrapped.key_id,
            wrapped.algorithm,
            material,
            wrapped.created_at,
            wrapped.expires_at,
        ))
    }

    fn wrapping_key(&self) -> Result<[u8; KEY_SIZE]> {
        hkdf_derive(self.master.as_bytes(), b"vitalseal-key-wrap")
    }
}

impl Drop for KeyStore {
    fn drop(&mut self) {
        self.default_salt.zeroize();
    }
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("master", &self.master)
            .field("default_salt", &"[REDACTED]")
            .finish()
    }
}

/// A key encrypted under a [`KeyStore`], safe to persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    pub key_id: Uuid,
    pub algorithm: Algorithm,
    pub created_at: u64,
    pub expires_at: Option<u64>,
    /// Base64 of `[nonce][ciphertext + tag]`
    pub blob: String,
}

impl WrappedKey {
    /// key_id (16) || algorithm name || created_at (8 BE) || expires_at (8 BE, 0 = never)
    fn aad(&self) -> Vec<u8> {
        let name = self.algorithm.name().as_bytes();
        let mut aad = Vec::with_capacity(16 + name.len() + 16);
        aad.extend_from_slice(self.key_id.as_bytes());
        aad.extend_from_slice(name);
        aad.extend_from_slice(&self.created_at.to_be_bytes());
        aad.extend_from_slice(&self.expires_at.unwrap_or(0).to_be_bytes());
        aad
    }
}

/// HKDF-SHA256 key derivation with a domain-specific info string.
fn hkdf_derive(ikm: &[u8; KEY_SIZE], info: &[u8]) -> Result<[u8; KEY_SIZE]> {
    let hkdf = Hkdf::<Sha256>::new(None, ikm);
    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(info, &mut okm)
        .map_err(|e| CryptoError::Kdf(format!("HKDF expand failed: {e}")))?;
    Ok(okm)
}
