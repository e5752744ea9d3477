//! Symmetric AEAD: AES-256-GCM, ChaCha20-Poly1305, XChaCha20-Poly1305
//!
//! Tags are detached: ciphertext length always equals plaintext length and
//! the 16-byte tag travels separately. Every call draws a fresh random nonce.

use std::time::Instant;

use aes_gcm::Aes256Gcm;
use chacha20poly1305::aead::{AeadInPlace, KeyInit, Nonce, Tag};
use chacha20poly1305::{ChaCha20Poly1305, XChaCha20Poly1305};
use vseal_core::{now_epoch, Algorithm, AlgorithmFamily, CryptographicKey, EncryptionResult};
use zeroize::Zeroize;

use crate::cipher::CipherEngine;
use crate::error::{CryptoError, Result};
use crate::keys::{check_key, check_key_for_encryption, random_bytes};

/// Output of [`seal`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub tag: Vec<u8>,
}

/// Nonce and tag lengths for a symmetric algorithm.
pub fn aead_shape(algorithm: Algorithm) -> Result<(usize, usize)> {
    match (algorithm.nonce_len(), algorithm.tag_len()) {
        (Some(nonce), Some(tag)) => Ok((nonce, tag)),
        _ => Err(CryptoError::Unsupported(format!(
            "{algorithm} is not a symmetric AEAD cipher"
        ))),
    }
}

/// Encrypt `plaintext` under a fresh random nonce.
pub fn seal(algorithm: Algorithm, key: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Sealed> {
    let (nonce_len, _) = aead_shape(algorithm)?;
    let nonce = random_bytes(nonce_len);
    let (ciphertext, tag) = match algorithm {
        Algorithm::Aes256Gcm => seal_with::<Aes256Gcm>(key, &nonce, aad, plaintext),
        Algorithm::ChaCha20Poly1305 => seal_with::<ChaCha20Poly1305>(key, &nonce, aad, plaintext),
        Algorithm::XChaCha20Poly1305 => {
            seal_with::<XChaCha20Poly1305>(key, &nonce, aad, plaintext)
        }
        other => unreachable_family(other),
    }?;
    Ok(Sealed {
        ciphertext,
        nonce,
        tag,
    })
}

/// Decrypt and authenticate. Any mismatch in key, nonce, tag, AAD or
/// ciphertext yields [`CryptoError::Authentication`] and no plaintext.
pub fn open(
    algorithm: Algorithm,
    key: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
    nonce: &[u8],
    tag: &[u8],
) -> Result<Vec<u8>> {
    let (nonce_len, tag_len) = aead_shape(algorithm)?;
    if nonce.len() != nonce_len {
        return Err(CryptoError::Format(format!(
            "{algorithm} nonce must be {nonce_len} bytes, got {}",
            nonce.len()
        )));
    }
    if tag.len() != tag_len {
        return Err(CryptoError::Format(format!(
            "{algorithm} tag must be {tag_len} bytes, got {}",
            tag.len()
        )));
    }
    match algorithm {
        Algorithm::Aes256Gcm => open_with::<Aes256Gcm>(key, nonce, aad, ciphertext, tag),
        Algorithm::ChaCha20Poly1305 => {
            open_with::<ChaCha20Poly1305>(key, nonce, aad, ciphertext, tag)
        }
        Algorithm::XChaCha20Poly1305 => {
            open_with::<XChaCha20Poly1305>(key, nonce, aad, ciphertext, tag)
        }
        other => unreachable_family(other),
    }
}

fn unreachable_family<T>(algorithm: Algorithm) -> Result<T> {
    Err(CryptoError::Unsupported(format!(
        "{algorithm} is not a symmetric AEAD cipher"
    )))
}

fn seal_with<C>(
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<(Vec<u8>, Vec<u8>)>
where
    C: KeyInit + AeadInPlace,
{
    let cipher = C::new_from_slice(key).map_err(|_| {
        CryptoError::InvalidKey(format!("invalid key length: {} bytes", key.len()))
    })?;

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::<C>::from_slice(nonce), aad, &mut buffer)
        .map_err(|e| CryptoError::Aead(format!("encryption failed: {e}")))?;
    Ok((buffer, tag.to_vec()))
}

fn open_with<C>(
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<Vec<u8>>
where
    C: KeyInit + AeadInPlace,
{
    let cipher = C::new_from_slice(key).map_err(|_| {
        CryptoError::InvalidKey(format!("invalid key length: {} bytes", key.len()))
    })?;

    let mut buffer = ciphertext.to_vec();
    match cipher.decrypt_in_place_detached(
        Nonce::<C>::from_slice(nonce),
        aad,
        &mut buffer,
        Tag::<C>::from_slice(tag),
    ) {
        Ok(()) => Ok(buffer),
        Err(_) => {
            buffer.zeroize();
            Err(CryptoError::Authentication(
                "invalid key, nonce, tag or associated data, or corrupted ciphertext".into(),
            ))
        }
    }
}

/// The symmetric family engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymmetricEngine;

impl CipherEngine for SymmetricEngine {
    fn family(&self) -> AlgorithmFamily {
        AlgorithmFamily::Symmetric
    }

    fn encrypt(
        &self,
        data: &[u8],
        algorithm: Algorithm,
        key: &CryptographicKey,
        associated_data: &[u8],
    ) -> Result<EncryptionResult> {
        let started = Instant::now();
        check_key_for_encryption(key, algorithm, now_epoch())?;
        let sealed = seal(algorithm, key.as_bytes(), associated_data, data)?;

        Ok(EncryptionResult {
            ciphertext: sealed.ciphertext,
            algorithm,
            nonce: Some(sealed.nonce),
            tag: Some(sealed.tag),
            key_id: Some(key.id),
            duration: started.elapsed(),
            timestamp: now_epoch(),
        })
    }

    fn decrypt(
        &self,
        ciphertext: &[u8],
        algorithm: Algorithm,
        key: &CryptographicKey,
        associated_data: &[u8],
        nonce: Option<&[u8]>,
        tag: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        check_key(key, algorithm)?;
        let nonce =
            nonce.ok_or_else(|| CryptoError::Format(format!("{algorithm} needs a nonce")))?;
        let tag = tag.ok_or_else(|| CryptoError::Format(format!("{algorithm} needs a tag")))?;
        open(algorithm, key.as_bytes(), associated_data, ciphertext, nonce, tag)
    }
}
