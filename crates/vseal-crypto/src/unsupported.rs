//! Asymmetric and post-quantum engines.
//!
//! Both families are part of the catalog and of the dispatch surface, but no
//! primitive is wired in: every call fails with `Unsupported`.

use vseal_core::{Algorithm, AlgorithmFamily, CryptographicKey, EncryptionResult};

use crate::cipher::CipherEngine;
use crate::error::{CryptoError, Result};

fn not_implemented(family: AlgorithmFamily, algorithm: Algorithm) -> CryptoError {
    CryptoError::Unsupported(format!(
        "{algorithm}: {family} encryption is not implemented"
    ))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AsymmetricEngine;

impl CipherEngine for AsymmetricEngine {
    fn family(&self) -> AlgorithmFamily {
        AlgorithmFamily::Asymmetric
    }

    fn encrypt(
        &self,
        _data: &[u8],
        algorithm: Algorithm,
        _key: &CryptographicKey,
        _associated_data: &[u8],
    ) -> Result<EncryptionResult> {
        Err(not_implemented(self.family(), algorithm))
    }

    fn decrypt(
        &self,
        _ciphertext: &[u8],
        algorithm: Algorithm,
        _key: &CryptographicKey,
        _associated_data: &[u8],
        _nonce: Option<&[u8]>,
        _tag: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        Err(not_implemented(self.family(), algorithm))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PostQuantumEngine;

impl CipherEngine for PostQuantumEngine {
    fn family(&self) -> AlgorithmFamily {
        AlgorithmFamily::PostQuantum
    }

    fn encrypt(
        &self,
        _data: &[u8],
        algorithm: Algorithm,
        _key: &CryptographicKey,
        _associated_data: &[u8],
    ) -> Result<EncryptionResult> {
        Err(not_implemented(self.family(), algorithm))
    }

    fn decrypt(
        &self,
        _ciphertext: &[u8],
        algorithm: Algorithm,
        _key: &CryptographicKey,
        _associated_data: &[u8],
        _nonce: Option<&[u8]>,
        _tag: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        Err(not_implemented(self.family(), algorithm))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_key;
    use std::time::Duration;

    #[test]
    fn test_asymmetric_refuses() {
        let key = generate_key(Algorithm::Rsa4096, None, Duration::ZERO).unwrap();
        let err = AsymmetricEngine
            .encrypt(b"data", Algorithm::Rsa4096, &key, b"")
            .unwrap_err();
        assert!(matches!(err, CryptoError::Unsupported(msg) if msg.contains("rsa-4096")));
        assert!(AsymmetricEngine
            .decrypt(b"data", Algorithm::Rsa4096, &key, b"", None, None)
            .is_err());
    }

    #[test]
    fn test_post_quantum_refuses() {
        let key = generate_key(Algorithm::Kyber1024, None, Duration::ZERO).unwrap();
        let err = PostQuantumEngine
            .encrypt(b"data", Algorithm::Kyber1024, &key, b"")
            .unwrap_err();
        assert!(matches!(err, CryptoError::Unsupported(msg) if msg.contains("post-quantum")));
    }
}
