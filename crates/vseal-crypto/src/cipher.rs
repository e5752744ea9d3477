use vseal_core::{Algorithm, AlgorithmFamily, CryptographicKey, EncryptionResult};

use crate::error::Result;

/// One engine per algorithm family. The facade picks an engine by
/// [`Algorithm::family`] and hands it the whole request.
pub trait CipherEngine: Send + Sync {
    fn family(&self) -> AlgorithmFamily;

    fn encrypt(
        &self,
        data: &[u8],
        algorithm: Algorithm,
        key: &CryptographicKey,
        associated_data: &[u8],
    ) -> Result<EncryptionResult>;

    /// `nonce` and `tag` are the values returned in the `EncryptionResult`.
    fn decrypt(
        &self,
        ciphertext: &[u8],
        algorithm: Algorithm,
        key: &CryptographicKey,
        associated_data: &[u8],
        nonce: Option<&[u8]>,
        tag: Option<&[u8]>,
    ) -> Result<Vec<u8>>;
}
