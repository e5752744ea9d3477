use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroize;

use crate::error::EngineError;

/// Current time as Unix epoch seconds.
pub fn now_epoch() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Algorithm family. Dispatch onto a sub-engine happens on this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlgorithmFamily {
    Symmetric,
    Asymmetric,
    PostQuantum,
}

impl fmt::Display for AlgorithmFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AlgorithmFamily::Symmetric => "symmetric",
            AlgorithmFamily::Asymmetric => "asymmetric",
            AlgorithmFamily::PostQuantum => "post-quantum",
        })
    }
}

/// Every algorithm the engine knows about.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Algorithm {
    /// AES-256-GCM, 96-bit nonce
    #[default]
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    /// ChaCha20-Poly1305 (RFC 8439), 96-bit nonce
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
    /// XChaCha20-Poly1305, 192-bit nonce
    #[serde(rename = "xchacha20-poly1305")]
    XChaCha20Poly1305,
    #[serde(rename = "rsa-4096")]
    Rsa4096,
    #[serde(rename = "ecdh-p256")]
    EcdhP256,
    #[serde(rename = "kyber-1024")]
    Kyber1024,
    #[serde(rename = "dilithium-5")]
    Dilithium5,
}

impl Algorithm {
    pub const ALL: [Algorithm; 7] = [
        Algorithm::Aes256Gcm,
        Algorithm::ChaCha20Poly1305,
        Algorithm::XChaCha20Poly1305,
        Algorithm::Rsa4096,
        Algorithm::EcdhP256,
        Algorithm::Kyber1024,
        Algorithm::Dilithium5,
    ];

    /// Canonical name, identical to the serialized form.
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Aes256Gcm => "aes-256-gcm",
            Algorithm::ChaCha20Poly1305 => "chacha20-poly1305",
            Algorithm::XChaCha20Poly1305 => "xchacha20-poly1305",
            Algorithm::Rsa4096 => "rsa-4096",
            Algorithm::EcdhP256 => "ecdh-p256",
            Algorithm::Kyber1024 => "kyber-1024",
            Algorithm::Dilithium5 => "dilithium-5",
        }
    }

    /// Case-insensitive lookup by canonical name.
    pub fn from_name(name: &str) -> Option<Algorithm> {
        let name = name.trim();
        Algorithm::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(name))
    }

    pub fn family(&self) -> AlgorithmFamily {
        match self {
            Algorithm::Aes256Gcm | Algorithm::ChaCha20Poly1305 | Algorithm::XChaCha20Poly1305 => {
                AlgorithmFamily::Symmetric
            }
            Algorithm::Rsa4096 | Algorithm::EcdhP256 => AlgorithmFamily::Asymmetric,
            Algorithm::Kyber1024 | Algorithm::Dilithium5 => AlgorithmFamily::PostQuantum,
        }
    }

    /// Key size used when the caller does not ask for one.
    pub fn default_key_bits(&self) -> u32 {
        match self {
            Algorithm::Aes256Gcm | Algorithm::ChaCha20Poly1305 | Algorithm::XChaCha20Poly1305 => {
                256
            }
            Algorithm::Rsa4096 => 4096,
            Algorithm::EcdhP256 => 256,
            Algorithm::Kyber1024 => 1024,
            Algorithm::Dilithium5 => 256,
        }
    }

    /// Nonce length in bytes, for AEAD ciphers only.
    pub fn nonce_len(&self) -> Option<usize> {
        match self {
            Algorithm::Aes256Gcm | Algorithm::ChaCha20Poly1305 => Some(12),
            Algorithm::XChaCha20Poly1305 => Some(24),
            _ => None,
        }
    }

    /// Authentication tag length in bytes, for AEAD ciphers only.
    pub fn tag_len(&self) -> Option<usize> {
        match self.family() {
            AlgorithmFamily::Symmetric => Some(16),
            _ => None,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key material issued by the key manager.
///
/// The engine does not keep a copy; the caller owns persistence. Key bytes
/// are zeroized on drop and never printed.
#[derive(Clone)]
pub struct CryptographicKey {
    pub id: Uuid,
    pub algorithm: Algorithm,
    pub key_bits: u32,
    /// Unix epoch seconds
    pub created_at: u64,
    /// Unix epoch seconds; `None` means the key never expires
    pub expires_at: Option<u64>,
    material: Vec<u8>,
}

impl CryptographicKey {
    pub fn from_parts(
        id: Uuid,
        algorithm: Algorithm,
        material: Vec<u8>,
        created_at: u64,
        expires_at: Option<u64>,
    ) -> Self {
        let key_bits = (material.len() * 8) as u32;
        Self {
            id,
            algorithm,
            key_bits,
            created_at,
            expires_at,
            material,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.material
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

impl Drop for CryptographicKey {
    fn drop(&mut self) {
        self.material.zeroize();
    }
}

impl fmt::Debug for CryptographicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptographicKey")
            .field("id", &self.id)
            .field("algorithm", &self.algorithm)
            .field("key_bits", &self.key_bits)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("material", &"[REDACTED]")
            .finish()
    }
}

/// A key derived from a password.
///
/// The salt must be persisted by the caller: without it the same key cannot
/// be derived again.
#[derive(Clone)]
pub struct DerivedKey {
    pub salt: Vec<u8>,
    pub iterations: u32,
    /// Unix epoch seconds
    pub derived_at: u64,
    bytes: Vec<u8>,
}

impl DerivedKey {
    pub fn new(bytes: Vec<u8>, salt: Vec<u8>, iterations: u32, derived_at: u64) -> Self {
        Self {
            salt,
            iterations,
            derived_at,
            bytes,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Turn the derived bytes into a key usable by the cipher engines.
    pub fn into_key(self, algorithm: Algorithm, expires_at: Option<u64>) -> CryptographicKey {
        CryptographicKey::from_parts(
            Uuid::new_v4(),
            algorithm,
            self.bytes.clone(),
            self.derived_at,
            expires_at,
        )
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKey")
            .field("salt_len", &self.salt.len())
            .field("iterations", &self.iterations)
            .field("derived_at", &self.derived_at)
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Output of a single-buffer encryption.
///
/// For symmetric algorithms `nonce` and `tag` are always present and must be
/// handed back, with the same key, to decrypt. The tag is never part of
/// `ciphertext`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionResult {
    pub ciphertext: Vec<u8>,
    pub algorithm: Algorithm,
    pub nonce: Option<Vec<u8>>,
    pub tag: Option<Vec<u8>>,
    pub key_id: Option<Uuid>,
    pub duration: Duration,
    /// Unix epoch seconds
    pub timestamp: u64,
}

/// Header of the streaming container, written once ahead of the chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEncryptionMetadata {
    /// Container format version
    pub version: u32,
    pub algorithm: Algorithm,
    /// Plaintext size in bytes
    pub file_size: u64,
    /// Plaintext bytes per chunk (the last chunk may be shorter)
    pub chunk_size: u64,
    /// Hex SHA-256 of the plaintext, computed before encryption
    pub checksum: String,
    /// Unix epoch seconds
    pub encrypted_at: u64,
}

#[derive(Debug, Clone)]
pub struct FileEncryptionResult {
    pub output_path: PathBuf,
    pub metadata: FileEncryptionMetadata,
    /// The key the file was sealed with. When the engine generated it, this
    /// is the only copy.
    pub key: CryptographicKey,
    pub bytes_processed: u64,
    pub chunks: u64,
}

#[derive(Debug, Clone)]
pub struct FileDecryptionResult {
    pub output_path: PathBuf,
    pub metadata: FileEncryptionMetadata,
    pub bytes_written: u64,
    pub chunks: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRotationResult {
    pub old_key_id: Uuid,
    pub new_key_id: Uuid,
    /// Unix epoch seconds
    pub rotated_at: u64,
    pub algorithm: Algorithm,
    pub success: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationStatus {
    #[default]
    Current,
    Rotating,
    Failed,
}

impl fmt::Display for RotationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RotationStatus::Current => "current",
            RotationStatus::Rotating => "rotating",
            RotationStatus::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityValidationResult {
    pub is_valid: bool,
    /// Hex SHA-256 of the data
    pub computed_hash: String,
    pub expected_hash: Option<String>,
    /// The encryption algorithm the data was protected with (bookkeeping only)
    pub algorithm: Algorithm,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncryptionMetrics {
    pub total_operations: u64,
    /// Operations per second over the last sampling window
    pub operations_per_second: f64,
    /// Unix epoch seconds of the last successful rotation
    pub last_key_rotation: Option<u64>,
    pub supported_algorithms: usize,
}

/// Observable engine status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    #[default]
    Idle,
    Encrypting,
    Decrypting,
    Completed,
    Failed,
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EngineStatus::Idle => "idle",
            EngineStatus::Encrypting => "encrypting",
            EngineStatus::Decrypting => "decrypting",
            EngineStatus::Completed => "completed",
            EngineStatus::Failed => "failed",
        })
    }
}

/// One variant per facade operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Encrypt,
    Decrypt,
    GenerateKey,
    DeriveKey,
    EncryptFile,
    DecryptFile,
    RotateKeys,
    ValidateIntegrity,
    WrapKey,
    UnwrapKey,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Encrypt => "encrypt",
            OperationKind::Decrypt => "decrypt",
            OperationKind::GenerateKey => "generate_key",
            OperationKind::DeriveKey => "derive_key",
            OperationKind::EncryptFile => "encrypt_file",
            OperationKind::DecryptFile => "decrypt_file",
            OperationKind::RotateKeys => "rotate_keys",
            OperationKind::ValidateIntegrity => "validate_integrity",
            OperationKind::WrapKey => "wrap_key",
            OperationKind::UnwrapKey => "unwrap_key",
        }
    }

    /// Status published while the operation is in flight.
    pub fn busy_status(&self) -> EngineStatus {
        match self {
            OperationKind::Decrypt
            | OperationKind::DecryptFile
            | OperationKind::UnwrapKey
            | OperationKind::ValidateIntegrity => EngineStatus::Decrypting,
            _ => EngineStatus::Encrypting,
        }
    }

    /// The error kind an internal failure of this operation maps to.
    pub fn failure(&self, reason: impl Into<String>) -> EngineError {
        let reason = reason.into();
        match self {
            OperationKind::Encrypt | OperationKind::WrapKey => EngineError::EncryptionFailed(reason),
            OperationKind::Decrypt | OperationKind::UnwrapKey => {
                EngineError::DecryptionFailed(reason)
            }
            OperationKind::GenerateKey => EngineError::KeyGenerationFailed(reason),
            OperationKind::DeriveKey => EngineError::KeyDerivationFailed(reason),
            OperationKind::EncryptFile => EngineError::FileEncryptionFailed(reason),
            OperationKind::DecryptFile => EngineError::FileDecryptionFailed(reason),
            OperationKind::RotateKeys => EngineError::KeyRotationFailed(reason),
            OperationKind::ValidateIntegrity => EngineError::IntegrityValidationFailed(reason),
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
