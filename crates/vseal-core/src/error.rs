use std::path::PathBuf;

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Failure kinds surfaced by the engine facade.
///
/// Every internal failure is converted to exactly one of these before it
/// reaches a caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),

    #[error("key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("key rotation failed: {0}")]
    KeyRotationFailed(String),

    #[error("file encryption failed: {0}")]
    FileEncryptionFailed(String),

    #[error("file decryption failed: {0}")]
    FileDecryptionFailed(String),

    #[error("integrity validation failed: {0}")]
    IntegrityValidationFailed(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("system error: {0}")]
    SystemError(String),
}

impl EngineError {
    /// Caller mistakes: retrying with corrected parameters can succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::UnsupportedAlgorithm(_) | EngineError::InvalidKey(_)
        )
    }

    /// Whether retrying the identical call could ever succeed.
    ///
    /// Buffer decryption does no I/O, so `DecryptionFailed` is always a
    /// deterministic authentication or format failure. `FileDecryptionFailed`
    /// also covers I/O failures (missing input, full disk) and stays
    /// retryable. A `SystemError` means the engine instance is gone.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            EngineError::DecryptionFailed(_)
                | EngineError::UnsupportedAlgorithm(_)
                | EngineError::InvalidKey(_)
                | EngineError::SystemError(_)
        )
    }

    pub fn reason(&self) -> &str {
        match self {
            EngineError::EncryptionFailed(r)
            | EngineError::DecryptionFailed(r)
            | EngineError::KeyGenerationFailed(r)
            | EngineError::KeyDerivationFailed(r)
            | EngineError::KeyRotationFailed(r)
            | EngineError::FileEncryptionFailed(r)
            | EngineError::FileDecryptionFailed(r)
            | EngineError::IntegrityValidationFailed(r)
            | EngineError::UnsupportedAlgorithm(r)
            | EngineError::InvalidKey(r)
            | EngineError::SystemError(r) => r,
        }
    }
}

/// Errors raised while loading or validating an `EncryptionConfiguration`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
