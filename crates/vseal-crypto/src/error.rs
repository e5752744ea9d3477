use thiserror::Error;
use vseal_core::{EngineError, OperationKind};

pub type Result<T> = std::result::Result<T, CryptoError>;

/// Failures raised inside the crypto engines.
///
/// The facade maps each of these onto an [`EngineError`] kind with
/// [`CryptoError::into_engine_error`], using the operation that failed.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Algorithm outside the catalog, or a family with no implementation
    #[error("{0}")]
    Unsupported(String),

    /// Key size or algorithm does not fit the operation
    #[error("{0}")]
    InvalidKey(String),

    /// AEAD tag check failed: wrong key, nonce, AAD or tampered data
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("cipher error: {0}")]
    Aead(String),

    #[error("key derivation: {0}")]
    Kdf(String),

    /// Malformed container, metadata or wrapped key
    #[error("malformed input: {0}")]
    Format(String),

    #[error("key rotation: {0}")]
    Rotation(String),

    /// The caller gave up on the operation before it finished
    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl CryptoError {
    /// Convert into the caller-facing kind for `op`.
    ///
    /// Unsupported algorithms and unusable keys keep their own kinds and a
    /// cancellation is a system error. Everything else becomes the failure
    /// kind of the operation.
    pub fn into_engine_error(self, op: OperationKind) -> EngineError {
        match self {
            CryptoError::Unsupported(reason) => EngineError::UnsupportedAlgorithm(reason),
            CryptoError::InvalidKey(reason) => EngineError::InvalidKey(reason),
            CryptoError::Cancelled => EngineError::SystemError(format!("{op} cancelled")),
            other => op.failure(other.to_string()),
        }
    }
}
