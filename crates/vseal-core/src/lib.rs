pub mod config;
pub mod error;
pub mod types;

pub use config::{EncryptionConfiguration, KdfConfig, LoggingConfig};
pub use error::{ConfigError, EngineError, EngineResult};
pub use types::{
    now_epoch, Algorithm, AlgorithmFamily, CryptographicKey, DerivedKey, EncryptionMetrics,
    EncryptionResult, EngineStatus, FileDecryptionResult, FileEncryptionMetadata,
    FileEncryptionResult, IntegrityValidationResult, KeyRotationResult, OperationKind,
    RotationStatus,
};
