use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{Algorithm, AlgorithmFamily};

/// Largest chunk size the stream codec accepts (64 MiB)
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Engine configuration (loaded from vitalseal.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfiguration {
    /// Cipher used when a call does not name one
    pub default_algorithm: Algorithm,
    /// Expose the post-quantum family in the catalog
    pub enable_post_quantum_crypto: bool,
    /// How often the caller is expected to rotate (default: 30 days)
    pub key_rotation_interval_secs: u64,
    /// Lifetime stamped on generated keys (default: 90 days)
    pub max_key_age_secs: u64,
    /// Key escrow hook; no backend exists, enabling it only logs a warning
    pub enable_key_escrow: bool,
    /// Metrics sampling window (default: 5s)
    pub metrics_update_interval_secs: u64,
    /// Advisory only
    pub performance_optimization: bool,
    /// Plaintext bytes per stream chunk (default: 1 MiB)
    pub chunk_size: usize,
    /// Crypto worker pool size (0 = available parallelism)
    pub worker_threads: usize,
    /// Per-operation timeout (0 = none)
    pub operation_timeout_secs: u64,
    /// PBKDF2 iterations used when `derive_key` is not given a count
    pub default_derivation_iterations: u32,
    pub kdf: KdfConfig,
    pub logging: LoggingConfig,
}

impl Default for EncryptionConfiguration {
    fn default() -> Self {
        Self {
            default_algorithm: Algorithm::Aes256Gcm,
            enable_post_quantum_crypto: false,
            key_rotation_interval_secs: 30 * 24 * 60 * 60,
            max_key_age_secs: 90 * 24 * 60 * 60,
            enable_key_escrow: false,
            metrics_update_interval_secs: 5,
            performance_optimization: true,
            chunk_size: 1024 * 1024,
            worker_threads: 0,
            operation_timeout_secs: 0,
            default_derivation_iterations: 100_000,
            kdf: KdfConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Argon2id parameters for deriving a master key from a passphrase
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfConfig {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub mem_cost_kib: u32,
    /// Time cost / iterations (default: 3)
    pub time_cost: u32,
    /// Parallelism (default: 4)
    pub parallelism: u32,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            mem_cost_kib: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl EncryptionConfiguration {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::warn!(
                "config file not found: {}  (using defaults)",
                path.display()
            );
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::Invalid(format!(
                "chunk_size must be between 1 and {MAX_CHUNK_SIZE} bytes, got {}",
                self.chunk_size
            )));
        }
        if self.default_algorithm.family() == AlgorithmFamily::PostQuantum
            && !self.enable_post_quantum_crypto
        {
            return Err(ConfigError::Invalid(format!(
                "default_algorithm {} requires enable_post_quantum_crypto",
                self.default_algorithm
            )));
        }
        if self.metrics_update_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "metrics_update_interval_secs must be at least 1".into(),
            ));
        }
        if self.default_derivation_iterations == 0 {
            return Err(ConfigError::Invalid(
                "default_derivation_iterations must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn max_key_age(&self) -> Duration {
        Duration::from_secs(self.max_key_age_secs)
    }

    pub fn key_rotation_interval(&self) -> Duration {
        Duration::from_secs(self.key_rotation_interval_secs)
    }

    pub fn metrics_update_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_update_interval_secs)
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        (self.operation_timeout_secs > 0).then(|| Duration::from_secs(self.operation_timeout_secs))
    }

    /// Worker pool size with `0` resolved to the available parallelism.
    pub fn effective_worker_threads(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
default_algorithm = "chacha20-poly1305"
enable_post_quantum_crypto = true
key_rotation_interval_secs = 86400
max_key_age_secs = 604800
enable_key_escrow = false
metrics_update_interval_secs = 10
performance_optimization = false
chunk_size = 65536
worker_threads = 2
operation_timeout_secs = 30
default_derivation_iterations = 200000

[kdf]
mem_cost_kib = 131072
time_cost = 4
parallelism = 8

[logging]
level = "debug"
format = "json"
"#;
        let config = EncryptionConfiguration::from_toml_str(toml_str).unwrap();

        assert_eq!(config.default_algorithm, Algorithm::ChaCha20Poly1305);
        assert!(config.enable_post_quantum_crypto);
        assert_eq!(config.key_rotation_interval(), Duration::from_secs(86400));
        assert_eq!(config.max_key_age(), Duration::from_secs(604800));
        assert_eq!(config.chunk_size, 65536);
        assert_eq!(config.effective_worker_threads(), 2);
        assert_eq!(config.operation_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.default_derivation_iterations, 200_000);
        assert_eq!(config.kdf.mem_cost_kib, 131072);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_parse_defaults() {
        let config = EncryptionConfiguration::from_toml_str("").unwrap();

        assert_eq!(config.default_algorithm, Algorithm::Aes256Gcm);
        assert!(!config.enable_post_quantum_crypto);
        assert!(!config.enable_key_escrow);
        assert_eq!(config.chunk_size, 1024 * 1024);
        assert_eq!(config.metrics_update_interval(), Duration::from_secs(5));
        assert_eq!(config.operation_timeout(), None);
        assert_eq!(config.default_derivation_iterations, 100_000);
        assert_eq!(config.kdf.time_cost, 3);
        assert_eq!(config.logging.level, "info");
        assert!(config.effective_worker_threads() >= 1);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[kdf]
time_cost = 1
"#;
        let config = EncryptionConfiguration::from_toml_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.kdf.time_cost, 1);
        // Defaults
        assert_eq!(config.kdf.mem_cost_kib, 65536);
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn test_rejects_post_quantum_default_when_disabled() {
        let err = EncryptionConfiguration::from_toml_str(r#"default_algorithm = "kyber-1024""#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_bad_chunk_size() {
        let err = EncryptionConfiguration::from_toml_str("chunk_size = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_unknown_algorithm() {
        let err = EncryptionConfiguration::from_toml_str(r#"default_algorithm = "des""#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = EncryptionConfiguration::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed = EncryptionConfiguration::from_toml_str(&toml_str).unwrap();

        assert_eq!(config.default_algorithm, parsed.default_algorithm);
        assert_eq!(config.max_key_age_secs, parsed.max_key_age_secs);
        assert_eq!(config.kdf.parallelism, parsed.kdf.parallelism);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EncryptionConfiguration::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.chunk_size, 1024 * 1024);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vitalseal.toml");
        std::fs::write(&path, "worker_threads = 3\n").unwrap();

        let config = EncryptionConfiguration::load(&path).unwrap();
        assert_eq!(config.worker_threads, 3);
    }
}
