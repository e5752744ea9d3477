//! Algorithm catalog: what the current configuration lets callers use

use std::collections::BTreeSet;

use vseal_core::{Algorithm, AlgorithmFamily, EncryptionConfiguration};

use crate::error::{CryptoError, Result};

fn family_enabled(config: &EncryptionConfiguration, family: AlgorithmFamily) -> bool {
    match family {
        AlgorithmFamily::Symmetric | AlgorithmFamily::Asymmetric => true,
        AlgorithmFamily::PostQuantum => config.enable_post_quantum_crypto,
    }
}

/// Algorithms exposed under `config`.
///
/// Asymmetric algorithms are listed although their engine refuses every
/// operation; post-quantum ones only appear with `enable_post_quantum_crypto`.
pub fn supported_algorithms(config: &EncryptionConfiguration) -> BTreeSet<Algorithm> {
    Algorithm::ALL
        .into_iter()
        .filter(|a| family_enabled(config, a.family()))
        .collect()
}

pub fn is_supported(config: &EncryptionConfiguration, algorithm: Algorithm) -> bool {
    family_enabled(config, algorithm.family())
}

pub fn ensure_supported(config: &EncryptionConfiguration, algorithm: Algorithm) -> Result<()> {
    if is_supported(config, algorithm) {
        return Ok(());
    }
    Err(CryptoError::Unsupported(format!(
        "{algorithm} is not enabled ({} algorithms require enable_post_quantum_crypto)",
        algorithm.family()
    )))
}

/// Resolve a caller-supplied algorithm name.
pub fn parse_algorithm(name: &str) -> Result<Algorithm> {
    Algorithm::from_name(name)
        .ok_or_else(|| CryptoError::Unsupported(format!("unknown algorithm: {name:?}")))
}
