//! vseal-crypto: the cryptographic engines behind vitalseal
//!
//! Every operation takes its key explicitly; nothing in this crate keeps
//! issued keys around.
//!
//! Layout:
//! ```text
//! catalog     which algorithms the current configuration exposes
//! keys        key generation, size rules, key/algorithm compatibility
//! kdf         PBKDF2-HMAC-SHA256 password derivation, Argon2id master keys
//! keystore    engine master key + default derivation salt, key wrapping
//! aead        AES-256-GCM / ChaCha20-Poly1305 / XChaCha20-Poly1305, detached tags
//! unsupported asymmetric and post-quantum engines (interface only)
//! integrity   SHA-256 digests, constant-time comparison
//! stream      chunked, length-prefixed file container
//! rotation    key rotation bookkeeping
//! ```
//!
//! Container layout (all integers big-endian):
//! ```text
//! [u32 N][N bytes: JSON FileEncryptionMetadata]
//! repeat until EOF:
//!   [u32 M][M bytes: nonce || ciphertext || tag]   AAD = chunk_index (u64)
//! ```

pub mod aead;
pub mod catalog;
pub mod cipher;
pub mod error;
pub mod integrity;
pub mod kdf;
pub mod keys;
pub mod keystore;
pub mod rotation;
pub mod stream;
pub mod unsupported;

pub use aead::{open, seal, Sealed, SymmetricEngine};
pub use catalog::{ensure_supported, is_supported, parse_algorithm, supported_algorithms};
pub use cipher::CipherEngine;
pub use error::{CryptoError, Result};
pub use integrity::{digest_file, digest_reader, sha256_hex, validate_integrity};
pub use kdf::{derive_key, derive_master_key, Argon2Params, MasterKey};
pub use keys::{generate_key, resolve_key_bits};
pub use keystore::{KeyStore, WrappedKey};
pub use rotation::{KeyRotator, RotationTicket};
pub use stream::{decrypt_file, decrypt_stream, encrypt_file, encrypt_stream, read_metadata, StreamSummary};
pub use unsupported::{AsymmetricEngine, PostQuantumEngine};

/// Size of a symmetric key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AEAD authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const XNONCE_SIZE: usize = 24;

/// Size of the engine-wide default derivation salt
pub const SALT_SIZE: usize = 16;
