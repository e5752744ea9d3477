//! File-level round trips through the chunked container.
//!
//! Covers chunk-boundary sizes, the checksum recorded in the header, and
//! the ways a container can be damaged or opened with the wrong key.

use proptest::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use vseal_core::{Algorithm, CryptographicKey};
use vseal_crypto::{
    decrypt_file, encrypt_file, generate_key, read_metadata, sha256_hex, CryptoError,
};

const CHUNK: usize = 1024 * 1024;

fn never() -> bool {
    false
}

fn test_key(algorithm: Algorithm) -> CryptographicKey {
    generate_key(algorithm, None, Duration::from_secs(3600)).expect("generate key")
}

fn pattern(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(31) ^ (i >> 7)) as u8)
        .collect()
}

fn write_test_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("write test file");
    path
}

fn roundtrip(algorithm: Algorithm, size: usize, chunk_size: usize) {
    let tmp = TempDir::new().unwrap();
    let data = pattern(size);
    let src = write_test_file(tmp.path(), "plain.bin", &data);
    let sealed = tmp.path().join("plain.bin.vseal");
    let restored = tmp.path().join("out/restored.bin");
    let key = test_key(algorithm);

    let enc = encrypt_file(&src, &sealed, &key, chunk_size, &never).unwrap();
    assert_eq!(enc.bytes, size as u64);
    assert_eq!(enc.chunks as usize, size.div_ceil(chunk_size));
    assert_eq!(enc.metadata.file_size, size as u64);

    let dec = decrypt_file(&sealed, &restored, &key, &never).unwrap();
    assert_eq!(dec.bytes, size as u64);
    assert_eq!(dec.chunks, enc.chunks);
    assert_eq!(dec.metadata, enc.metadata);
    assert_eq!(std::fs::read(&restored).unwrap(), data, "size {size}");
}

#[test]
fn chunk_boundary_sizes() {
    let chunk = 4096;
    for size in [0, 1, chunk - 1, chunk, chunk + 1, 3 * chunk] {
        roundtrip(Algorithm::Aes256Gcm, size, chunk);
    }
}

#[test]
fn every_symmetric_cipher_roundtrips() {
    for algorithm in [
        Algorithm::Aes256Gcm,
        Algorithm::ChaCha20Poly1305,
        Algorithm::XChaCha20Poly1305,
    ] {
        roundtrip(algorithm, 10_000, 1000);
    }
}

#[test]
fn two_and_a_half_mib_is_three_chunks() {
    let tmp = TempDir::new().unwrap();
    let data = pattern(CHUNK * 5 / 2);
    let src = write_test_file(tmp.path(), "big.bin", &data);
    let sealed = tmp.path().join("big.vseal");
    let key = test_key(Algorithm::ChaCha20Poly1305);

    let enc = encrypt_file(&src, &sealed, &key, CHUNK, &never).unwrap();
    assert_eq!(enc.chunks, 3);
    assert_eq!(enc.metadata.checksum, sha256_hex(&data));

    let mut reader = std::fs::File::open(&sealed).unwrap();
    let header = read_metadata(&mut reader).unwrap();
    assert_eq!(header.file_size, data.len() as u64);
    assert_eq!(header.chunk_size, CHUNK as u64);
    assert_eq!(header.algorithm, Algorithm::ChaCha20Poly1305);
}

#[test]
fn wrong_key_fails_and_writes_nothing() {
    let tmp = TempDir::new().unwrap();
    let src = write_test_file(tmp.path(), "plain.bin", &pattern(5000));
    let sealed = tmp.path().join("plain.vseal");
    let restored = tmp.path().join("restored.bin");

    encrypt_file(&src, &sealed, &test_key(Algorithm::Aes256Gcm), 1024, &never).unwrap();
    let err = decrypt_file(&sealed, &restored, &test_key(Algorithm::Aes256Gcm), &never)
        .unwrap_err();

    assert!(matches!(err, CryptoError::Authentication(_)));
    assert!(!restored.exists());
}

#[test]
fn tampered_header_checksum_is_detected() {
    let tmp = TempDir::new().unwrap();
    let data = pattern(3000);
    let src = write_test_file(tmp.path(), "plain.bin", &data);
    let sealed = tmp.path().join("plain.vseal");
    let restored = tmp.path().join("restored.bin");
    let key = test_key(Algorithm::Aes256Gcm);

    encrypt_file(&src, &sealed, &key, 1024, &never).unwrap();

    // The header is unauthenticated JSON; swap in the checksum of other data.
    let mut bytes = std::fs::read(&sealed).unwrap();
    let original = sha256_hex(&data);
    let start = bytes
        .windows(original.len())
        .position(|w| w == original.as_bytes())
        .expect("checksum present in header");
    bytes[start..start + original.len()].copy_from_slice(sha256_hex(b"other").as_bytes());
    std::fs::write(&sealed, &bytes).unwrap();

    let err = decrypt_file(&sealed, &restored, &key, &never).unwrap_err();
    assert!(matches!(err, CryptoError::Format(_)));
    assert!(!restored.exists());
}

#[test]
fn missing_input_is_io_error() {
    let tmp = TempDir::new().unwrap();
    let key = test_key(Algorithm::Aes256Gcm);
    let err = encrypt_file(
        &tmp.path().join("absent.bin"),
        &tmp.path().join("out.vseal"),
        &key,
        1024,
        &never,
    )
    .unwrap_err();
    assert!(matches!(err, CryptoError::Io(_)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn any_size_any_chunking_roundtrips(
        data in proptest::collection::vec(any::<u8>(), 0..=20_000),
        chunk_size in 1usize..=4096,
    ) {
        let tmp = TempDir::new().unwrap();
        let src = write_test_file(tmp.path(), "p.bin", &data);
        let sealed = tmp.path().join("p.vseal");
        let restored = tmp.path().join("r.bin");
        let key = test_key(Algorithm::XChaCha20Poly1305);

        let enc = encrypt_file(&src, &sealed, &key, chunk_size, &never).unwrap();
        prop_assert_eq!(enc.chunks as usize, data.len().div_ceil(chunk_size));

        decrypt_file(&sealed, &restored, &key, &never).unwrap();
        prop_assert_eq!(std::fs::read(&restored).unwrap(), data);
    }
}
