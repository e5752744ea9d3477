use std::io::Cursor;
use std::time::Duration;

use vseal_core::Algorithm;
use vseal_crypto::{decrypt_stream, derive_key, encrypt_stream, generate_key, open, seal};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

fn never() -> bool {
    false
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_seal_aes_gcm(bencher: divan::Bencher, size: usize) {
    let key = generate_key(Algorithm::Aes256Gcm, None, Duration::ZERO).unwrap();
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            seal(
                Algorithm::Aes256Gcm,
                divan::black_box(key.as_bytes()),
                b"",
                divan::black_box(&data),
            )
            .unwrap()
        });
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_seal_chacha20(bencher: divan::Bencher, size: usize) {
    let key = generate_key(Algorithm::ChaCha20Poly1305, None, Duration::ZERO).unwrap();
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            seal(
                Algorithm::ChaCha20Poly1305,
                divan::black_box(key.as_bytes()),
                b"",
                divan::black_box(&data),
            )
            .unwrap()
        });
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_open_aes_gcm(bencher: divan::Bencher, size: usize) {
    let key = generate_key(Algorithm::Aes256Gcm, None, Duration::ZERO).unwrap();
    let data = make_data(size);
    let sealed = seal(Algorithm::Aes256Gcm, key.as_bytes(), b"", &data).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            open(
                Algorithm::Aes256Gcm,
                divan::black_box(key.as_bytes()),
                b"",
                divan::black_box(&sealed.ciphertext),
                &sealed.nonce,
                &sealed.tag,
            )
            .unwrap()
        });
}

#[divan::bench(args = [4 * 1048576])]
fn bench_stream_roundtrip(bencher: divan::Bencher, size: usize) {
    let key = generate_key(Algorithm::XChaCha20Poly1305, None, Duration::ZERO).unwrap();
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            let mut container = Vec::with_capacity(size + 4096);
            encrypt_stream(&mut Cursor::new(&data), &mut container, &key, 1048576, &never)
                .unwrap();
            let mut plain = Vec::with_capacity(size);
            decrypt_stream(&mut Cursor::new(&container), &mut plain, &key, &never).unwrap();
            plain
        });
}

#[divan::bench(sample_count = 10)]
fn bench_pbkdf2_100k(bencher: divan::Bencher) {
    bencher.bench(|| {
        derive_key(
            divan::black_box(b"correct horse battery staple"),
            b"0123456789abcdef",
            100_000,
            32,
        )
        .unwrap()
    });
}

fn main() {
    divan::main();
}
