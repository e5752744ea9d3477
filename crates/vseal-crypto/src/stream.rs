//! Chunked file container
//!
//! Layout (all integers big-endian):
//! ```text
//! [u32 N][N bytes: JSON FileEncryptionMetadata]
//! repeat until EOF:
//!   [u32 M][M bytes: nonce || ciphertext || tag]
//! ```
//!
//! Each chunk is sealed independently under the file key with
//! AAD = chunk_index (u64 BE), so chunks cannot be reordered, dropped from
//! the middle or spliced in from another file without failing
//! authentication. Every chunk but the last carries exactly `chunk_size`
//! plaintext bytes; an empty file has no chunks at all.
//!
//! Truncation after a whole chunk is caught by the `file_size` and
//! `checksum` recorded in the metadata header.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use vseal_core::config::MAX_CHUNK_SIZE;
use vseal_core::{now_epoch, CryptographicKey, FileEncryptionMetadata};
use zeroize::Zeroize;

use crate::aead::{aead_shape, open, seal, Sealed};
use crate::error::{CryptoError, Result};
use crate::integrity::{digest_reader, digests_match};
use crate::keys::{check_key, check_key_for_encryption};

/// Container format version written into the metadata header
pub const FORMAT_VERSION: u32 = 1;

/// Upper bound on the JSON metadata header
pub const MAX_METADATA_LEN: usize = 64 * 1024;

const LEN_PREFIX: usize = 4;

/// What a stream pass processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    pub metadata: FileEncryptionMetadata,
    /// Plaintext bytes read (encrypt) or written (decrypt)
    pub bytes: u64,
    pub chunks: u64,
}

/// Build AAD: chunk_index (8 bytes BE)
fn chunk_aad(chunk_index: u64) -> [u8; 8] {
    chunk_index.to_be_bytes()
}

/// Encrypt everything `reader` yields from its current position.
///
/// The source is read twice: once for the SHA-256 checksum recorded in the
/// header, then again for the chunks. A source that changes size between
/// the passes fails the operation.
pub fn encrypt_stream<R, W>(
    reader: &mut R,
    writer: &mut W,
    key: &CryptographicKey,
    chunk_size: usize,
    cancelled: &dyn Fn() -> bool,
) -> Result<StreamSummary>
where
    R: Read + Seek,
    W: Write,
{
    if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
        return Err(CryptoError::Format(format!(
            "chunk size must be between 1 and {MAX_CHUNK_SIZE} bytes, got {chunk_size}"
        )));
    }
    let algorithm = key.algorithm;
    aead_shape(algorithm)?;
    check_key_for_encryption(key, algorithm, now_epoch())?;

    let start = reader.stream_position()?;
    let (checksum, file_size) = digest_reader(reader)?;
    reader.seek(SeekFrom::Start(start))?;

    let metadata = FileEncryptionMetadata {
        version: FORMAT_VERSION,
        algorithm,
        file_size,
        chunk_size: chunk_size as u64,
        checksum,
        encrypted_at: now_epoch(),
    };
    let header = serde_json::to_vec(&metadata)
        .map_err(|e| CryptoError::Format(format!("serializing metadata: {e}")))?;
    write_frame_len(writer, header.len())?;
    writer.write_all(&header)?;

    let mut buf = vec![0u8; chunk_size];
    let mut chunk_index = 0u64;
    let mut processed = 0u64;
    let result = loop {
        if cancelled() {
            break Err(CryptoError::Cancelled);
        }
        let n = match read_full(reader, &mut buf) {
            Ok(n) => n,
            Err(e) => break Err(e.into()),
        };
        if n == 0 {
            break Ok(());
        }

        let aad = chunk_aad(chunk_index);
        let sealed = match seal(algorithm, key.as_bytes(), &aad, &buf[..n]) {
            Ok(sealed) => sealed,
            Err(e) => break Err(e),
        };
        if let Err(e) = write_chunk(writer, &sealed) {
            break Err(e.into());
        }

        processed += n as u64;
        chunk_index += 1;
        if n < chunk_size {
            break Ok(());
        }
    };
    buf.zeroize();
    result?;

    if processed != file_size {
        return Err(CryptoError::Format(format!(
            "source changed while encrypting: hashed {file_size} bytes, encrypted {processed}"
        )));
    }
    writer.flush()?;

    tracing::debug!(
        %algorithm,
        bytes = processed,
        chunks = chunk_index,
        "encrypted stream"
    );
    Ok(StreamSummary {
        metadata,
        bytes: processed,
        chunks: chunk_index,
    })
}

/// Read and validate the metadata header of a container.
pub fn read_metadata<R: Read>(reader: &mut R) -> Result<FileEncryptionMetadata> {
    let len = read_frame_len(reader)?
        .ok_or_else(|| CryptoError::Format("missing metadata header".into()))?;
    if len == 0 || len > MAX_METADATA_LEN {
        return Err(CryptoError::Format(format!(
            "metadata header length {len} out of range (1..={MAX_METADATA_LEN})"
        )));
    }
    let mut header = vec![0u8; len];
    reader
        .read_exact(&mut header)
        .map_err(|e| truncated(e, "metadata header"))?;

    let metadata: FileEncryptionMetadata = serde_json::from_slice(&header)
        .map_err(|e| CryptoError::Format(format!("invalid metadata header: {e}")))?;
    if metadata.version != FORMAT_VERSION {
        return Err(CryptoError::Format(format!(
            "unsupported container version {} (expected {FORMAT_VERSION})",
            metadata.version
        )));
    }
    if metadata.chunk_size == 0 || metadata.chunk_size > MAX_CHUNK_SIZE as u64 {
        return Err(CryptoError::Format(format!(
            "chunk size {} out of range",
            metadata.chunk_size
        )));
    }
    Ok(metadata)
}

/// Decrypt a container, writing plaintext to `writer` chunk by chunk.
///
/// Plaintext reaches `writer` before the whole container is verified. On
/// error the caller must discard what was written; the path-level
/// [`decrypt_file`] does so.
pub fn decrypt_stream<R, W>(
    reader: &mut R,
    writer: &mut W,
    key: &CryptographicKey,
    cancelled: &dyn Fn() -> bool,
) -> Result<StreamSummary>
where
    R: Read,
    W: Write,
{
    let metadata = read_metadata(reader)?;
    let algorithm = metadata.algorithm;
    let (nonce_len, tag_len) = aead_shape(algorithm)?;
    check_key(key, algorithm)?;

    let chunk_size = metadata.chunk_size as usize;
    let max_frame = chunk_size + nonce_len + tag_len;
    let mut hasher = Sha256::new();
    let mut chunk_index = 0u64;
    let mut written = 0u64;
    let mut saw_short_chunk = false;

    while let Some(len) = read_frame_len(reader)? {
        if cancelled() {
            return Err(CryptoError::Cancelled);
        }
        if saw_short_chunk {
            return Err(CryptoError::Format(format!(
                "chunk {chunk_index} follows a short chunk"
            )));
        }
        if len <= nonce_len + tag_len || len > max_frame {
            return Err(CryptoError::Format(format!(
                "chunk {chunk_index} has invalid length {len}"
            )));
        }

        let mut frame = vec![0u8; len];
        reader
            .read_exact(&mut frame)
            .map_err(|e| truncated(e, "chunk"))?;
        let (nonce, rest) = frame.split_at(nonce_len);
        let (ciphertext, tag) = rest.split_at(rest.len() - tag_len);

        let mut plaintext = open(
            algorithm,
            key.as_bytes(),
            &chunk_aad(chunk_index),
            ciphertext,
            nonce,
            tag,
        )
        .map_err(|e| match e {
            CryptoError::Authentication(_) => CryptoError::Authentication(format!(
                "chunk {chunk_index}: wrong key or corrupted data"
            )),
            other => other,
        })?;

        hasher.update(&plaintext);
        let result = writer.write_all(&plaintext);
        written += plaintext.len() as u64;
        saw_short_chunk = plaintext.len() < chunk_size;
        plaintext.zeroize();
        result?;
        chunk_index += 1;
    }

    if written != metadata.file_size {
        return Err(CryptoError::Format(format!(
            "container holds {written} bytes, header says {}",
            metadata.file_size
        )));
    }
    let checksum = hex::encode(hasher.finalize());
    if !digests_match(&checksum, &metadata.checksum) {
        return Err(CryptoError::Format(
            "plaintext checksum does not match the header".into(),
        ));
    }
    writer.flush()?;

    tracing::debug!(%algorithm, bytes = written, chunks = chunk_index, "decrypted stream");
    Ok(StreamSummary {
        metadata,
        bytes: written,
        chunks: chunk_index,
    })
}

/// Encrypt `input` into a container at `output`.
///
/// `output` only appears once the container is complete.
pub fn encrypt_file(
    input: &Path,
    output: &Path,
    key: &CryptographicKey,
    chunk_size: usize,
    cancelled: &dyn Fn() -> bool,
) -> Result<StreamSummary> {
    let mut reader = BufReader::new(File::open(input)?);
    write_atomically(output, |writer| {
        encrypt_stream(&mut reader, writer, key, chunk_size, cancelled)
    })
}

/// Decrypt the container at `input` into `output`.
///
/// No plaintext is left at `output` unless every chunk authenticated and the
/// checksum matched.
pub fn decrypt_file(
    input: &Path,
    output: &Path,
    key: &CryptographicKey,
    cancelled: &dyn Fn() -> bool,
) -> Result<StreamSummary> {
    let mut reader = BufReader::new(File::open(input)?);
    write_atomically(output, |writer| {
        decrypt_stream(&mut reader, writer, key, cancelled)
    })
}

/// Write through a hidden temp file next to `target`, then rename over it.
fn write_atomically<T>(
    target: &Path,
    body: impl FnOnce(&mut BufWriter<File>) -> Result<T>,
) -> Result<T> {
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = temp_path_for(target);
    let mut writer = BufWriter::new(File::create(&tmp)?);

    let result = body(&mut writer).and_then(|value| {
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(value)
    });
    drop(writer);

    match result {
        Ok(value) => match std::fs::rename(&tmp, target) {
            Ok(()) => Ok(value),
            Err(e) => {
                let _ = std::fs::remove_file(&tmp);
                Err(e.into())
            }
        },
        Err(e) => {
            if let Err(rm) = std::fs::remove_file(&tmp) {
                tracing::warn!(path = %tmp.display(), "removing partial output: {rm}");
            }
            Err(e)
        }
    }
}

fn temp_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".into());
    target.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()))
}

fn write_chunk<W: Write>(writer: &mut W, sealed: &Sealed) -> std::io::Result<()> {
    write_frame_len(
        writer,
        sealed.nonce.len() + sealed.ciphertext.len() + sealed.tag.len(),
    )?;
    writer.write_all(&sealed.nonce)?;
    writer.write_all(&sealed.ciphertext)?;
    writer.write_all(&sealed.tag)
}

fn write_frame_len<W: Write>(writer: &mut W, len: usize) -> std::io::Result<()> {
    let len = u32::try_from(len).map_err(|_| {
        std::io::Error::new(ErrorKind::InvalidInput, format!("frame of {len} bytes"))
    })?;
    writer.write_all(&len.to_be_bytes())
}

/// `Ok(None)` at a clean EOF; a partial prefix is a format error.
fn read_frame_len<R: Read>(reader: &mut R) -> Result<Option<usize>> {
    let mut prefix = [0u8; LEN_PREFIX];
    let n = read_full(reader, &mut prefix)?;
    match n {
        0 => Ok(None),
        LEN_PREFIX => Ok(Some(u32::from_be_bytes(prefix) as usize)),
        _ => Err(CryptoError::Format(format!(
            "truncated length prefix ({n} of {LEN_PREFIX} bytes)"
        ))),
    }
}

/// Read until `buf` is full or EOF. Returns the bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn truncated(e: std::io::Error, what: &str) -> CryptoError {
    if e.kind() == ErrorKind::UnexpectedEof {
        CryptoError::Format(format!("truncated {what}"))
    } else {
        CryptoError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_key;
    use std::io::Cursor;
    use std::time::Duration;
    use vseal_core::Algorithm;

    fn never() -> bool {
        false
    }

    fn key(algorithm: Algorithm) -> CryptographicKey {
        generate_key(algorithm, None, Duration::from_secs(3600)).unwrap()
    }

    fn seal_bytes(data: &[u8], key: &CryptographicKey, chunk_size: usize) -> Vec<u8> {
        let mut out = Vec::new();
        encrypt_stream(&mut Cursor::new(data), &mut out, key, chunk_size, &never).unwrap();
        out
    }

    fn open_bytes(container: &[u8], key: &CryptographicKey) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        decrypt_stream(&mut Cursor::new(container), &mut out, key, &never)?;
        Ok(out)
    }

    #[test]
    fn test_roundtrip_multi_chunk() {
        let key = key(Algorithm::Aes256Gcm);
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();

        let container = seal_bytes(&data, &key, 4096);
        assert_eq!(open_bytes(&container, &key).unwrap(), data);
    }

    #[test]
    fn test_metadata_header() {
        let key = key(Algorithm::ChaCha20Poly1305);
        let container = seal_bytes(b"hello", &key, 64);

        let metadata = read_metadata(&mut Cursor::new(&container)).unwrap();
        assert_eq!(metadata.version, FORMAT_VERSION);
        assert_eq!(metadata.algorithm, Algorithm::ChaCha20Poly1305);
        assert_eq!(metadata.file_size, 5);
        assert_eq!(metadata.chunk_size, 64);
        assert_eq!(metadata.checksum, crate::integrity::sha256_hex(b"hello"));
    }

    #[test]
    fn test_empty_input_has_no_chunks() {
        let key = key(Algorithm::XChaCha20Poly1305);
        let mut out = Vec::new();
        let summary =
            encrypt_stream(&mut Cursor::new(Vec::new()), &mut out, &key, 16, &never).unwrap();

        assert_eq!(summary.chunks, 0);
        assert_eq!(summary.bytes, 0);
        assert!(open_bytes(&out, &key).unwrap().is_empty());
    }

    #[test]
    fn test_encrypt_starts_at_current_position() {
        let key = key(Algorithm::Aes256Gcm);
        let mut source = Cursor::new(b"skipped|payload".to_vec());
        source.set_position(8);

        let mut out = Vec::new();
        let summary = encrypt_stream(&mut source, &mut out, &key, 4, &never).unwrap();
        assert_eq!(summary.bytes, 7);
        assert_eq!(open_bytes(&out, &key).unwrap(), b"payload");
    }

    #[test]
    fn test_swapped_chunks_fail() {
        let key = key(Algorithm::Aes256Gcm);
        let container = seal_bytes(&[7u8; 32], &key, 16);

        // header, then two frames of equal size
        let header_len = u32::from_be_bytes(container[..4].try_into().unwrap()) as usize;
        let header_end = LEN_PREFIX + header_len;
        let frame_len = (container.len() - header_end) / 2;
        let (head, frames) = container.split_at(header_end);
        let (first, second) = frames.split_at(frame_len);
        let swapped = [head, second, first].concat();

        assert!(matches!(
            open_bytes(&swapped, &key),
            Err(CryptoError::Authentication(_))
        ));
    }

    #[test]
    fn test_dropped_last_chunk_fails() {
        let key = key(Algorithm::Aes256Gcm);
        let container = seal_bytes(&[1u8; 40], &key, 16);

        // last frame holds 8 plaintext bytes
        let last_frame = LEN_PREFIX + 12 + 8 + 16;
        let cut = &container[..container.len() - last_frame];
        assert!(matches!(open_bytes(cut, &key), Err(CryptoError::Format(_))));
    }

    #[test]
    fn test_truncated_frame_fails() {
        let key = key(Algorithm::Aes256Gcm);
        let container = seal_bytes(&[1u8; 40], &key, 16);

        let cut = &container[..container.len() - 3];
        assert!(matches!(open_bytes(cut, &key), Err(CryptoError::Format(_))));
    }

    #[test]
    fn test_wrong_key_algorithm_rejected() {
        let aes = key(Algorithm::Aes256Gcm);
        let chacha = key(Algorithm::ChaCha20Poly1305);
        let container = seal_bytes(b"data", &aes, 16);

        assert!(matches!(
            open_bytes(&container, &chacha),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_garbage_header_rejected() {
        let key = key(Algorithm::Aes256Gcm);
        assert!(matches!(open_bytes(b"", &key), Err(CryptoError::Format(_))));
        assert!(matches!(
            open_bytes(&[0, 0, 0, 3, b'{', b'}', b'x'], &key),
            Err(CryptoError::Format(_))
        ));
        assert!(matches!(
            open_bytes(&[0xff, 0xff, 0xff, 0xff], &key),
            Err(CryptoError::Format(_))
        ));
    }

    #[test]
    fn test_cancellation_stops_encryption() {
        let key = key(Algorithm::Aes256Gcm);
        let mut out = Vec::new();
        let mut source = Cursor::new(vec![0u8; 64]);
        let err = encrypt_stream(&mut source, &mut out, &key, 16, &|| true).unwrap_err();
        assert!(matches!(err, CryptoError::Cancelled));
    }

    #[test]
    fn test_failed_decrypt_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("plain.bin");
        let sealed = dir.path().join("plain.bin.vseal");
        let restored = dir.path().join("restored.bin");
        std::fs::write(&plain, vec![9u8; 1000]).unwrap();

        let key = key(Algorithm::Aes256Gcm);
        encrypt_file(&plain, &sealed, &key, 256, &never).unwrap();

        let mut bytes = std::fs::read(&sealed).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        std::fs::write(&sealed, &bytes).unwrap();

        assert!(decrypt_file(&sealed, &restored, &key, &never).is_err());
        assert!(!restored.exists());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "temp file must be cleaned up");
    }
}
