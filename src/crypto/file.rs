//! Chunked authenticated encryption for uploaded documents.
//!
//! Files are sealed with the BE32 STREAM construction over ChaCha20-Poly1305
//! in fixed-size chunks, so a progress callback can fire as chunks are
//! processed and truncation or reordering of chunks is detected on decrypt.
//! A SHA-256 checksum of the plaintext travels in the metadata, independent
//! of the per-chunk tags, for post-decryption validation.

use chacha20poly1305::aead::generic_array::GenericArray;
use chacha20poly1305::aead::stream::{DecryptorBE32, EncryptorBE32};
use chacha20poly1305::{aead::KeyInit, ChaCha20Poly1305};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::{derive_key, random_bytes, ALGORITHM_VERSION, SALT_LEN, TAG_LEN};
use crate::error::{KycError, Result};

/// Plaintext bytes sealed per STREAM segment.
pub const FILE_CHUNK_LEN: usize = 64 * 1024;

/// STREAM nonce prefix: 12-byte AEAD nonce minus the 4-byte counter and
/// 1-byte last-segment flag.
const STREAM_NONCE_LEN: usize = 7;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub original_name: String,
    pub size: u64,
    /// SHA-256 of the plaintext, hex. Independent of the AEAD tags.
    pub checksum: String,
    /// Opaque generated name for the durable side; never derived from the
    /// original filename.
    pub storage_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedFile {
    #[serde(with = "hex::serde")]
    pub blob: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub salt: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub iv: Vec<u8>,
    pub algorithm_version: u32,
    pub metadata: FileMetadata,
}

/// Encrypts a document, invoking `on_progress` with a 0..=100 percentage as
/// chunks are sealed. Synchronous core.
pub fn encrypt_file_blocking(
    original_name: &str,
    bytes: &[u8],
    passphrase: &str,
    on_progress: &mut dyn FnMut(u8),
) -> Result<EncryptedFile> {
    let checksum = hex::encode(Sha256::digest(bytes));
    let salt = random_bytes(SALT_LEN);
    let iv = random_bytes(STREAM_NONCE_LEN);
    let key = derive_key(passphrase, &salt)?;

    let cipher = ChaCha20Poly1305::new(GenericArray::from_slice(&key[..]));
    let mut encryptor = EncryptorBE32::from_aead(cipher, GenericArray::from_slice(&iv));

    let total = bytes.len();
    let mut blob = Vec::with_capacity(total + TAG_LEN);
    let mut chunks: Vec<&[u8]> = bytes.chunks(FILE_CHUNK_LEN).collect();
    // `encrypt_last` consumes the encryptor, so the final chunk is sealed
    // outside the loop.
    let last = chunks.pop().unwrap_or(&[]);
    let mut processed = 0usize;

    for chunk in chunks {
        blob.extend(
            encryptor
                .encrypt_next(chunk)
                .map_err(|_| KycError::Encryption)?,
        );
        processed += chunk.len();
        on_progress(((processed * 100) / total.max(1)) as u8);
    }
    blob.extend(
        encryptor
            .encrypt_last(last)
            .map_err(|_| KycError::Encryption)?,
    );
    on_progress(100);

    Ok(EncryptedFile {
        blob,
        salt,
        iv,
        algorithm_version: ALGORITHM_VERSION,
        metadata: FileMetadata {
            original_name: original_name.to_string(),
            size: total as u64,
            checksum,
            storage_name: format!("{}.enc", hex::encode(random_bytes(16))),
        },
    })
}

/// Decrypts a sealed document, failing closed on any chunk-tag mismatch,
/// truncation, or plaintext checksum divergence.
pub fn decrypt_file_blocking(file: &EncryptedFile, passphrase: &str) -> Result<Vec<u8>> {
    if file.salt.len() != SALT_LEN || file.iv.len() != STREAM_NONCE_LEN {
        return Err(KycError::Decryption);
    }

    let key = derive_key(passphrase, &file.salt)?;
    let cipher = ChaCha20Poly1305::new(GenericArray::from_slice(&key[..]));
    let mut decryptor = DecryptorBE32::from_aead(cipher, GenericArray::from_slice(&file.iv));

    let sealed_chunk = FILE_CHUNK_LEN + TAG_LEN;
    let mut rest = file.blob.as_slice();
    let mut clear = Vec::with_capacity(file.blob.len());

    if rest.len() < TAG_LEN {
        return Err(KycError::Decryption);
    }
    while rest.len() > sealed_chunk {
        let (chunk, tail) = rest.split_at(sealed_chunk);
        clear.extend(
            decryptor
                .decrypt_next(chunk)
                .map_err(|_| KycError::Decryption)?,
        );
        rest = tail;
    }
    clear.extend(
        decryptor
            .decrypt_last(rest)
            .map_err(|_| KycError::Decryption)?,
    );

    if clear.len() as u64 != file.metadata.size {
        return Err(KycError::Decryption);
    }
    if hex::encode(Sha256::digest(&clear)) != file.metadata.checksum {
        return Err(KycError::Decryption);
    }
    Ok(clear)
}

/// Async entry point for file encryption. `on_progress` runs on the blocking
/// thread as chunks complete.
pub async fn encrypt_file(
    original_name: &str,
    bytes: Vec<u8>,
    passphrase: &str,
    mut on_progress: impl FnMut(u8) + Send + 'static,
) -> Result<EncryptedFile> {
    let original_name = original_name.to_string();
    let passphrase = Zeroizing::new(passphrase.to_string());
    tokio::task::spawn_blocking(move || {
        encrypt_file_blocking(&original_name, &bytes, &passphrase, &mut on_progress)
    })
    .await
    .map_err(|_| KycError::Encryption)?
}

/// Async entry point for file decryption.
pub async fn decrypt_file(file: &EncryptedFile, passphrase: &str) -> Result<Vec<u8>> {
    let file = file.clone();
    let passphrase = Zeroizing::new(passphrase.to_string());
    tokio::task::spawn_blocking(move || decrypt_file_blocking(&file, &passphrase))
        .await
        .map_err(|_| KycError::Decryption)?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bytes(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn round_trips_multi_chunk_file() -> Result<()> {
        let bytes = sample_bytes(FILE_CHUNK_LEN * 2 + 1234);
        let mut ticks = Vec::new();
        let sealed =
            encrypt_file_blocking("statement.pdf", &bytes, "pw", &mut |pct| ticks.push(pct))?;
        assert_eq!(sealed.metadata.size, bytes.len() as u64);
        assert_eq!(sealed.metadata.original_name, "statement.pdf");
        assert!(sealed.metadata.storage_name.ends_with(".enc"));
        assert!(ticks.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*ticks.last().unwrap(), 100);

        assert_eq!(decrypt_file_blocking(&sealed, "pw")?, bytes);
        Ok(())
    }

    #[test]
    fn round_trips_empty_and_exact_chunk_sizes() -> Result<()> {
        for len in [0, 1, FILE_CHUNK_LEN, FILE_CHUNK_LEN * 2] {
            let bytes = sample_bytes(len);
            let sealed = encrypt_file_blocking("f", &bytes, "pw", &mut |_| {})?;
            assert_eq!(decrypt_file_blocking(&sealed, "pw")?, bytes, "len {}", len);
        }
        Ok(())
    }

    #[test]
    fn tampered_chunk_fails_closed() -> Result<()> {
        let bytes = sample_bytes(FILE_CHUNK_LEN + 7);
        let mut sealed = encrypt_file_blocking("f", &bytes, "pw", &mut |_| {})?;
        let mid = sealed.blob.len() / 2;
        sealed.blob[mid] ^= 0x01;
        assert!(matches!(
            decrypt_file_blocking(&sealed, "pw"),
            Err(KycError::Decryption)
        ));
        Ok(())
    }

    #[test]
    fn truncated_blob_fails_closed() -> Result<()> {
        let bytes = sample_bytes(FILE_CHUNK_LEN * 2);
        let mut sealed = encrypt_file_blocking("f", &bytes, "pw", &mut |_| {})?;
        sealed.blob.truncate(sealed.blob.len() - FILE_CHUNK_LEN - TAG_LEN);
        assert!(matches!(
            decrypt_file_blocking(&sealed, "pw"),
            Err(KycError::Decryption)
        ));
        Ok(())
    }
}
