//! Field-typed PII encryption.
//!
//! A symmetric key is derived per operation from the caller's passphrase and
//! a fresh random salt (Argon2id, fixed parameters), then the value is sealed
//! with ChaCha20-Poly1305 using a detached tag. The result is self-describing:
//! everything needed to decrypt except the passphrase itself.
//!
//! Key derivation and AEAD work is CPU-bound, so the public entry points are
//! async and offload to a blocking thread; the `_blocking` variants run the
//! same deterministic computation inline.

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::{
    aead::{AeadInPlace, KeyInit},
    ChaCha20Poly1305, Key, Nonce, Tag,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{KycError, Result};
use crate::field::{self, FieldType};

mod file;

pub use file::{
    decrypt_file, decrypt_file_blocking, encrypt_file, encrypt_file_blocking, EncryptedFile,
    FileMetadata, FILE_CHUNK_LEN,
};

pub const KEY_LEN: usize = 32;
pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Versions the KDF parameters and AEAD choice baked into an
/// [`EncryptionResult`]; bump when either changes.
pub const ALGORITHM_VERSION: u32 = 1;

/// Argon2id parameters, fixed so results remain decryptable across builds.
/// 19 MiB / 2 passes / 1 lane follows the current OWASP low-memory profile.
pub const ARGON2_MEM_KIB: u32 = 19 * 1024;
pub const ARGON2_PASSES: u32 = 2;
pub const ARGON2_LANES: u32 = 1;

/// Output of authenticated PII encryption. Never contains the derived key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionResult {
    #[serde(with = "hex::serde")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub salt: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub iv: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub auth_tag: Vec<u8>,
    pub algorithm_version: u32,
}

pub(crate) fn derive_key(passphrase: &str, salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let params = Params::new(ARGON2_MEM_KIB, ARGON2_PASSES, ARGON2_LANES, Some(KEY_LEN))
        .map_err(|_| KycError::Encryption)?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon
        .hash_password_into(passphrase.as_bytes(), salt, &mut key[..])
        .map_err(|_| KycError::Encryption)?;
    Ok(key)
}

pub(crate) fn random_bytes(len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut out);
    out
}

/// Validates and encrypts a single PII value. Synchronous core.
pub fn encrypt_pii_blocking(
    value: &str,
    field_type: FieldType,
    passphrase: &str,
) -> Result<EncryptionResult> {
    field::validate(value, field_type)?;

    let salt = random_bytes(SALT_LEN);
    let iv = random_bytes(NONCE_LEN);
    let key = derive_key(passphrase, &salt)?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key[..]));
    let mut ciphertext = value.as_bytes().to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&iv), &[], &mut ciphertext)
        .map_err(|_| KycError::Encryption)?;

    Ok(EncryptionResult {
        ciphertext,
        salt,
        iv,
        auth_tag: tag.to_vec(),
        algorithm_version: ALGORITHM_VERSION,
    })
}

/// Decrypts a single PII value. Synchronous core.
///
/// Fails with [`KycError::Decryption`] on any tag mismatch; never returns
/// partial plaintext.
pub fn decrypt_pii_blocking(result: &EncryptionResult, passphrase: &str) -> Result<String> {
    if result.salt.len() != SALT_LEN
        || result.iv.len() != NONCE_LEN
        || result.auth_tag.len() != TAG_LEN
    {
        return Err(KycError::Decryption);
    }

    let key = derive_key(passphrase, &result.salt)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key[..]));
    let mut clear = result.ciphertext.clone();
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&result.iv),
            &[],
            &mut clear,
            Tag::from_slice(&result.auth_tag),
        )
        .map_err(|_| KycError::Decryption)?;

    String::from_utf8(clear).map_err(|_| KycError::Decryption)
}

/// Async entry point for PII encryption; format validation still fails fast
/// before any blocking work is scheduled.
pub async fn encrypt_pii(
    value: &str,
    field_type: FieldType,
    passphrase: &str,
) -> Result<EncryptionResult> {
    field::validate(value, field_type)?;
    let value = Zeroizing::new(value.to_string());
    let passphrase = Zeroizing::new(passphrase.to_string());
    tokio::task::spawn_blocking(move || encrypt_pii_blocking(&value, field_type, &passphrase))
        .await
        .map_err(|_| KycError::Encryption)?
}

/// Async entry point for PII decryption.
pub async fn decrypt_pii(result: &EncryptionResult, passphrase: &str) -> Result<String> {
    let result = result.clone();
    let passphrase = Zeroizing::new(passphrase.to_string());
    tokio::task::spawn_blocking(move || decrypt_pii_blocking(&result, &passphrase))
        .await
        .map_err(|_| KycError::Decryption)?
}
