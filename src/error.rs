use thiserror::Error;

use crate::field::FieldType;

pub type Result<T> = std::result::Result<T, KycError>;

/// Error taxonomy for the trust kernel.
///
/// Low-level cryptographic failures are never surfaced verbatim; they are
/// translated into `Encryption`/`Decryption` with messages that carry no key
/// material, passphrases, or raw PII.
#[derive(Debug, Error)]
pub enum KycError {
    #[error("validation failed for {field_type}: {reason}")]
    Validation {
        field_type: FieldType,
        reason: String,
    },

    #[error("encryption failed")]
    Encryption,

    /// Authentication-tag failure: wrong passphrase or tampered ciphertext.
    #[error("decryption failed: ciphertext rejected")]
    Decryption,

    #[error("no session context established")]
    NotInitialized,

    #[error("storage backend error: {0}")]
    Storage(String),

    /// An audit-log write contained an unmasked PII-shaped value. The write
    /// path never masks on the caller's behalf; it rejects.
    #[error("compliance violation: field '{key}' holds an unmasked {field_type} value")]
    Compliance { key: String, field_type: FieldType },

    #[error("actor {actor_id} is blocked: {reason}")]
    BlockedActor { actor_id: String, reason: String },

    #[error("rate limit exceeded for actor {actor_id}")]
    RateLimit { actor_id: String },
}

impl From<rusqlite::Error> for KycError {
    fn from(e: rusqlite::Error) -> Self {
        KycError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for KycError {
    fn from(e: serde_json::Error) -> Self {
        KycError::Storage(e.to_string())
    }
}
