//! Namespaced, expiring secure storage for session keys, draft KYC state and
//! verification status.
//!
//! Values are sealed through the field encryption layer before they reach the
//! durable backend; every entry carries a mandatory expiry and is lazily
//! purged on retrieval. An entry that fails authentication is deleted as part
//! of error handling so a tampered or stale payload cannot resurface.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::crypto::{self, EncryptionResult};
use crate::error::{KycError, Result};
use crate::field::FieldType;
use crate::time::TimeSource;

mod backend;

pub use backend::{MemoryBackend, SqliteBackend, StorageBackend};

/// Fixed namespace prefix; full keys read `kyc_<category>_<key>`.
pub const KEY_PREFIX: &str = "kyc";

/// Mandatory per-entry options. There is no implicit "forever" default:
/// callers state an expiry explicitly (negative values expire immediately).
#[derive(Clone, Copy, Debug)]
pub struct StoreOptions {
    pub expiry_ms: i64,
    pub field_type: FieldType,
}

/// Persisted shape of one entry, stored as JSON under the namespaced key.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedEntry {
    #[serde(with = "hex::serde")]
    ciphertext: Vec<u8>,
    #[serde(with = "hex::serde")]
    salt: Vec<u8>,
    #[serde(with = "hex::serde")]
    iv: Vec<u8>,
    #[serde(with = "hex::serde")]
    auth_tag: Vec<u8>,
    algorithm_version: u32,
    created_at: u64,
    expires_at: u64,
    field_type: FieldType,
}

pub struct SecureStore {
    backend: Box<dyn StorageBackend>,
    category: String,
    clock: Arc<dyn TimeSource>,
}

impl SecureStore {
    pub fn new(
        backend: Box<dyn StorageBackend>,
        category: impl Into<String>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            backend,
            category: category.into(),
            clock,
        }
    }

    fn namespaced_key(&self, key: &str) -> String {
        format!("{}_{}_{}", KEY_PREFIX, self.category, key)
    }

    fn namespace_prefix(&self) -> String {
        format!("{}_{}_", KEY_PREFIX, self.category)
    }

    /// Encrypts `value` and writes it under the namespaced key. Last writer
    /// wins per key.
    pub async fn store(
        &mut self,
        key: &str,
        value: &str,
        passphrase: &str,
        opts: StoreOptions,
    ) -> Result<()> {
        let sealed = crypto::encrypt_pii(value, opts.field_type, passphrase).await?;
        let now = self.clock.now_ms();
        let entry = PersistedEntry {
            ciphertext: sealed.ciphertext,
            salt: sealed.salt,
            iv: sealed.iv,
            auth_tag: sealed.auth_tag,
            algorithm_version: sealed.algorithm_version,
            created_at: now,
            expires_at: now.saturating_add_signed(opts.expiry_ms),
            field_type: opts.field_type,
        };
        let payload = serde_json::to_string(&entry)?;
        self.backend.put(&self.namespaced_key(key), &payload)
    }

    /// Reads and decrypts an entry.
    ///
    /// Expired entries are deleted and reported as `None` without any
    /// decryption attempt. An authentication failure deletes the entry and
    /// propagates [`KycError::Decryption`].
    pub async fn retrieve(&mut self, key: &str, passphrase: &str) -> Result<Option<String>> {
        let namespaced = self.namespaced_key(key);
        let Some(payload) = self.backend.get(&namespaced)? else {
            return Ok(None);
        };

        let entry: PersistedEntry = match serde_json::from_str(&payload) {
            Ok(entry) => entry,
            Err(e) => {
                // Undecodable entries are as unusable as unauthenticated ones.
                self.backend.delete(&namespaced)?;
                return Err(KycError::Storage(e.to_string()));
            }
        };

        if self.clock.now_ms() > entry.expires_at {
            log::debug!("secure store entry expired: {}", namespaced);
            self.backend.delete(&namespaced)?;
            return Ok(None);
        }

        let sealed = EncryptionResult {
            ciphertext: entry.ciphertext,
            salt: entry.salt,
            iv: entry.iv,
            auth_tag: entry.auth_tag,
            algorithm_version: entry.algorithm_version,
        };
        match crypto::decrypt_pii(&sealed, passphrase).await {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                log::warn!("secure store entry failed authentication: {}", namespaced);
                self.backend.delete(&namespaced)?;
                Err(err)
            }
        }
    }

    /// Deletes a single entry.
    pub fn clear(&mut self, key: &str) -> Result<()> {
        self.backend.delete(&self.namespaced_key(key))
    }

    /// Wipes every entry under this store's namespace.
    pub fn clear_all(&mut self) -> Result<()> {
        for key in self.backend.list_prefix(&self.namespace_prefix())? {
            self.backend.delete(&key)?;
        }
        Ok(())
    }

    /// Namespaced keys currently present in the backend, for inspection.
    pub fn keys(&self) -> Result<Vec<String>> {
        self.backend.list_prefix(&self.namespace_prefix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;

    fn store_with_clock(clock: Arc<ManualClock>) -> SecureStore {
        SecureStore::new(Box::new(MemoryBackend::new()), "session", clock)
    }

    #[tokio::test]
    async fn round_trips_and_namespaces_keys() -> Result<()> {
        let clock = ManualClock::new(1_000);
        let mut store = store_with_clock(clock);
        store
            .store(
                "draft",
                "42 Harbor Lane, Springfield",
                "pw",
                StoreOptions {
                    expiry_ms: 60_000,
                    field_type: FieldType::Address,
                },
            )
            .await?;

        assert_eq!(store.keys()?, vec!["kyc_session_draft".to_string()]);
        assert_eq!(
            store.retrieve("draft", "pw").await?,
            Some("42 Harbor Lane, Springfield".to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn negative_expiry_is_gone_immediately() -> Result<()> {
        let clock = ManualClock::new(1_000);
        let mut store = store_with_clock(clock);
        store
            .store(
                "draft",
                "jane@example.com",
                "pw",
                StoreOptions {
                    expiry_ms: -1,
                    field_type: FieldType::Email,
                },
            )
            .await?;

        assert_eq!(store.retrieve("draft", "pw").await?, None);
        assert!(store.keys()?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn wrong_passphrase_deletes_entry() -> Result<()> {
        let clock = ManualClock::new(1_000);
        let mut store = store_with_clock(clock);
        store
            .store(
                "draft",
                "jane@example.com",
                "pw",
                StoreOptions {
                    expiry_ms: 60_000,
                    field_type: FieldType::Email,
                },
            )
            .await?;

        assert!(matches!(
            store.retrieve("draft", "other").await,
            Err(KycError::Decryption)
        ));
        assert!(store.keys()?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn clear_all_wipes_namespace() -> Result<()> {
        let clock = ManualClock::new(1_000);
        let mut store = store_with_clock(clock);
        for key in ["a", "b", "c"] {
            store
                .store(
                    key,
                    "jane@example.com",
                    "pw",
                    StoreOptions {
                        expiry_ms: 60_000,
                        field_type: FieldType::Email,
                    },
                )
                .await?;
        }
        store.clear_all()?;
        assert!(store.keys()?.is_empty());
        Ok(())
    }
}
