//! Durable append-only stores for audit entries.
//!
//! Each appended entry is chained to its predecessor: the store keeps
//! `chain_hash = SHA-256(prev_chain_hash || entry_json)` alongside the entry,
//! so deleting or reordering persisted entries is detectable, not just
//! altering one. Per-entry integrity hashes live inside the entry itself.

use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};

use super::AuditEntry;
use crate::error::{KycError, Result};

/// Chain head before any entry exists.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Hashes an entry payload with the previous chain hash.
pub fn chain_hash(prev_hash: &str, payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

/// An entry as persisted, with its chain linkage.
#[derive(Clone, Debug)]
pub struct ChainedEntry {
    pub entry: AuditEntry,
    pub prev_hash: String,
    pub chain_hash: String,
}

/// Recomputes the whole chain; returns the id of the first entry whose
/// linkage or recomputed hash diverges, or `None` when the log is intact.
pub fn verify_chain(entries: &[ChainedEntry]) -> Option<u64> {
    let mut prev = GENESIS_HASH.to_string();
    for chained in entries {
        let payload = match serde_json::to_vec(&chained.entry) {
            Ok(payload) => payload,
            Err(_) => return Some(chained.entry.id),
        };
        if chained.prev_hash != prev || chain_hash(&prev, &payload) != chained.chain_hash {
            return Some(chained.entry.id);
        }
        prev = chained.chain_hash.clone();
    }
    None
}

pub trait AuditLogStore: Send {
    /// Appends one entry, extending the hash chain. Entries are never
    /// updated or deleted through this interface.
    fn append(&mut self, entry: &AuditEntry) -> Result<()>;

    /// All persisted entries in id order, with chain linkage.
    fn scan(&self) -> Result<Vec<ChainedEntry>>;

    /// Highest id persisted so far, 0 when empty. Seeds monotonic id
    /// assignment across restarts.
    fn last_id(&self) -> Result<u64>;
}

pub struct SqliteAuditStore {
    conn: Connection,
}

impl SqliteAuditStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS audit_entries (
              id INTEGER PRIMARY KEY,
              created_at INTEGER NOT NULL,
              payload_json TEXT NOT NULL,
              prev_hash TEXT NOT NULL,
              chain_hash TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_created ON audit_entries(created_at);
            "#,
        )?;
        Ok(())
    }

    fn chain_head(&self) -> Result<String> {
        let mut stmt = self
            .conn
            .prepare("SELECT chain_hash FROM audit_entries ORDER BY id DESC LIMIT 1")?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(GENESIS_HASH.to_string()),
        }
    }
}

impl AuditLogStore for SqliteAuditStore {
    fn append(&mut self, entry: &AuditEntry) -> Result<()> {
        let prev_hash = self.chain_head()?;
        let payload = serde_json::to_vec(entry)?;
        let head = chain_hash(&prev_hash, &payload);
        let created_at = i64::try_from(entry.timestamp)
            .map_err(|_| KycError::Storage("timestamp exceeds i64 range".to_string()))?;

        self.conn.execute(
            r#"
            INSERT INTO audit_entries(id, created_at, payload_json, prev_hash, chain_hash)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                entry.id as i64,
                created_at,
                String::from_utf8_lossy(&payload).into_owned(),
                prev_hash,
                head
            ],
        )?;
        Ok(())
    }

    fn scan(&self) -> Result<Vec<ChainedEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT payload_json, prev_hash, chain_hash FROM audit_entries ORDER BY id ASC",
        )?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let payload: String = row.get(0)?;
            let entry: AuditEntry = serde_json::from_str(&payload)?;
            out.push(ChainedEntry {
                entry,
                prev_hash: row.get(1)?,
                chain_hash: row.get(2)?,
            });
        }
        Ok(out)
    }

    fn last_id(&self) -> Result<u64> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM audit_entries ORDER BY id DESC LIMIT 1")?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => {
                let id: i64 = row.get(0)?;
                Ok(id as u64)
            }
            None => Ok(0),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    rows: Vec<ChainedEntry>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditLogStore for InMemoryAuditStore {
    fn append(&mut self, entry: &AuditEntry) -> Result<()> {
        let prev_hash = self
            .rows
            .last()
            .map(|row| row.chain_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        let payload = serde_json::to_vec(entry)?;
        let head = chain_hash(&prev_hash, &payload);
        self.rows.push(ChainedEntry {
            entry: entry.clone(),
            prev_hash,
            chain_hash: head,
        });
        Ok(())
    }

    fn scan(&self) -> Result<Vec<ChainedEntry>> {
        Ok(self.rows.clone())
    }

    fn last_id(&self) -> Result<u64> {
        Ok(self.rows.last().map(|row| row.entry.id).unwrap_or(0))
    }
}
