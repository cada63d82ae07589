//! Durable key/value backends for the secure store.
//!
//! The trait is deliberately minimal (`get`/`put`/`delete`/`list_prefix`) so
//! any persistent medium can back the store; SQLite is the production
//! implementation, the in-memory map serves tests and ephemeral sessions.

use rusqlite::{params, Connection};
use std::collections::BTreeMap;

use crate::error::Result;

pub trait StorageBackend: Send {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn put(&mut self, key: &str, value: &str) -> Result<()>;
    fn delete(&mut self, key: &str) -> Result<()>;
    /// Keys starting with `prefix`, in lexicographic order.
    fn list_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let backend = Self { conn };
        backend.ensure_schema()?;
        Ok(backend)
    }

    fn ensure_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS secure_entries (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL,
              updated_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

impl StorageBackend for SqliteBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM secure_entries WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    fn put(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO secure_entries(key, value, updated_at)
            VALUES (?1, ?2, strftime('%s','now'))
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM secure_entries WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        let mut stmt = self.conn.prepare(
            "SELECT key FROM secure_entries WHERE key LIKE ?1 ESCAPE '\\' ORDER BY key ASC",
        )?;
        let mut rows = stmt.query(params![pattern])?;
        let mut keys = Vec::new();
        while let Some(row) = rows.next()? {
            keys.push(row.get(0)?);
        }
        Ok(keys)
    }
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    map: BTreeMap<String, String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &str) -> Result<()> {
        self.map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.map.remove(key);
        Ok(())
    }

    fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .map
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(backend: &mut dyn StorageBackend) -> Result<()> {
        backend.put("kyc_session_a", "1")?;
        backend.put("kyc_session_b", "2")?;
        backend.put("other_c", "3")?;
        backend.put("kyc_session_a", "updated")?;

        assert_eq!(backend.get("kyc_session_a")?, Some("updated".to_string()));
        assert_eq!(backend.get("missing")?, None);
        assert_eq!(
            backend.list_prefix("kyc_session_")?,
            vec!["kyc_session_a".to_string(), "kyc_session_b".to_string()]
        );

        backend.delete("kyc_session_a")?;
        assert_eq!(backend.get("kyc_session_a")?, None);
        Ok(())
    }

    #[test]
    fn memory_backend_contract() -> Result<()> {
        exercise(&mut MemoryBackend::new())
    }

    #[test]
    fn sqlite_backend_contract() -> Result<()> {
        let dir = tempfile::tempdir().map_err(|e| crate::error::KycError::Storage(e.to_string()))?;
        let path = dir.path().join("store.db");
        exercise(&mut SqliteBackend::open(path.to_str().unwrap())?)
    }
}
