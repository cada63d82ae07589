//! KYC Trust Kernel (KTK)
//!
//! This crate implements the trust core of a KYC identity-verification flow:
//! the only part of the surrounding dashboard where incorrect design causes
//! real harm.
//!
//! # Architecture
//!
//! The kernel enforces five guarantees by construction:
//!
//! 1. **Typed PII**: every value entering encryption or logging carries
//!    exactly one [`FieldType`]; validation and masking are total mappings
//!    checked for completeness at build time.
//! 2. **Authenticated encryption only**: PII at rest is sealed with a key
//!    derived from the session passphrase (Argon2id) under
//!    ChaCha20-Poly1305; a failed tag check never yields partial plaintext.
//! 3. **Tamper-evident audit**: every KYC-relevant action appends one
//!    immutable, integrity-hashed entry; persisted entries are additionally
//!    hash-chained so deletion is detectable.
//! 4. **Compliance at the write path**: an audit write containing an
//!    unmasked PII-shaped value is rejected, never silently masked.
//! 5. **Anomaly-driven blocking**: pattern rules over rolling per-actor
//!    windows raise alerts and can auto-block an actor for a bounded TTL.
//!
//! # Module Structure
//!
//! - `field`: FieldType, validation, masking, PII-shape detection
//! - `crypto`: field and file encryption (Argon2id + ChaCha20-Poly1305)
//! - `integrity`: canonical hashing, HMAC signing, constant-time verify
//! - `store`: expiring encrypted key/value store over pluggable backends
//! - `audit`: append-only hash-chained audit log with search and export
//! - `monitor`: pattern rules, alerts, block list
//! - `session` / `api`: session context and the facade the UI calls

pub mod api;
pub mod audit;
pub mod config;
pub mod crypto;
pub mod error;
pub mod field;
pub mod integrity;
pub mod monitor;
pub mod session;
pub mod store;
pub mod time;

pub use api::{FormField, KycKernel, SubmissionProof};
pub use audit::{
    verify_chain, ActionDetails, ActionType, AuditEntry, AuditFilter, AuditLogStore, AuditLogger,
    AuditLoggerConfig, BackpressurePolicy, ChangeSet, ChainedEntry, ComplianceInfo,
    DataClassification, EntryMetadata, ExportFormat, InMemoryAuditStore, LogContext,
    SqliteAuditStore,
};
pub use config::KernelConfig;
pub use crypto::{
    decrypt_file, decrypt_pii, encrypt_file, encrypt_pii, EncryptedFile, EncryptionResult,
    FileMetadata,
};
pub use error::{KycError, Result};
pub use field::{detect_pii, mask, validate, FieldType};
pub use integrity::{hash_at, sign, verify_entry, verify_signature, HashResult};
pub use monitor::{
    default_rules, AlertFilter, BlockRecord, MonitorConfig, PatternPredicate, PatternRule,
    SecurityAlert, SecurityMonitor, SecurityReport, Severity,
};
pub use session::SessionContext;
pub use store::{MemoryBackend, SecureStore, SqliteBackend, StorageBackend, StoreOptions};
pub use time::{system_clock, ManualClock, SystemClock, TimeSource};
