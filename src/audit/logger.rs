//! The audit writer: serialized id assignment, bounded buffering, search and
//! export.
//!
//! `log` is safe to call from many independent call sites: entry construction
//! runs under one mutex scoped to the logger instance, so ids and timestamps
//! never race. Entries accumulate in a bounded buffer drained to the durable
//! store; the backpressure policy decides what happens when a burst outruns
//! the capacity.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Deserialize;

use super::store::AuditLogStore;
use super::{
    default_classification, scan_value_for_pii, ActionDetails, ActionType, AuditEntry, ChangeSet,
    ComplianceInfo, EntryMetadata,
};
use crate::error::{KycError, Result};
use crate::integrity;
use crate::time::TimeSource;

/// What to do when the write buffer is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Flush the buffer to the durable store inline before accepting more.
    #[default]
    Block,
    /// Drop the oldest unflushed entry. Bounded memory, lossy under burst.
    DropOldest,
}

#[derive(Clone, Copy, Debug)]
pub struct AuditLoggerConfig {
    pub queue_capacity: usize,
    pub policy: BackpressurePolicy,
}

impl Default for AuditLoggerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            policy: BackpressurePolicy::Block,
        }
    }
}

/// Caller-supplied context for one logged action.
#[derive(Clone, Debug, Default)]
pub struct LogContext {
    pub actor_id: String,
    pub kyc_id: String,
    pub session_id: Option<String>,
    pub metadata: EntryMetadata,
}

/// Search filter; an empty filter returns the most recent `limit` entries.
#[derive(Clone, Debug)]
pub struct AuditFilter {
    pub actor_id: Option<String>,
    pub kyc_id: Option<String>,
    pub action: Option<ActionType>,
    pub date_from: Option<u64>,
    pub date_to: Option<u64>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for AuditFilter {
    fn default() -> Self {
        Self {
            actor_id: None,
            kyc_id: None,
            action: None,
            date_from: None,
            date_to: None,
            limit: 50,
            offset: 0,
        }
    }
}

impl AuditFilter {
    /// Filter with no pagination, for export.
    pub fn unbounded() -> Self {
        Self {
            limit: usize::MAX,
            ..Self::default()
        }
    }

    fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(actor_id) = &self.actor_id {
            if &entry.actor_id != actor_id {
                return false;
            }
        }
        if let Some(kyc_id) = &self.kyc_id {
            if &entry.kyc_id != kyc_id {
                return false;
            }
        }
        if let Some(action) = self.action {
            if entry.action != action {
                return false;
            }
        }
        if let Some(from) = self.date_from {
            if entry.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if entry.timestamp > to {
                return false;
            }
        }
        true
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

/// Fixed CSV column order.
const CSV_HEADER: &str = "timestamp,action,actorId,kycId,ipAddress,dataClassification";

type Subscriber = Box<dyn Fn(&AuditEntry) + Send>;

struct LoggerInner {
    store: Box<dyn AuditLogStore>,
    buffer: VecDeque<AuditEntry>,
    next_id: u64,
    config: AuditLoggerConfig,
    subscribers: Vec<Subscriber>,
}

pub struct AuditLogger {
    inner: Mutex<LoggerInner>,
    clock: Arc<dyn TimeSource>,
}

impl AuditLogger {
    pub fn new(
        store: Box<dyn AuditLogStore>,
        clock: Arc<dyn TimeSource>,
        config: AuditLoggerConfig,
    ) -> Result<Self> {
        let next_id = store.last_id()? + 1;
        Ok(Self {
            inner: Mutex::new(LoggerInner {
                store,
                buffer: VecDeque::with_capacity(config.queue_capacity.min(1024)),
                next_id,
                config,
                subscribers: Vec::new(),
            }),
            clock,
        })
    }

    /// Registers a subscriber invoked for every accepted entry. Subscribers
    /// run under the logger mutex and must not call back into the logger.
    pub fn subscribe(&self, subscriber: impl Fn(&AuditEntry) + Send + 'static) {
        self.lock().subscribers.push(Box::new(subscriber));
    }

    fn lock(&self) -> MutexGuard<'_, LoggerInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Builds, compliance-checks, buffers and publishes one entry.
    ///
    /// Rejects with [`KycError::Compliance`] when `details` or `changes`
    /// carry an unmasked PII-shaped value; nothing is recorded in that case.
    pub fn log(
        &self,
        details: ActionDetails,
        changes: Option<ChangeSet>,
        ctx: &LogContext,
    ) -> Result<AuditEntry> {
        scan_value_for_pii(&serde_json::to_value(&details)?)?;
        if let Some(changes) = &changes {
            scan_value_for_pii(&serde_json::to_value(changes)?)?;
        }

        let action = details.action_type();
        let (data_classification, retention_period_days) = default_classification(action);

        let mut inner = self.lock();
        let mut entry = AuditEntry {
            id: inner.next_id,
            timestamp: self.clock.now_ms(),
            actor_id: ctx.actor_id.clone(),
            kyc_id: ctx.kyc_id.clone(),
            session_id: ctx.session_id.clone(),
            action,
            details,
            changes,
            metadata: ctx.metadata.clone(),
            compliance: ComplianceInfo {
                pii_masked: true,
                data_classification,
                retention_period_days,
            },
            integrity_hash: String::new(),
            signature: None,
        };
        entry.integrity_hash = integrity::entry_hash(&entry)?;
        inner.next_id += 1;

        if inner.buffer.len() >= inner.config.queue_capacity {
            match inner.config.policy {
                BackpressurePolicy::Block => flush_locked(&mut inner)?,
                BackpressurePolicy::DropOldest => {
                    if let Some(dropped) = inner.buffer.pop_front() {
                        log::warn!("audit buffer full, dropping entry {}", dropped.id);
                    }
                }
            }
        }
        inner.buffer.push_back(entry.clone());

        for subscriber in &inner.subscribers {
            subscriber(&entry);
        }
        Ok(entry)
    }

    /// Drains the buffer to the durable store, preserving id order.
    pub fn flush(&self) -> Result<()> {
        flush_locked(&mut self.lock())
    }

    /// Number of entries accepted but not yet durably persisted.
    pub fn buffered(&self) -> usize {
        self.lock().buffer.len()
    }

    /// Filtered entries ordered by timestamp descending, paginated.
    pub fn search(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>> {
        let mut inner = self.lock();
        flush_locked(&mut inner)?;
        let mut entries: Vec<AuditEntry> = inner
            .store
            .scan()?
            .into_iter()
            .map(|chained| chained.entry)
            .filter(|entry| filter.matches(entry))
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(entries
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect())
    }

    /// Serializes the filtered set. Exported data is exactly the stored data,
    /// which already passed the write-time compliance check.
    pub fn export_logs(&self, filter: &AuditFilter, format: ExportFormat) -> Result<String> {
        let entries = self.search(filter)?;
        match format {
            ExportFormat::Json => Ok(serde_json::to_string_pretty(&entries)?),
            ExportFormat::Csv => {
                let mut out = String::from(CSV_HEADER);
                out.push('\n');
                for entry in &entries {
                    out.push_str(&format!(
                        "{},{},{},{},{},{}\n",
                        entry.timestamp,
                        entry.action.as_str(),
                        csv_field(&entry.actor_id),
                        csv_field(&entry.kyc_id),
                        csv_field(entry.metadata.ip_address.as_deref().unwrap_or("")),
                        entry.compliance.data_classification.as_str(),
                    ));
                }
                Ok(out)
            }
        }
    }
}

fn flush_locked(inner: &mut LoggerInner) -> Result<()> {
    while let Some(entry) = inner.buffer.pop_front() {
        if let Err(err) = inner.store.append(&entry) {
            // Put it back so a transient storage failure loses nothing.
            inner.buffer.push_front(entry);
            return Err(err);
        }
    }
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditStore;
    use crate::time::ManualClock;

    fn logger_with(config: AuditLoggerConfig) -> (AuditLogger, Arc<ManualClock>) {
        let clock = ManualClock::new(1_000);
        let logger = AuditLogger::new(Box::new(InMemoryAuditStore::new()), clock.clone(), config)
            .expect("logger");
        (logger, clock)
    }

    fn ctx(actor: &str) -> LogContext {
        LogContext {
            actor_id: actor.to_string(),
            kyc_id: "kyc-1".to_string(),
            ..LogContext::default()
        }
    }

    fn auth_failure() -> ActionDetails {
        ActionDetails::FailedAuthAttempt {
            method: "password".to_string(),
        }
    }

    #[test]
    fn ids_are_strictly_increasing() -> Result<()> {
        let (logger, _) = logger_with(AuditLoggerConfig::default());
        let a = logger.log(auth_failure(), None, &ctx("alice"))?;
        let b = logger.log(auth_failure(), None, &ctx("alice"))?;
        assert!(b.id > a.id);
        Ok(())
    }

    #[test]
    fn drop_oldest_keeps_newest_entries() -> Result<()> {
        let (logger, _) = logger_with(AuditLoggerConfig {
            queue_capacity: 3,
            policy: BackpressurePolicy::DropOldest,
        });
        for _ in 0..5 {
            logger.log(auth_failure(), None, &ctx("alice"))?;
        }
        assert_eq!(logger.buffered(), 3);
        logger.flush()?;
        let entries = logger.search(&AuditFilter::unbounded())?;
        let ids: Vec<u64> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![5, 4, 3]);
        Ok(())
    }

    #[test]
    fn block_policy_never_drops() -> Result<()> {
        let (logger, _) = logger_with(AuditLoggerConfig {
            queue_capacity: 2,
            policy: BackpressurePolicy::Block,
        });
        for _ in 0..5 {
            logger.log(auth_failure(), None, &ctx("alice"))?;
        }
        let entries = logger.search(&AuditFilter::unbounded())?;
        assert_eq!(entries.len(), 5);
        Ok(())
    }

    #[test]
    fn rejects_unmasked_pii_in_changes() {
        let (logger, _) = logger_with(AuditLoggerConfig::default());
        let err = logger
            .log(
                ActionDetails::PersonalInfoUpdated {
                    fields: vec![crate::field::FieldType::Ssn],
                },
                Some(ChangeSet {
                    before: "123-45-6789".to_string(),
                    after: "987-65-4321".to_string(),
                }),
                &ctx("alice"),
            )
            .unwrap_err();
        assert!(matches!(err, KycError::Compliance { .. }));
        assert_eq!(logger.buffered(), 0);
    }
}
