//! Facade exposed to the surrounding dashboard application.
//!
//! Bundles the secure store, audit logger and security monitor behind the
//! operations the UI actually calls: form-data encryption, submission proofs,
//! KYC status persistence, and the blocked-actor guard every mutating action
//! must pass first.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::audit::{ActionDetails, AuditLogger, ChangeSet, EntryMetadata, LogContext};
use crate::crypto::{self, EncryptionResult};
use crate::error::{KycError, Result};
use crate::field::FieldType;
use crate::integrity;
use crate::monitor::SecurityMonitor;
use crate::session::SessionContext;
use crate::store::{SecureStore, StoreOptions};
use crate::time::TimeSource;

/// One named form field headed for encryption.
#[derive(Clone, Debug)]
pub struct FormField {
    pub name: String,
    pub field_type: FieldType,
    pub value: String,
}

/// Verifiable proof over a final KYC submission, consumable by the external
/// verification backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionProof {
    pub hash: String,
    pub signature: String,
    pub timestamp: u64,
}

/// KYC status entries outlive a session but not the retention window.
const STATUS_EXPIRY_MS: i64 = 30 * 24 * 60 * 60 * 1000;

pub struct KycKernel {
    store: SecureStore,
    logger: Arc<AuditLogger>,
    monitor: Arc<SecurityMonitor>,
    clock: Arc<dyn TimeSource>,
    session: Option<SessionContext>,
}

impl KycKernel {
    pub fn new(
        store: SecureStore,
        logger: Arc<AuditLogger>,
        monitor: Arc<SecurityMonitor>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            store,
            logger,
            monitor,
            clock,
            session: None,
        }
    }

    /// Installs the session produced by the authentication subsystem.
    pub fn begin_session(&mut self, session: SessionContext) {
        log::info!("session {} started for {}", session.session_id, session.actor_id);
        self.session = Some(session);
    }

    /// Drops session key material and clears cached secure-store state.
    pub fn end_session(&mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            log::info!("session {} ended", session.session_id);
        }
        self.store.clear_all()
    }

    fn session(&self) -> Result<&SessionContext> {
        self.session.as_ref().ok_or(KycError::NotInitialized)
    }

    fn log_context(&self, kyc_id: &str) -> Result<LogContext> {
        let session = self.session()?;
        Ok(LogContext {
            actor_id: session.actor_id.clone(),
            kyc_id: kyc_id.to_string(),
            session_id: Some(session.session_id.clone()),
            metadata: EntryMetadata::default(),
        })
    }

    pub fn logger(&self) -> &Arc<AuditLogger> {
        &self.logger
    }

    pub fn monitor(&self) -> &Arc<SecurityMonitor> {
        &self.monitor
    }

    /// Encrypts every field of a form with the session passphrase.
    ///
    /// Validation errors fail the whole call before any field is returned,
    /// so no partially encrypted form ever escapes.
    pub async fn encrypt_form_data(
        &self,
        fields: &[FormField],
    ) -> Result<HashMap<String, EncryptionResult>> {
        let session = self.session()?;
        for field in fields {
            crate::field::validate(&field.value, field.field_type)?;
        }
        let mut out = HashMap::with_capacity(fields.len());
        for field in fields {
            let sealed =
                crypto::encrypt_pii(&field.value, field.field_type, session.passphrase()).await?;
            out.insert(field.name.clone(), sealed);
        }
        Ok(out)
    }

    /// Decrypts a previously encrypted form back to plaintext values.
    pub async fn decrypt_form_data(
        &self,
        encrypted: &HashMap<String, EncryptionResult>,
    ) -> Result<HashMap<String, String>> {
        let session = self.session()?;
        let mut out = HashMap::with_capacity(encrypted.len());
        for (name, sealed) in encrypted {
            let value = crypto::decrypt_pii(sealed, session.passphrase()).await?;
            out.insert(name.clone(), value);
        }
        Ok(out)
    }

    /// Produces a hash + keyed signature over a final submission, bound to
    /// the current time.
    pub fn generate_submission_proof(&self, data: &Value) -> Result<SubmissionProof> {
        let session = self.session()?;
        let hashed = integrity::hash_at(data, self.clock.now_ms());
        let signature = integrity::sign(hashed.hash.as_bytes(), session.signing_secret());
        Ok(SubmissionProof {
            hash: hashed.hash,
            signature,
            timestamp: hashed.timestamp,
        })
    }

    /// Checks a submission proof against the session's signing secret.
    pub fn verify_submission_proof(&self, data: &Value, proof: &SubmissionProof) -> Result<bool> {
        let session = self.session()?;
        let expected = integrity::hash_at(data, proof.timestamp);
        Ok(expected.hash == proof.hash
            && integrity::verify_signature(
                proof.hash.as_bytes(),
                session.signing_secret(),
                &proof.signature,
            ))
    }

    /// Persists the KYC status for an application and logs the transition.
    pub async fn store_kyc_status(&mut self, kyc_id: &str, status: &str) -> Result<()> {
        self.guard_mutating_action(kyc_id)?;
        let previous = self.get_kyc_status(kyc_id).await?;
        let previous_masked = previous
            .as_deref()
            .map(|value| crate::field::mask(value, FieldType::Document))
            .unwrap_or_else(|| "none".to_string());

        let passphrase = self.session()?.passphrase().to_string();
        self.store
            .store(
                &format!("status_{}", kyc_id),
                status,
                &passphrase,
                StoreOptions {
                    expiry_ms: STATUS_EXPIRY_MS,
                    field_type: FieldType::Document,
                },
            )
            .await?;

        let ctx = self.log_context(kyc_id)?;
        self.logger.log(
            ActionDetails::KycStatusChanged {
                from: previous.unwrap_or_else(|| "none".to_string()),
                to: status.to_string(),
            },
            Some(ChangeSet {
                before: previous_masked,
                after: crate::field::mask(status, FieldType::Document),
            }),
            &ctx,
        )?;
        Ok(())
    }

    pub async fn get_kyc_status(&mut self, kyc_id: &str) -> Result<Option<String>> {
        let passphrase = self.session()?.passphrase().to_string();
        self.store
            .retrieve(&format!("status_{}", kyc_id), &passphrase)
            .await
    }

    /// Gatekeeper for every mutating KYC action.
    ///
    /// A blocked actor is rejected before any side effect, and the rejected
    /// attempt itself is logged as a security event so persistent abuse
    /// stays visible to the monitor. The per-actor rate limit is charged
    /// here as well.
    pub fn guard_mutating_action(&self, kyc_id: &str) -> Result<()> {
        let session = self.session()?;
        let actor_id = session.actor_id.clone();

        if self.monitor.is_blocked(&actor_id) {
            let reason = self
                .monitor
                .block_record(&actor_id)
                .map(|record| record.reason)
                .unwrap_or_else(|| "blocked".to_string());
            let ctx = self.log_context(kyc_id)?;
            self.logger.log(
                ActionDetails::SuspiciousActivityDetected {
                    pattern: "blocked_actor_attempt".to_string(),
                    note: "mutating action attempted while blocked".to_string(),
                },
                None,
                &ctx,
            )?;
            return Err(KycError::BlockedActor { actor_id, reason });
        }

        if let Err(err) = self.monitor.check_rate_limit(&actor_id) {
            let (limit, window_ms) = self.monitor.rate_limit();
            let ctx = self.log_context(kyc_id)?;
            self.logger.log(
                ActionDetails::RateLimitExceeded {
                    limit: limit as u32,
                    window_ms,
                },
                None,
                &ctx,
            )?;
            return Err(err);
        }
        Ok(())
    }
}
