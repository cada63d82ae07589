//! Append-only, compliance-annotated audit log.
//!
//! Every KYC-relevant action produces one immutable [`AuditEntry`]. The entry
//! payload is a closed set of typed variants rather than a freeform bag, and
//! the write path rejects any free-text field containing an unmasked
//! PII-shaped value; masking is the caller's responsibility, and silently
//! masking here would hide the caller's bug.

use serde::{Deserialize, Serialize};

use crate::error::{KycError, Result};
use crate::field::{self, FieldType};

mod logger;
mod store;

pub use logger::{
    AuditFilter, AuditLogger, AuditLoggerConfig, BackpressurePolicy, ExportFormat, LogContext,
};
pub use store::{
    verify_chain, AuditLogStore, ChainedEntry, InMemoryAuditStore, SqliteAuditStore, GENESIS_HASH,
};

/// Closed action taxonomy. Extended only by adding variants, never by
/// freeform strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    PersonalInfoViewed,
    PersonalInfoUpdated,
    PersonalInfoSubmitted,
    DocumentUploaded,
    DocumentDeleted,
    DocumentVerified,
    RiskAssessmentStarted,
    RiskAssessmentUpdated,
    RiskAssessmentSubmitted,
    KycStatusChanged,
    FailedAuthAttempt,
    SuspiciousActivityDetected,
    RateLimitExceeded,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::PersonalInfoViewed => "personal_info_viewed",
            ActionType::PersonalInfoUpdated => "personal_info_updated",
            ActionType::PersonalInfoSubmitted => "personal_info_submitted",
            ActionType::DocumentUploaded => "document_uploaded",
            ActionType::DocumentDeleted => "document_deleted",
            ActionType::DocumentVerified => "document_verified",
            ActionType::RiskAssessmentStarted => "risk_assessment_started",
            ActionType::RiskAssessmentUpdated => "risk_assessment_updated",
            ActionType::RiskAssessmentSubmitted => "risk_assessment_submitted",
            ActionType::KycStatusChanged => "kyc_status_changed",
            ActionType::FailedAuthAttempt => "failed_auth_attempt",
            ActionType::SuspiciousActivityDetected => "suspicious_activity_detected",
            ActionType::RateLimitExceeded => "rate_limit_exceeded",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionType {
    type Err = KycError;

    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| KycError::Storage(format!("unknown action type: {}", s)))
    }
}

/// Typed payload, one variant per action. Free-text fields are
/// compliance-scanned at construction time by the logger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionDetails {
    PersonalInfoViewed { field: FieldType },
    PersonalInfoUpdated { fields: Vec<FieldType> },
    PersonalInfoSubmitted { field_count: u32 },
    DocumentUploaded { document_kind: String, size_bytes: u64, checksum: String },
    DocumentDeleted { document_kind: String },
    DocumentVerified { document_kind: String, outcome: String },
    RiskAssessmentStarted,
    RiskAssessmentUpdated { section: String },
    RiskAssessmentSubmitted { score_band: String },
    KycStatusChanged { from: String, to: String },
    FailedAuthAttempt { method: String },
    SuspiciousActivityDetected { pattern: String, note: String },
    RateLimitExceeded { limit: u32, window_ms: u64 },
}

impl ActionDetails {
    pub fn action_type(&self) -> ActionType {
        match self {
            ActionDetails::PersonalInfoViewed { .. } => ActionType::PersonalInfoViewed,
            ActionDetails::PersonalInfoUpdated { .. } => ActionType::PersonalInfoUpdated,
            ActionDetails::PersonalInfoSubmitted { .. } => ActionType::PersonalInfoSubmitted,
            ActionDetails::DocumentUploaded { .. } => ActionType::DocumentUploaded,
            ActionDetails::DocumentDeleted { .. } => ActionType::DocumentDeleted,
            ActionDetails::DocumentVerified { .. } => ActionType::DocumentVerified,
            ActionDetails::RiskAssessmentStarted => ActionType::RiskAssessmentStarted,
            ActionDetails::RiskAssessmentUpdated { .. } => ActionType::RiskAssessmentUpdated,
            ActionDetails::RiskAssessmentSubmitted { .. } => ActionType::RiskAssessmentSubmitted,
            ActionDetails::KycStatusChanged { .. } => ActionType::KycStatusChanged,
            ActionDetails::FailedAuthAttempt { .. } => ActionType::FailedAuthAttempt,
            ActionDetails::SuspiciousActivityDetected { .. } => {
                ActionType::SuspiciousActivityDetected
            }
            ActionDetails::RateLimitExceeded { .. } => ActionType::RateLimitExceeded,
        }
    }
}

/// Before/after snapshot attached to update actions. Values are expected to
/// be pre-masked; the write path verifies that.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub before: String,
    pub after: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub location: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataClassification {
    Public,
    Internal,
    Confidential,
    Restricted,
}

impl DataClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataClassification::Public => "public",
            DataClassification::Internal => "internal",
            DataClassification::Confidential => "confidential",
            DataClassification::Restricted => "restricted",
        }
    }
}

/// Default classification and retention per action; every variant is mapped,
/// checked for completeness at build time.
pub fn default_classification(action: ActionType) -> (DataClassification, u32) {
    match action {
        ActionType::PersonalInfoViewed
        | ActionType::PersonalInfoUpdated
        | ActionType::PersonalInfoSubmitted => (DataClassification::Restricted, 2555),
        ActionType::DocumentUploaded
        | ActionType::DocumentDeleted
        | ActionType::DocumentVerified => (DataClassification::Confidential, 2555),
        ActionType::RiskAssessmentStarted
        | ActionType::RiskAssessmentUpdated
        | ActionType::RiskAssessmentSubmitted => (DataClassification::Confidential, 1825),
        ActionType::KycStatusChanged => (DataClassification::Internal, 2555),
        ActionType::FailedAuthAttempt
        | ActionType::SuspiciousActivityDetected
        | ActionType::RateLimitExceeded => (DataClassification::Internal, 365),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceInfo {
    pub pii_masked: bool,
    pub data_classification: DataClassification,
    pub retention_period_days: u32,
}

/// One immutable audit record. Never updated or deleted in place before its
/// retention period elapses; purge is an external scheduled collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: u64,
    pub timestamp: u64,
    pub actor_id: String,
    pub kyc_id: String,
    pub session_id: Option<String>,
    pub action: ActionType,
    pub details: ActionDetails,
    pub changes: Option<ChangeSet>,
    pub metadata: EntryMetadata,
    pub compliance: ComplianceInfo,
    pub integrity_hash: String,
    pub signature: Option<String>,
}

/// Walks every string in a serialized payload and rejects the first one
/// matching a known PII shape.
pub(crate) fn scan_value_for_pii(value: &serde_json::Value) -> Result<()> {
    fn walk(value: &serde_json::Value, key: &str) -> Result<()> {
        match value {
            serde_json::Value::String(s) => {
                if let Some(field_type) = field::detect_pii(s) {
                    return Err(KycError::Compliance {
                        key: key.to_string(),
                        field_type,
                    });
                }
                Ok(())
            }
            serde_json::Value::Array(items) => {
                for item in items {
                    walk(item, key)?;
                }
                Ok(())
            }
            serde_json::Value::Object(map) => {
                for (k, v) in map {
                    walk(v, k)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
    walk(value, "details")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn details_map_to_their_action_type() {
        assert_eq!(
            ActionDetails::FailedAuthAttempt {
                method: "password".to_string()
            }
            .action_type(),
            ActionType::FailedAuthAttempt
        );
        assert_eq!(
            ActionDetails::RiskAssessmentStarted.action_type(),
            ActionType::RiskAssessmentStarted
        );
    }

    #[test]
    fn action_type_round_trips_through_strings() {
        let action: ActionType = "kyc_status_changed".parse().unwrap();
        assert_eq!(action, ActionType::KycStatusChanged);
        assert!("not_an_action".parse::<ActionType>().is_err());
    }

    #[test]
    fn pii_scan_rejects_nested_raw_values() {
        let clean = json!({"kind": "document_deleted", "document_kind": "passport"});
        assert!(scan_value_for_pii(&clean).is_ok());

        let dirty = json!({"kind": "suspicious_activity_detected", "note": "saw 123-45-6789"});
        let err = scan_value_for_pii(&dirty).unwrap_err();
        assert!(matches!(err, KycError::Compliance { ref key, .. } if key == "note"));
    }
}
