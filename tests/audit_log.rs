use kyc_kernel::{
    integrity, verify_chain, ActionDetails, AuditFilter, AuditLogger, AuditLoggerConfig,
    AuditLogStore, ChangeSet, ExportFormat, FieldType, InMemoryAuditStore, KycError, LogContext,
    ManualClock, Result, SqliteAuditStore,
};

fn ctx(actor: &str, kyc: &str) -> LogContext {
    LogContext {
        actor_id: actor.to_string(),
        kyc_id: kyc.to_string(),
        session_id: Some("sess-test".to_string()),
        metadata: kyc_kernel::EntryMetadata {
            ip_address: Some("10.0.0.1".to_string()),
            ..Default::default()
        },
    }
}

fn view(field: FieldType) -> ActionDetails {
    ActionDetails::PersonalInfoViewed { field }
}

fn memory_logger() -> (AuditLogger, std::sync::Arc<ManualClock>) {
    let clock = ManualClock::new(1_000_000);
    let logger = AuditLogger::new(
        Box::new(InMemoryAuditStore::new()),
        clock.clone(),
        AuditLoggerConfig::default(),
    )
    .expect("logger");
    (logger, clock)
}

#[test]
fn identical_calls_get_distinct_increasing_ids() -> Result<()> {
    let (logger, _) = memory_logger();
    let a = logger.log(view(FieldType::Ssn), None, &ctx("alice", "kyc-1"))?;
    let b = logger.log(view(FieldType::Ssn), None, &ctx("alice", "kyc-1"))?;
    assert!(b.id > a.id);

    logger.flush()?;
    let all = logger.search(&AuditFilter::unbounded())?;
    assert_eq!(all.len(), 2);
    Ok(())
}

#[test]
fn entries_verify_after_log_and_fail_after_mutation() -> Result<()> {
    let (logger, _) = memory_logger();
    let entry = logger.log(view(FieldType::Email), None, &ctx("alice", "kyc-1"))?;
    assert!(integrity::verify_entry(&entry));

    let mut forged = entry.clone();
    forged.actor_id = "mallory".to_string();
    assert!(!integrity::verify_entry(&forged));

    let mut forged = entry;
    forged.timestamp += 1;
    assert!(!integrity::verify_entry(&forged));
    Ok(())
}

#[test]
fn unmasked_pii_is_rejected_masked_passes() -> Result<()> {
    let (logger, _) = memory_logger();

    let err = logger
        .log(
            ActionDetails::SuspiciousActivityDetected {
                pattern: "manual_review".to_string(),
                note: "actor pasted 123-45-6789 into a note".to_string(),
            },
            None,
            &ctx("alice", "kyc-1"),
        )
        .unwrap_err();
    assert!(matches!(err, KycError::Compliance { .. }));

    logger.log(
        ActionDetails::SuspiciousActivityDetected {
            pattern: "manual_review".to_string(),
            note: "actor pasted ***-**-6789 into a note".to_string(),
        },
        None,
        &ctx("alice", "kyc-1"),
    )?;

    let err = logger
        .log(
            view(FieldType::Ssn),
            Some(ChangeSet {
                before: "jane@example.com".to_string(),
                after: "j***@example.com".to_string(),
            }),
            &ctx("alice", "kyc-1"),
        )
        .unwrap_err();
    assert!(matches!(err, KycError::Compliance { .. }));
    Ok(())
}

#[test]
fn search_filters_and_paginates_descending() -> Result<()> {
    let (logger, clock) = memory_logger();
    for i in 0..10 {
        clock.advance(1_000);
        let actor = if i % 2 == 0 { "alice" } else { "bob" };
        logger.log(view(FieldType::Address), None, &ctx(actor, "kyc-1"))?;
    }

    let alice = logger.search(&AuditFilter {
        actor_id: Some("alice".to_string()),
        ..AuditFilter::unbounded()
    })?;
    assert_eq!(alice.len(), 5);
    assert!(alice.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));

    let page = logger.search(&AuditFilter {
        limit: 3,
        offset: 3,
        ..AuditFilter::default()
    })?;
    assert_eq!(page.len(), 3);
    // Empty filter with defaults returns the most recent entries first.
    let recent = logger.search(&AuditFilter::default())?;
    assert_eq!(recent[0].id, 10);
    Ok(())
}

#[test]
fn export_row_count_matches_search_and_json_round_trips() -> Result<()> {
    let (logger, clock) = memory_logger();
    for _ in 0..7 {
        clock.advance(500);
        logger.log(view(FieldType::Phone), None, &ctx("alice", "kyc-9"))?;
    }
    let filter = AuditFilter {
        actor_id: Some("alice".to_string()),
        ..AuditFilter::unbounded()
    };

    let entries = logger.search(&filter)?;
    let csv = logger.export_logs(&filter, ExportFormat::Csv)?;
    let rows: Vec<&str> = csv.lines().collect();
    assert_eq!(
        rows[0],
        "timestamp,action,actorId,kycId,ipAddress,dataClassification"
    );
    assert_eq!(rows.len() - 1, entries.len());
    assert!(rows[1].contains("personal_info_viewed"));
    assert!(rows[1].contains("10.0.0.1"));
    assert!(rows[1].contains("restricted"));

    let json = logger.export_logs(&filter, ExportFormat::Json)?;
    let parsed: Vec<kyc_kernel::AuditEntry> = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, entries);
    Ok(())
}

#[test]
fn sqlite_store_chains_entries_and_detects_deletion() -> Result<()> {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("audit.db");
    let db_path = db_path.to_str().unwrap();

    let clock = ManualClock::new(5_000);
    let logger = AuditLogger::new(
        Box::new(SqliteAuditStore::open(db_path)?),
        clock.clone(),
        AuditLoggerConfig::default(),
    )?;
    for _ in 0..4 {
        clock.advance(100);
        logger.log(view(FieldType::FullName), None, &ctx("alice", "kyc-2"))?;
    }
    logger.flush()?;

    let store = SqliteAuditStore::open(db_path)?;
    let chained = store.scan()?;
    assert_eq!(chained.len(), 4);
    assert_eq!(verify_chain(&chained), None);
    for row in &chained {
        assert!(integrity::verify_entry(&row.entry));
    }

    // Deleting an interior entry breaks the chain at its successor.
    let conn = rusqlite::Connection::open(db_path).unwrap();
    conn.execute("DELETE FROM audit_entries WHERE id = 2", [])
        .unwrap();
    drop(conn);

    let store = SqliteAuditStore::open(db_path)?;
    assert_eq!(verify_chain(&store.scan()?), Some(3));
    Ok(())
}

#[test]
fn ids_stay_monotonic_across_reopen() -> Result<()> {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("audit.db");
    let db_path = db_path.to_str().unwrap();
    let clock = ManualClock::new(1_000);

    let logger = AuditLogger::new(
        Box::new(SqliteAuditStore::open(db_path)?),
        clock.clone(),
        AuditLoggerConfig::default(),
    )?;
    let last = logger.log(view(FieldType::Ssn), None, &ctx("alice", "kyc-1"))?;
    logger.flush()?;
    drop(logger);

    let logger = AuditLogger::new(
        Box::new(SqliteAuditStore::open(db_path)?),
        clock,
        AuditLoggerConfig::default(),
    )?;
    let next = logger.log(view(FieldType::Ssn), None, &ctx("alice", "kyc-1"))?;
    assert_eq!(next.id, last.id + 1);
    Ok(())
}
