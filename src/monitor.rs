//! Rule-based security monitoring over the audit stream.
//!
//! The monitor subscribes to the audit logger and maintains a rolling
//! time-windowed event history per actor. Pattern rules are evaluated
//! incrementally as each entry arrives, never by rescanning the whole log.
//! A rule with `auto_block` creates a time-bounded block record; an actor is
//! blocked iff an unexpired record exists, and expiry is checked lazily.

use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::audit::{ActionType, AuditEntry, AuditLogger};
use crate::error::{KycError, Result};
use crate::time::TimeSource;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Predicate shapes evaluated over an actor's rolling window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatternPredicate {
    /// Count of events of one action type.
    RepeatedAction(ActionType),
    /// Count of distinct KYC ids touched by one action type.
    DistinctKycIds(ActionType),
}

#[derive(Clone, Debug)]
pub struct PatternRule {
    pub name: &'static str,
    pub predicate: PatternPredicate,
    /// Rule fires when the measured count exceeds this value.
    pub threshold: usize,
    pub window_ms: u64,
    pub severity: Severity,
    pub auto_block: bool,
}

pub fn default_rules() -> Vec<PatternRule> {
    vec![
        PatternRule {
            name: "repeated_auth_failures",
            predicate: PatternPredicate::RepeatedAction(ActionType::FailedAuthAttempt),
            threshold: 5,
            window_ms: 15 * 60 * 1000,
            severity: Severity::High,
            auto_block: true,
        },
        PatternRule {
            name: "personal_info_scraping",
            predicate: PatternPredicate::DistinctKycIds(ActionType::PersonalInfoViewed),
            threshold: 10,
            window_ms: 5 * 60 * 1000,
            severity: Severity::Medium,
            auto_block: false,
        },
        PatternRule {
            name: "repeated_rate_limiting",
            predicate: PatternPredicate::RepeatedAction(ActionType::RateLimitExceeded),
            threshold: 3,
            window_ms: 10 * 60 * 1000,
            severity: Severity::Medium,
            auto_block: false,
        },
    ]
}

#[derive(Clone, Debug, Serialize)]
pub struct SecurityAlert {
    pub id: u64,
    pub timestamp: u64,
    pub actor_id: String,
    pub pattern_type: String,
    pub severity: Severity,
    pub description: String,
    pub auto_blocked: bool,
}

#[derive(Clone, Debug)]
pub struct BlockRecord {
    pub actor_id: String,
    pub reason: String,
    pub created_at: u64,
    pub expires_at: u64,
}

#[derive(Clone, Debug)]
pub struct MonitorConfig {
    pub rules: Vec<PatternRule>,
    pub block_ttl_ms: u64,
    /// Mutating actions allowed per actor within the rate window.
    pub rate_limit_max: usize,
    pub rate_limit_window_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            block_ttl_ms: 24 * 60 * 60 * 1000,
            rate_limit_max: 30,
            rate_limit_window_ms: 60_000,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct AlertFilter {
    pub actor_id: Option<String>,
    pub since: Option<u64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReportSummary {
    pub total_alerts: usize,
    pub blocked_users: usize,
    pub by_severity: Vec<(Severity, usize)>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SecurityReport {
    pub summary: ReportSummary,
    pub recommendations: Vec<String>,
}

struct WindowEvent {
    timestamp: u64,
    action: ActionType,
    kyc_id: String,
}

struct MonitorInner {
    config: MonitorConfig,
    max_window_ms: u64,
    windows: HashMap<String, VecDeque<WindowEvent>>,
    alerts: Vec<SecurityAlert>,
    next_alert_id: u64,
    blocks: HashMap<String, BlockRecord>,
    rate_marks: HashMap<String, VecDeque<u64>>,
}

pub struct SecurityMonitor {
    inner: Mutex<MonitorInner>,
    clock: Arc<dyn TimeSource>,
}

impl SecurityMonitor {
    pub fn new(config: MonitorConfig, clock: Arc<dyn TimeSource>) -> Arc<Self> {
        let max_window_ms = config
            .rules
            .iter()
            .map(|rule| rule.window_ms)
            .max()
            .unwrap_or(0);
        Arc::new(Self {
            inner: Mutex::new(MonitorInner {
                config,
                max_window_ms,
                windows: HashMap::new(),
                alerts: Vec::new(),
                next_alert_id: 1,
                blocks: HashMap::new(),
                rate_marks: HashMap::new(),
            }),
            clock,
        })
    }

    /// Wires the monitor to the logger's publish stream.
    pub fn attach(self: &Arc<Self>, logger: &AuditLogger) {
        let monitor = Arc::clone(self);
        logger.subscribe(move |entry| monitor.ingest(entry));
    }

    fn lock(&self) -> MutexGuard<'_, MonitorInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Feeds one audit entry into the rolling windows and evaluates every
    /// rule against the actor's updated window.
    pub fn ingest(&self, entry: &AuditEntry) {
        let mut inner = self.lock();
        let now = entry.timestamp;
        let horizon = now.saturating_sub(inner.max_window_ms);

        let window = inner.windows.entry(entry.actor_id.clone()).or_default();
        window.push_back(WindowEvent {
            timestamp: now,
            action: entry.action,
            kyc_id: entry.kyc_id.clone(),
        });
        while window.front().is_some_and(|e| e.timestamp < horizon) {
            window.pop_front();
        }

        for i in 0..inner.config.rules.len() {
            let rule = inner.config.rules[i].clone();
            let count = measure(&inner, &entry.actor_id, &rule, now);
            if count > rule.threshold {
                fire(&mut inner, &rule, entry, now, count);
            }
        }
    }

    /// True iff an unexpired block record exists; expired records are
    /// garbage-collected on the way.
    pub fn is_blocked(&self, actor_id: &str) -> bool {
        let now = self.clock.now_ms();
        let mut inner = self.lock();
        match inner.blocks.get(actor_id) {
            Some(record) if record.expires_at > now => true,
            Some(_) => {
                inner.blocks.remove(actor_id);
                false
            }
            None => false,
        }
    }

    pub fn block_record(&self, actor_id: &str) -> Option<BlockRecord> {
        let now = self.clock.now_ms();
        self.lock()
            .blocks
            .get(actor_id)
            .filter(|record| record.expires_at > now)
            .cloned()
    }

    /// Alerts matching the filter, most recent first.
    pub fn get_alerts(&self, filter: &AlertFilter) -> Vec<SecurityAlert> {
        let inner = self.lock();
        let mut alerts: Vec<SecurityAlert> = inner
            .alerts
            .iter()
            .filter(|alert| {
                filter
                    .actor_id
                    .as_ref()
                    .map_or(true, |actor| &alert.actor_id == actor)
                    && filter.since.map_or(true, |since| alert.timestamp >= since)
            })
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        alerts
    }

    /// Configured per-actor rate limit as `(max, window_ms)`.
    pub fn rate_limit(&self) -> (usize, u64) {
        let inner = self.lock();
        (
            inner.config.rate_limit_max,
            inner.config.rate_limit_window_ms,
        )
    }

    /// Marks one mutating action for the actor and rejects once the rate
    /// window overflows.
    pub fn check_rate_limit(&self, actor_id: &str) -> Result<()> {
        let now = self.clock.now_ms();
        let mut inner = self.lock();
        let window_ms = inner.config.rate_limit_window_ms;
        let max = inner.config.rate_limit_max;
        let marks = inner.rate_marks.entry(actor_id.to_string()).or_default();
        while marks.front().is_some_and(|t| *t + window_ms < now) {
            marks.pop_front();
        }
        if marks.len() >= max {
            return Err(KycError::RateLimit {
                actor_id: actor_id.to_string(),
            });
        }
        marks.push_back(now);
        Ok(())
    }

    /// Aggregates alerts over `[from, to]` and derives recommendations from
    /// the dominant pattern types.
    pub fn generate_report(&self, from: u64, to: u64) -> SecurityReport {
        let inner = self.lock();
        let in_range: Vec<&SecurityAlert> = inner
            .alerts
            .iter()
            .filter(|alert| alert.timestamp >= from && alert.timestamp <= to)
            .collect();

        let mut by_severity: Vec<(Severity, usize)> = Vec::new();
        for severity in [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
        ] {
            let count = in_range.iter().filter(|a| a.severity == severity).count();
            if count > 0 {
                by_severity.push((severity, count));
            }
        }

        let now = self.clock.now_ms();
        let blocked_users = inner
            .blocks
            .values()
            .filter(|record| record.expires_at > now)
            .count();

        let mut patterns: HashSet<&str> = HashSet::new();
        for alert in &in_range {
            patterns.insert(alert.pattern_type.as_str());
        }
        let mut recommendations = Vec::new();
        if patterns.contains("repeated_auth_failures") {
            recommendations.push(
                "repeated authentication failures observed: require stronger authentication \
                 (MFA) and review credential-stuffing exposure"
                    .to_string(),
            );
        }
        if patterns.contains("personal_info_scraping") {
            recommendations.push(
                "one actor viewed personal data across many KYC applications: review that \
                 actor's access scope and add per-role read limits"
                    .to_string(),
            );
        }
        if patterns.contains("repeated_rate_limiting") {
            recommendations.push(
                "rate limits tripped repeatedly: tighten per-actor limits or add backoff at \
                 the client"
                    .to_string(),
            );
        }
        if recommendations.is_empty() {
            recommendations.push("no anomalous activity in the selected range".to_string());
        }

        SecurityReport {
            summary: ReportSummary {
                total_alerts: in_range.len(),
                blocked_users,
                by_severity,
            },
            recommendations,
        }
    }
}

fn measure(inner: &MonitorInner, actor_id: &str, rule: &PatternRule, now: u64) -> usize {
    let Some(window) = inner.windows.get(actor_id) else {
        return 0;
    };
    let since = now.saturating_sub(rule.window_ms);
    match rule.predicate {
        PatternPredicate::RepeatedAction(action) => window
            .iter()
            .filter(|e| e.timestamp >= since && e.action == action)
            .count(),
        PatternPredicate::DistinctKycIds(action) => window
            .iter()
            .filter(|e| e.timestamp >= since && e.action == action)
            .map(|e| e.kyc_id.as_str())
            .collect::<HashSet<_>>()
            .len(),
    }
}

fn fire(inner: &mut MonitorInner, rule: &PatternRule, entry: &AuditEntry, now: u64, count: usize) {
    // One alert per rule firing episode: skip while a previous alert for the
    // same rule and actor is still inside the rule window, or while an
    // auto-block from this rule is active.
    let since = now.saturating_sub(rule.window_ms);
    let already_alerted = inner.alerts.iter().any(|alert| {
        alert.pattern_type == rule.name
            && alert.actor_id == entry.actor_id
            && alert.timestamp >= since
    });
    let blocked = inner
        .blocks
        .get(&entry.actor_id)
        .is_some_and(|record| record.expires_at > now);
    if already_alerted || (rule.auto_block && blocked) {
        return;
    }

    if rule.auto_block {
        let record = BlockRecord {
            actor_id: entry.actor_id.clone(),
            reason: rule.name.to_string(),
            created_at: now,
            expires_at: now + inner.config.block_ttl_ms,
        };
        log::warn!(
            "auto-blocking actor {} until {} ({})",
            record.actor_id,
            record.expires_at,
            rule.name
        );
        inner.blocks.insert(entry.actor_id.clone(), record);
    }

    let alert = SecurityAlert {
        id: inner.next_alert_id,
        timestamp: now,
        actor_id: entry.actor_id.clone(),
        pattern_type: rule.name.to_string(),
        severity: rule.severity,
        description: format!(
            "{} matched for actor {}: {} events within {}ms (threshold {})",
            rule.name, entry.actor_id, count, rule.window_ms, rule.threshold
        ),
        auto_blocked: rule.auto_block,
    };
    inner.next_alert_id += 1;
    log::info!(
        "security alert {}: {} [{}]",
        alert.id,
        alert.pattern_type,
        alert.severity.as_str()
    );
    inner.alerts.push(alert);
}
