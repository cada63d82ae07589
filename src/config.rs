//! TOML configuration for the kernel.
//!
//! Every field is optional in the file and resolved against documented
//! defaults, so an empty or missing config is always valid.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;

use crate::audit::{AuditLoggerConfig, BackpressurePolicy};
use crate::monitor::MonitorConfig;

const DEFAULT_DB_PATH: &str = "kyc.db";
const DEFAULT_STORE_CATEGORY: &str = "session";
const DEFAULT_QUEUE_CAPACITY: usize = 256;
const DEFAULT_BLOCK_TTL_HOURS: u64 = 24;
const DEFAULT_RATE_LIMIT_MAX: usize = 30;
const DEFAULT_RATE_LIMIT_WINDOW_S: u64 = 60;

#[derive(Debug, Deserialize, Default)]
struct KernelConfigFile {
    db_path: Option<String>,
    store_category: Option<String>,
    audit: Option<AuditConfigFile>,
    monitor: Option<MonitorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct AuditConfigFile {
    queue_capacity: Option<usize>,
    backpressure: Option<BackpressurePolicy>,
}

#[derive(Debug, Deserialize, Default)]
struct MonitorConfigFile {
    block_ttl_hours: Option<u64>,
    rate_limit_max: Option<usize>,
    rate_limit_window_s: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub db_path: String,
    pub store_category: String,
    pub audit_queue_capacity: usize,
    pub audit_backpressure: BackpressurePolicy,
    pub block_ttl_hours: u64,
    pub rate_limit_max: usize,
    pub rate_limit_window_s: u64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
            store_category: DEFAULT_STORE_CATEGORY.to_string(),
            audit_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            audit_backpressure: BackpressurePolicy::Block,
            block_ttl_hours: DEFAULT_BLOCK_TTL_HOURS,
            rate_limit_max: DEFAULT_RATE_LIMIT_MAX,
            rate_limit_window_s: DEFAULT_RATE_LIMIT_WINDOW_S,
        }
    }
}

impl KernelConfig {
    /// Loads a config file, falling back to defaults for anything unset.
    /// A missing file yields the full default configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(path)
                    .map_err(|e| anyhow!("failed to read config {}: {}", path.display(), e))?;
                toml::from_str::<KernelConfigFile>(&raw)
                    .map_err(|e| anyhow!("failed to parse config {}: {}", path.display(), e))?
            }
            Some(path) => return Err(anyhow!("config file not found: {}", path.display())),
            None => KernelConfigFile::default(),
        };

        let audit = file.audit.unwrap_or_default();
        let monitor = file.monitor.unwrap_or_default();
        Ok(Self {
            db_path: file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            store_category: file
                .store_category
                .unwrap_or_else(|| DEFAULT_STORE_CATEGORY.to_string()),
            audit_queue_capacity: audit.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
            audit_backpressure: audit.backpressure.unwrap_or_default(),
            block_ttl_hours: monitor.block_ttl_hours.unwrap_or(DEFAULT_BLOCK_TTL_HOURS),
            rate_limit_max: monitor.rate_limit_max.unwrap_or(DEFAULT_RATE_LIMIT_MAX),
            rate_limit_window_s: monitor
                .rate_limit_window_s
                .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_S),
        })
    }

    pub fn audit_config(&self) -> AuditLoggerConfig {
        AuditLoggerConfig {
            queue_capacity: self.audit_queue_capacity,
            policy: self.audit_backpressure,
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            block_ttl_ms: self.block_ttl_hours * 60 * 60 * 1000,
            rate_limit_max: self.rate_limit_max,
            rate_limit_window_ms: self.rate_limit_window_s * 1000,
            ..MonitorConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_path_gives_defaults() {
        let cfg = KernelConfig::load(None).expect("defaults");
        assert_eq!(cfg.db_path, DEFAULT_DB_PATH);
        assert_eq!(cfg.audit_backpressure, BackpressurePolicy::Block);
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("kernel.toml");
        let mut file = std::fs::File::create(&path).expect("create");
        writeln!(
            file,
            "db_path = \"custom.db\"\n\n[audit]\nbackpressure = \"drop_oldest\"\n\n[monitor]\nblock_ttl_hours = 1"
        )
        .expect("write");

        let cfg = KernelConfig::load(Some(&path)).expect("load");
        assert_eq!(cfg.db_path, "custom.db");
        assert_eq!(cfg.audit_backpressure, BackpressurePolicy::DropOldest);
        assert_eq!(cfg.block_ttl_hours, 1);
        assert_eq!(cfg.rate_limit_max, DEFAULT_RATE_LIMIT_MAX);
    }
}
