//! audit_export - filtered export of an audit database to JSON or CSV

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::Write;

use kyc_kernel::{
    system_clock, ActionType, AuditFilter, AuditLogger, AuditLoggerConfig, ExportFormat,
    SqliteAuditStore,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the audit database.
    #[arg(long, default_value = "kyc.db")]
    db_path: String,
    /// Restrict to one actor id.
    #[arg(long)]
    actor_id: Option<String>,
    /// Restrict to one KYC application id.
    #[arg(long)]
    kyc_id: Option<String>,
    /// Restrict to one action type (snake_case, e.g. failed_auth_attempt).
    #[arg(long)]
    action: Option<String>,
    /// Inclusive lower bound, epoch milliseconds.
    #[arg(long)]
    from: Option<u64>,
    /// Inclusive upper bound, epoch milliseconds.
    #[arg(long)]
    to: Option<u64>,
    /// Output format: json or csv.
    #[arg(long, default_value = "json")]
    format: String,
    /// Output file path; stdout when omitted.
    #[arg(long)]
    output: Option<String>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let format = match args.format.as_str() {
        "json" => ExportFormat::Json,
        "csv" => ExportFormat::Csv,
        other => return Err(anyhow!("unknown export format: {}", other)),
    };
    let action = args
        .action
        .as_deref()
        .map(|s| s.parse::<ActionType>())
        .transpose()
        .map_err(|e| anyhow!("{}", e))?;

    let store = SqliteAuditStore::open(&args.db_path).map_err(|e| anyhow!("{}", e))?;
    let logger = AuditLogger::new(Box::new(store), system_clock(), AuditLoggerConfig::default())
        .map_err(|e| anyhow!("{}", e))?;

    let filter = AuditFilter {
        actor_id: args.actor_id,
        kyc_id: args.kyc_id,
        action,
        date_from: args.from,
        date_to: args.to,
        ..AuditFilter::unbounded()
    };
    let rendered = logger
        .export_logs(&filter, format)
        .map_err(|e| anyhow!("{}", e))?;

    match args.output {
        Some(path) => {
            let mut file = std::fs::File::create(&path)?;
            file.write_all(rendered.as_bytes())?;
            log::info!("wrote export to {}", path);
        }
        None => print!("{}", rendered),
    }
    Ok(())
}
