//! Logger setup for `mollyguardctl`.
//!
//! The tool mostly runs as a oneshot unit, so stderr goes to the journal. The
//! default format prefixes each line with its syslog priority (`<3>`), which
//! journald turns into the entry's level. Timestamps are left to the journal.

use env_logger::Builder;
use log::Level;
use serde_json::json;
use std::env;
use std::io::Write;
use std::sync::OnceLock;

static INIT: OnceLock<()> = OnceLock::new();

const FORMAT_ENV: &str = "MOLLYGUARD_LOG_FORMAT";
const LEVEL_ENV: &str = "MOLLYGUARD_LOG_LEVEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// `<priority>target: message`, one record per line.
    Journal,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Unknown names fall back to the journal format.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Journal,
        }
    }
}

/// Syslog priority journald assigns to a record of `level`.
pub fn syslog_priority(level: Level) -> u8 {
    match level {
        Level::Error => 3,
        Level::Warn => 4,
        Level::Info => 6,
        Level::Debug | Level::Trace => 7,
    }
}

/// Initialize the global logger once; later calls are no-ops.
///
/// The filter comes from `MOLLYGUARD_LOG_LEVEL`, then `RUST_LOG`, then
/// `default_level`. `MOLLYGUARD_LOG_FORMAT=json` switches to JSON lines.
pub fn init(default_level: &str) {
    INIT.get_or_init(|| configure(default_level));
}

fn configure(default_level: &str) {
    let filter = env::var(LEVEL_ENV)
        .or_else(|_| env::var("RUST_LOG"))
        .unwrap_or_else(|_| default_level.to_string());
    let format = env::var(FORMAT_ENV)
        .map(|name| LogFormat::parse(&name))
        .unwrap_or(LogFormat::Journal);

    let mut builder = Builder::new();
    builder.parse_filters(&filter);
    match format {
        LogFormat::Journal => {
            builder.format(|buf, record| {
                writeln!(
                    buf,
                    "<{}>{}: {}",
                    syslog_priority(record.level()),
                    record.target(),
                    record.args()
                )
            });
        }
        LogFormat::Json => {
            builder.format(|buf, record| {
                let payload = json!({
                    "priority": syslog_priority(record.level()),
                    "level": record.level().as_str().to_ascii_lowercase(),
                    "target": record.target(),
                    "message": record.args().to_string(),
                });
                writeln!(buf, "{payload}")
            });
        }
    }

    if let Err(err) = builder.try_init() {
        eprintln!("failed to initialize logger: {err}");
    }
}
