//! Subscriber setup for the `symbridge` binary.
//!
//! - `RUST_LOG` overrides the filter entirely (e.g. `RUST_LOG=symbridge_core=debug`).
//! - `SYMBRIDGE_LOG_FORMAT` selects `pretty` (default) or `json` output.
//! - Without `RUST_LOG`, each `-v` raises the default level from `warn`.
//!
//! Logs go to stderr so `--json` output on stdout stays machine-readable.

use std::env;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use tracing::Level;
use tracing_subscriber::EnvFilter;

pub const LOG_FORMAT_ENV: &str = "SYMBRIDGE_LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {s}. Use 'pretty' or 'json'")),
        }
    }
}

impl LogFormat {
    /// Format named by `SYMBRIDGE_LOG_FORMAT`; unknown values fall back to pretty.
    pub fn from_env() -> Self {
        env::var(LOG_FORMAT_ENV).ok().and_then(|v| v.parse().ok()).unwrap_or_default()
    }
}

/// Map `-v` occurrences to a default level.
pub fn level_for_verbosity(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

pub fn init_logging(verbosity: u8) -> Result<()> {
    init_logging_with_format(verbosity, LogFormat::from_env())
}

pub fn init_logging_with_format(verbosity: u8, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_for_verbosity(verbosity).as_str()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);

    let installed = match format {
        LogFormat::Pretty => builder.with_target(false).try_init(),
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
    };
    installed.map_err(|e| anyhow!("Failed to initialize logging: {e}"))
}
