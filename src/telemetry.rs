//! Tracing/logging initialization
//!
//! Logs always go to stderr; stdout carries the balances CSV.

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Output format of log lines
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Initialize tracing for the process, filtered by `RUST_LOG` (default `info`)
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let _ = match format {
        LogFormat::Text => builder.with_target(true).try_init(),
        LogFormat::Json => builder.json().with_target(true).try_init(),
    };
}
