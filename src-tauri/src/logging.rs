// Desktop log sink
// Every supervisor lifecycle transition goes through `tracing`; this module
// installs the subscriber that appends those events to desktop.log (the file
// operators are pointed at when the backend gives up) and mirrors them on stderr.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;

/// Local wall-clock timestamps with millisecond precision
struct LocalTimestamp;

impl FormatTime for LocalTimestamp {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Install the global subscriber. Returns the log file path.
///
/// Safe to call more than once: later calls keep the first subscriber.
pub fn init(config: &Config) -> Result<PathBuf> {
    config
        .ensure_dirs()
        .with_context(|| format!("Failed to create {}", config.log_dir.display()))?;

    let log_path = config.log_file();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_timer(LocalTimestamp)
        .with_ansi(false);
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(LocalTimestamp)
        .with_target(false);

    // try_init fails only when a subscriber is already installed
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init();

    Ok(log_path)
}
