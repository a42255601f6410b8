use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;
use crate::diagnostics::DiagnosticSink;

/// One log file per run, named after the start time
pub fn log_file_name(started_at: DateTime<Local>) -> String {
    format!("bot_{}.log", started_at.format("%Y-%m-%d_%H-%M-%S"))
}

/// Install the global subscriber: plain-text output to stdout and the run's
/// log file, plus the diagnostic layer. Returns the log file path.
pub fn init(config: &LoggingConfig, diagnostics: &DiagnosticSink) -> Result<PathBuf> {
    std::fs::create_dir_all(&config.directory).with_context(|| {
        format!(
            "Failed to create log directory: {}",
            config.directory.display()
        )
    })?;

    let path = config.directory.join(log_file_name(Local::now()));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;
    let file = Arc::new(file);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let output = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout.and(file))
        .with_ansi(false)
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S,%3f".to_string()))
        .with_filter(filter);

    // The diagnostic layer sees warnings regardless of RUST_LOG.
    tracing_subscriber::registry()
        .with(output)
        .with(diagnostics.layer())
        .try_init()
        .map_err(|e| anyhow!("Failed to set global subscriber: {}", e))?;

    Ok(path)
}
