//! Process-wide logging facility
//!
//! Installs one `tracing` subscriber for the whole process. The first call
//! to [`init`] wins; every later call returns the facility that is already
//! installed, whatever configuration it was given.
//!
//! File output goes through a non-blocking writer. Call [`shutdown`] before
//! the process exits so buffered lines reach the file.

use std::path::Path;
use std::sync::OnceLock;

use parking_lot::Mutex;
use tracing::debug;
use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{HostError, Result};

static FACILITY: OnceLock<LogFacility> = OnceLock::new();

/// The installed logging configuration.
#[derive(Debug)]
pub struct LogFacility {
    level: String,
    format: LogFormat,
    /// False if another subscriber was already set as the global default
    installed: bool,
    /// Flushes the file writer when dropped
    guard: Mutex<Option<WorkerGuard>>,
}

impl LogFacility {
    /// The filter directive in effect.
    pub fn level(&self) -> &str {
        &self.level
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }

    /// Whether this facility owns the global subscriber.
    pub fn is_installed(&self) -> bool {
        self.installed
    }

    /// Whether a file writer is still attached.
    pub fn has_file_writer(&self) -> bool {
        self.guard.lock().is_some()
    }
}

/// Install the process-wide subscriber once and return it.
///
/// Fails if the level, or the `MODHOST_LOG` override, is not a valid filter
/// directive. Once a facility is installed this always returns it.
pub fn init(config: &LoggingConfig) -> Result<&'static LogFacility> {
    if let Some(facility) = FACILITY.get() {
        return Ok(facility);
    }
    let level = config.effective_level();
    let filter = parse_filter(&level)?;
    Ok(FACILITY.get_or_init(|| install(config, level, filter)))
}

/// The facility, if [`init`] has run.
pub fn facility() -> Option<&'static LogFacility> {
    FACILITY.get()
}

/// Flush and detach the log file writer.
///
/// Blocks until every buffered line has been written. Events emitted after
/// this are no longer written to the file. Safe to call more than once.
pub fn shutdown() {
    if let Some(facility) = FACILITY.get() {
        drop(facility.guard.lock().take());
    }
}

fn parse_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level)
        .map_err(|e| HostError::Config(format!("invalid log level '{}': {}", level, e)))
}

fn install(config: &LoggingConfig, level: String, filter: EnvFilter) -> LogFacility {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    layers.push(match config.format {
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
    });

    let mut guard = None;
    if let Some(file) = &config.file {
        let (writer, file_guard) = NonBlockingBuilder::default()
            .lossy(false)
            .finish(file_appender(file));
        layers.push(fmt::layer().with_ansi(false).with_writer(writer).boxed());
        guard = Some(file_guard);
    }

    let installed = tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .is_ok();
    if installed {
        debug!("Logging initialized at '{}'", level);
    }

    LogFacility {
        level,
        format: config.format,
        installed,
        guard: Mutex::new(guard),
    }
}

fn file_appender(file: &Path) -> tracing_appender::rolling::RollingFileAppender {
    let dir = file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = file
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "modhost.log".into());
    tracing_appender::rolling::never(dir, name)
}
