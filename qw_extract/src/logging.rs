/// Structured logging for the extraction pipeline
///
/// Every event carries the stream it concerns (ENV, QA, or SYS for
/// call-level events) and the partition identifier, so a log line can be
/// traced back to the table set it came from. Events go through `tracing`;
/// `init_logger` installs a fmt subscriber writing to the console or
/// appending to a file.

use std::fmt;
use std::fs::OpenOptions;
use std::sync::Mutex;

use crate::backend::BackendError;
use crate::error::{EmptyResultWarning, Stage};
use crate::model::Stream;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn as_tracing(self) -> tracing::Level {
        match self {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warning => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }

    /// Parses `debug`, `info`, `warn`/`warning` and `error`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Wrong database, partition or table name in configuration
    Configuration,
    /// The backend dropped or refused the connection
    Connectivity,
    /// Anything else the backend reported
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Configuration => write!(f, "CONFIGURATION"),
            FailureType::Connectivity => write!(f, "CONNECTIVITY"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

pub fn classify_backend_failure(err: &BackendError) -> FailureType {
    match err {
        BackendError::MissingTable(_) | BackendError::InvalidIdentifier(_) => {
            FailureType::Configuration
        }
        BackendError::Connect(_) => FailureType::Connectivity,
        BackendError::Query(_) => FailureType::Unknown,
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Install the global subscriber.
///
/// With `log_file` set, events are appended to that file without ANSI
/// colors; otherwise they go to stderr. A subscriber installed earlier (by a
/// test harness, say) is left in place.
pub fn init_logger(
    min_level: LogLevel,
    log_file: Option<&str>,
    console_timestamps: bool,
) -> std::io::Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_max_level(min_level.as_tracing())
        .with_target(false);

    let installed = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).try_init()
        }
        None if console_timestamps => builder.with_writer(std::io::stderr).try_init(),
        None => builder
            .without_time()
            .with_writer(std::io::stderr)
            .try_init(),
    };

    if installed.is_err() {
        tracing::debug!("global subscriber already installed; keeping it");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

fn emit(level: LogLevel, stream: Option<Stream>, partition: Option<&str>, message: &str) {
    let stream = stream.map_or_else(|| "SYS".to_string(), |s| s.to_string());
    let partition = partition.unwrap_or("-");
    match level {
        LogLevel::Debug => tracing::debug!(stream = %stream, partition, "{}", message),
        LogLevel::Info => tracing::info!(stream = %stream, partition, "{}", message),
        LogLevel::Warning => tracing::warn!(stream = %stream, partition, "{}", message),
        LogLevel::Error => tracing::error!(stream = %stream, partition, "{}", message),
    }
}

/// Log a general informational message
pub fn info(stream: Option<Stream>, partition: Option<&str>, message: &str) {
    emit(LogLevel::Info, stream, partition, message);
}

/// Log a warning message
pub fn warn(stream: Option<Stream>, partition: Option<&str>, message: &str) {
    emit(LogLevel::Warning, stream, partition, message);
}

/// Log an error message
pub fn error(stream: Option<Stream>, partition: Option<&str>, message: &str) {
    emit(LogLevel::Error, stream, partition, message);
}

/// Log a debug message
pub fn debug(stream: Option<Stream>, partition: Option<&str>, message: &str) {
    emit(LogLevel::Debug, stream, partition, message);
}

// ---------------------------------------------------------------------------
// Pipeline Logging
// ---------------------------------------------------------------------------

/// Log the row count a stream has after a stage.
pub fn log_stage_rows(stream: Stream, partition: &str, stage: Stage, rows: usize) {
    debug(
        Some(stream),
        Some(partition),
        &format!("{} rows after {}", rows, stage),
    );
}

pub fn log_empty_stage(warning: &EmptyResultWarning) {
    warn(Some(warning.stream), Some(&warning.partition), &warning.to_string());
}

/// Log a failed backend query with its classification.
pub fn log_query_failure(partition: &str, table: &str, err: &BackendError) {
    let failure_type = classify_backend_failure(err);
    let message = format!("query on {} failed [{}]: {}", table, failure_type, err);
    error(None, Some(partition), &message);
}

/// Log a summary of one batched lookup.
pub fn log_batch_summary(partition: &str, table: &str, keys: usize, batches: usize, rows: usize) {
    debug(
        None,
        Some(partition),
        &format!(
            "{}: {} keys in {} batch(es) returned {} rows",
            table, keys, batches, rows
        ),
    );
}

/// Log records dropped because they lacked required key columns.
pub fn log_undecodable(partition: &str, table: &str, skipped: usize) {
    if skipped > 0 {
        debug(
            None,
            Some(partition),
            &format!("{}: skipped {} row(s) missing key columns", table, skipped),
        );
    }
}
