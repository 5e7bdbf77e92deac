//! Error types for the sync library.
//!
//! Two families live here:
//!
//! - [`SyncError`]: job-level failures. These abort the current table job and
//!   propagate to the top-level driver.
//! - [`ConversionError`]: row-level failures raised while converting a source
//!   row. They never escape a job; the row is recorded as a reject instead.

use thiserror::Error;

use crate::orchestrator::SyncRunResult;

/// Exit code for configuration errors (invalid YAML, missing fields, etc.).
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for source database errors.
pub const EXIT_SOURCE_ERROR: u8 = 2;
/// Exit code for target database errors.
pub const EXIT_TARGET_ERROR: u8 = 3;
/// Exit code for job-level sync failures.
pub const EXIT_SYNC_ERROR: u8 = 4;
/// Exit code for reject artifact failures.
pub const EXIT_REJECT_SINK_ERROR: u8 = 5;
/// Exit code when the run was cancelled between jobs.
pub const EXIT_CANCELLED: u8 = 6;
/// Exit code for I/O errors (config file not found, etc.).
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source database connection or query error
    #[error("Source database error: {0}")]
    Source(#[from] sqlx::Error),

    /// Target database connection or statement error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Result header carries neither `id` nor `ID`
    #[error("No identity column (\"id\" or \"ID\") in the result columns for table {table}")]
    MissingIdentity { table: String },

    /// A table job failed for a reason other than the above
    #[error("Sync failed for table {table}: {message}")]
    Sync { table: String, message: String },

    /// Reject artifacts could not be created or written
    #[error("Reject sink error: {0}")]
    RejectSink(String),

    /// CSV writer error while writing reject artifacts
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Run was cancelled (SIGINT, etc.) before the next job started
    #[error("Sync cancelled")]
    Cancelled,

    /// A job failed under `on_job_error: abort`; `partial` holds the jobs
    /// that finished before it.
    #[error("Run aborted by failed job {job}")]
    Aborted {
        job: String,
        partial: Box<SyncRunResult>,
        #[source]
        source: Box<SyncError>,
    },
}

impl SyncError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        SyncError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Sync error for a table job
    pub fn sync(table: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Sync {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this error category.
    pub fn exit_code(&self) -> u8 {
        match self {
            SyncError::Config(_) | SyncError::Yaml(_) => EXIT_CONFIG_ERROR,
            SyncError::Source(_) => EXIT_SOURCE_ERROR,
            SyncError::Target(_) | SyncError::Pool { .. } => EXIT_TARGET_ERROR,
            SyncError::MissingIdentity { .. } | SyncError::Sync { .. } | SyncError::Json(_) => {
                EXIT_SYNC_ERROR
            }
            SyncError::RejectSink(_) | SyncError::Csv(_) => EXIT_REJECT_SINK_ERROR,
            SyncError::Cancelled => EXIT_CANCELLED,
            SyncError::Io(_) => EXIT_IO_ERROR,
            SyncError::Aborted { source, .. } => source.exit_code(),
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Why a single column value could not be converted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionCause {
    #[error("invalid date, expected YYYY-MM-DD")]
    InvalidDate,

    #[error("invalid timestamp, expected YYYY-MM-DD HH:MM:SS")]
    InvalidTimestamp,

    #[error("invalid interval, expected HH:MM:SS[.ffffff]")]
    InvalidInterval,

    #[error("target NUMBER({precision},{scale})")]
    NumericOverflow { precision: u32, scale: u32 },

    #[error("{found} value cannot be stored as {kind}")]
    Incompatible { kind: String, found: String },
}

/// A row-level conversion failure, raised on the first failing column.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", describe(.column, .value, .cause))]
pub struct ConversionError {
    /// Upper-cased column name.
    pub column: String,
    /// String projection of the offending source value.
    pub value: String,
    pub cause: ConversionCause,
}

impl ConversionError {
    pub fn new(column: impl Into<String>, value: impl Into<String>, cause: ConversionCause) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
            cause,
        }
    }
}

fn describe(column: &str, value: &str, cause: &ConversionCause) -> String {
    match cause {
        ConversionCause::NumericOverflow { .. } => {
            format!("Numeric overflow for {}='{}' {}", column, value, cause)
        }
        _ => format!("Conversion failed for {}='{}': {}", column, value, cause),
    }
}
