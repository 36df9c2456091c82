use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort the whole run before or during a batch.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum RunnerError {
    #[error("Config file {0} could not be read: {1}")]
    ConfigFileNotReadable(String, String),

    #[error("Failed to parse config: {0}")]
    ConfigParse(String),

    #[error("Source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Source file {} could not be read: {1}", .0.display())]
    SourceUnreadable(PathBuf, String),

    #[error("CSV header is empty: {}", .0.display())]
    EmptyHeader(PathBuf),

    #[error("Invalid CSV row {row}: expected {expected} columns but got {actual} after normalization")]
    MalformedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Failed to write baseline {}: {1}", .0.display())]
    BaselineWrite(PathBuf, String),

    #[error("Failed to parse baseline {}: {1}", .0.display())]
    BaselineParse(PathBuf, String),

    #[error("No target rows matched the given filters")]
    NoMatchingJobs,

    #[error("{0}")]
    Usage(String),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    #[error("Query engine `{program}` could not be launched ({reason}); check that it is installed and on PATH")]
    EngineUnavailable { program: String, reason: String },
}

impl RunnerError {
    /// Environment problems get their own exit code so they are not mistaken for query failures.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunnerError::EngineUnavailable { .. } => 2,
            _ => 1,
        }
    }
}

/// Errors scoped to a single job. The batch runner logs and counts them, then moves on.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum JobError {
    #[error("Invalid line {line_no} (expected: <sql> <job_dt> <tbl_id>): {line}")]
    MalformedLine { line_no: usize, line: String },

    #[error("Missing {field} in record: {record}")]
    MissingField { field: String, record: String },

    #[error("SQL file not found: {}", .0.display())]
    TemplateNotFound(PathBuf),

    #[error("SQL file {} could not be read: {reason}", .path.display())]
    TemplateUnreadable { path: PathBuf, reason: String },

    #[error("query failed (exit_code={code})")]
    QueryFailed { code: u32 },

    #[error("query killed by signal {signal}")]
    QueryKilled { signal: u8 },

    #[error("lost contact with query engine: {0}")]
    EngineIo(String),
}

impl JobError {
    /// Whether the job had already been handed to the query engine when it failed.
    pub fn dispatched(&self) -> bool {
        matches!(
            self,
            JobError::QueryFailed { .. } | JobError::QueryKilled { .. } | JobError::EngineIo(_)
        )
    }
}

/// Outcome of handing one query to the engine: either the query failed, or the
/// engine itself could not be reached.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum EngineError {
    #[error(transparent)]
    Query(#[from] JobError),

    #[error(transparent)]
    Unavailable(#[from] RunnerError),
}
