//! Error types for ads-report-dl
//!
//! The taxonomy separates the failure domains of a report run:
//! - `Config` — bad or missing CLI/configuration input, fatal before any task runs
//! - `Fetch` — report download failures, split transient vs permanent
//! - `Mapping` — per-row CSV-to-entity failures with row and column context
//! - `Database` — persistence failures

use std::path::Path;
use thiserror::Error;

/// Result type alias for ads-report-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for ads-report-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "reporting.concurrency")
        key: Option<String>,
    },

    /// Report download failed
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// CSV row could not be mapped to an entity
    #[error("mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External tool execution failed (HTML-to-PDF converter)
    #[error("external tool error: {0}")]
    ExternalTool(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Report download errors, classified by whether a retry can help
#[derive(Clone, Debug, Error)]
pub enum FetchError {
    /// The API asked us to back off; retried with backoff
    #[error("rate limited by report endpoint{}", retry_after_secs.map(|s| format!(" (retry after {s}s)")).unwrap_or_default())]
    RateLimited {
        /// Server-provided Retry-After hint, if any
        retry_after_secs: Option<u64>,
    },

    /// Transient failure (server error, timeout, connection reset); retried
    #[error("transient fetch failure: {0}")]
    Transient(String),

    /// Permanent failure (invalid account, no permission, malformed definition); never retried
    #[error("permanent fetch failure: {0}")]
    Permanent(String),
}

/// Per-row mapping errors
///
/// Row indexes are 1-based and count data rows only: the first data row after
/// the header is row 1.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    /// A required column is absent from the report header
    #[error("required column '{column}' missing from report header")]
    MissingColumn {
        /// The column name declared required by the schema
        column: String,
    },

    /// A raw value could not be coerced to the declared field type
    #[error("row {row}: column '{column}' value '{value}' is not a valid {expected}")]
    InvalidValue {
        /// 1-based data row index
        row: usize,
        /// Column name
        column: String,
        /// The raw CSV value that failed to parse
        value: String,
        /// The declared field type name
        expected: &'static str,
    },

    /// A date value did not match the expected format
    #[error("row {row}: column '{column}' value '{value}' does not match date format {format}")]
    DateFormat {
        /// 1-based data row index
        row: usize,
        /// Column name
        column: String,
        /// The raw CSV value that failed to parse
        value: String,
        /// The expected chrono format string
        format: &'static str,
    },

    /// A line could not be decoded as a CSV record
    #[error("row {row}: malformed CSV record: {message}")]
    MalformedRecord {
        /// 1-based data row index
        row: usize,
        /// Decoder error text
        message: String,
    },
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Constraint violation (e.g., duplicate key outside the upsert path)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Stored entity could not be decoded back into a report entity
    #[error("stored entity {id} is corrupt: {reason}")]
    CorruptEntity {
        /// Database row id
        id: i64,
        /// What failed to decode
        reason: String,
    },
}

/// Export errors surface through `Error::ExternalTool` / `Error::Io`; this helper
/// builds the tool variant with the binary path for context.
pub(crate) fn external_tool_error(tool: &Path, detail: impl std::fmt::Display) -> Error {
    Error::ExternalTool(format!("{}: {}", tool.display(), detail))
}
