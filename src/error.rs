//! Error types for panel reconciliation

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the reconciliation and replenishment stages
#[derive(Debug, Error)]
pub enum PanelError {
    /// Wave or table file could not be opened
    #[error("failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Output file or directory could not be written
    #[error("failed to write {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed CSV content
    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Required key column absent from an extract
    #[error("required column '{column}' not found in {path}")]
    MissingColumn { column: String, path: PathBuf },

    /// A key field could not be parsed
    #[error("invalid {field} value '{value}' in {path}")]
    InvalidValue {
        field: String,
        value: String,
        path: PathBuf,
    },

    /// Extracts disagree on their attribute columns
    #[error("schema mismatch in {path}: {reason}")]
    SchemaMismatch { path: PathBuf, reason: String },

    /// Stage configuration refers to something that does not exist or is unsafe
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Column referenced by a stage is not part of the panel schema
    #[error("column '{0}' not found in panel")]
    UnknownColumn(String),

    /// Minted identifier clashed with one already in use
    #[error("{kind} identifier collision on {id} (year {year})")]
    IdentifierCollision {
        kind: &'static str,
        id: i64,
        year: i32,
    },

    /// Configuration file could not be parsed
    #[error("failed to parse configuration {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for panel operations
pub type Result<T> = std::result::Result<T, PanelError>;
