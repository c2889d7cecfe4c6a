//! Error handling for tdm.
//!
//! [`TdmError`] covers the whole failure taxonomy of a merge run. The two
//! contribution-level validation failures ([`TdmError::MalformedModel`] and
//! [`TdmError::UnknownCharacteristic`]) are usually accumulated into
//! [`crate::validation::ValidationMessages`] rather than returned directly,
//! so a single run can report every structural problem at once.

use std::io;

use thiserror::Error;

/// Main error type for tdm operations.
#[derive(Error, Debug)]
pub enum TdmError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed model document from '{contribution}': {reason}")]
    MalformedModel {
        contribution: String,
        reason: String,
    },

    #[error(
        "Contribution '{contribution}' declares a requirement on unknown characteristic '{key}'"
    )]
    UnknownCharacteristic { contribution: String, key: String },

    #[error("Model validation failed: {0}")]
    ValidationFailed(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Missing required config: {0}")]
    MissingConfig(String),

    #[error("Lock failed: {0}")]
    LockFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type alias using TdmError.
pub type Result<T> = std::result::Result<T, TdmError>;
