//! Error types for shelf
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad index, unknown id, bad args, bad config)
//! - 4: Operation failed (storage rejected the write, I/O, lock timeout)

use std::path::PathBuf;
use thiserror::Error;

use crate::model::Level;

/// Exit codes for the shelf CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for shelf operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Invalid index {index} for a list of {len} item(s)")]
    InvalidIndex { index: usize, len: usize },

    #[error("{level} not found: {id}")]
    NotFound { level: Level, id: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Operation failures (exit code 4)
    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),
}

impl Error {
    pub fn not_found(level: Level, id: impl Into<String>) -> Self {
        Error::NotFound {
            level,
            id: id.into(),
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidIndex { .. }
            | Error::NotFound { .. }
            | Error::InvalidArgument(_)
            | Error::InvalidConfig(_) => exit_codes::USER_ERROR,

            Error::StorageFailure(_)
            | Error::ConstraintViolation(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::LockFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Structured fields for JSON error output, where the variant carries any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::InvalidIndex { index, len } => {
                Some(serde_json::json!({ "index": index, "len": len }))
            }
            Error::NotFound { level, id } => {
                Some(serde_json::json!({ "level": level, "id": id }))
            }
            Error::LockFailed(path) => Some(serde_json::json!({ "path": path })),
            _ => None,
        }
    }

    /// Fold anything raised while talking to a store into `StorageFailure`.
    ///
    /// Core errors (`InvalidIndex`, `NotFound`, `ConstraintViolation`) and an
    /// existing `StorageFailure` pass through unchanged.
    pub fn into_storage_failure(self) -> Self {
        match self {
            Error::InvalidIndex { .. }
            | Error::NotFound { .. }
            | Error::ConstraintViolation(_)
            | Error::StorageFailure(_) => self,
            other => Error::StorageFailure(other.to_string()),
        }
    }
}

/// Result type alias for shelf operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for displaying errors in JSON format
#[derive(serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        JsonError {
            error: err.to_string(),
            code: err.exit_code(),
            details: err.details(),
        }
    }
}
