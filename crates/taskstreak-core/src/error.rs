//! Core error types for taskstreak-core.
//!
//! The ledger itself cannot fail on a well-formed record. Everything in
//! here belongs to the I/O boundary: timezone validation, storage, config
//! and the request surface.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for taskstreak-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The identifier is not a recognized IANA zone.
    #[error("Invalid timezone: '{0}' is not a recognized IANA zone")]
    InvalidTimezone(String),

    /// Persisted state could not be decoded into a `UserRecord`.
    #[error("Invalid record for '{user}': {message}")]
    InvalidRecord { user: String, message: String },

    /// Storage I/O failed or timed out. Retried on the next cycle.
    #[error("Storage unavailable for '{user}': {message}")]
    StorageUnavailable { user: String, message: String },

    /// The id is not on the roster.
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Malformed input at the API boundary.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by a [`TaskStore`](crate::storage::TaskStore) implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No record has been written for this user yet.
    #[error("no record stored for '{0}'")]
    NotFound(String),

    /// The backing medium could not be reached.
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    /// A record exists but does not decode.
    #[error("stored record is corrupt: {0}")]
    Corrupt(String),

    /// The operation exceeded the configured deadline.
    #[error("storage operation timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// The data directory could not be resolved or created.
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

impl CoreError {
    /// Lift a storage failure into the core taxonomy for `user`.
    pub fn from_store(user: &str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => CoreError::UserNotFound(id),
            StoreError::Corrupt(message) => CoreError::InvalidRecord {
                user: user.to_string(),
                message,
            },
            other => CoreError::StorageUnavailable {
                user: user.to_string(),
                message: other.to_string(),
            },
        }
    }

    /// Whether the failure should simply be retried on the next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::StorageUnavailable { .. })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg)
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                StoreError::Unavailable("database is locked".to_string())
            }
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
