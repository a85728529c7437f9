//! Core error types for heartpoll-core.
//!
//! This module defines the error hierarchy using thiserror. Spam-gate
//! rejections and malformed inbound votes are not errors: they surface as
//! [`crate::vote::IntakeOutcome`] variants instead.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for heartpoll-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Storage errors (the store is unavailable or a query failed)
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Outbound broadcast errors
    #[error("Broadcast error: {0}")]
    Broadcast(#[from] BroadcastError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// The data directory holding the database could not be created
    #[error("Data directory unavailable: {0}")]
    DataDirUnavailable(#[from] std::io::Error),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// A previous holder of the connection panicked
    #[error("Database connection mutex poisoned")]
    LockPoisoned,

    /// A stored row could not be decoded
    #[error("Corrupt row in '{table}': {message}")]
    CorruptRow { table: &'static str, message: String },
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

    /// Missing required configuration key
    #[error("Missing required configuration key: {0}")]
    MissingKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Outbound broadcast errors.
#[derive(Error, Debug)]
pub enum BroadcastError {
    /// Transport-level failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The chat API answered with `ok: false` or a non-success status
    #[error("{method} rejected by chat API: {description}")]
    Api { method: String, description: String },

    /// No credential available
    #[error("Bot token not configured")]
    NotConfigured,
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked
                    || err.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

impl<T> From<std::sync::PoisonError<T>> for DatabaseError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        DatabaseError::LockPoisoned
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
