// src/error.rs

//! Error types for provenv

use thiserror::Error;

/// Errors surfaced by provenv operations
#[derive(Error, Debug)]
pub enum Error {
    /// A computation record with this identifier is already stored
    #[error("Computation record '{0}' already exists")]
    AlreadyExists(String),

    /// The requested item is not known
    #[error("{0} not found")]
    NotFound(String),

    /// A computation can only be executed once
    #[error("Computation already executed")]
    AlreadyExecuted,

    /// The repository was accessed outside an active unit-of-work scope
    #[error("Not inside an active unit-of-work scope")]
    NotInScope,

    /// The trigger failed; the underlying error is surfaced unmodified
    #[error(transparent)]
    Trigger(anyhow::Error),

    /// Environment enumeration failed (tool missing, unreadable system database)
    #[error("Environment query failed: {0}")]
    Environment(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Key serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
