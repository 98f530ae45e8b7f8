//! Error types for sensetier-store.

use std::path::PathBuf;

use crate::predicate::PredicateError;

/// Result type for sensetier-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in sensetier-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The volatile tier was still full after one promotion retry.
    /// Fatal for that insert call; the caller must retry later.
    #[error("Volatile tier is full, insert failed after promotion retry")]
    CapacityExceeded,

    /// The selection string could not be parsed into a predicate.
    #[error("Malformed predicate: {0}")]
    MalformedPredicate(#[from] PredicateError),

    /// A mutation was requested against a target that does not allow it,
    /// for example deleting from the remote archive.
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Database error from SQLite. Transactions are rolled back before this
    /// surfaces, so a partial bulk insert is never observable.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create the database directory for the persistent tier.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
