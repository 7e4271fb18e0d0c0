//! Error types for the session shell.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the session, allocation and identity layers.
///
/// Token problems never show up here: an unreadable session token is
/// treated as "no session" by the identity store.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// A database name that would resolve outside the data directory
    #[error("Invalid database name '{db_name}': {reason}")]
    InvalidDbName { db_name: String, reason: String },

    /// A session pointing at a data directory other than the configured one
    #[error("Session data path '{}' does not match the configured data directory", path.display())]
    ForeignDataPath { path: PathBuf },

    /// Base dataset key not present in the catalog
    #[error("Unknown base dataset: {0}")]
    UnknownBaseData(String),

    /// Catalog entry without a seed file on disk
    #[error("Seed file for base dataset '{key}' is missing: {}", path.display())]
    MissingSeedFile { key: String, path: PathBuf },

    /// Private store already exists and would be overwritten by seeding
    #[error("Database '{0}' already exists")]
    StoreExists(String),

    /// Malformed catalog file
    #[error("Invalid base data catalog: {0}")]
    InvalidCatalog(String),

    /// Identity provider rejected the request or could not be reached
    #[error("{message}")]
    IdentityProvider { message: String },

    /// Explicit deletion of a store whose class is not deletable
    #[error("Deleting '{db_name}' is not supported")]
    UnsupportedDeletion { db_name: String },

    /// Filesystem failure during explicit deletion; the user may retry
    #[error("Could not delete '{}': {source}", path.display())]
    Deletion {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Operation not valid in the current resolver state
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// Background task failed to complete
    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<figment::Error> for AppError {
    fn from(e: figment::Error) -> Self {
        AppError::Config(Box::new(e))
    }
}

/// Result type for session shell operations
pub type AppResult<T> = Result<T, AppError>;
