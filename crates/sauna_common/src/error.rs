//! Error taxonomy shared by the daemon and the CLI
//!
//! Too few samples is not an error: it is the `InsufficientData` state.

use thiserror::Error;

/// Failures of the sample store. Surfaced to the caller, never retried here.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sample store lock poisoned")]
    LockPoisoned,

    #[error("unparseable timestamp in store: {0}")]
    CorruptTimestamp(String),
}

/// A reading line from the sensor bridge that could not be used.
#[derive(Debug, Error)]
pub enum ReadingError {
    #[error("malformed reading: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid timestamp '{0}' (expected YYYY-MM-DD HH:MM:SS or RFC 3339)")]
    BadTimestamp(String),

    #[error("non-finite {field} value")]
    NonFinite { field: &'static str },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Failure while importing a history file. Bad lines are counted, not errors.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read history file: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
