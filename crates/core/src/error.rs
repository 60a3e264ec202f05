//! Unified error types for the tag cache.
//!
//! Every variant belongs to one of three kinds (see [`ErrorKind`]); callers
//! that only care about retry-vs-refetch decisions should match on the kind.

use std::path::PathBuf;

use tokio_rusqlite::rusqlite;

/// Broad classification of [`Error`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The database file cannot be opened, read, or written.
    StorageUnavailable,
    /// A stored value could not be parsed back into its expected shape.
    Decode,
    /// The caller passed a value the store refuses to persist.
    InvalidInput,
}

/// Unified error type for cache operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database operation failed.
    #[error("STORAGE_UNAVAILABLE: {0}")]
    Database(tokio_rusqlite::Error),

    /// Filesystem preparation for the database location failed.
    #[error("STORAGE_UNAVAILABLE: {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Migration failed to apply.
    #[error("STORAGE_UNAVAILABLE: migration failed: {0}")]
    MigrationFailed(String),

    /// A stored blob or column could not be decoded.
    #[error("DECODE_ERROR: {0}")]
    Decode(String),

    /// Invalid input parameters (e.g., a non-finite TTL).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Database(_) | Error::Io { .. } | Error::MigrationFailed(_) => ErrorKind::StorageUnavailable,
            Error::Decode(_) => ErrorKind::Decode,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e.into(),
            other => Error::Database(other),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            // Column held a value of the wrong storage class: foreign or corrupt data.
            e @ (rusqlite::Error::InvalidColumnType(..) | rusqlite::Error::FromSqlConversionFailure(..)) => {
                Error::Decode(e.to_string())
            }
            e => Error::Database(tokio_rusqlite::Error::Error(e)),
        }
    }
}
