//! Common error types for maDMP synchronization

use thiserror::Error;

/// Common result type for maDMP operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the store, the repository stand-in and the services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// Another writer kept the database locked past the busy timeout
    ///
    /// Retryable, like [`Error::DuplicateKey`].
    #[error("Database busy: {0}")]
    Busy(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An entity with the same external identifier already exists
    ///
    /// Raised on unique-constraint violations, including the ones caused by two
    /// concurrent writers creating the same key. Callers may retry.
    #[error("{entity} already exists: {key}")]
    DuplicateKey { entity: &'static str, key: String },

    /// Stored data could not be decoded
    #[error("Corrupt data: {0}")]
    Corrupt(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map a unique-constraint violation to [`Error::DuplicateKey`], pass everything else through
    pub fn from_insert(err: sqlx::Error, entity: &'static str, key: impl Into<String>) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => Error::DuplicateKey {
                entity,
                key: key.into(),
            },
            _ => Error::from(err),
        }
    }

    /// True for errors that signal a conflicting concurrent write
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::DuplicateKey { .. } | Error::Busy(_))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        if is_busy(&err) {
            Error::Busy(err.to_string())
        } else {
            Error::Database(err)
        }
    }
}

/// SQLITE_BUSY or SQLITE_LOCKED, including their extended codes
fn is_busy(err: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db_err) = err else {
        return false;
    };
    db_err
        .code()
        .and_then(|code| code.parse::<i32>().ok())
        .map_or(false, |code| matches!(code & 0xff, 5 | 6))
}
