//! Error types for cm-db

use rusqlite::ErrorCode;
use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum DbError {
    /// Filesystem or disk failure (D001)
    #[error("[D001] Database I/O failed: {0}")]
    Io(String),

    /// Writer lock not obtained before the timeout (D002)
    #[error("[D002] Database is locked: {0}")]
    Locked(String),

    /// Statement rejected by SQLite (D003)
    #[error("[D003] SQL execution failed (code {code}): {message}")]
    Sql { code: i32, message: String },

    /// Connection could not be opened or is unusable (D004)
    #[error("[D004] Database connection failed: {0}")]
    Connection(String),
}

impl DbError {
    /// Error kind as reported on the CLI.
    pub fn kind(&self) -> &'static str {
        match self {
            DbError::Io(_) | DbError::Connection(_) => "IOError",
            DbError::Locked(_) => "LockedError",
            DbError::Sql { .. } => "SqlError",
        }
    }

    /// Whether retrying the operation later may succeed.
    pub fn is_busy(&self) -> bool {
        matches!(self, DbError::Locked(_))
    }
}

/// Result type alias for DbError
pub type DbResult<T> = Result<T, DbError>;

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        let message = err.to_string();
        match &err {
            rusqlite::Error::SqliteFailure(e, _) => match e.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => DbError::Locked(message),
                ErrorCode::SystemIoFailure
                | ErrorCode::DiskFull
                | ErrorCode::CannotOpen
                | ErrorCode::PermissionDenied
                | ErrorCode::ReadOnly
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseCorrupt => DbError::Io(message),
                _ => DbError::Sql {
                    code: e.extended_code,
                    message,
                },
            },
            _ => DbError::Sql { code: 0, message },
        }
    }
}
