//! Error types for cm-runner

use cm_db::DbError;
use cm_meta::MetaError;
use std::path::PathBuf;
use thiserror::Error;

/// Runner and registry errors
#[derive(Error, Debug)]
pub enum RunnerError {
    /// Two steps share an id (R001)
    #[error("[R001] Duplicate migration id {id}: '{first}' and '{second}'")]
    DuplicateMigrationId {
        id: i64,
        first: String,
        second: String,
    },

    /// Step file name has no numeric id prefix (R002)
    #[error("[R002] Migration file '{file}' must be named <id>_<name>.<ext>")]
    InvalidFileName { file: String },

    /// Ledger holds a step the registry does not know (R003)
    #[error("[R003] Applied migration {id} is not registered; the database is ahead of this build (run `migrate history-sync` to drop it)")]
    LedgerDivergence { id: i64 },

    /// Pending step sorts below the last applied one (R004)
    #[error("[R004] Migration {id} is pending but {max_applied} is already applied")]
    OutOfOrder { id: i64, max_applied: i64 },

    /// Advisory lock still held after the lock timeout (R005)
    #[error("[R005] Migration lock held by {holder} since {since}")]
    Locked { holder: String, since: String },

    /// Step file could not be decoded (R006)
    #[error("[R006] Invalid migration file '{file}': {message}")]
    MigrationFile { file: String, message: String },

    /// A step's up or down failed; its transaction was rolled back (R007)
    #[error("[R007] Migration {id} ({file}) failed: {source}")]
    StepFailed {
        id: i64,
        file: String,
        #[source]
        source: MetaError,
    },

    /// Filesystem error reading migrations (R008)
    #[error("[R008] Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Meta(#[from] MetaError),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl RunnerError {
    /// Error kind as reported on the CLI.
    pub fn kind(&self) -> &'static str {
        match self {
            RunnerError::DuplicateMigrationId { .. } => "DuplicateMigrationId",
            RunnerError::InvalidFileName { .. } | RunnerError::MigrationFile { .. } => {
                "ValidationError"
            }
            RunnerError::LedgerDivergence { .. } => "LedgerDivergence",
            RunnerError::OutOfOrder { .. } => "OutOfOrder",
            RunnerError::Locked { .. } => "LockedError",
            RunnerError::StepFailed { source, .. } => source.kind(),
            RunnerError::Io { .. } => "IOError",
            RunnerError::Meta(e) => e.kind(),
            RunnerError::Db(e) => e.kind(),
        }
    }

    /// Whether the ledger cannot be reproduced from the registry.
    pub fn is_divergence(&self) -> bool {
        matches!(
            self,
            RunnerError::LedgerDivergence { .. } | RunnerError::OutOfOrder { .. }
        )
    }
}

/// Result type alias for RunnerError
pub type RunnerResult<T> = Result<T, RunnerError>;
