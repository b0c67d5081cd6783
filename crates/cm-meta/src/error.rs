//! Error types for the meta-store.

use cm_core::CoreError;
use cm_db::DbError;
use cm_sql::SqlError;
use thiserror::Error;

/// Meta-store errors.
#[derive(Error, Debug)]
pub enum MetaError {
    /// Collection rejected by a meta-store check (M001).
    #[error("[M001] Invalid {field}: {rule}")]
    Validation { field: String, rule: String },

    /// Relation field points at a collection that does not exist (M002).
    #[error("[M002] Relation target collection '{missing_collection_id}' does not exist")]
    Reference { missing_collection_id: String },

    /// Collection name already taken (M003).
    #[error("[M003] Name '{on_name}' is already used by another collection or table")]
    Conflict { on_name: String },

    /// Collection or ledger row not found (M004).
    #[error("[M004] {what} not found")]
    NotFound { what: String },

    /// Change would orphan relations of another collection (M005).
    #[error("[M005] {message}")]
    ReferentialPolicy { message: String },

    /// Stored snapshot could not be decoded (M006).
    #[error("[M006] Stored snapshot for collection '{id}' is unreadable: {message}")]
    Snapshot { id: String, message: String },

    /// System-table bootstrap failed (M007).
    #[error("[M007] System table migration failed: {0}")]
    Bootstrap(String),

    /// Planner rejected the change (M008).
    #[error(transparent)]
    Planner(#[from] SqlError),

    /// Storage failure (M009).
    #[error(transparent)]
    Db(#[from] DbError),

    /// Meta-model validation failure (M010).
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl MetaError {
    pub(crate) fn validation(field: impl Into<String>, rule: impl Into<String>) -> Self {
        MetaError::Validation {
            field: field.into(),
            rule: rule.into(),
        }
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        MetaError::NotFound { what: what.into() }
    }

    /// Error kind as reported on the CLI.
    pub fn kind(&self) -> &'static str {
        match self {
            MetaError::Validation { .. } | MetaError::Snapshot { .. } => "ValidationError",
            MetaError::Reference { .. } => "ReferenceError",
            MetaError::Conflict { .. } => "ConflictError",
            MetaError::NotFound { .. } => "NotFoundError",
            MetaError::ReferentialPolicy { .. } => "ReferentialPolicyError",
            MetaError::Bootstrap(_) => "SqlError",
            MetaError::Planner(e) => e.kind(),
            MetaError::Db(e) => e.kind(),
            MetaError::Core(e) => e.kind(),
        }
    }
}

/// Result type alias for [`MetaError`].
pub type MetaResult<T> = Result<T, MetaError>;

impl From<rusqlite::Error> for MetaError {
    fn from(err: rusqlite::Error) -> Self {
        MetaError::Db(DbError::from(err))
    }
}
