//! Error types for cm-sql

use thiserror::Error;

/// SQL parsing and planning errors
#[derive(Error, Debug)]
pub enum SqlError {
    /// SQL parse error (S001)
    #[error("[S001] SQL parse error at line {line}, column {column}: {message}")]
    ParseError {
        message: String,
        line: usize,
        column: usize,
    },

    /// Empty SQL (S002)
    #[error("[S002] SQL is empty")]
    EmptySql,

    /// Index declaration is not a usable CREATE INDEX statement (S003)
    #[error("[S003] Invalid index declaration '{index}': {message}")]
    InvalidIndex { index: String, message: String },

    /// Schema change the planner refuses to translate (S004)
    #[error("[S004] Invalid {field}: {rule}")]
    Validation { field: String, rule: String },

    /// Change would orphan data in a dependent collection (S005)
    #[error("[S005] {message}")]
    ReferentialPolicy { message: String },
}

impl SqlError {
    /// Error kind as reported on the CLI.
    pub fn kind(&self) -> &'static str {
        match self {
            SqlError::ReferentialPolicy { .. } => "ReferentialPolicyError",
            _ => "ValidationError",
        }
    }

    pub(crate) fn invalid_index(index: &str, message: impl Into<String>) -> Self {
        SqlError::InvalidIndex {
            index: index.to_string(),
            message: message.into(),
        }
    }
}

/// Result type alias for SqlError
pub type SqlResult<T> = Result<T, SqlError>;
