//! Error types for cm-core

use thiserror::Error;

/// Core error type for colmig
#[derive(Error, Debug)]
pub enum CoreError {
    /// C001: A collection or field declaration was rejected
    #[error("[C001] Invalid {field}: {rule}")]
    Validation { field: String, rule: String },

    /// C002: Collection JSON could not be decoded (unknown kind, bad option, ...)
    #[error("[C002] Failed to parse collection: {message}")]
    CollectionParse { message: String },

    /// C003: Access rule does not match the rule grammar
    #[error("[C003] Invalid {rule} rule at offset {offset}: {message}")]
    RuleSyntax {
        rule: String,
        offset: usize,
        message: String,
    },

    /// C004: Configuration file not found
    #[error("[C004] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// C005: Failed to parse configuration file
    #[error("[C005] Failed to parse config: {message}")]
    ConfigParseError { message: String },

    /// C006: Invalid configuration value
    #[error("[C006] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// C007: Filesystem error while reading configuration or fixtures
    #[error("[C007] IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Shorthand for a [`CoreError::Validation`].
    pub fn validation(field: impl Into<String>, rule: impl Into<String>) -> Self {
        CoreError::Validation {
            field: field.into(),
            rule: rule.into(),
        }
    }

    /// Error kind as reported on the CLI (`ERROR <kind>: ...`).
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Validation { .. }
            | CoreError::CollectionParse { .. }
            | CoreError::RuleSyntax { .. }
            | CoreError::ConfigNotFound { .. }
            | CoreError::ConfigParseError { .. }
            | CoreError::ConfigInvalid { .. } => "ValidationError",
            CoreError::Io(_) => "IOError",
        }
    }
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
