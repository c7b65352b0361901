//! Error types for the Sprintlens evaluation and metrics engine
//!
//! This module provides structured error definitions using thiserror. The
//! first four variants form the caller-facing taxonomy (not found, validation,
//! constraint violation, storage failure); the rest are ambient failures
//! raised while loading configuration or decoding persisted rows.

use thiserror::Error;

/// Main error type for Sprintlens operations
#[derive(Error, Debug)]
pub enum SprintlensError {
    /// A referenced root entity does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Missing required field or malformed payload
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Uniqueness or foreign-key constraint rejected a write
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Schema migration failed
    #[error("Migration error: {0}")]
    Migration(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored timestamp could not be parsed
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(#[from] chrono::ParseError),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl SprintlensError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        SprintlensError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SprintlensError::NotFound { .. })
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, SprintlensError::ConstraintViolation(_))
    }
}

/// Result type alias for Sprintlens operations
pub type Result<T> = std::result::Result<T, SprintlensError>;

/// SQLite reports every constraint failure as "<KIND> constraint failed: ..."
impl From<libsql::Error> for SprintlensError {
    fn from(err: libsql::Error) -> Self {
        let message = err.to_string();
        if message.contains("constraint failed") {
            SprintlensError::ConstraintViolation(message)
        } else {
            SprintlensError::Database(message)
        }
    }
}

/// Convert anyhow::Error to SprintlensError
impl From<anyhow::Error> for SprintlensError {
    fn from(err: anyhow::Error) -> Self {
        SprintlensError::Other(err.to_string())
    }
}
