//! Error taxonomy shared across the engine.

use thiserror::Error;

use crate::query::Operator;
use crate::schema::FieldType;

/// A field or operator the schema registry does not know about.
///
/// Always fatal for the request that raised it; never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Operator {operator} is not supported for field '{field}' of type {field_type}")]
    UnsupportedOperator {
        field: String,
        operator: Operator,
        field_type: FieldType,
    },
}

/// A malformed slot value. The slot is dropped and the request continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Slot '{field}' expects {expected} but got {actual}")]
    TypeMismatch {
        field: String,
        expected: FieldType,
        actual: FieldType,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Failure to insert a slot.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlotError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Application-level error used at the API boundary.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable name, used as `error_type` in API bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Schema(_) => "schema_error",
            Self::Execution(_) => "execution_error",
            Self::NotFound(_) => "not_found",
            Self::Config(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;
