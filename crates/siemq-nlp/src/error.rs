//! NLP-specific error types

use siemq_core::{AppError, SchemaError};
use thiserror::Error;

/// NLP-specific error types
#[derive(Error, Debug)]
pub enum NlpError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Classification error: {0}")]
    Classification(String),

    #[error("Slot extraction error: {0}")]
    Extraction(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl NlpError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn classification(msg: impl Into<String>) -> Self {
        Self::Classification(msg.into())
    }

    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type for NLP operations
pub type Result<T> = std::result::Result<T, NlpError>;

impl From<NlpError> for AppError {
    fn from(err: NlpError) -> Self {
        match err {
            NlpError::Validation(msg) => AppError::validation(msg),
            NlpError::Schema(err) => AppError::Schema(err),
            NlpError::Classification(msg) => AppError::internal(msg),
            NlpError::Extraction(msg) => AppError::internal(msg),
            NlpError::Internal(msg) => AppError::internal(msg),
        }
    }
}
