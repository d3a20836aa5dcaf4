use siemq_core::AppError;
use thiserror::Error;

/// Context store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("Invalid turn: {0}")]
    InvalidTurn(String),

    #[error("Session capacity exhausted: {0}")]
    Capacity(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ContextError>;

impl From<ContextError> for AppError {
    fn from(err: ContextError) -> Self {
        AppError::internal(err.to_string())
    }
}
