use siemq_context::ContextError;
use siemq_core::{AppError, SchemaError};
use siemq_nlp::NlpError;
use thiserror::Error;

/// Errors that abort a conversation request.
///
/// Backend failures are not among them: those degrade the response instead.
#[derive(Error, Debug)]
pub enum ConversationError {
    #[error(transparent)]
    Nlp(#[from] NlpError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Context(#[from] ContextError),
}

pub type Result<T> = std::result::Result<T, ConversationError>;

impl From<ConversationError> for AppError {
    fn from(err: ConversationError) -> Self {
        match err {
            ConversationError::Nlp(e) => e.into(),
            ConversationError::Schema(e) => AppError::Schema(e),
            ConversationError::Context(e) => e.into(),
        }
    }
}
