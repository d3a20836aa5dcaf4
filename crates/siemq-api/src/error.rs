//! API error responses.
//!
//! Every failure is rendered as `{error_type, message, suggestion?, session_id?}`
//! with a status derived from the engine error.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use siemq_conversation::ConversationError;
use siemq_core::AppError;
use tracing::error;

const QUESTION_HINT: &str = "Ask a question such as 'Show failed logins in the last 24 hours'";

/// JSON error response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error_type: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error_type: error_type.into(),
                message: message.into(),
                suggestion: None,
                session_id: None,
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.body.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.body.session_id = session_id;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &ErrorBody {
        &self.body
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let status = match &err {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Schema(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Execution(_) => StatusCode::BAD_GATEWAY,
            AppError::Config(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &err {
            AppError::Validation(msg)
            | AppError::Execution(msg)
            | AppError::NotFound(msg)
            | AppError::Internal(msg) => msg.clone(),
            other => other.to_string(),
        };

        let api_error = Self::new(status, err.kind(), message);
        match err {
            AppError::Validation(_) => api_error.with_suggestion(QUESTION_HINT),
            AppError::Schema(_) => {
                api_error.with_suggestion("Rephrase the question using supported fields")
            }
            _ => api_error,
        }
    }
}

impl From<ConversationError> for ApiError {
    fn from(err: ConversationError) -> Self {
        AppError::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(
                status = self.status.as_u16(),
                error_type = %self.body.error_type,
                message = %self.body.message,
                "Request failed"
            );
        }
        (self.status, Json(self.body)).into_response()
    }
}
