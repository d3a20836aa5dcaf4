//! Query execution against a security event backend.

pub mod elasticsearch;
pub mod event;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use siemq_core::{AppError, StructuredQuery};
use thiserror::Error;

use crate::resilience::TimeoutError;
use event::SecurityEvent;

/// Errors raised while running a query against a backend
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    #[error("Bad response from backend: {0}")]
    BadResponse(String),

    #[error("Failed to load events: {0}")]
    Load(String),
}

impl ExecutionError {
    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::Unreachable(msg.into())
    }

    pub fn bad_response(msg: impl Into<String>) -> Self {
        Self::BadResponse(msg.into())
    }

    pub fn load(msg: impl Into<String>) -> Self {
        Self::Load(msg.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<ExecutionError> for AppError {
    fn from(err: ExecutionError) -> Self {
        AppError::execution(err.to_string())
    }
}

/// Events returned for one query plus backend statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    pub events: Vec<SecurityEvent>,
    /// Matches in the backend, which may exceed `events.len()`
    pub total_hits: u64,
    pub took_ms: u64,
    pub indices: Vec<String>,
}

impl ExecutionOutput {
    pub fn empty() -> Self {
        Self {
            events: Vec::new(),
            total_hits: 0,
            took_ms: 0,
            indices: Vec::new(),
        }
    }

    pub fn has_more(&self) -> bool {
        self.total_hits > self.events.len() as u64
    }
}

/// A backend that can answer structured queries.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &StructuredQuery) -> Result<ExecutionOutput, ExecutionError>;

    /// Short backend name used in logs
    fn name(&self) -> &str;
}
