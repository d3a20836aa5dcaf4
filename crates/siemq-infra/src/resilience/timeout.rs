//! Timeout handling
//!
//! Bounds backend calls by a deadline so a slow search cluster degrades a
//! response instead of hanging it.

use async_trait::async_trait;
use siemq_core::StructuredQuery;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::executor::{ExecutionError, ExecutionOutput, QueryExecutor};

/// An operation exceeded its deadline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Operation '{operation}' timed out after {duration:?}")]
pub struct TimeoutError {
    pub duration: Duration,
    pub operation: String,
}

/// Either a timeout or an operation error
#[derive(Error, Debug)]
pub enum TimeoutOrError<E> {
    #[error(transparent)]
    Timeout(TimeoutError),

    #[error("{0}")]
    Error(E),
}

impl<E> TimeoutOrError<E> {
    /// Collapses into the operation's error type.
    pub fn flatten(self) -> E
    where
        E: From<TimeoutError>,
    {
        match self {
            Self::Timeout(e) => E::from(e),
            Self::Error(e) => e,
        }
    }
}

/// Runs a fallible future with a deadline.
pub async fn timeout_result<F, Fut, T, E>(
    timeout: Duration,
    operation_name: &str,
    operation: F,
) -> Result<T, TimeoutOrError<E>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(timeout, operation()).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(TimeoutOrError::Error(e)),
        Err(_) => {
            warn!(
                operation = operation_name,
                timeout_ms = timeout.as_millis() as u64,
                "Operation timed out"
            );
            Err(TimeoutOrError::Timeout(TimeoutError {
                duration: timeout,
                operation: operation_name.to_string(),
            }))
        }
    }
}

/// Wraps an executor so every query is bounded by `timeout`.
pub struct TimeoutExecutor {
    inner: Arc<dyn QueryExecutor>,
    timeout: Duration,
    operation: String,
}

impl TimeoutExecutor {
    pub fn new(inner: Arc<dyn QueryExecutor>, timeout: Duration) -> Self {
        let operation = format!("{}.execute", inner.name());
        Self {
            inner,
            timeout,
            operation,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl QueryExecutor for TimeoutExecutor {
    async fn execute(&self, query: &StructuredQuery) -> Result<ExecutionOutput, ExecutionError> {
        timeout_result(self.timeout, &self.operation, || self.inner.execute(query))
            .await
            .map_err(TimeoutOrError::flatten)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
