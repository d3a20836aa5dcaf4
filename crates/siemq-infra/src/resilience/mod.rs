//! Resilience helpers for backend calls.

pub mod timeout;

pub use timeout::{timeout_result, TimeoutError, TimeoutExecutor, TimeoutOrError};
