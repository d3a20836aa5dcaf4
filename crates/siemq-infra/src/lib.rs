//! # SIEMQ Infrastructure
//!
//! Backends that run a [`StructuredQuery`](siemq_core::StructuredQuery)
//! against security event data, plus the timeout guard the conversation
//! pipeline wraps them in.
//!
//! - [`InMemoryExecutor`]: filters a local event set (built-in samples or a
//!   JSON export)
//! - [`ElasticsearchExecutor`]: posts the rendered DSL to a Wazuh /
//!   Elasticsearch index
//! - [`TimeoutExecutor`]: bounds any executor by a deadline

pub mod executor;
pub mod resilience;

pub use executor::{
    elasticsearch::ElasticsearchExecutor, event::SecurityEvent, memory::InMemoryExecutor,
    ExecutionError, ExecutionOutput, QueryExecutor,
};
pub use resilience::{timeout_result, TimeoutError, TimeoutExecutor, TimeoutOrError};
