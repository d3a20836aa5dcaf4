//! # SIEMQ Context
//!
//! Conversation memory for the security query engine.
//!
//! - [`ContextStore`]: concurrent, TTL-bounded store of sessions and their
//!   last few turns, with capacity eviction and a background sweeper
//! - [`ContextMerger`]: resolves follow-up questions ("show me more about
//!   those") against recent turns into a complete [`ResolvedQuery`](siemq_core::ResolvedQuery)

pub mod error;
pub mod merge;
pub mod session;
pub mod store;

pub use error::{ContextError, Result};
pub use merge::{ContextMerger, MergeRequest};
pub use session::{Session, SessionSummary, Turn};
pub use store::{ContextStore, StoreStats};
