//! # SIEMQ Conversation
//!
//! The request pipeline that turns a natural-language security question into
//! events, a summary, and follow-up suggestions while keeping per-session
//! context.

pub mod error;
pub mod manager;
pub mod suggestions;
pub mod summary;

pub use error::{ConversationError, Result};
pub use manager::{
    ClearedContext, ContextView, ConversationManager, QueryRequest, QueryResponse, QueryStats,
};
pub use suggestions::{ResultBucket, SuggestionGenerator};
pub use summary::{summarize, DEGRADED_SUMMARY};
