//! # SIEMQ Core
//!
//! Shared building blocks for the conversational security query engine:
//! domain types (intents, slots, resolved queries), the schema registry that
//! every slot and filter is validated against, the backend-agnostic
//! structured query, an injectable clock and the application configuration.

pub mod clock;
pub mod config;
pub mod error;
pub mod query;
pub mod schema;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use self::config::*;
pub use error::*;
pub use query::{FieldFilter, Operator, Sort, SortOrder, StructuredQuery, TextMatch};
pub use schema::{fields, FieldSpec, FieldType, SchemaRegistry};
pub use types::*;
