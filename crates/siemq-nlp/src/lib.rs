//! # SIEMQ NLP
//!
//! Deterministic natural-language front-end for the security query engine.
//!
//! - **Intent classification**: maps a question to one of a closed set of
//!   security-event categories ([`IntentKind`](siemq_core::IntentKind))
//! - **Slot extraction**: pulls typed, schema-validated slots (time range, IPs,
//!   severity, user...) and free keywords out of the question
//! - **Query building**: turns a merged [`ResolvedQuery`](siemq_core::ResolvedQuery)
//!   into a backend-agnostic structured query
//!
//! Classifier and extractor sit behind traits so a learned model can replace
//! the rule-based implementations without touching the rest of the pipeline.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use siemq_core::SchemaRegistry;
//! use siemq_nlp::NlpEngine;
//!
//! let engine = NlpEngine::new(Arc::new(SchemaRegistry::standard()));
//! let analysis = engine.analyze("Show failed logins in last 24 hours", chrono::Utc::now())?;
//! println!("Intent: {}", analysis.intent.kind);
//! # Ok::<(), siemq_nlp::NlpError>(())
//! ```

pub mod engine;
pub mod error;
pub mod intent;
pub mod query;
pub mod slots;

use chrono::{DateTime, Utc};
use siemq_core::{Intent, SlotSet};

pub use engine::{is_referential, Analysis, NlpEngine, REFERENTIAL_WORDS};
pub use error::{NlpError, Result};
pub use intent::KeywordClassifier;
pub use query::QueryBuilder;
pub use slots::RuleBasedExtractor;

/// Maps a question to an intent.
///
/// Implementations must be deterministic for a given input and return a
/// confidence in `[0, 1]`; input is non-empty and trimmed.
pub trait IntentClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Result<Intent>;
}

/// Extracts schema-valid slots from a question.
///
/// `now` anchors relative time phrases such as "last 24 hours".
pub trait SlotExtractor: Send + Sync {
    fn extract(&self, text: &str, now: DateTime<Utc>) -> Result<SlotSet>;
}
