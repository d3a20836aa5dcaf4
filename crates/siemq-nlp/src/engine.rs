//! NLP front-end.
//!
//! Validates and normalises a question, then runs the intent classifier and
//! slot extractor over it and flags referential language.

use chrono::{DateTime, Utc};
use serde::Serialize;
use siemq_core::{Intent, QueryConfig, SchemaRegistry, SlotSet};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::error::{NlpError, Result};
use crate::intent::KeywordClassifier;
use crate::slots::RuleBasedExtractor;
use crate::{IntentClassifier, SlotExtractor};

/// Words that point back at an earlier question.
pub const REFERENTIAL_WORDS: &[&str] = &["those", "these", "them", "same", "more", "also", "again"];

/// True when the question refers back to earlier results.
pub fn is_referential(text: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .any(|word| REFERENTIAL_WORDS.contains(&word.to_lowercase().as_str()))
}

/// Everything the NLP stage learned about one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    /// Whitespace-normalised question
    pub question: String,
    pub intent: Intent,
    pub slots: SlotSet,
    pub referential: bool,
}

/// Question validation plus classification and extraction.
pub struct NlpEngine {
    classifier: Arc<dyn IntentClassifier>,
    extractor: Arc<dyn SlotExtractor>,
    max_question_len: usize,
}

impl NlpEngine {
    /// Engine with the keyword classifier and rule-based extractor.
    pub fn new(schema: Arc<SchemaRegistry>) -> Self {
        info!("Initializing NLP engine");
        Self::with_components(
            Arc::new(KeywordClassifier::new()),
            Arc::new(RuleBasedExtractor::new(schema)),
        )
    }

    /// Engine honouring the question length and lookback limits of `query`.
    pub fn from_config(schema: Arc<SchemaRegistry>, query: &QueryConfig) -> Self {
        info!(
            max_lookback_days = query.max_lookback().num_days(),
            "Initializing NLP engine"
        );
        Self::with_components(
            Arc::new(KeywordClassifier::new()),
            Arc::new(RuleBasedExtractor::new(schema).with_max_lookback(query.max_lookback())),
        )
        .with_max_question_len(query.max_question_len)
    }

    pub fn with_components(
        classifier: Arc<dyn IntentClassifier>,
        extractor: Arc<dyn SlotExtractor>,
    ) -> Self {
        Self {
            classifier,
            extractor,
            max_question_len: 1000,
        }
    }

    pub fn with_max_question_len(mut self, max: usize) -> Self {
        self.max_question_len = max;
        self
    }

    /// Validates the question before processing.
    pub fn validate(&self, question: &str) -> Result<()> {
        if question.trim().is_empty() {
            return Err(NlpError::validation("Question cannot be empty"));
        }

        if question.chars().count() > self.max_question_len {
            return Err(NlpError::validation(format!(
                "Question is too long (max {} characters)",
                self.max_question_len
            )));
        }

        Ok(())
    }

    /// Trims and collapses whitespace.
    pub fn preprocess(&self, question: &str) -> String {
        question.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[instrument(skip(self, question), fields(question_len = question.len()))]
    pub fn analyze(&self, question: &str, now: DateTime<Utc>) -> Result<Analysis> {
        self.validate(question)?;
        let question = self.preprocess(question);

        let intent = self.classifier.classify(&question)?;
        let slots = self.extractor.extract(&question, now)?;
        let referential = is_referential(&question);

        debug!(
            intent = %intent.kind,
            confidence = intent.confidence,
            slots = slots.len(),
            referential,
            "Question analysed"
        );

        Ok(Analysis {
            question,
            intent,
            slots,
            referential,
        })
    }
}
