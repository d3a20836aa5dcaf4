//! Intent classification module.
//!
//! Keyword-based classification using pre-compiled, whole-word trigger
//! patterns. The longest matching trigger phrase decides the intent; equal
//! lengths are broken by intent priority.

use lazy_static::lazy_static;
use regex::Regex;
use siemq_core::{Intent, IntentKind};
use std::collections::HashSet;
use tracing::{debug, trace};

use crate::error::{NlpError, Result};
use crate::IntentClassifier;

/// Trigger pattern for one intent.
#[derive(Debug, Clone)]
struct TriggerPattern {
    regex: Regex,
    intent: IntentKind,
}

lazy_static! {
    /// Built-in trigger patterns. Alternatives are listed longest first so the
    /// leftmost-first regex semantics pick the longest phrase at a position.
    static ref TRIGGER_PATTERNS: Vec<TriggerPattern> = vec![
        TriggerPattern {
            regex: Regex::new(r"(?i)\b(failed\s+log-?ins?|brute\s+force|authentication|credentials?|passwords?|log-?ons?|log-?ins?|sign\s*ins?|sudo|ssh|auth)\b").unwrap(),
            intent: IntentKind::Authentication,
        },
        TriggerPattern {
            regex: Regex::new(r"(?i)\b(ransomware|infections?|infected|rootkits?|trojans?|malware|viruses|virus|worms?)\b").unwrap(),
            intent: IntentKind::Malware,
        },
        TriggerPattern {
            regex: Regex::new(r"(?i)\b(port\s+scans?|connections?|firewall|outbound|inbound|network|traffic|dns)\b").unwrap(),
            intent: IntentKind::Network,
        },
        TriggerPattern {
            regex: Regex::new(r"(?i)\b(file\s+integrity|file\s+access|file\s+changes?|syscheck|integrity|files?)\b").unwrap(),
            intent: IntentKind::FileAccess,
        },
    ];

    /// Single words that appear in built-in trigger phrases, minus "failed"
    /// which stays a searchable keyword.
    static ref TRIGGER_WORDS: HashSet<&'static str> = [
        "login", "logins", "log-in", "log-ins", "logon", "logons", "brute", "force",
        "authentication", "credential", "credentials", "password", "passwords", "sign", "signin",
        "signins", "sudo", "ssh", "auth", "ransomware", "infection", "infections", "infected",
        "rootkit", "rootkits", "trojan", "trojans", "malware", "virus", "viruses", "worm",
        "worms", "port", "scan", "scans", "connection", "connections", "firewall", "outbound",
        "inbound", "network", "traffic", "dns", "file", "files", "integrity", "access",
        "change", "changes", "syscheck",
    ]
    .into_iter()
    .collect();
}

/// True when `word` (lowercase) belongs to a built-in trigger phrase.
pub fn is_trigger_word(word: &str) -> bool {
    TRIGGER_WORDS.contains(word)
}

/// Whole-word, longest-match keyword classifier.
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier {
    /// Patterns added at runtime, consulted alongside the built-in ones
    custom_patterns: Vec<TriggerPattern>,
}

impl KeywordClassifier {
    pub fn new() -> Self {
        Self {
            custom_patterns: Vec::new(),
        }
    }

    /// Adds a whole-word trigger phrase for an intent.
    pub fn add_trigger(&mut self, phrase: &str, intent: IntentKind) -> Result<()> {
        let words: Vec<String> = phrase.split_whitespace().map(regex::escape).collect();
        if words.is_empty() {
            return Err(NlpError::classification("Trigger phrase cannot be empty"));
        }

        let pattern = format!(r"(?i)\b{}\b", words.join(r"\s+"));
        let regex = Regex::new(&pattern)
            .map_err(|e| NlpError::classification(format!("Invalid trigger '{}': {}", phrase, e)))?;
        self.custom_patterns.push(TriggerPattern { regex, intent });
        Ok(())
    }

    pub fn with_trigger(mut self, phrase: &str, intent: IntentKind) -> Result<Self> {
        self.add_trigger(phrase, intent)?;
        Ok(self)
    }

    fn best_match(&self, text: &str) -> Option<(IntentKind, String)> {
        let mut best: Option<(usize, IntentKind, String)> = None;

        for pattern in TRIGGER_PATTERNS.iter().chain(self.custom_patterns.iter()) {
            for found in pattern.regex.find_iter(text) {
                let phrase = found.as_str();
                let len = phrase.chars().count();
                trace!(intent = %pattern.intent, phrase, "Trigger matched");

                let better = match &best {
                    None => true,
                    Some((best_len, best_intent, _)) => {
                        len > *best_len
                            || (len == *best_len && pattern.intent.priority() < best_intent.priority())
                    }
                };
                if better {
                    best = Some((len, pattern.intent, phrase.to_lowercase()));
                }
            }
        }

        best.map(|(_, intent, phrase)| (intent, phrase))
    }
}

impl IntentClassifier for KeywordClassifier {
    fn classify(&self, text: &str) -> Result<Intent> {
        let text = text.trim();
        if text.is_empty() {
            return Err(NlpError::validation("Question cannot be empty"));
        }

        let intent = match self.best_match(text) {
            Some((kind, phrase)) => Intent::new(kind, 1.0).with_phrase(phrase),
            None => {
                debug!("No trigger matched, falling back to generic intent");
                Intent::generic()
            }
        };

        debug!(
            intent = %intent.kind,
            confidence = intent.confidence,
            "Classified intent"
        );
        Ok(intent)
    }
}
