//! Follow-up suggestions.
//!
//! Picks templates by intent and by how many results came back, fills in
//! `{ip}`, `{user}` and `{severity}` from the resolved query, and drops
//! anything the session has already asked.

use serde::{Deserialize, Serialize};
use siemq_context::Session;
use siemq_core::{fields, IntentKind, ResolvedQuery, SlotValue};
use std::collections::HashSet;

/// Below this many results a query counts as "small".
const SMALL_RESULT_LIMIT: u64 = 5;
const MAX_SUGGESTIONS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultBucket {
    Zero,
    Small,
    Large,
}

impl ResultBucket {
    /// `None` means execution failed and is treated as zero.
    pub fn of(result_count: Option<u64>) -> Self {
        match result_count.unwrap_or(0) {
            0 => Self::Zero,
            n if n < SMALL_RESULT_LIMIT => Self::Small,
            _ => Self::Large,
        }
    }
}

fn templates(intent: IntentKind, bucket: ResultBucket) -> &'static [&'static str] {
    use IntentKind::*;
    use ResultBucket::*;

    match (intent, bucket) {
        (Authentication, Zero) => &[
            "Show all authentication events for {user}",
            "Show failed logins in the last 7 days",
            "Show all activity from {ip} this week",
            "Check recent security alerts",
            "Try a different search term",
        ],
        (Authentication, Small) => &[
            "Show more details about these events",
            "Show all activity from {ip}",
            "Show all logins by {user} this week",
            "Find all high severity alerts this week",
            "Show failed logins in the last 7 days",
        ],
        (Authentication, Large) => &[
            "Show me the top attacking IPs",
            "Show only critical authentication failures",
            "Show failed logins from {ip} in the last hour",
            "Show logins by {user} with {severity} severity",
            "Filter by specific time range",
        ],
        (Malware, Zero) => &[
            "Show malware detections in the last 7 days",
            "Show file integrity changes today",
            "Check recent security alerts",
            "Try a different search term",
        ],
        (Malware, Small) => &[
            "Show more details about these events",
            "Show network connections from {ip}",
            "Show file integrity changes in the last 24 hours",
            "Show malware detection trends",
        ],
        (Malware, Large) => &[
            "Show malware detection trends",
            "Show only critical malware alerts",
            "Show malware alerts from {ip}",
            "Filter by specific time range",
        ],
        (Network, Zero) => &[
            "Show network connections in the last 7 days",
            "Analyze network traffic patterns",
            "Check recent security alerts",
            "Try a different search term",
        ],
        (Network, Small) => &[
            "Show more details about these events",
            "Show failed logins from {ip}",
            "Analyze related IP addresses",
            "Analyze network traffic patterns",
        ],
        (Network, Large) => &[
            "Show me the top attacking IPs",
            "Show only high severity network alerts",
            "Show connections to {ip} in the last hour",
            "Filter by specific time range",
        ],
        (FileAccess, Zero) => &[
            "Show file integrity changes in the last 7 days",
            "Show malware detections this week",
            "Check recent security alerts",
            "Try a different search term",
        ],
        (FileAccess, Small) => &[
            "Show more details about these events",
            "Show file changes by {user}",
            "Show malware alerts in the last 24 hours",
            "Find all high severity alerts this week",
        ],
        (FileAccess, Large) => &[
            "Show only critical file integrity alerts",
            "Show file changes by {user} today",
            "Filter by specific time range",
            "Show malware detection trends",
        ],
        (Generic, Zero) => &[
            "Try a different search term",
            "Check recent security alerts",
            "Show failed logins in the last 24 hours",
            "Show malware detections this week",
            "Analyze network traffic patterns",
        ],
        (Generic, Small) => &[
            "Show more details about these events",
            "Show all activity from {ip}",
            "Analyze related IP addresses",
            "Find all high severity alerts this week",
        ],
        (Generic, Large) => &[
            "Show only {severity} severity alerts",
            "Find all high severity alerts this week",
            "Show me the top attacking IPs",
            "Filter by specific time range",
            "Show malware detection trends",
        ],
    }
}

/// Generates at most five deterministic follow-up questions.
#[derive(Debug, Clone)]
pub struct SuggestionGenerator {
    max: usize,
}

impl Default for SuggestionGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SuggestionGenerator {
    pub fn new() -> Self {
        Self {
            max: MAX_SUGGESTIONS,
        }
    }

    pub fn with_max(mut self, max: usize) -> Self {
        self.max = max.min(MAX_SUGGESTIONS);
        self
    }

    pub fn generate(
        &self,
        resolved: &ResolvedQuery,
        result_count: Option<u64>,
        session: Option<&Session>,
    ) -> Vec<String> {
        let bucket = ResultBucket::of(result_count);
        let mut seen = HashSet::new();

        templates(resolved.intent, bucket)
            .iter()
            .filter_map(|template| render(template, resolved))
            .filter(|s| session.map_or(true, |session| !session.has_asked(s)))
            .filter(|s| seen.insert(s.to_lowercase()))
            .take(self.max)
            .collect()
    }
}

/// Fills placeholders, or `None` when one has no value.
fn render(template: &str, resolved: &ResolvedQuery) -> Option<String> {
    let mut rendered = template.to_string();

    if rendered.contains("{ip}") {
        let ip = resolved
            .slot(fields::SOURCE_IP)
            .or_else(|| resolved.slot(fields::DESTINATION_IP))?;
        rendered = rendered.replace("{ip}", &ip.to_string());
    }
    if rendered.contains("{user}") {
        let user = resolved.slot(fields::USER)?;
        rendered = rendered.replace("{user}", &user.to_string());
    }
    if rendered.contains("{severity}") {
        let severity = match resolved.slot(fields::SEVERITY)? {
            SlotValue::Severity(s) => s.as_str(),
            _ => return None,
        };
        rendered = rendered.replace("{severity}", severity);
    }

    Some(rendered)
}
