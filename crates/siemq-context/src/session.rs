//! Sessions and the turns they own.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use siemq_core::{fields, IntentKind, ResolvedQuery, SessionId, SlotValue, TimeRange};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// One answered question. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub intent: IntentKind,
    /// Stated or inherited slots, time range included when not defaulted
    pub slots: BTreeMap<String, SlotValue>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub timestamp: DateTime<Utc>,
    /// Total hits; `None` when execution failed
    pub result_count: Option<u64>,
}

impl Turn {
    pub fn new(question: impl Into<String>, intent: IntentKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            question: question.into(),
            intent,
            slots: BTreeMap::new(),
            keywords: Vec::new(),
            timestamp,
            result_count: None,
        }
    }

    /// Turn recording a resolved query and its outcome.
    pub fn from_resolved(
        question: impl Into<String>,
        resolved: &ResolvedQuery,
        timestamp: DateTime<Utc>,
        result_count: Option<u64>,
    ) -> Self {
        Self {
            question: question.into(),
            intent: resolved.intent,
            slots: resolved.carried_slots(),
            keywords: resolved.keywords.clone(),
            timestamp,
            result_count,
        }
    }

    pub fn with_slot(mut self, field: impl Into<String>, value: SlotValue) -> Self {
        self.slots.insert(field.into(), value);
        self
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn with_result_count(mut self, count: u64) -> Self {
        self.result_count = Some(count);
        self
    }

    pub fn time_range(&self) -> Option<&TimeRange> {
        self.slots.get(fields::TIMESTAMP).and_then(SlotValue::as_time_range)
    }
}

/// Conversation state for one session id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    turns: VecDeque<Turn>,
    /// Field to the values most recently filtered on
    active_filters: BTreeMap<String, BTreeSet<String>>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            turns: VecDeque::new(),
            active_filters: BTreeMap::new(),
            created_at: now,
            last_active: now,
        }
    }

    /// Turns, oldest first.
    pub fn turns(&self) -> impl DoubleEndedIterator<Item = &Turn> + ExactSizeIterator {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.back()
    }

    /// The last `k` turns, oldest first.
    pub fn recent_turns(&self, k: usize) -> Vec<Turn> {
        let skip = self.turns.len().saturating_sub(k);
        self.turns.iter().skip(skip).cloned().collect()
    }

    pub fn active_filters(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.active_filters
    }

    pub fn has_asked(&self, question: &str) -> bool {
        self.turns
            .iter()
            .any(|turn| turn.question.eq_ignore_ascii_case(question.trim()))
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.last_active > ttl
    }

    /// Appends a turn, evicting the oldest beyond `max_turns`.
    /// Returns how many turns were evicted.
    pub(crate) fn push_turn(&mut self, turn: Turn, max_turns: usize, now: DateTime<Utc>) -> usize {
        for (field, value) in &turn.slots {
            self.active_filters
                .insert(field.clone(), value.display_values());
        }

        self.turns.push_back(turn);
        let mut evicted = 0;
        while self.turns.len() > max_turns.max(1) {
            self.turns.pop_front();
            evicted += 1;
        }

        self.last_active = now;
        evicted
    }

    /// Known security terms used in more than one question, most frequent first.
    pub fn common_themes(&self) -> Vec<String> {
        const SECURITY_TERMS: &[&str] = &[
            "login", "logins", "authentication", "failed", "malware", "suspicious", "attack",
            "brute", "force", "network", "connection", "connections", "user", "address", "file",
            "files", "access", "powershell", "command", "dns", "domain", "firewall", "ssh",
        ];

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for turn in &self.turns {
            let lower = turn.question.to_lowercase();
            for word in lower.split(|c: char| !c.is_alphanumeric()) {
                if let Some(term) = SECURITY_TERMS.iter().find(|t| **t == word) {
                    *counts.entry(*term).or_insert(0) += 1;
                }
            }
        }

        let mut themes: Vec<(&str, usize)> = counts.into_iter().filter(|(_, n)| *n > 1).collect();
        themes.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        themes.into_iter().take(5).map(|(t, _)| t.to_string()).collect()
    }
}

/// Aggregate view of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub total_queries: usize,
    pub total_results: u64,
    pub session_duration_minutes: i64,
    pub active_filters: BTreeMap<String, BTreeSet<String>>,
    pub common_themes: Vec<String>,
    pub last_activity: DateTime<Utc>,
    pub recent_queries: Vec<String>,
}

impl SessionSummary {
    pub fn of(session: &Session, now: DateTime<Utc>) -> Self {
        let duration = session
            .turns
            .front()
            .map(|first| (now - first.timestamp).num_minutes())
            .unwrap_or(0);

        Self {
            session_id: session.id.clone(),
            total_queries: session.turns.len(),
            total_results: session.turns.iter().filter_map(|t| t.result_count).sum(),
            session_duration_minutes: duration.max(0),
            active_filters: session.active_filters.clone(),
            common_themes: session.common_themes(),
            last_activity: session.last_active,
            recent_queries: session
                .recent_turns(3)
                .into_iter()
                .map(|t| t.question)
                .collect(),
        }
    }
}
