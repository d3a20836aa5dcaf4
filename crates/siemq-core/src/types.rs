use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use uuid::Uuid;

use crate::error::SlotError;
use crate::schema::{fields, FieldType, SchemaRegistry};

// Session identifiers

/// Conversation session identifier.
///
/// Clients may supply their own opaque id; ids minted by the engine are
/// UUIDv4 strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, used in log lines.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(idx, _)| idx)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Intent types

/// Closed set of security-event categories a question can target.
///
/// Declaration order is priority order, used to break classifier ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Authentication,
    Malware,
    Network,
    FileAccess,
    Generic,
}

impl IntentKind {
    /// All intents, highest priority first.
    pub const ALL: [IntentKind; 5] = [
        IntentKind::Authentication,
        IntentKind::Malware,
        IntentKind::Network,
        IntentKind::FileAccess,
        IntentKind::Generic,
    ];

    /// Lower value wins a tie.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Authentication => 0,
            Self::Malware => 1,
            Self::Network => 2,
            Self::FileAccess => 3,
            Self::Generic => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Malware => "malware",
            Self::Network => "network",
            Self::FileAccess => "file_access",
            Self::Generic => "generic",
        }
    }

    /// Noun used in human-readable summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Malware => "malware",
            Self::Network => "network",
            Self::FileAccess => "file access",
            Self::Generic => "security",
        }
    }

    /// Default field filters applied when a question does not constrain them.
    pub fn default_filters(&self) -> Vec<(&'static str, SlotValue)> {
        let event_types: &[&str] = match self {
            Self::Authentication => &["login", "auth"],
            Self::Malware => &["malware", "virus"],
            Self::Network => &["network", "connection", "firewall"],
            Self::FileAccess => &["file", "syscheck"],
            Self::Generic => return Vec::new(),
        };

        vec![(fields::EVENT_TYPE, SlotValue::text_set(event_types.iter().copied()))]
    }
}

impl std::fmt::Display for IntentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier output: an intent with a confidence score in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub kind: IntentKind,
    pub confidence: f64,
    /// Trigger phrase that produced the classification, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_phrase: Option<String>,
}

impl Intent {
    pub fn new(kind: IntentKind, confidence: f64) -> Self {
        Self {
            kind,
            confidence: confidence.clamp(0.0, 1.0),
            matched_phrase: None,
        }
    }

    pub fn generic() -> Self {
        Self::new(IntentKind::Generic, 0.0)
    }

    pub fn with_phrase(mut self, phrase: impl Into<String>) -> Self {
        self.matched_phrase = Some(phrase.into());
        self
    }

    pub fn is_confident(&self) -> bool {
        self.confidence >= 0.7
    }

    /// True when nothing in the question pointed at a category.
    pub fn is_unmatched(&self) -> bool {
        self.kind == IntentKind::Generic && self.confidence == 0.0
    }
}

// Slot values

/// Event severity, ordered from least to most restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Lowest Wazuh rule level that maps to this severity.
    pub fn min_rule_level(&self) -> u64 {
        match self {
            Self::Low => 1,
            Self::Medium => 5,
            Self::High => 8,
            Self::Critical => 10,
        }
    }

    pub fn from_rule_level(level: u64) -> Option<Self> {
        match level {
            0 => None,
            1..=4 => Some(Self::Low),
            5..=7 => Some(Self::Medium),
            8..=9 => Some(Self::High),
            _ => Some(Self::Critical),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown severity '{}'", s))
    }
}

/// Closed time interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Set only when the user explicitly asked for everything
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub all_time: bool,
}

impl TimeRange {
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        Self {
            start,
            end,
            all_time: false,
        }
    }

    /// `[now - span, now]`
    pub fn last(now: DateTime<Utc>, span: Duration) -> Self {
        Self::between(now - span, now)
    }

    pub fn all_time(now: DateTime<Utc>) -> Self {
        Self {
            start: Utc.timestamp_opt(0, 0).single().unwrap_or(now),
            end: now,
            all_time: true,
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// Typed slot value; the variant must agree with the schema's field type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SlotValue {
    Text(String),
    TextSet(BTreeSet<String>),
    TimeRange(TimeRange),
    Ip(Ipv4Addr),
    Severity(Severity),
}

impl SlotValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn text_set<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::TextSet(values.into_iter().map(Into::into).collect())
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            Self::Text(_) => FieldType::String,
            Self::TextSet(_) => FieldType::StringSet,
            Self::TimeRange(_) => FieldType::TimeRange,
            Self::Ip(_) => FieldType::Ip,
            Self::Severity(_) => FieldType::Severity,
        }
    }

    /// String rendering used for active-filter bookkeeping.
    pub fn display_values(&self) -> BTreeSet<String> {
        match self {
            Self::TextSet(values) => values.clone(),
            other => BTreeSet::from([other.to_string()]),
        }
    }

    pub fn as_time_range(&self) -> Option<&TimeRange> {
        match self {
            Self::TimeRange(range) => Some(range),
            _ => None,
        }
    }
}

impl std::fmt::Display for SlotValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(value) => f.write_str(value),
            Self::TextSet(values) => {
                let joined: Vec<&str> = values.iter().map(String::as_str).collect();
                write!(f, "{}", joined.join(", "))
            }
            Self::TimeRange(range) => write!(
                f,
                "{} .. {}",
                range.start.format("%Y-%m-%dT%H:%M:%SZ"),
                range.end.format("%Y-%m-%dT%H:%M:%SZ")
            ),
            Self::Ip(ip) => write!(f, "{}", ip),
            Self::Severity(severity) => write!(f, "{}", severity),
        }
    }
}

/// Slots extracted from a single question, at most one value per field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotSet {
    slots: BTreeMap<String, SlotValue>,
    /// Significant free-text tokens for full-text matching
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Explicit result cap ("last 5 failed logins")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl SlotSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a slot after checking it against the schema.
    ///
    /// Unknown fields are a [`SchemaError`](crate::SchemaError); a value whose
    /// type disagrees with the declared field type is a
    /// [`ValidationError`](crate::ValidationError). Nothing is inserted on error.
    pub fn insert(
        &mut self,
        schema: &SchemaRegistry,
        field: &str,
        value: SlotValue,
    ) -> Result<Option<SlotValue>, SlotError> {
        schema.validate_slot(field, &value)?;
        Ok(self.slots.insert(field.to_string(), value))
    }

    pub fn get(&self, field: &str) -> Option<&SlotValue> {
        self.slots.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.slots.contains_key(field)
    }

    pub fn time_range(&self) -> Option<&TimeRange> {
        self.get(fields::TIMESTAMP).and_then(SlotValue::as_time_range)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SlotValue)> {
        self.slots.iter()
    }

    pub fn as_map(&self) -> &BTreeMap<String, SlotValue> {
        &self.slots
    }
}

// Resolved queries

/// Where a resolved slot value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotOrigin {
    /// Stated in the current question
    Extracted,
    /// Carried over from an earlier turn
    Inherited,
    /// Filled from the intent's default template
    Template,
    /// Engine default (time range only)
    Default,
}

/// Fully merged, schema-valid query intent; the Query Builder's only input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedQuery {
    pub intent: IntentKind,
    pub confidence: f64,
    /// Field filters, excluding the time range
    pub slots: BTreeMap<String, SlotValue>,
    pub keywords: Vec<String>,
    pub time_range: TimeRange,
    pub size: usize,
    pub origins: BTreeMap<String, SlotOrigin>,
    pub time_origin: SlotOrigin,
    pub intent_inherited: bool,
}

impl ResolvedQuery {
    pub fn slot(&self, field: &str) -> Option<&SlotValue> {
        self.slots.get(field)
    }

    pub fn origin(&self, field: &str) -> Option<SlotOrigin> {
        if field == fields::TIMESTAMP {
            return Some(self.time_origin);
        }
        self.origins.get(field).copied()
    }

    pub fn inherited_fields(&self) -> Vec<&str> {
        let mut inherited: Vec<&str> = self
            .origins
            .iter()
            .filter(|(_, origin)| **origin == SlotOrigin::Inherited)
            .map(|(field, _)| field.as_str())
            .collect();
        if self.time_origin == SlotOrigin::Inherited {
            inherited.push(fields::TIMESTAMP);
        }
        inherited
    }

    /// Slots worth remembering in a turn: stated or inherited values,
    /// never template or engine defaults.
    pub fn carried_slots(&self) -> BTreeMap<String, SlotValue> {
        let mut carried: BTreeMap<String, SlotValue> = self
            .slots
            .iter()
            .filter(|(field, _)| {
                matches!(
                    self.origins.get(field.as_str()),
                    Some(SlotOrigin::Extracted | SlotOrigin::Inherited)
                )
            })
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();

        if matches!(self.time_origin, SlotOrigin::Extracted | SlotOrigin::Inherited) {
            carried.insert(
                fields::TIMESTAMP.to_string(),
                SlotValue::TimeRange(self.time_range),
            );
        }
        carried
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_session_id_creation() {
        let id1 = SessionId::new();
        let id2 = SessionId::new();
        assert_ne!(id1, id2);
        assert_eq!(id1.short().len(), 8);
    }

    #[test]
    fn test_intent_priority_follows_declaration_order() {
        let mut sorted = IntentKind::ALL.to_vec();
        sorted.sort_by_key(|kind| kind.priority());
        assert_eq!(sorted, IntentKind::ALL.to_vec());
    }

    #[test]
    fn test_authentication_template() {
        let filters = IntentKind::Authentication.default_filters();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].0, fields::EVENT_TYPE);
        assert_eq!(filters[0].1, SlotValue::text_set(["login", "auth"]));
        assert!(IntentKind::Generic.default_filters().is_empty());
    }

    #[test]
    fn test_severity_ordering_and_levels() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(Severity::parse("HIGH"), Some(Severity::High));
        assert_eq!(Severity::parse("urgent"), None);
        assert_eq!(Severity::from_rule_level(12), Some(Severity::Critical));
        assert_eq!(Severity::from_rule_level(8), Some(Severity::High));
        assert_eq!(Severity::from_rule_level(0), None);
    }

    #[test]
    fn test_time_range_normalizes_order() {
        let a = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
        let range = TimeRange::between(b, a);
        assert_eq!(range.start, a);
        assert_eq!(range.end, b);
        assert!(range.contains(a));
        assert_eq!(range.duration(), Duration::days(1));
    }

    #[test]
    fn test_slot_set_rejects_type_mismatch() {
        let schema = SchemaRegistry::standard();
        let mut slots = SlotSet::new();

        assert!(slots
            .insert(&schema, fields::USER, SlotValue::text("alice"))
            .is_ok());
        assert!(slots
            .insert(&schema, fields::SOURCE_IP, SlotValue::text("not-an-ip"))
            .is_err());
        assert!(slots
            .insert(&schema, "hostname_typo", SlotValue::text("web01"))
            .is_err());

        assert_eq!(slots.len(), 1);
        assert!(!slots.contains(fields::SOURCE_IP));
    }

    #[test]
    fn test_carried_slots_skip_template_and_default_time() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut slots = BTreeMap::new();
        let mut origins = BTreeMap::new();
        slots.insert(fields::USER.to_string(), SlotValue::text("bob"));
        origins.insert(fields::USER.to_string(), SlotOrigin::Extracted);
        slots.insert(
            fields::EVENT_TYPE.to_string(),
            SlotValue::text_set(["login", "auth"]),
        );
        origins.insert(fields::EVENT_TYPE.to_string(), SlotOrigin::Template);

        let resolved = ResolvedQuery {
            intent: IntentKind::Authentication,
            confidence: 1.0,
            slots,
            keywords: Vec::new(),
            time_range: TimeRange::last(now, Duration::hours(24)),
            size: 20,
            origins,
            time_origin: SlotOrigin::Default,
            intent_inherited: false,
        };

        let carried = resolved.carried_slots();
        assert_eq!(carried.len(), 1);
        assert!(carried.contains_key(fields::USER));
    }
}
