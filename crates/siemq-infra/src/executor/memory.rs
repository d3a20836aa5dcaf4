//! In-memory executor.
//!
//! Evaluates structured queries against a local vector of events. Used for
//! demos, tests, and deployments without a search cluster.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use siemq_core::{FieldFilter, Operator, SlotValue, StructuredQuery, TextMatch};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::{event::SecurityEvent, ExecutionError, ExecutionOutput, QueryExecutor};

const INDEX_NAME: &str = "memory";

pub struct InMemoryExecutor {
    events: Vec<SecurityEvent>,
}

impl InMemoryExecutor {
    pub fn new(events: Vec<SecurityEvent>) -> Self {
        Self { events }
    }

    /// A small built-in alert set timestamped relative to `now`.
    pub fn with_sample_events(now: DateTime<Utc>) -> Self {
        let events = sample_documents(now)
            .iter()
            .enumerate()
            .filter_map(|(i, doc)| SecurityEvent::from_wazuh(doc, &format!("sample-{}", i + 1)).ok())
            .collect();
        Self::new(events)
    }

    /// Loads Wazuh-shaped alerts from a JSON export.
    ///
    /// Accepts a bare array, an `{"events": [...]}` object, or a search
    /// response with `hits.hits`; each entry may be a raw document or a hit
    /// with `_id` and `_source`.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ExecutionError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ExecutionError::load(format!("{}: {}", path.display(), e)))?;
        let executor = Self::from_json_str(&raw)?;
        info!(path = %path.display(), events = executor.len(), "Loaded events from file");
        Ok(executor)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ExecutionError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| ExecutionError::load(e.to_string()))?;

        let entries = match &value {
            Value::Array(items) => items.as_slice(),
            other => other
                .get("events")
                .or_else(|| other.pointer("/hits/hits"))
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .ok_or_else(|| ExecutionError::load("expected an array of events"))?,
        };

        let mut events = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let fallback_id = entry
                .get("_id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("event-{}", i + 1));
            let source = entry.get("_source").unwrap_or(entry);
            match SecurityEvent::from_wazuh(source, &fallback_id) {
                Ok(event) => events.push(event),
                Err(e) => warn!(index = i, error = %e, "Skipping malformed event"),
            }
        }

        Ok(Self::new(events))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn matches(event: &SecurityEvent, query: &StructuredQuery) -> bool {
        (query.time_range.all_time || query.time_range.contains(event.timestamp))
            && query.filters.iter().all(|f| filter_matches(event, f))
            && query.text.as_ref().map_or(true, |t| text_matches(event, t))
    }
}

#[async_trait]
impl QueryExecutor for InMemoryExecutor {
    #[instrument(skip(self, query), fields(size = query.size, filters = query.filters.len()))]
    async fn execute(&self, query: &StructuredQuery) -> Result<ExecutionOutput, ExecutionError> {
        let started = Instant::now();

        let mut matched: Vec<&SecurityEvent> = self
            .events
            .iter()
            .filter(|event| Self::matches(event, query))
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let total_hits = matched.len() as u64;
        let events: Vec<SecurityEvent> = matched.into_iter().take(query.size).cloned().collect();

        debug!(total_hits, returned = events.len(), "In-memory query complete");

        Ok(ExecutionOutput {
            events,
            total_hits,
            took_ms: started.elapsed().as_millis() as u64,
            indices: vec![INDEX_NAME.to_string()],
        })
    }

    fn name(&self) -> &str {
        INDEX_NAME
    }
}

fn filter_matches(event: &SecurityEvent, filter: &FieldFilter) -> bool {
    match (&filter.value, filter.operator) {
        (SlotValue::TimeRange(range), _) => range.all_time || range.contains(event.timestamp),
        (SlotValue::Severity(severity), Operator::Gte) => {
            event.rule_level >= severity.min_rule_level()
        }
        (SlotValue::Severity(severity), _) => event.severity == Some(*severity),
        (SlotValue::TextSet(wanted), _) => event
            .values(&filter.field)
            .iter()
            .any(|v| wanted.iter().any(|w| v.eq_ignore_ascii_case(w))),
        (value, Operator::Match) => {
            let needle = value.to_string().to_lowercase();
            event
                .values(&filter.field)
                .iter()
                .any(|v| v.to_lowercase().contains(&needle))
        }
        (value, _) => {
            let wanted = value.to_string();
            event
                .values(&filter.field)
                .iter()
                .any(|v| v.eq_ignore_ascii_case(&wanted))
        }
    }
}

/// Any term in the description or details, like an `or` match query.
fn text_matches(event: &SecurityEvent, text: &TextMatch) -> bool {
    if text.terms.is_empty() {
        return true;
    }
    let haystack = format!("{} {}", event.description, event.details).to_lowercase();
    text.terms
        .iter()
        .any(|term| haystack.contains(&term.to_lowercase()))
}

#[allow(clippy::too_many_arguments)]
fn alert(
    now: DateTime<Utc>,
    minutes_ago: i64,
    groups: &[&str],
    level: u64,
    description: &str,
    agent: &str,
    data: Value,
    syscheck_path: Option<&str>,
) -> Value {
    let mut doc = json!({
        "@timestamp": (now - Duration::minutes(minutes_ago)).to_rfc3339(),
        "rule": {
            "level": level,
            "description": description,
            "groups": groups,
        },
        "agent": { "name": agent },
        "data": data,
    });
    if let Some(path) = syscheck_path {
        doc["syscheck"] = json!({ "path": path });
    }
    doc
}

fn sample_documents(now: DateTime<Utc>) -> Vec<Value> {
    vec![
        alert(now, 5, &["auth", "sshd", "authentication_failed"], 10,
            "sshd: authentication failed for root", "web01",
            json!({ "srcip": "203.0.113.15", "user": "root", "protocol": "ssh" }), None),
        alert(now, 9, &["auth", "sshd", "authentication_failed"], 10,
            "sshd: Attempt to login using a non-existent user", "web01",
            json!({ "srcip": "203.0.113.15", "user": "admin", "protocol": "ssh" }), None),
        alert(now, 14, &["login", "pam", "authentication_failed"], 5,
            "PAM: User login failed", "web02",
            json!({ "srcip": "203.0.113.15", "user": "alice" }), None),
        alert(now, 40, &["login", "pam", "authentication_success"], 3,
            "PAM: Login session opened", "web02",
            json!({ "srcip": "192.168.1.20", "user": "alice" }), None),
        alert(now, 120, &["auth", "sudo"], 4,
            "Successful sudo to ROOT executed", "db01",
            json!({ "srcip": "192.168.1.25", "user": "bob" }), None),
        alert(now, 30, &["malware", "virus"], 12,
            "ClamAV: Virus detected in downloaded attachment", "ws-07",
            json!({ "user": "carol" }), Some("/tmp/invoice.exe")),
        alert(now, 180, &["malware", "rootcheck"], 9,
            "Rootcheck: Trojaned version of file detected", "ws-03",
            json!({}), Some("/usr/bin/ps")),
        alert(now, 20, &["network", "firewall", "firewall_drop"], 6,
            "Firewall drop event from external host", "fw01",
            json!({ "srcip": "198.51.100.23", "dstip": "10.0.0.5", "protocol": "tcp" }), None),
        alert(now, 50, &["network", "connection"], 8,
            "Outbound connection to known malicious host", "ws-07",
            json!({ "srcip": "10.0.0.5", "dstip": "185.220.101.43", "protocol": "tcp" }), None),
        alert(now, 360, &["connection", "firewall"], 3,
            "Multiple connections accepted", "fw01",
            json!({ "srcip": "192.168.1.30", "dstip": "10.0.0.8", "protocol": "udp" }), None),
        alert(now, 15, &["syscheck", "file"], 7,
            "Integrity checksum changed", "db01",
            json!({}), Some("/etc/passwd")),
        alert(now, 240, &["syscheck", "file"], 5,
            "File added to the system", "web01",
            json!({}), Some("/var/www/html/index.php")),
        alert(now, 3 * 24 * 60, &["auth", "sshd", "authentication_failed"], 10,
            "sshd: brute force trying to get access to the system", "web01",
            json!({ "srcip": "203.0.113.15", "user": "root", "protocol": "ssh" }), None),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use siemq_core::{fields, Severity, Sort, TimeRange};
    use std::net::Ipv4Addr;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn query(filters: Vec<FieldFilter>) -> StructuredQuery {
        StructuredQuery {
            filters,
            text: None,
            time_range: TimeRange::last(now(), Duration::hours(24)),
            size: 20,
            sort: Sort::newest_first(),
        }
    }

    fn auth_filter() -> FieldFilter {
        FieldFilter {
            field: fields::EVENT_TYPE.to_string(),
            operator: Operator::In,
            value: SlotValue::text_set(["login", "auth"]),
        }
    }

    #[tokio::test]
    async fn test_filters_by_event_type_and_ip() {
        let executor = InMemoryExecutor::with_sample_events(now());
        let q = query(vec![
            auth_filter(),
            FieldFilter {
                field: fields::SOURCE_IP.to_string(),
                operator: Operator::Eq,
                value: SlotValue::Ip(Ipv4Addr::new(203, 0, 113, 15)),
            },
        ]);

        let output = executor.execute(&q).await.unwrap();
        // The three-day-old alert is outside the window
        assert_eq!(output.total_hits, 3);
        assert!(output
            .events
            .iter()
            .all(|e| e.source_ip.as_deref() == Some("203.0.113.15")));
        assert_eq!(output.indices, vec!["memory".to_string()]);
    }

    #[tokio::test]
    async fn test_results_newest_first_and_capped() {
        let executor = InMemoryExecutor::with_sample_events(now());
        let mut q = query(vec![auth_filter()]);
        q.size = 2;

        let output = executor.execute(&q).await.unwrap();
        assert_eq!(output.events.len(), 2);
        assert_eq!(output.total_hits, 5);
        assert!(output.has_more());
        assert!(output.events[0].timestamp >= output.events[1].timestamp);
    }

    #[tokio::test]
    async fn test_severity_gte_uses_rule_level() {
        let executor = InMemoryExecutor::with_sample_events(now());
        let q = query(vec![FieldFilter {
            field: fields::SEVERITY.to_string(),
            operator: Operator::Gte,
            value: SlotValue::Severity(Severity::Critical),
        }]);

        let output = executor.execute(&q).await.unwrap();
        assert!(!output.events.is_empty());
        assert!(output.events.iter().all(|e| e.rule_level >= 10));
    }

    #[tokio::test]
    async fn test_all_time_and_text_match() {
        let executor = InMemoryExecutor::with_sample_events(now());
        let mut q = query(vec![]);
        q.time_range = TimeRange::all_time(now());
        q.text = Some(TextMatch {
            field: fields::MESSAGE.to_string(),
            terms: vec!["BRUTE".to_string(), "nothing-matches".to_string()],
        });

        let output = executor.execute(&q).await.unwrap();
        assert_eq!(output.total_hits, 1);
        assert!(output.events[0].description.contains("brute force"));
    }

    #[test]
    fn test_user_match_is_case_insensitive() {
        let executor = InMemoryExecutor::with_sample_events(now());
        let q = query(vec![FieldFilter {
            field: fields::USER.to_string(),
            operator: Operator::Eq,
            value: SlotValue::text("ALICE"),
        }]);

        let output = tokio_test::block_on(executor.execute(&q)).unwrap();
        assert_eq!(output.total_hits, 2);
    }

    #[test]
    fn test_from_json_accepts_hits_and_skips_bad_entries() {
        let raw = r#"{
            "hits": { "hits": [
                { "_id": "a1", "_source": { "@timestamp": "2024-03-10T11:00:00Z", "rule": { "level": 8 } } },
                { "_id": "a2", "_source": { "rule": { "level": 8 } } }
            ] }
        }"#;
        let executor = InMemoryExecutor::from_json_str(raw).unwrap();
        assert_eq!(executor.len(), 1);
    }

    #[test]
    fn test_from_json_rejects_non_array() {
        let err = InMemoryExecutor::from_json_str(r#"{"foo": 1}"#).err().unwrap();
        assert!(matches!(err, ExecutionError::Load(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = InMemoryExecutor::from_json_file("/definitely/not/here.json")
            .err()
            .unwrap();
        assert!(matches!(err, ExecutionError::Load(_)));
    }
}
