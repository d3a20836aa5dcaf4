//! Human-readable response summaries.

use chrono::{DateTime, Utc};
use siemq_core::{fields, ResolvedQuery, SlotValue, TimeRange};
use siemq_infra::ExecutionOutput;
use std::collections::HashMap;

pub const DEGRADED_SUMMARY: &str = "search backend unavailable; showing conversation context only";

/// One or two sentences describing what was searched and found.
///
/// `output` is `None` when execution failed.
pub fn summarize(resolved: &ResolvedQuery, output: Option<&ExecutionOutput>, now: DateTime<Utc>) -> String {
    let output = match output {
        Some(output) => output,
        None => return DEGRADED_SUMMARY.to_string(),
    };

    let label = resolved.intent.label();
    let scope = describe_scope(resolved, now);

    if output.events.is_empty() {
        return format!("No {} events found {}.", label, scope);
    }

    let mut summary = if output.has_more() {
        format!(
            "Found {} {} events {}; showing the {} most recent.",
            output.total_hits,
            label,
            scope,
            output.events.len()
        )
    } else {
        format!("Found {} {} {} {}.", output.events.len(), label, plural(output.events.len()), scope)
    };

    if let Some((ip, count)) = top_source(output) {
        summary.push_str(&format!(" Most active source: {} ({} events).", ip, count));
    }
    summary
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        "event"
    } else {
        "events"
    }
}

fn describe_scope(resolved: &ResolvedQuery, now: DateTime<Utc>) -> String {
    let mut parts = Vec::new();

    for (field, value) in &resolved.slots {
        let part = match (field.as_str(), value) {
            (fields::SOURCE_IP, v) => format!("from {}", v),
            (fields::DESTINATION_IP, v) => format!("to {}", v),
            (fields::USER, v) => format!("for user {}", v),
            (fields::HOST, v) => format!("on host {}", v),
            (fields::FILE_PATH, v) => format!("touching {}", v),
            (fields::SEVERITY, SlotValue::Severity(s)) => format!("at {} severity or above", s),
            _ => continue,
        };
        parts.push(part);
    }

    if !resolved.keywords.is_empty() {
        parts.push(format!("matching \"{}\"", resolved.keywords.join(" ")));
    }
    parts.push(describe_time(&resolved.time_range, now));
    parts.join(" ")
}

fn describe_time(range: &TimeRange, now: DateTime<Utc>) -> String {
    if range.all_time {
        return "across all time".to_string();
    }
    if range.end != now {
        return format!(
            "between {} and {}",
            range.start.format("%Y-%m-%d %H:%M"),
            range.end.format("%Y-%m-%d %H:%M")
        );
    }

    let minutes = range.duration().num_minutes();
    let (n, unit) = if minutes >= 2 * 1440 && minutes % 1440 == 0 {
        (minutes / 1440, "day")
    } else if minutes > 0 && minutes % 60 == 0 {
        (minutes / 60, "hour")
    } else {
        (minutes, "minute")
    };

    if n == 1 {
        format!("in the last {}", unit)
    } else {
        format!("in the last {} {}s", n, unit)
    }
}

/// Most frequent source IP among returned events, if it appears more than once.
fn top_source(output: &ExecutionOutput) -> Option<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for event in &output.events {
        if let Some(ip) = &event.source_ip {
            *counts.entry(ip.as_str()).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(ip, count)| (ip.to_string(), count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use siemq_core::{IntentKind, SlotOrigin};
    use siemq_infra::SecurityEvent;
    use std::collections::BTreeMap;
    use std::net::Ipv4Addr;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn resolved(slots: Vec<(&str, SlotValue)>, range: TimeRange) -> ResolvedQuery {
        ResolvedQuery {
            intent: IntentKind::Authentication,
            confidence: 1.0,
            slots: slots.into_iter().map(|(f, v)| (f.to_string(), v)).collect(),
            keywords: vec!["failed".to_string()],
            time_range: range,
            size: 20,
            origins: BTreeMap::new(),
            time_origin: SlotOrigin::Default,
            intent_inherited: false,
        }
    }

    fn event(id: &str, ip: &str) -> SecurityEvent {
        SecurityEvent::from_wazuh(
            &json!({
                "@timestamp": "2024-03-10T11:00:00Z",
                "rule": { "level": 5, "description": "login failed" },
                "data": { "srcip": ip }
            }),
            id,
        )
        .unwrap()
    }

    fn output(events: Vec<SecurityEvent>, total_hits: u64) -> ExecutionOutput {
        ExecutionOutput {
            events,
            total_hits,
            took_ms: 1,
            indices: vec!["memory".to_string()],
        }
    }

    #[test]
    fn test_degraded() {
        let query = resolved(vec![], TimeRange::last(now(), Duration::hours(24)));
        assert_eq!(summarize(&query, None, now()), DEGRADED_SUMMARY);
    }

    #[test]
    fn test_no_results() {
        let query = resolved(
            vec![(fields::SOURCE_IP, SlotValue::Ip(Ipv4Addr::new(203, 0, 113, 15)))],
            TimeRange::last(now(), Duration::hours(24)),
        );
        assert_eq!(
            summarize(&query, Some(&output(vec![], 0)), now()),
            "No authentication events found from 203.0.113.15 matching \"failed\" in the last 24 hours."
        );
    }

    #[test]
    fn test_found_with_top_source() {
        let query = resolved(vec![], TimeRange::last(now(), Duration::days(7)));
        let events = vec![
            event("1", "203.0.113.15"),
            event("2", "203.0.113.15"),
            event("3", "10.0.0.1"),
        ];
        assert_eq!(
            summarize(&query, Some(&output(events, 3)), now()),
            "Found 3 authentication events matching \"failed\" in the last 7 days. \
             Most active source: 203.0.113.15 (2 events)."
        );
    }

    #[test]
    fn test_truncated_results() {
        let query = resolved(vec![], TimeRange::last(now(), Duration::hours(1)));
        let summary = summarize(&query, Some(&output(vec![event("1", "10.0.0.1")], 40)), now());
        assert_eq!(
            summary,
            "Found 40 authentication events matching \"failed\" in the last hour; showing the 1 most recent."
        );
    }

    #[test]
    fn test_time_descriptions() {
        let yesterday = TimeRange::between(now() - Duration::days(2), now() - Duration::days(1));
        assert_eq!(
            describe_time(&yesterday, now()),
            "between 2024-03-08 12:00 and 2024-03-09 12:00"
        );
        assert_eq!(describe_time(&TimeRange::all_time(now()), now()), "across all time");
        assert_eq!(
            describe_time(&TimeRange::last(now(), Duration::minutes(15)), now()),
            "in the last 15 minutes"
        );
    }
}
