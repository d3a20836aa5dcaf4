//! Context merging.
//!
//! Combines the current question's intent and slots with the session's
//! recent turns into a [`ResolvedQuery`]. The merger is pure: the same
//! inputs always produce the same resolved query.

use chrono::{DateTime, Duration, Utc};
use siemq_core::{
    fields, Intent, QueryConfig, ResolvedQuery, SchemaRegistry, SlotOrigin, SlotSet, SlotValue,
    TimeRange,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::session::Turn;

/// Everything the merger needs about the current question.
#[derive(Debug, Clone, Copy)]
pub struct MergeRequest<'a> {
    pub intent: &'a Intent,
    pub slots: &'a SlotSet,
    pub referential: bool,
    /// Explicit result cap from the caller
    pub requested_size: Option<usize>,
    pub now: DateTime<Utc>,
}

/// Multi-turn slot and intent resolution.
#[derive(Debug, Clone)]
pub struct ContextMerger {
    schema: Arc<SchemaRegistry>,
    window: usize,
    default_lookback: Duration,
    default_size: usize,
    max_size: usize,
}

impl ContextMerger {
    pub fn new(schema: Arc<SchemaRegistry>) -> Self {
        Self::from_config(schema, 3, &QueryConfig::default())
    }

    pub fn from_config(schema: Arc<SchemaRegistry>, window: usize, query: &QueryConfig) -> Self {
        Self {
            schema,
            window,
            default_lookback: query.default_lookback(),
            default_size: query.default_size,
            max_size: query.max_size.max(1),
        }
    }

    /// Number of recent turns consulted.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Resolves the current question against `history` (oldest first).
    pub fn merge(&self, request: MergeRequest<'_>, history: &[Turn]) -> ResolvedQuery {
        // Most recent first
        let window: Vec<&Turn> = history.iter().rev().take(self.window).collect();

        let mut slots: BTreeMap<String, SlotValue> = BTreeMap::new();
        let mut origins: BTreeMap<String, SlotOrigin> = BTreeMap::new();
        let mut intent = request.intent.kind;
        let mut intent_inherited = false;
        let mut keywords = request.slots.keywords.clone();
        let mut inherited_time: Option<TimeRange> = None;

        if request.referential && !window.is_empty() {
            if request.intent.is_unmatched() {
                if let Some(last) = window.first() {
                    intent = last.intent;
                    intent_inherited = true;
                }
            }

            for turn in &window {
                for (field, value) in &turn.slots {
                    if request.slots.contains(field) {
                        continue;
                    }
                    if field == fields::TIMESTAMP {
                        if inherited_time.is_none() {
                            inherited_time = value.as_time_range().copied();
                        }
                        continue;
                    }
                    if slots.contains_key(field) {
                        continue;
                    }
                    if let Err(e) = self.schema.validate_slot(field, value) {
                        warn!(field = %field, error = %e, "Skipping inherited slot");
                        continue;
                    }
                    slots.insert(field.clone(), value.clone());
                    origins.insert(field.clone(), SlotOrigin::Inherited);
                }
            }

            if keywords.is_empty() {
                if let Some(last) = window.first() {
                    keywords = last.keywords.clone();
                }
            }
        }

        for (field, value) in request.slots.iter() {
            if field == fields::TIMESTAMP {
                continue;
            }
            slots.insert(field.clone(), value.clone());
            origins.insert(field.clone(), SlotOrigin::Extracted);
        }

        for (field, value) in intent.default_filters() {
            if slots.contains_key(field) || !self.schema.contains(field) {
                continue;
            }
            slots.insert(field.to_string(), value);
            origins.insert(field.to_string(), SlotOrigin::Template);
        }

        let (time_range, time_origin) = match (request.slots.time_range(), inherited_time) {
            (Some(range), _) => (*range, SlotOrigin::Extracted),
            (None, Some(range)) => (range, SlotOrigin::Inherited),
            (None, None) => (
                TimeRange::last(request.now, self.default_lookback),
                SlotOrigin::Default,
            ),
        };

        let size = request
            .requested_size
            .or(request.slots.limit)
            .unwrap_or(self.default_size)
            .clamp(1, self.max_size);

        let resolved = ResolvedQuery {
            intent,
            confidence: request.intent.confidence,
            slots,
            keywords,
            time_range,
            size,
            origins,
            time_origin,
            intent_inherited,
        };

        debug!(
            intent = %resolved.intent,
            intent_inherited,
            inherited = ?resolved.inherited_fields(),
            size,
            "Merged question with context"
        );
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use siemq_core::{IntentKind, Severity};
    use std::net::Ipv4Addr;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn merger() -> ContextMerger {
        ContextMerger::new(Arc::new(SchemaRegistry::standard()))
    }

    fn slots(values: Vec<(&str, SlotValue)>) -> SlotSet {
        let schema = SchemaRegistry::standard();
        let mut set = SlotSet::new();
        for (field, value) in values {
            set.insert(&schema, field, value).unwrap();
        }
        set
    }

    fn request<'a>(intent: &'a Intent, slots: &'a SlotSet, referential: bool) -> MergeRequest<'a> {
        MergeRequest {
            intent,
            slots,
            referential,
            requested_size: None,
            now: now(),
        }
    }

    fn ip_turn(ip: Ipv4Addr) -> Turn {
        Turn::new("Show failed logins from x", IntentKind::Authentication, now())
            .with_slot(fields::SOURCE_IP, SlotValue::Ip(ip))
    }

    #[test]
    fn test_template_and_default_time() {
        let intent = Intent::new(IntentKind::Authentication, 1.0);
        let current = SlotSet::new();
        let resolved = merger().merge(request(&intent, &current, false), &[]);

        assert_eq!(
            resolved.slot(fields::EVENT_TYPE),
            Some(&SlotValue::text_set(["login", "auth"]))
        );
        assert_eq!(resolved.origin(fields::EVENT_TYPE), Some(SlotOrigin::Template));
        assert_eq!(resolved.time_range, TimeRange::last(now(), Duration::hours(24)));
        assert_eq!(resolved.time_origin, SlotOrigin::Default);
        assert_eq!(resolved.size, 20);
    }

    #[test]
    fn test_non_referential_ignores_history() {
        let history = vec![ip_turn(Ipv4Addr::new(203, 0, 113, 15))];
        let intent = Intent::new(IntentKind::Malware, 1.0);
        let current = SlotSet::new();

        let with_history = merger().merge(request(&intent, &current, false), &history);
        let without = merger().merge(request(&intent, &current, false), &[]);
        assert_eq!(with_history, without);
        assert!(with_history.slot(fields::SOURCE_IP).is_none());
    }

    #[test]
    fn test_referential_inherits_ip_and_intent() {
        let ip = Ipv4Addr::new(203, 0, 113, 15);
        let history = vec![ip_turn(ip).with_keywords(vec!["failed".to_string()])];
        let intent = Intent::generic();
        let current = SlotSet::new();

        let resolved = merger().merge(request(&intent, &current, true), &history);
        assert_eq!(resolved.intent, IntentKind::Authentication);
        assert!(resolved.intent_inherited);
        assert_eq!(resolved.slot(fields::SOURCE_IP), Some(&SlotValue::Ip(ip)));
        assert_eq!(resolved.origin(fields::SOURCE_IP), Some(SlotOrigin::Inherited));
        assert_eq!(resolved.origin(fields::EVENT_TYPE), Some(SlotOrigin::Template));
        assert_eq!(resolved.keywords, vec!["failed".to_string()]);
    }

    #[test]
    fn test_confident_intent_not_overridden() {
        let history = vec![ip_turn(Ipv4Addr::new(10, 0, 0, 1))];
        let intent = Intent::new(IntentKind::Malware, 1.0);
        let current = SlotSet::new();

        let resolved = merger().merge(request(&intent, &current, true), &history);
        assert_eq!(resolved.intent, IntentKind::Malware);
        assert!(!resolved.intent_inherited);
        assert!(resolved.slot(fields::SOURCE_IP).is_some());
        assert_eq!(
            resolved.slot(fields::EVENT_TYPE),
            Some(&SlotValue::text_set(["malware", "virus"]))
        );
    }

    #[test]
    fn test_explicit_value_overrides_inherited() {
        let history = vec![ip_turn(Ipv4Addr::new(10, 0, 0, 1))];
        let intent = Intent::generic();
        let current = slots(vec![(
            fields::SOURCE_IP,
            SlotValue::Ip(Ipv4Addr::new(10, 0, 0, 2)),
        )]);

        let resolved = merger().merge(request(&intent, &current, true), &history);
        assert_eq!(
            resolved.slot(fields::SOURCE_IP),
            Some(&SlotValue::Ip(Ipv4Addr::new(10, 0, 0, 2)))
        );
        assert_eq!(resolved.origin(fields::SOURCE_IP), Some(SlotOrigin::Extracted));
    }

    #[test]
    fn test_most_recent_turn_wins_within_window() {
        let history = vec![
            Turn::new("q1", IntentKind::Authentication, now())
                .with_slot(fields::USER, SlotValue::text("alice")),
            Turn::new("q2", IntentKind::Authentication, now())
                .with_slot(fields::USER, SlotValue::text("bob"))
                .with_slot(fields::SEVERITY, SlotValue::Severity(Severity::High)),
        ];
        let intent = Intent::generic();
        let current = SlotSet::new();

        let resolved = merger().merge(request(&intent, &current, true), &history);
        assert_eq!(resolved.slot(fields::USER), Some(&SlotValue::text("bob")));
        assert!(resolved.slot(fields::SEVERITY).is_some());
    }

    #[test]
    fn test_window_limits_inheritance() {
        let mut history = vec![Turn::new("old", IntentKind::Network, now())
            .with_slot(fields::HOST, SlotValue::text("web01"))];
        for i in 0..3 {
            history.push(Turn::new(format!("q{}", i), IntentKind::Network, now()));
        }
        let intent = Intent::generic();
        let current = SlotSet::new();

        let resolved = merger().merge(request(&intent, &current, true), &history);
        assert!(resolved.slot(fields::HOST).is_none());
        assert_eq!(resolved.intent, IntentKind::Network);
    }

    #[test]
    fn test_same_user_without_history() {
        let intent = Intent::generic();
        let current = SlotSet::new();
        let resolved = merger().merge(request(&intent, &current, true), &[]);
        assert!(resolved.slot(fields::USER).is_none());
        assert_eq!(resolved.intent, IntentKind::Generic);
        assert!(!resolved.intent_inherited);
    }

    #[test]
    fn test_time_range_inherited() {
        let range = TimeRange::last(now(), Duration::days(7));
        let history = vec![Turn::new("q", IntentKind::Malware, now())
            .with_slot(fields::TIMESTAMP, SlotValue::TimeRange(range))];
        let intent = Intent::generic();
        let current = SlotSet::new();

        let resolved = merger().merge(request(&intent, &current, true), &history);
        assert_eq!(resolved.time_range, range);
        assert_eq!(resolved.time_origin, SlotOrigin::Inherited);
    }

    #[test]
    fn test_size_resolution() {
        let intent = Intent::generic();
        let mut current = SlotSet::new();
        current.limit = Some(5);

        let resolved = merger().merge(request(&intent, &current, false), &[]);
        assert_eq!(resolved.size, 5);

        let mut req = request(&intent, &current, false);
        req.requested_size = Some(500);
        assert_eq!(merger().merge(req, &[]).size, 100);

        req.requested_size = Some(0);
        assert_eq!(merger().merge(req, &[]).size, 1);
    }
}
