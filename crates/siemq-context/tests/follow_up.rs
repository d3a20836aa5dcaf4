//! Multi-turn resolution through the store and merger together.

use chrono::{Duration, TimeZone, Utc};
use siemq_context::{ContextMerger, ContextStore, MergeRequest, Turn};
use siemq_core::{
    fields, Clock, ContextConfig, Intent, IntentKind, ManualClock, SchemaRegistry, SessionId, SlotOrigin,
    SlotSet, SlotValue,
};
use std::net::Ipv4Addr;
use std::sync::Arc;

fn setup() -> (ContextStore, ContextMerger, Arc<ManualClock>, Arc<SchemaRegistry>) {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap(),
    ));
    let schema = Arc::new(SchemaRegistry::standard());
    let store = ContextStore::new(ContextConfig::default(), clock.clone());
    let merger = ContextMerger::new(schema.clone());
    (store, merger, clock, schema)
}

#[test]
fn follow_up_inherits_ip_and_intent() {
    let (store, merger, clock, schema) = setup();
    let session = SessionId::new();
    let ip = Ipv4Addr::new(203, 0, 113, 15);

    // Turn 1: "Show failed logins from 203.0.113.15"
    let intent = Intent::new(IntentKind::Authentication, 1.0);
    let mut slots = SlotSet::new();
    slots
        .insert(&schema, fields::SOURCE_IP, SlotValue::Ip(ip))
        .unwrap();
    let first = merger.merge(
        MergeRequest {
            intent: &intent,
            slots: &slots,
            referential: false,
            requested_size: None,
            now: clock.now(),
        },
        &store.recent_turns(&session, merger.window()),
    );
    store
        .append(
            &session,
            Turn::from_resolved("Show failed logins from 203.0.113.15", &first, clock.now(), Some(3)),
        )
        .unwrap();

    // Turn 2: "show me more details about those events"
    clock.advance(Duration::minutes(1));
    let intent = Intent::generic();
    let slots = SlotSet::new();
    let second = merger.merge(
        MergeRequest {
            intent: &intent,
            slots: &slots,
            referential: true,
            requested_size: None,
            now: clock.now(),
        },
        &store.recent_turns(&session, merger.window()),
    );

    assert_eq!(second.intent, IntentKind::Authentication);
    assert_eq!(second.slot(fields::SOURCE_IP), Some(&SlotValue::Ip(ip)));
    assert_eq!(second.origin(fields::SOURCE_IP), Some(SlotOrigin::Inherited));
    // The template is re-applied, never remembered
    assert_eq!(second.origin(fields::EVENT_TYPE), Some(SlotOrigin::Template));
}

#[test]
fn stored_turn_drops_template_and_default_time() {
    let (store, merger, clock, _) = setup();
    let session = SessionId::from("s");

    let intent = Intent::new(IntentKind::Authentication, 1.0);
    let slots = SlotSet::new();
    let resolved = merger.merge(
        MergeRequest {
            intent: &intent,
            slots: &slots,
            referential: false,
            requested_size: None,
            now: clock.now(),
        },
        &[],
    );
    store
        .append(&session, Turn::from_resolved("show logins", &resolved, clock.now(), None))
        .unwrap();

    let turn = store.get(&session).unwrap().last_turn().cloned().unwrap();
    assert!(turn.slots.is_empty());
    assert_eq!(turn.result_count, None);
}

#[test]
fn sessions_are_independent() {
    let (store, merger, clock, schema) = setup();
    let a = SessionId::from("a");
    let b = SessionId::from("b");

    let mut slots = SlotSet::new();
    slots
        .insert(&schema, fields::USER, SlotValue::text("alice"))
        .unwrap();
    let intent = Intent::new(IntentKind::Authentication, 1.0);
    let resolved = merger.merge(
        MergeRequest {
            intent: &intent,
            slots: &slots,
            referential: false,
            requested_size: None,
            now: clock.now(),
        },
        &[],
    );
    store
        .append(&a, Turn::from_resolved("logins by alice", &resolved, clock.now(), Some(1)))
        .unwrap();

    // "same user" in another session has nothing to inherit
    let intent = Intent::generic();
    let empty = SlotSet::new();
    let resolved = merger.merge(
        MergeRequest {
            intent: &intent,
            slots: &empty,
            referential: true,
            requested_size: None,
            now: clock.now(),
        },
        &store.recent_turns(&b, merger.window()),
    );
    assert!(resolved.slot(fields::USER).is_none());
}
