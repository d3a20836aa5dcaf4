//! End-to-end conversations over the in-memory backend.

use chrono::{Duration, TimeZone, Utc};
use siemq_context::ContextStore;
use siemq_conversation::{ConversationManager, QueryRequest};
use siemq_core::{ContextConfig, ManualClock, QueryConfig, SchemaRegistry, SessionId};
use siemq_infra::InMemoryExecutor;
use std::sync::Arc;

fn setup() -> (ConversationManager, Arc<ManualClock>) {
    let start = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let schema = Arc::new(SchemaRegistry::standard());
    let store = Arc::new(ContextStore::new(ContextConfig::default(), clock.clone()));
    let manager = ConversationManager::new(
        schema,
        store,
        Arc::new(InMemoryExecutor::with_sample_events(start)),
        &QueryConfig::default(),
    );
    (manager, clock)
}

#[tokio::test]
async fn same_user_without_history_stays_unconstrained() {
    let (manager, _) = setup();
    let response = manager
        .process_query(QueryRequest::new("what did the same user do"))
        .await
        .unwrap();

    let dsl = response.query_stats.dsl_query.to_string();
    assert!(!dsl.contains("data.user"));
}

#[tokio::test]
async fn user_carries_into_follow_up() {
    let (manager, _) = setup();
    manager
        .process_query(QueryRequest::new("Show logins by alice").in_session("analyst"))
        .await
        .unwrap();

    let response = manager
        .process_query(QueryRequest::new("show those again for the last 7 days").in_session("analyst"))
        .await
        .unwrap();

    let dsl = response.query_stats.dsl_query.to_string();
    assert!(dsl.contains("data.user"));
    assert!(dsl.contains("alice"));
    assert!(response
        .results
        .iter()
        .all(|e| e.user.as_deref() == Some("alice")));
}

#[tokio::test]
async fn expired_session_starts_fresh() {
    let (manager, clock) = setup();
    let id = SessionId::from("idle");
    manager
        .process_query(QueryRequest::new("Show failed logins from 203.0.113.15").in_session("idle"))
        .await
        .unwrap();

    clock.advance(Duration::minutes(31));
    assert!(manager.context(&id).turns.is_empty());
    assert_eq!(manager.store().sweep_expired(), 1);

    let response = manager
        .process_query(QueryRequest::new("show me more about those").in_session("idle"))
        .await
        .unwrap();
    assert!(!response.query_stats.dsl_query.to_string().contains("data.srcip"));
    assert_eq!(manager.context(&id).turns.len(), 1);
}

#[tokio::test]
async fn history_is_bounded() {
    let (manager, clock) = setup();
    for i in 0..15 {
        clock.advance(Duration::seconds(10));
        manager
            .process_query(QueryRequest::new(format!("show malware alerts number {}", i)).in_session("busy"))
            .await
            .unwrap();
    }

    let context = manager.context(&SessionId::from("busy"));
    assert_eq!(context.turns.len(), 10);
    assert_eq!(context.turns[0].question, "show malware alerts number 5");

    let summary = manager.summary(&SessionId::from("busy")).unwrap();
    assert_eq!(summary.total_queries, 10);
}

#[tokio::test]
async fn possessive_user_without_history_adds_no_filter() {
    let (manager, _) = setup();
    let response = manager
        .process_query(QueryRequest::new("show the same user's failed logins"))
        .await
        .unwrap();

    let dsl = response.query_stats.dsl_query.to_string();
    assert!(!dsl.contains("data.user"));
    assert!(!dsl.contains(r#":"s""#));
}

#[tokio::test]
async fn possessive_user_inherits_previous_user() {
    let (manager, _) = setup();
    manager
        .process_query(QueryRequest::new("Show logins by alice").in_session("analyst"))
        .await
        .unwrap();

    let response = manager
        .process_query(QueryRequest::new("show the same user's failed logins").in_session("analyst"))
        .await
        .unwrap();

    let dsl = response.query_stats.dsl_query.to_string();
    assert!(dsl.contains("alice"));
    assert!(!dsl.contains(r#":"s""#));
    assert!(response
        .results
        .iter()
        .all(|e| e.user.as_deref() == Some("alice")));
}

#[tokio::test]
async fn oversized_lookback_is_capped() {
    let (manager, _) = setup();
    let response = manager
        .process_query(QueryRequest::new("malware alerts in the last 999999 months"))
        .await
        .unwrap();

    let dsl = response.query_stats.dsl_query.to_string();
    assert!(dsl.contains(r#""gte":"2023-03-11T12:00:00Z""#));
    assert!(!response.degraded);
}
