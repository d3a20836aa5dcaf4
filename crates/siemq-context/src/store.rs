//! In-memory session store.
//!
//! Sessions live in a [`DashMap`] keyed by session id, each behind its own
//! mutex, so requests for different sessions never contend and at most one
//! writer touches a session at a time. Expiry is lazy on read and eager in
//! [`ContextStore::sweep_expired`], which only ever `try_lock`s a session and
//! therefore never waits on, or interrupts, an append in progress.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use siemq_core::{Clock, ContextConfig, SessionId, SystemClock};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::error::{ContextError, Result};
use crate::session::{Session, SessionSummary, Turn};

/// How many past turns relevance scoring looks at.
const RELEVANCE_SCAN: usize = 5;
/// Minimum word-overlap score for a turn to count as relevant.
const RELEVANCE_THRESHOLD: f64 = 0.3;
/// Retries when a session is swapped out from under an append.
const MAX_APPEND_ATTEMPTS: usize = 3;

/// Store-wide counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub active_sessions: usize,
    pub total_sessions: usize,
    pub total_turns: usize,
}

/// Concurrent session store with TTL and capacity limits.
pub struct ContextStore {
    sessions: DashMap<SessionId, Arc<Mutex<Session>>>,
    clock: Arc<dyn Clock>,
    config: ContextConfig,
}

impl ContextStore {
    pub fn new(config: ContextConfig, clock: Arc<dyn Clock>) -> Self {
        info!(
            ttl_secs = config.session_ttl_secs,
            max_sessions = config.max_sessions,
            max_turns = config.turn_limit(),
            "Context store initialized"
        );
        Self {
            sessions: DashMap::new(),
            clock,
            config,
        }
    }

    pub fn with_system_clock(config: ContextConfig) -> Self {
        Self::new(config, Arc::new(SystemClock))
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Records a turn, creating the session when absent or expired.
    #[instrument(skip(self, turn), fields(session = %session_id.short()))]
    pub fn append(&self, session_id: &SessionId, turn: Turn) -> Result<()> {
        if turn.question.trim().is_empty() {
            return Err(ContextError::InvalidTurn(
                "question cannot be empty".to_string(),
            ));
        }
        if self.config.max_sessions == 0 {
            return Err(ContextError::Capacity(
                "store configured with zero sessions".to_string(),
            ));
        }

        let now = self.clock.now();
        let ttl = self.config.session_ttl();

        for _ in 0..MAX_APPEND_ATTEMPTS {
            let mut created = false;
            let handle = {
                let entry = self
                    .sessions
                    .entry(session_id.clone())
                    .or_insert_with(|| {
                        created = true;
                        Arc::new(Mutex::new(Session::new(session_id.clone(), now)))
                    });
                Arc::clone(entry.value())
            };

            let mut session = handle.lock();

            // A sweep or clear may have removed the entry between lookup and lock
            let still_current = self
                .sessions
                .get(session_id)
                .map(|entry| Arc::ptr_eq(entry.value(), &handle))
                .unwrap_or(false);
            if !still_current {
                debug!("Session replaced during append, retrying");
                continue;
            }

            if session.is_expired(now, ttl) {
                info!("Session expired, starting fresh");
                *session = Session::new(session_id.clone(), now);
            }

            let evicted = session.push_turn(turn, self.config.turn_limit(), now);
            debug!(turns = session.len(), evicted, "Turn appended");
            drop(session);

            if created {
                self.enforce_capacity(session_id);
            }
            return Ok(());
        }

        Err(ContextError::Internal(format!(
            "session {} kept changing during append",
            session_id.short()
        )))
    }

    /// Snapshot of a live session. Expired sessions read as absent.
    pub fn get(&self, session_id: &SessionId) -> Option<Session> {
        let handle = self
            .sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))?;

        let session = handle.lock();
        if session.is_expired(self.clock.now(), self.config.session_ttl()) {
            debug!(session = %session_id.short(), "Session expired");
            return None;
        }
        Some(session.clone())
    }

    /// Removes a session. Returns whether one existed; clearing twice is harmless.
    pub fn clear(&self, session_id: &SessionId) -> bool {
        let removed = self.sessions.remove(session_id).is_some();
        if removed {
            info!(session = %session_id.short(), "Cleared session context");
        }
        removed
    }

    /// The last `k` turns, oldest first; empty for unknown sessions.
    pub fn recent_turns(&self, session_id: &SessionId, k: usize) -> Vec<Turn> {
        self.get(session_id)
            .map(|session| session.recent_turns(k))
            .unwrap_or_default()
    }

    /// Up to `k` recent turns whose question shares enough words with `question`.
    pub fn relevant_turns(&self, session_id: &SessionId, question: &str, k: usize) -> Vec<Turn> {
        let Some(session) = self.get(session_id) else {
            return Vec::new();
        };

        let words = word_set(question);
        let mut scored: Vec<(f64, Turn)> = session
            .recent_turns(RELEVANCE_SCAN)
            .into_iter()
            .filter_map(|turn| {
                let score = jaccard(&words, &word_set(&turn.question));
                (score > RELEVANCE_THRESHOLD).then_some((score, turn))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.timestamp
                .cmp(&a.1.timestamp)
                .then(b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal))
        });
        scored.into_iter().take(k).map(|(_, turn)| turn).collect()
    }

    pub fn summary(&self, session_id: &SessionId) -> Option<SessionSummary> {
        self.get(session_id)
            .map(|session| SessionSummary::of(&session, self.clock.now()))
    }

    /// Removes sessions idle past the TTL and returns how many went.
    ///
    /// Sessions locked by a writer are skipped until the next sweep.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.config.session_ttl();
        let mut removed = 0;

        self.sessions.retain(|_, session| match session.try_lock() {
            Some(guard) if guard.is_expired(now, ttl) => {
                removed += 1;
                false
            }
            _ => true,
        });

        if removed > 0 {
            info!(removed, remaining = self.sessions.len(), "Swept expired sessions");
        }
        removed
    }

    pub fn stats(&self) -> StoreStats {
        let now = self.clock.now();
        let ttl = self.config.session_ttl();
        let mut stats = StoreStats {
            active_sessions: 0,
            total_sessions: 0,
            total_turns: 0,
        };

        for entry in self.sessions.iter() {
            stats.total_sessions += 1;
            match entry.value().try_lock() {
                Some(session) if session.is_expired(now, ttl) => {}
                Some(session) => {
                    stats.active_sessions += 1;
                    stats.total_turns += session.len();
                }
                // Mid-append, so alive
                None => stats.active_sessions += 1,
            }
        }
        stats
    }

    pub fn active_session_count(&self) -> usize {
        self.stats().active_sessions
    }

    /// Runs [`sweep_expired`](Self::sweep_expired) every `interval` on a tokio task.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let removed = store.sweep_expired();
                debug!(removed, "Session sweep completed");
            }
        })
    }

    /// Evicts least recently active sessions until within capacity.
    fn enforce_capacity(&self, keep: &SessionId) {
        while self.sessions.len() > self.config.max_sessions {
            let oldest = self
                .sessions
                .iter()
                .filter(|entry| entry.key() != keep)
                .filter_map(|entry| {
                    let last_active = entry.value().try_lock().map(|s| s.last_active)?;
                    Some((entry.key().clone(), last_active))
                })
                .min_by_key(|(_, last_active)| *last_active);

            let Some((victim, _)) = oldest else {
                warn!(
                    sessions = self.sessions.len(),
                    "Over capacity but no idle session to evict"
                );
                break;
            };

            if self.sessions.remove(&victim).is_some() {
                info!(session = %victim.short(), "Evicted oldest session to make room");
            }
        }
    }
}

fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use siemq_core::{IntentKind, ManualClock};
    use std::thread;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn store_with(config: ContextConfig) -> (Arc<ContextStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = Arc::new(ContextStore::new(config, clock.clone()));
        (store, clock)
    }

    fn turn(question: &str) -> Turn {
        Turn::new(question, IntentKind::Authentication, t0())
    }

    #[test]
    fn test_fifteen_appends_keep_last_ten() {
        let (store, _) = store_with(ContextConfig::default());
        let id = SessionId::from("s1");
        for i in 0..15 {
            store.append(&id, turn(&format!("question {}", i))).unwrap();
        }

        let session = store.get(&id).unwrap();
        let questions: Vec<&str> = session.turns().map(|t| t.question.as_str()).collect();
        assert_eq!(questions.len(), 10);
        assert_eq!(questions[0], "question 5");
        assert_eq!(questions[9], "question 14");
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (store, _) = store_with(ContextConfig::default());
        let id = SessionId::from("s1");
        store.append(&id, turn("failed logins")).unwrap();

        assert!(store.clear(&id));
        assert!(!store.clear(&id));
        assert!(store.get(&id).is_none());
        assert!(!store.clear(&SessionId::from("never-seen")));
    }

    #[test]
    fn test_expired_session_reads_absent_then_sweeps() {
        let (store, clock) = store_with(ContextConfig::default().with_ttl_secs(1800));
        let id = SessionId::from("s1");
        store.append(&id, turn("failed logins")).unwrap();

        clock.advance(chrono::Duration::minutes(29));
        assert!(store.get(&id).is_some());
        assert_eq!(store.sweep_expired(), 0);

        clock.advance(chrono::Duration::minutes(2));
        assert!(store.get(&id).is_none());
        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.stats().total_sessions, 0);

        store.append(&id, turn("malware today")).unwrap();
        let session = store.get(&id).unwrap();
        assert_eq!(session.len(), 1);
        assert_eq!(session.last_turn().unwrap().question, "malware today");
    }

    #[test]
    fn test_append_to_expired_unswept_session_starts_fresh() {
        let (store, clock) = store_with(ContextConfig::default().with_ttl_secs(60));
        let id = SessionId::from("s1");
        store.append(&id, turn("first")).unwrap();
        store.append(&id, turn("second")).unwrap();

        clock.advance(chrono::Duration::minutes(5));
        store.append(&id, turn("third")).unwrap();

        let session = store.get(&id).unwrap();
        assert_eq!(session.len(), 1);
        assert_eq!(session.created_at, clock.now());
    }

    #[test]
    fn test_sweep_skips_locked_session() {
        let (store, clock) = store_with(ContextConfig::default().with_ttl_secs(60));
        let id = SessionId::from("busy");
        store.append(&id, turn("first")).unwrap();
        clock.advance(chrono::Duration::minutes(5));

        let handle = Arc::clone(store.sessions.get(&id).unwrap().value());
        let guard = handle.lock();
        assert_eq!(store.sweep_expired(), 0);
        drop(guard);

        assert_eq!(store.sweep_expired(), 1);
    }

    #[test]
    fn test_capacity_evicts_oldest_idle() {
        let (store, clock) = store_with(ContextConfig::default().with_max_sessions(2));
        let a = SessionId::from("a");
        let b = SessionId::from("b");
        let c = SessionId::from("c");

        store.append(&a, turn("q")).unwrap();
        clock.advance(chrono::Duration::seconds(1));
        store.append(&b, turn("q")).unwrap();
        clock.advance(chrono::Duration::seconds(1));
        store.append(&a, turn("q again")).unwrap();
        clock.advance(chrono::Duration::seconds(1));
        store.append(&c, turn("q")).unwrap();

        assert!(store.get(&a).is_some());
        assert!(store.get(&b).is_none());
        assert!(store.get(&c).is_some());
    }

    #[test]
    fn test_capacity_of_one_keeps_newcomer() {
        let (store, _) = store_with(ContextConfig::default().with_max_sessions(1));
        store.append(&SessionId::from("a"), turn("q")).unwrap();
        store.append(&SessionId::from("b"), turn("q")).unwrap();

        assert!(store.get(&SessionId::from("a")).is_none());
        assert!(store.get(&SessionId::from("b")).is_some());
    }

    #[test]
    fn test_invalid_turn_rejected() {
        let (store, _) = store_with(ContextConfig::default());
        let err = store.append(&SessionId::from("s"), turn("  ")).unwrap_err();
        assert!(matches!(err, ContextError::InvalidTurn(_)));

        let (store, _) = store_with(ContextConfig::default().with_max_sessions(0));
        let err = store.append(&SessionId::from("s"), turn("q")).unwrap_err();
        assert!(matches!(err, ContextError::Capacity(_)));
    }

    #[test]
    fn test_relevant_turns() {
        let (store, clock) = store_with(ContextConfig::default());
        let id = SessionId::from("s1");
        store.append(&id, turn("show failed logins for admin")).unwrap();
        clock.advance(chrono::Duration::seconds(1));
        store.append(&id, turn("malware on web01")).unwrap();

        let relevant = store.relevant_turns(&id, "show failed logins for root", 3);
        assert_eq!(relevant.len(), 1);
        assert_eq!(relevant[0].question, "show failed logins for admin");

        assert!(store.relevant_turns(&SessionId::from("none"), "x", 3).is_empty());
    }

    #[test]
    fn test_summary_and_stats() {
        let (store, clock) = store_with(ContextConfig::default());
        let id = SessionId::from("s1");
        store
            .append(&id, turn("failed login attempts").with_result_count(7))
            .unwrap();
        clock.advance(chrono::Duration::minutes(3));

        let summary = store.summary(&id).unwrap();
        assert_eq!(summary.total_queries, 1);
        assert_eq!(summary.total_results, 7);
        assert_eq!(summary.recent_queries, vec!["failed login attempts"]);

        let stats = store.stats();
        assert_eq!(stats.active_sessions, 1);
        assert_eq!(stats.total_turns, 1);
        assert!(store.summary(&SessionId::from("none")).is_none());
    }

    #[test]
    fn test_configured_turns_cannot_exceed_ten() {
        let (store, _) = store_with(ContextConfig::default().with_max_turns(50));
        let id = SessionId::from("s1");
        for i in 0..15 {
            store.append(&id, turn(&format!("q{}", i))).unwrap();
        }

        let session = store.get(&id).unwrap();
        assert_eq!(session.len(), 10);
        assert_eq!(session.turns().next().unwrap().question, "q5");
    }

    #[test]
    fn test_concurrent_appends() {
        let (store, _) = store_with(ContextConfig::default());
        let shared = SessionId::from("shared");

        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let store = Arc::clone(&store);
                let shared = shared.clone();
                thread::spawn(move || {
                    let own = SessionId::from(format!("worker-{}", worker));
                    for i in 0..25 {
                        store.append(&own, turn(&format!("q{}", i))).unwrap();
                        store.append(&shared, turn(&format!("w{} q{}", worker, i))).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let shared = store.get(&shared).unwrap();
        assert_eq!(shared.len(), 10);
        let distinct: HashSet<_> = shared.turns().map(|t| t.question.clone()).collect();
        assert_eq!(distinct.len(), 10);
        for worker in 0..8 {
            let own = store.get(&SessionId::from(format!("worker-{}", worker))).unwrap();
            assert_eq!(own.len(), 10);
            assert_eq!(own.last_turn().unwrap().question, "q24");
        }
    }

    #[tokio::test]
    async fn test_background_sweeper() {
        let (store, clock) = store_with(ContextConfig::default().with_ttl_secs(60));
        store.append(&SessionId::from("s1"), turn("q")).unwrap();
        clock.advance(chrono::Duration::minutes(2));

        let sweeper = store.spawn_sweeper(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        sweeper.abort();

        assert_eq!(store.stats().total_sessions, 0);
    }
}
