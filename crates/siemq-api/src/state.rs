use chrono::{DateTime, Utc};
use siemq_conversation::ConversationManager;
use std::sync::Arc;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ConversationManager>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(manager: Arc<ConversationManager>) -> Self {
        Self {
            manager,
            started_at: Utc::now(),
        }
    }

    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds().max(0)
    }
}
