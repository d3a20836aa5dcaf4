//! Conversation manager for multi-turn security queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use siemq_context::{ContextMerger, ContextStore, MergeRequest, SessionSummary, StoreStats, Turn};
use siemq_core::{QueryConfig, SchemaRegistry, SessionId};
use siemq_infra::{ExecutionOutput, QueryExecutor, SecurityEvent, TimeoutExecutor};
use siemq_nlp::{NlpEngine, QueryBuilder};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::suggestions::SuggestionGenerator;
use crate::summary::summarize;
use crate::Result;

/// Turns returned by a relevance lookup.
const RELEVANT_TURNS: usize = 3;

/// A natural-language question within a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    /// Omitted on the first question; a new id is minted and returned
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub max_results: Option<usize>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            session_id: None,
            max_results: None,
        }
    }

    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = Some(max);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryStats {
    pub total_hits: u64,
    pub query_time_ms: u64,
    pub indices_searched: Vec<String>,
    /// The backend request body, for transparency
    pub dsl_query: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub summary: String,
    pub results: Vec<SecurityEvent>,
    pub query_stats: QueryStats,
    pub session_id: SessionId,
    pub suggestions: Vec<String>,
    pub has_more_results: bool,
    /// Set when the backend failed or timed out
    pub degraded: bool,
}

/// A session's stored turns and accumulated filters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextView {
    pub session_id: SessionId,
    pub turns: Vec<Turn>,
    pub active_filters: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearedContext {
    pub session_id: SessionId,
    /// False when there was nothing to clear
    pub cleared: bool,
}

/// Runs the question pipeline: analyze, merge with context, build, execute,
/// record, suggest.
pub struct ConversationManager {
    schema: Arc<SchemaRegistry>,
    nlp: NlpEngine,
    merger: ContextMerger,
    builder: QueryBuilder,
    store: Arc<ContextStore>,
    backend: Arc<dyn QueryExecutor>,
    executor: TimeoutExecutor,
    suggestions: SuggestionGenerator,
}

impl ConversationManager {
    pub fn new(
        schema: Arc<SchemaRegistry>,
        store: Arc<ContextStore>,
        backend: Arc<dyn QueryExecutor>,
        query: &QueryConfig,
    ) -> Self {
        let nlp = NlpEngine::from_config(schema.clone(), query);
        let merger =
            ContextMerger::from_config(schema.clone(), store.config().relevance_window, query);
        let executor = TimeoutExecutor::new(backend.clone(), query.execution_timeout());

        info!(
            backend = backend.name(),
            timeout_secs = query.execution_timeout_secs,
            window = merger.window(),
            "Conversation manager initialized"
        );

        Self {
            builder: QueryBuilder::new(schema.clone()),
            schema,
            nlp,
            merger,
            store,
            backend,
            executor,
            suggestions: SuggestionGenerator::new(),
        }
    }

    /// Replaces the default rule-based NLP front-end.
    pub fn with_nlp(mut self, nlp: NlpEngine) -> Self {
        self.nlp = nlp;
        self
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.executor = TimeoutExecutor::new(self.backend.clone(), timeout);
        self
    }

    pub fn store(&self) -> &Arc<ContextStore> {
        &self.store
    }

    /// Answers one question.
    ///
    /// Backend failures and timeouts degrade the response; the turn is still
    /// recorded, without a result count.
    #[instrument(skip(self, request), fields(session = tracing::field::Empty))]
    pub async fn process_query(&self, request: QueryRequest) -> Result<QueryResponse> {
        let session_id = request
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(SessionId::from)
            .unwrap_or_default();
        tracing::Span::current().record("session", session_id.short());

        let now = self.store.now();
        let analysis = self.nlp.analyze(&request.question, now)?;

        let history = self.store.recent_turns(&session_id, self.merger.window());
        let resolved = self.merger.merge(
            MergeRequest {
                intent: &analysis.intent,
                slots: &analysis.slots,
                referential: analysis.referential,
                requested_size: request.max_results,
                now,
            },
            &history,
        );

        let query = self.builder.build(&resolved)?;
        let dsl_query = query.to_dsl(&self.schema);

        let output = match self.executor.execute(&query).await {
            Ok(output) => Some(output),
            Err(e) => {
                warn!(
                    backend = self.executor.name(),
                    error = %e,
                    timeout = e.is_timeout(),
                    "Query execution failed; degrading response"
                );
                None
            }
        };
        let result_count = output.as_ref().map(|o| o.total_hits);

        self.store.append(
            &session_id,
            Turn::from_resolved(analysis.question.clone(), &resolved, now, result_count),
        )?;

        let session = self.store.get(&session_id);
        let suggestions = self
            .suggestions
            .generate(&resolved, result_count, session.as_ref());
        let summary = summarize(&resolved, output.as_ref(), now);

        info!(
            intent = %resolved.intent,
            inherited = ?resolved.inherited_fields(),
            results = result_count,
            degraded = output.is_none(),
            "Question answered"
        );

        Ok(self.respond(session_id, summary, suggestions, output, dsl_query))
    }

    fn respond(
        &self,
        session_id: SessionId,
        summary: String,
        suggestions: Vec<String>,
        output: Option<ExecutionOutput>,
        dsl_query: serde_json::Value,
    ) -> QueryResponse {
        let degraded = output.is_none();
        let output = output.unwrap_or_else(ExecutionOutput::empty);
        let has_more_results = output.has_more();

        QueryResponse {
            summary,
            query_stats: QueryStats {
                total_hits: output.total_hits,
                query_time_ms: output.took_ms,
                indices_searched: output.indices,
                dsl_query,
            },
            results: output.events,
            session_id,
            suggestions,
            has_more_results,
            degraded,
        }
    }

    /// Stored context; unknown or expired sessions come back empty.
    pub fn context(&self, session_id: &SessionId) -> ContextView {
        match self.store.get(session_id) {
            Some(session) => ContextView {
                session_id: session.id.clone(),
                turns: session.turns().cloned().collect(),
                active_filters: session.active_filters().clone(),
            },
            None => {
                debug!(session = %session_id.short(), "No stored context");
                ContextView {
                    session_id: session_id.clone(),
                    turns: Vec::new(),
                    active_filters: BTreeMap::new(),
                }
            }
        }
    }

    /// Earlier turns that share vocabulary with `question`, newest first.
    pub fn relevant_context(&self, session_id: &SessionId, question: &str) -> ContextView {
        let mut view = self.context(session_id);
        view.turns = self
            .store
            .relevant_turns(session_id, question, RELEVANT_TURNS);
        view
    }

    /// Idempotent; reports whether anything was removed.
    pub fn clear_context(&self, session_id: &SessionId) -> ClearedContext {
        ClearedContext {
            session_id: session_id.clone(),
            cleared: self.store.clear(session_id),
        }
    }

    pub fn summary(&self, session_id: &SessionId) -> Option<SessionSummary> {
        self.store.summary(session_id)
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.store.now()
    }
}
