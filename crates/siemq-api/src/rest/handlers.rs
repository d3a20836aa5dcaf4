//! Route handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use siemq_context::{SessionSummary, StoreStats};
use siemq_conversation::{ClearedContext, ContextView, QueryRequest, QueryResponse};
use siemq_core::SessionId;
use std::sync::Arc;
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ContextParams {
    /// Restrict to turns relevant to this question
    #[serde(default)]
    pub q: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: i64,
    pub active_sessions: usize,
}

/// `POST /api/v1/query`
pub async fn query(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        ApiError::bad_request(rejection.body_text())
            .with_suggestion("Send a JSON body like {\"question\": \"Show failed logins\"}")
    })?;

    let session_id = request.session_id.clone();
    let response = state
        .manager
        .process_query(request)
        .await
        .map_err(|e| ApiError::from(e).with_session(session_id))?;

    Ok(Json(response))
}

/// `GET /api/v1/context/:session_id`
pub async fn get_context(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(params): Query<ContextParams>,
) -> Json<ContextView> {
    let session_id = SessionId::from(session_id);
    let view = match params.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        Some(question) => state.manager.relevant_context(&session_id, question),
        None => state.manager.context(&session_id),
    };
    debug!(session = %session_id.short(), turns = view.turns.len(), "Context read");
    Json(view)
}

/// `DELETE /api/v1/context/:session_id`
pub async fn clear_context(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Json<ClearedContext> {
    Json(state.manager.clear_context(&SessionId::from(session_id)))
}

/// `GET /api/v1/context/:session_id/summary`
pub async fn session_summary(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSummary>, ApiError> {
    let id = SessionId::from(session_id.as_str());
    state.manager.summary(&id).map(Json).ok_or_else(|| {
        ApiError::not_found(format!("No active session '{}'", session_id))
            .with_session(Some(session_id))
    })
}

/// `GET /api/v1/sessions`
pub async fn sessions(State(state): State<Arc<AppState>>) -> Json<StoreStats> {
    Json(state.manager.stats())
}

/// `GET /health`
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_secs(),
        active_sessions: state.manager.stats().active_sessions,
    })
}
