//! Route handler functions for all API endpoints.
//!
//! Handlers stay thin: they parse the request, call the orchestrator and
//! map `ChatError` into `ApiError`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use lookout_chat::{AskResponse, SessionHistory, ToolDefinition};
use lookout_data::DatasetSummary;

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request / response types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    /// Omitted, null or empty starts a new session.
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewSessionResponse {
    pub session_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub model: String,
    pub active_sessions: usize,
    pub dataset: DatasetSummary,
}

fn parse_session_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::BadRequest(format!("Invalid session id: {}", raw)))
}

// =============================================================================
// Handlers
// =============================================================================

/// GET / - endpoint index.
pub async fn index() -> Json<Value> {
    Json(json!({
        "name": "lookout",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "GET /health": "service status and dataset summary",
            "POST /ask": "ask a question, optionally within a session",
            "POST /session/new": "start a new session",
            "GET /session/{id}/history": "transcript of a session",
            "DELETE /session/{id}/clear": "clear a session's transcript",
            "DELETE /session/{id}": "delete a session",
            "GET /tools": "tool schemas advertised to the model",
        }
    }))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        model: state.orchestrator.model_name().to_string(),
        active_sessions: state.orchestrator.session_count(),
        dataset: state.dataset.summary(),
    })
}

/// POST /ask
pub async fn ask(
    State(state): State<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, ApiError> {
    let Json(body) = payload?;
    let session_id = match body.session_id.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(parse_session_id(raw)?),
    };

    let response = state.orchestrator.ask(session_id, &body.question).await?;
    info!(
        session_id = %response.session_id,
        tool_calls = response.tool_calls.len(),
        outcome = ?response.outcome,
        "Question answered"
    );
    Ok(Json(response))
}

/// POST /session/new
pub async fn new_session(
    State(state): State<AppState>,
) -> Result<Json<NewSessionResponse>, ApiError> {
    let session_id = state.orchestrator.new_session()?;
    Ok(Json(NewSessionResponse { session_id }))
}

/// GET /session/{id}/history
pub async fn session_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionHistory>, ApiError> {
    let id = parse_session_id(&id)?;
    Ok(Json(state.orchestrator.history(id)?))
}

/// DELETE /session/{id}/clear
pub async fn clear_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = parse_session_id(&id)?;
    state.orchestrator.clear_history(id).await?;
    Ok(Json(MessageResponse {
        message: format!("History cleared for session {}", id),
    }))
}

/// DELETE /session/{id}
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = parse_session_id(&id)?;
    state.orchestrator.delete_session(id)?;
    Ok(Json(MessageResponse {
        message: format!("Session {} deleted", id),
    }))
}

/// GET /tools
pub async fn tools(State(state): State<AppState>) -> Json<Vec<ToolDefinition>> {
    Json(state.orchestrator.tools().describe())
}
