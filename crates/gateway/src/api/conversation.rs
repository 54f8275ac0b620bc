//! Conversation API endpoints — the thin mapping from HTTP to engine calls.
//!
//! Each handler acquires the session's turn lock (when the operation
//! mutates), runs exactly one engine operation under the overall request
//! deadline, and serializes the reply. All failure paths flow through
//! [`ApiError`].

use std::future::Future;
use std::time::Duration;

use axum::extract::{FromRequest, Path, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use tokio::sync::OwnedSemaphorePermit;

use loom_domain::error::{Error, Result};
use loom_domain::style::StoryStyle;
use loom_engine::OptionKind;

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request shapes (unknown fields rejected)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StartRequest {
    pub core_idea: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContinueRequest {
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectOptionRequest {
    #[serde(rename = "type")]
    pub kind: OptionKind,
    pub index: usize,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerateFinalRequest {
    pub style: StoryStyle,
}

/// `axum::Json` with rejections folded into the standard error envelope
/// (a malformed or unknown-field body is a 400, like any invalid input).
pub struct LoomJson<T>(pub T);

#[async_trait::async_trait]
impl<S, T> FromRequest<S> for LoomJson<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(LoomJson(value)),
            Err(rejection) => Err(ApiError(Error::InvalidInput(rejection.body_text()))),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// POST /conversation/start
pub async fn start(
    State(state): State<AppState>,
    LoomJson(body): LoomJson<StartRequest>,
) -> ApiResult<impl IntoResponse> {
    let reply = with_deadline(&state, state.engine.start(&body.core_idea, body.user_id)).await?;
    Ok((StatusCode::CREATED, Json(reply)))
}

/// POST /conversation/continue/{id}
pub async fn continue_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    LoomJson(body): LoomJson<ContinueRequest>,
) -> ApiResult<impl IntoResponse> {
    let _permit = acquire_turn_lock(&state, &id).await?;
    let reply = with_deadline(&state, state.engine.advance(&id, &body.message)).await?;
    Ok(Json(reply))
}

/// POST /conversation/select-option/{id}
pub async fn select_option(
    State(state): State<AppState>,
    Path(id): Path<String>,
    LoomJson(body): LoomJson<SelectOptionRequest>,
) -> ApiResult<impl IntoResponse> {
    let _permit = acquire_turn_lock(&state, &id).await?;
    let reply =
        with_deadline(&state, state.engine.select_option(&id, body.kind, body.index)).await?;
    Ok(Json(reply))
}

/// POST /conversation/generate-final/{id}
pub async fn generate_final(
    State(state): State<AppState>,
    Path(id): Path<String>,
    LoomJson(body): LoomJson<GenerateFinalRequest>,
) -> ApiResult<impl IntoResponse> {
    let _permit = acquire_turn_lock(&state, &id).await?;
    let story = with_deadline(&state, state.engine.generate_final(&id, body.style)).await?;
    Ok(Json(serde_json::json!({ "final_story": story })))
}

/// GET /conversation/session/{id}
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let session = state.engine.get_session(&id)?;
    Ok(Json(session))
}

/// GET /conversation/sessions/active
pub async fn list_active(State(state): State<AppState>) -> Json<serde_json::Value> {
    let sessions = state.store.list_active();
    Json(serde_json::json!({ "sessions": sessions }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shared plumbing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Serialize this request behind the session's turn lock. A session with
/// a turn running and a waiter already queued is reported unavailable.
async fn acquire_turn_lock(
    state: &AppState,
    session_id: &str,
) -> ApiResult<OwnedSemaphorePermit> {
    state
        .session_locks
        .acquire(session_id)
        .await
        .map_err(|busy| ApiError(Error::Unavailable(busy.to_string())))
}

/// Enforce the overall per-request deadline around one engine operation.
async fn with_deadline<T>(
    state: &AppState,
    operation: impl Future<Output = Result<T>>,
) -> ApiResult<T> {
    let deadline = Duration::from_secs(state.config.server.request_deadline_secs);
    match tokio::time::timeout(deadline, operation).await {
        Ok(result) => result.map_err(ApiError),
        Err(_) => Err(ApiError(Error::GenerationTimeout(
            "request exceeded the overall deadline".into(),
        ))),
    }
}
