use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use dlq_api::model::{FetchedRecord, ReplayBatch};
use dlq_engine::policy::Rule;
use dlq_engine::DlqError;

use super::error::ApiError;
use super::AppState;

// ═══════════════════════════════════════════════════════════════
//  REST: GET /api/dlq/topics
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_list_topics(
    State(state): State<AppState>,
) -> Result<Json<Vec<String>>, ApiError> {
    let topics = state.discovery.list_dead_letter_topics().await?;
    Ok(Json(topics))
}

// ═══════════════════════════════════════════════════════════════
//  REST: GET /api/dlq/messages?topic=&limit=
// ═══════════════════════════════════════════════════════════════

#[derive(Deserialize)]
pub(crate) struct MessagesParams {
    #[serde(default)]
    topic: String,
    limit: Option<i64>,
}

pub(crate) async fn handle_messages(
    State(state): State<AppState>,
    Query(params): Query<MessagesParams>,
) -> Result<Json<Vec<FetchedRecord>>, ApiError> {
    let cancel = state.shutdown.child_token();
    let records = state
        .fetcher
        .fetch_last(&params.topic, params.limit, &cancel)
        .await?;
    Ok(Json(records))
}

// ═══════════════════════════════════════════════════════════════
//  REST: POST /api/dlq/replay
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_replay(
    State(state): State<AppState>,
    body: Result<Json<ReplayBatch>, JsonRejection>,
) -> Result<Json<usize>, ApiError> {
    let Json(batch) =
        body.map_err(|e| DlqError::InvalidRequest(format!("malformed replay batch: {}", e.body_text())))?;
    let cancel = state.shutdown.child_token();
    let published = state.replayer.replay(&batch, &cancel).await?;
    Ok(Json(published))
}

// ═══════════════════════════════════════════════════════════════
//  REST: GET|PUT /api/redaction/rules
// ═══════════════════════════════════════════════════════════════

#[derive(Deserialize)]
pub(crate) struct RulesParams {
    scope: Option<String>,
    key: Option<String>,
}

pub(crate) async fn handle_get_rules(
    State(state): State<AppState>,
    Query(params): Query<RulesParams>,
) -> Json<Vec<Rule>> {
    Json(state.policies.load(params.scope.as_deref(), params.key.as_deref()))
}

#[derive(Deserialize)]
pub(crate) struct SaveRules {
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    rules: Option<Vec<Rule>>,
}

pub(crate) async fn handle_save_rules(
    State(state): State<AppState>,
    body: Result<Json<SaveRules>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(req) =
        body.map_err(|e| DlqError::InvalidRequest(format!("malformed rules: {}", e.body_text())))?;
    state.policies.save(
        req.scope.as_deref(),
        req.key.as_deref(),
        req.rules.unwrap_or_default(),
    );
    Ok(StatusCode::NO_CONTENT)
}

// --- GET /health ---

pub(crate) async fn handle_health() -> &'static str {
    "ok"
}
