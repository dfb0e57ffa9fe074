//! `/health` and `/clarity/*` handlers.

use super::{ApiError, AppState};
use crate::engine::{Contract, EngineError, StateSnapshot, TerminalOutcome};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct ContractRequest {
    pub code: String,
    pub name: String,
}

impl From<ContractRequest> for Contract {
    fn from(req: ContractRequest) -> Self {
        Contract::new(req.name, req.code)
    }
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub snippet: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateRequest {
    #[serde(default)]
    pub contract_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TerminalRequest {
    pub command: String,
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "engine": "Clarinet CLI" }))
}

/// POST /clarity/check
///
/// 200 when the contract checks clean, 422 when the tool reports problems.
/// Engine faults keep the `errors` array shape the editor expects.
pub async fn check(State(state): State<AppState>, Json(req): Json<ContractRequest>) -> Response {
    match state.orchestrator.check(req.into()).await {
        Ok(outcome) => {
            let status = if outcome.success {
                StatusCode::OK
            } else {
                StatusCode::UNPROCESSABLE_ENTITY
            };
            (status, Json(outcome)).into_response()
        }
        Err(e) => {
            let err = ApiError::from(e);
            tracing::error!("Check failed to run: {}", err.message);
            (
                err.status,
                Json(json!({ "success": false, "errors": [err.message] })),
            )
                .into_response()
        }
    }
}

/// POST /clarity/deploy: make the contract the session's execution context.
pub async fn deploy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ContractRequest>,
) -> Result<Json<Value>, ApiError> {
    let session = state.session(&headers)?;
    state.orchestrator.set_active(&session, req.into()).await?;
    Ok(Json(json!({ "success": true })))
}

/// POST /clarity/execute
pub async fn execute(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<Value>, ApiError> {
    let session = state.session(&headers)?;
    let outcome = state.orchestrator.evaluate(&session, &req.snippet).await?;
    Ok(Json(json!({
        "success": outcome.success,
        "result": outcome.result,
        "events": [],
    })))
}

/// POST /clarity/state
pub async fn state(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<StateRequest>>,
) -> Result<Json<StateSnapshot>, ApiError> {
    let session = state.session(&headers)?;
    if let Some(name) = body.and_then(|Json(req)| req.contract_name) {
        tracing::debug!("State requested for {name}; reporting the session's workspace");
    }
    Ok(Json(state.orchestrator.inspect_state(&session).await?))
}

/// POST /clarity/terminal
///
/// A fault while running the command is shown in the terminal pane rather
/// than failing the request.
pub async fn terminal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<TerminalRequest>,
) -> Result<Json<TerminalOutcome>, ApiError> {
    let session = state.session(&headers)?;
    match state.orchestrator.terminal(&session, &req.command).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(EngineError::Invocation(e)) => Ok(Json(TerminalOutcome {
            success: false,
            output: e.to_string(),
        })),
        Err(e) => Err(e.into()),
    }
}

/// POST /clarity/reset
pub async fn reset(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let session = state.session(&headers)?;
    state.orchestrator.reset(&session).await;
    Ok(Json(json!({ "success": true })))
}
