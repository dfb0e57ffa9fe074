//! `/git/*` handlers. Every failure is a 500 carrying git's message.

use super::{ApiError, AppState};
use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRequest {
    pub file_path: String,
}

#[derive(Debug, Deserialize)]
pub struct CommitRequest {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub branch: String,
    #[serde(default)]
    pub create: bool,
}

fn ok() -> Json<Value> {
    Json(json!({ "success": true }))
}

pub async fn status(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let status = state.git.status().await?;
    Ok(Json(json!({
        "success": true,
        "branch": status.branch,
        "modifiedFiles": status.modified_files,
        "stagedFiles": status.staged_files,
        "untrackedFiles": status.untracked_files,
    })))
}

pub async fn stage(
    State(state): State<AppState>,
    Json(req): Json<FileRequest>,
) -> Result<Json<Value>, ApiError> {
    state.git.stage(&req.file_path).await?;
    Ok(ok())
}

pub async fn unstage(
    State(state): State<AppState>,
    Json(req): Json<FileRequest>,
) -> Result<Json<Value>, ApiError> {
    state.git.unstage(&req.file_path).await?;
    Ok(ok())
}

pub async fn discard(
    State(state): State<AppState>,
    Json(req): Json<FileRequest>,
) -> Result<Json<Value>, ApiError> {
    state.git.discard(&req.file_path).await?;
    Ok(ok())
}

pub async fn commit(
    State(state): State<AppState>,
    Json(req): Json<CommitRequest>,
) -> Result<Json<Value>, ApiError> {
    state.git.commit(&req.message).await?;
    tracing::info!("Committed: {}", req.message);
    Ok(ok())
}

pub async fn log(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let commits = state.git.log().await?;
    Ok(Json(json!({ "success": true, "commits": commits })))
}

pub async fn branches(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let branches = state.git.branches().await?;
    Ok(Json(json!({ "success": true, "branches": branches })))
}

pub async fn checkout(
    State(state): State<AppState>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<Value>, ApiError> {
    state.git.checkout(&req.branch, req.create).await?;
    Ok(ok())
}
