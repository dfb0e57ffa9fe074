//! `/github/*` proxy handlers. The token comes from the `github_auth` cookie.

use super::{ApiError, AppState};
use crate::github::{cookie_value, AuthCookie, AUTH_COOKIE};
use axum::{
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

const NOT_AUTHENTICATED: &str = "Not authenticated";

fn auth_cookie(headers: &HeaderMap) -> Option<AuthCookie> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|raw| cookie_value(raw, AUTH_COOKIE))
        .and_then(AuthCookie::decode)
}

fn require_auth(headers: &HeaderMap) -> Result<AuthCookie, ApiError> {
    auth_cookie(headers).ok_or_else(|| ApiError::unauthorized(NOT_AUTHENTICATED))
}

/// GET /github/user
pub async fn user(headers: HeaderMap) -> Json<Value> {
    match auth_cookie(&headers) {
        Some(auth) => Json(json!({ "authenticated": true, "user": auth.user })),
        None => Json(json!({ "authenticated": false })),
    }
}

/// GET /github/repos
pub async fn repos(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let auth = require_auth(&headers)?;
    let repos = state
        .github
        .repos(&auth.token)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to fetch repositories: {e}")))?;
    Ok(Json(json!({ "repos": repos })))
}

fn default_branch() -> String {
    "main".into()
}

#[derive(Debug, Deserialize)]
pub struct CloneRequest {
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

/// POST /github/clone: anonymous access works for public repositories.
pub async fn clone_repo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CloneRequest>,
) -> Result<Json<Value>, ApiError> {
    let token = auth_cookie(&headers).map(|a| a.token);
    tracing::info!("Cloning {}/{}@{}", req.owner, req.repo, req.branch);

    let cloned = state
        .github
        .clone_repo(&req.owner, &req.repo, &req.branch, token.as_deref())
        .await?;

    Ok(Json(json!({
        "success": true,
        "repo": format!("{}/{}", req.owner, req.repo),
        "branch": cloned.branch,
        "fileCount": cloned.files.len(),
        "files": cloned.files,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GistRequest {
    #[serde(default)]
    pub description: Option<String>,
    pub files: HashMap<String, String>,
    #[serde(default)]
    pub is_public: bool,
}

/// POST /github/gist
pub async fn create_gist(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<GistRequest>,
) -> Result<Json<Value>, ApiError> {
    let auth = require_auth(&headers)?;
    let url = state
        .github
        .create_gist(
            &auth.token,
            req.description.as_deref(),
            &req.files,
            req.is_public,
        )
        .await?;
    Ok(Json(json!({ "success": true, "url": url })))
}
