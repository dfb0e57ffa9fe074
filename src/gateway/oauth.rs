//! GitHub OAuth flow: `/auth/github`, `/auth/github/callback`, `/auth/logout`.
//!
//! On success the access token and user profile are handed back to the
//! browser in the `github_auth` cookie; nothing is stored server-side.

use super::{ApiError, AppState, API_PREFIX};
use crate::github::{self, AuthCookie};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

/// Query parameters returned by GitHub's OAuth redirect.
#[derive(Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
}

fn redirect(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

fn redirect_with_cookie(location: &str, cookie: String) -> Response {
    (
        StatusCode::FOUND,
        [
            (header::LOCATION, location.to_string()),
            (header::SET_COOKIE, cookie),
        ],
    )
        .into_response()
}

fn error_location(frontend: &str, code: &str) -> String {
    let sep = if frontend.contains('?') { '&' } else { '?' };
    format!("{frontend}{sep}error={}", urlencoding::encode(code))
}

/// GET /auth/github: redirect the browser to GitHub's authorization page.
pub async fn handle_github_auth(State(state): State<AppState>) -> Response {
    let cfg = state.config.lock().github.clone();

    if cfg.client_id.is_empty() {
        return ApiError::internal("GitHub OAuth not configured").into_response();
    }

    let redirect_uri = format!(
        "{}{API_PREFIX}/auth/github/callback",
        cfg.callback_base_url.trim_end_matches('/')
    );
    redirect(&state.github.authorize_url(&cfg.client_id, &redirect_uri))
}

/// GET /auth/github/callback: exchange the code, fetch the user, set the
/// cookie and return to the frontend. Failures go back with `?error=`.
pub async fn handle_github_callback(
    State(state): State<AppState>,
    Query(params): Query<OAuthCallbackQuery>,
) -> Response {
    let cfg = state.config.lock().github.clone();
    let frontend = cfg.frontend_url.as_str();

    if let Some(err) = params.error {
        tracing::warn!("GitHub OAuth denied: {err}");
        return redirect(&error_location(frontend, &err));
    }
    let code = match params.code {
        Some(c) if !c.is_empty() => c,
        _ => return redirect(&error_location(frontend, "no_code")),
    };
    if !cfg.is_configured() {
        return redirect(&error_location(frontend, "oauth_not_configured"));
    }

    let token = match state
        .github
        .exchange_code(&cfg.client_id, &cfg.client_secret, &code)
        .await
    {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("GitHub token exchange failed: {e:#}");
            return redirect(&error_location(frontend, &e.to_string()));
        }
    };

    let user = match state.github.user(&token).await {
        Ok(u) => u,
        Err(e) => {
            tracing::error!("GitHub user lookup failed: {e:#}");
            return redirect(&error_location(frontend, "oauth_failed"));
        }
    };
    tracing::info!("GitHub OAuth: connected as {}", user.login);

    match (AuthCookie { token, user }).encode() {
        Ok(encoded) => redirect_with_cookie(frontend, github::set_cookie_header(&encoded)),
        Err(e) => {
            tracing::error!("{e:#}");
            redirect(&error_location(frontend, "oauth_failed"))
        }
    }
}

/// GET /auth/logout
pub async fn handle_logout(State(state): State<AppState>) -> Response {
    let frontend = state.config.lock().github.frontend_url.clone();
    redirect_with_cookie(&frontend, github::clear_cookie_header())
}
