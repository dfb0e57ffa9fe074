//! HTTP gateway for the IDE.
//!
//! Everything is mounted under `/ide-api`:
//! - `/health`, `/clarity/*`: engine operations
//! - `/git/*`: source-control panel
//! - `/auth/*`, `/github/*`: GitHub login and proxying
//! - `/compile`: forwarded to the external WASM compiler

mod clarity;
mod compile;
pub mod error;
mod git;
mod github;
mod oauth;

use crate::config::Config;
use crate::engine::{Orchestrator, SessionHandle, SessionRegistry};
use crate::git::GitRepo;
use crate::github::GithubClient;
use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Mount point of every route.
pub const API_PREFIX: &str = "/ide-api";
/// Request header naming the caller's session.
pub const SESSION_HEADER: &str = "x-session-id";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Mutex<Config>>,
    pub orchestrator: Arc<Orchestrator>,
    pub sessions: Arc<SessionRegistry>,
    pub git: Arc<GitRepo>,
    pub github: GithubClient,
    /// Client for the compiler proxy.
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(
        config: Config,
        orchestrator: Arc<Orchestrator>,
        sessions: Arc<SessionRegistry>,
        git: Arc<GitRepo>,
    ) -> Result<Self> {
        let github = GithubClient::new(&config.github.api_base, &config.github.oauth_base)?;
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.compiler.timeout_secs.max(1)))
            .build()
            .context("Failed to build compiler HTTP client")?;
        Ok(Self {
            config: Arc::new(Mutex::new(config)),
            orchestrator,
            sessions,
            git,
            github,
            http,
        })
    }

    /// The session named by the request headers, or the default one.
    pub fn session(&self, headers: &HeaderMap) -> Result<SessionHandle, ApiError> {
        let id = match headers.get(SESSION_HEADER) {
            None => crate::engine::session::DEFAULT_SESSION,
            Some(raw) => raw
                .to_str()
                .ok()
                .map(str::trim)
                .filter(|id| is_valid_session_id(id))
                .ok_or_else(|| {
                    ApiError::bad_request(format!(
                        "{SESSION_HEADER} must be 1-{MAX_SESSION_ID_LEN} characters of [A-Za-z0-9_-]"
                    ))
                })?,
        };
        Ok(self.sessions.get(id))
    }
}

/// Longest accepted session id; a UUID fits.
pub const MAX_SESSION_ID_LEN: usize = 64;

fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

pub fn router(state: AppState) -> Router {
    let gateway = state.config.lock().gateway.clone();

    let api = Router::new()
        .route("/health", get(clarity::health))
        .route("/clarity/check", post(clarity::check))
        .route("/clarity/deploy", post(clarity::deploy))
        .route("/clarity/execute", post(clarity::execute))
        .route("/clarity/state", post(clarity::state))
        .route("/clarity/terminal", post(clarity::terminal))
        .route("/clarity/reset", post(clarity::reset))
        .route("/git/status", get(git::status))
        .route("/git/stage", post(git::stage))
        .route("/git/unstage", post(git::unstage))
        .route("/git/discard", post(git::discard))
        .route("/git/commit", post(git::commit))
        .route("/git/log", get(git::log))
        .route("/git/branches", get(git::branches))
        .route("/git/checkout", post(git::checkout))
        .route("/auth/github", get(oauth::handle_github_auth))
        .route("/auth/github/callback", get(oauth::handle_github_callback))
        .route("/auth/logout", get(oauth::handle_logout))
        .route("/github/user", get(github::user))
        .route("/github/repos", get(github::repos))
        .route("/github/clone", post(github::clone_repo))
        .route("/github/gist", post(github::create_gist))
        .route("/compile", post(compile::proxy));

    Router::new()
        .nest(API_PREFIX, api)
        .layer(cors_layer(&gateway.allowed_origins))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(gateway.body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {o:?}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(SESSION_HEADER)])
        .allow_credentials(true)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(state: AppState) -> Result<()> {
    let (host, port) = {
        let cfg = state.config.lock();
        (cfg.gateway.host.clone(), cfg.gateway.port)
    };
    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("Failed to bind {host}:{port}"))?;
    tracing::info!(
        "LabSTX IDE backend listening on http://{}{API_PREFIX}",
        listener.local_addr()?
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {e}");
            }
            tracing::info!("Shutting down");
        })
        .await
        .context("Gateway server failed")
}
