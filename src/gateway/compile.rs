//! `POST /compile`: stream the request to the external WASM compiler.

use super::{ApiError, AppState};
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

const PASSTHROUGH_HEADERS: [&str; 2] = ["x-compilation-time", "x-wasm-size"];
const WASM_CONTENT_TYPE: &str = "application/wasm";

pub async fn proxy(State(state): State<AppState>, headers: HeaderMap, body: Body) -> Response {
    let url = format!(
        "{}/compile",
        state.config.lock().compiler.service_url.trim_end_matches('/')
    );

    let mut req = state
        .http
        .post(&url)
        .body(reqwest::Body::wrap_stream(body.into_data_stream()));
    if let Some(ct) = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        req = req.header(reqwest::header::CONTENT_TYPE, ct);
    }

    let resp = match req.send().await {
        Ok(r) => r,
        Err(e) => {
            tracing::error!("Compiler proxy error: {e}");
            return ApiError::internal(format!("Compiler service unavailable: {e}")).into_response();
        }
    };

    let status = StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        tracing::warn!("Compiler returned {status}: {text}");
        return (status, text).into_response();
    }

    let mut out = HeaderMap::new();
    out.insert(header::CONTENT_TYPE, HeaderValue::from_static(WASM_CONTENT_TYPE));
    for name in PASSTHROUGH_HEADERS {
        if let Some(value) = resp
            .headers()
            .get(name)
            .and_then(|v| HeaderValue::from_bytes(v.as_bytes()).ok())
        {
            out.insert(HeaderName::from_static(name), value);
        }
    }

    match resp.bytes().await {
        Ok(bytes) => (status, out, bytes).into_response(),
        Err(e) => ApiError::internal(format!("Failed to read compiler response: {e}")).into_response(),
    }
}
