//! Bearer-token auth middleware. Required on every route except `/health`
//! and `/auth/token`; implemented as an Axum middleware layer so every
//! mutating route is covered uniformly rather than opted in per handler.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use cw_core::config::AuthMode;

use crate::app::AppState;

pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    match state.config.gateway.auth.mode {
        AuthMode::None => next.run(request).await,
        AuthMode::Token => {
            let expected = match &state.config.gateway.auth.token {
                Some(t) => t.as_str(),
                None => return unauthorized(),
            };
            match extract_bearer(request.headers()) {
                Some(token) if token == expected => next.run(request).await,
                _ => unauthorized(),
            }
        }
    }
}

fn extract_bearer(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        axum::Json(json!({ "ok": false, "error": "unauthorized" })),
    )
        .into_response()
}
