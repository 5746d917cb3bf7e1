//! `GET /health` liveness probe and the `/auth/token` stub.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::app::AppState;

/// GET /health — never requires auth. Reports liveness plus a few counters
/// useful for an operator glancing at the process.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "ws_clients": state.ws_clients.len(),
        "broadcast_subscribers": state.broadcast.subscriber_count(),
        "running_agents": state.orchestrator.get_running_agents().len(),
    }))
}

/// `/auth/token` — token minting is handled by an external OAuth
/// collaborator; this core exposes only the route so a front-end can
/// discover it's unimplemented here rather than 404ing, without building
/// the minting flow itself.
pub async fn auth_token_stub() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(json!({
            "ok": false,
            "error": "token minting is handled by an external OAuth collaborator, not this core"
        })),
    )
}
