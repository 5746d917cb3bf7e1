//! Maps every component error taxonomy into the `{ok:false, error}` envelope,
//! centralized here rather than left as per-handler ad hoc status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cw_core::CwError;
use serde_json::json;

pub struct ApiError(pub CwError);

impl From<CwError> for ApiError {
    fn from(e: CwError) -> Self {
        Self(e)
    }
}
impl From<cw_store::StoreError> for ApiError {
    fn from(e: cw_store::StoreError) -> Self {
        Self(e.into())
    }
}
impl From<cw_kanban::KanbanError> for ApiError {
    fn from(e: cw_kanban::KanbanError) -> Self {
        Self(e.into())
    }
}
impl From<cw_agent::AgentError> for ApiError {
    fn from(e: cw_agent::AgentError) -> Self {
        Self(e.into())
    }
}
impl From<cw_scheduler::SchedulerError> for ApiError {
    fn from(e: cw_scheduler::SchedulerError) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({ "ok": false, "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

/// A plain 400 for request-shape problems that never reach a component
/// (missing fields, bad enum strings) — surfaced the same way as any other
/// `Validation` error.
pub fn validation(msg: impl Into<String>) -> ApiError {
    ApiError(CwError::Validation(msg.into()))
}
