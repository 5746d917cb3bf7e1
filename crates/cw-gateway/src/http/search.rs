//! `GET /search` — unified full-text search across cards, documents, and
//! decisions, backed by the store's `searchFullText` contract.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use cw_core::config::clamp_page_limit;
use cw_core::Envelope;
use cw_store::SearchHit;
use serde::Deserialize;

use crate::app::AppState;
use crate::error::{validation, ApiError};

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default)]
    pub limit: Option<i64>,
}

const DEFAULT_SEARCH_LIMIT: i64 = 20;

pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Envelope<Vec<SearchHit>>>, ApiError> {
    if q.q.trim().is_empty() {
        return Err(validation("q must not be empty"));
    }
    let limit = clamp_page_limit(q.limit.unwrap_or(DEFAULT_SEARCH_LIMIT));
    let hits = state.store.search_full_text(&q.q, limit)?;
    Ok(Json(Envelope::ok(hits)))
}
