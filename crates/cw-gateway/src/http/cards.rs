//! `/projects/:id/cards` REST surface. Card creation and the narrow
//! state-machine transitions go through [`cw_kanban::KanbanQueue`] so
//! its per-project critical section and invariants hold; free-form field
//! edits (title/description/labels/priority) go straight to the store since
//! they don't touch the column/agent-status state machine.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use cw_core::config::clamp_page_limit;
use cw_core::{Column, Envelope};
use cw_store::KanbanCard;
use serde::Deserialize;

use crate::app::AppState;
use crate::error::{validation, ApiError};

/// Default page size when a caller omits `limit` on card listing.
const DEFAULT_CARD_PAGE: i64 = 100;

#[derive(Deserialize)]
pub struct ListCardsQuery {
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

pub async fn list_cards(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Query(q): Query<ListCardsQuery>,
) -> Result<Json<Envelope<Vec<KanbanCard>>>, ApiError> {
    let limit = clamp_page_limit(q.limit.unwrap_or(DEFAULT_CARD_PAGE));
    let offset = q.offset.unwrap_or(0).max(0);

    let cards = match q.column {
        Some(c) => {
            let column: Column = c.parse().map_err(validation)?;
            state.kanban.list_by_column(&project_id, column, limit, offset)?
        }
        None => {
            let mut all = Vec::new();
            for column in [Column::Backlog, Column::InProgress, Column::Done] {
                all.extend(state.kanban.list_by_column(&project_id, column, limit, offset)?);
            }
            all
        }
    };
    Ok(Json(Envelope::ok(cards)))
}

#[derive(Deserialize)]
pub struct CreateCardRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub priority: i64,
}

pub async fn create_card(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(req): Json<CreateCardRequest>,
) -> Result<Json<Envelope<KanbanCard>>, ApiError> {
    if req.title.trim().is_empty() {
        return Err(validation("title must not be empty"));
    }
    let card = state
        .kanban
        .create_card(&project_id, req.title.trim(), &req.description, req.labels, req.priority)
        .await?;
    Ok(Json(Envelope::ok(card)))
}

#[derive(Deserialize, Default)]
pub struct UpdateCardRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub labels: Option<Vec<String>>,
    pub priority: Option<i64>,
}

pub async fn update_card(
    State(state): State<Arc<AppState>>,
    Path((_project_id, card_id)): Path<(String, String)>,
    Json(req): Json<UpdateCardRequest>,
) -> Result<Json<Envelope<KanbanCard>>, ApiError> {
    let mut card = state.store.get_card(&card_id)?;
    if let Some(title) = req.title {
        if title.trim().is_empty() {
            return Err(validation("title must not be empty"));
        }
        card.title = title;
    }
    if let Some(description) = req.description {
        card.description = description;
    }
    if let Some(labels) = req.labels {
        card.labels = labels;
    }
    if let Some(priority) = req.priority {
        card.priority = priority;
    }
    card.updated_at = chrono::Utc::now().to_rfc3339();
    state.store.update_card(&card)?;
    state.store.insert_audit("card", &card.id, "card.edited", serde_json::json!({}), None)?;
    Ok(Json(Envelope::ok(card)))
}

pub async fn skip_card(
    State(state): State<Arc<AppState>>,
    Path((_project_id, card_id)): Path<(String, String)>,
) -> Result<Json<Envelope<KanbanCard>>, ApiError> {
    let card = state.kanban.skip_to_back(&card_id).await?;
    Ok(Json(Envelope::ok(card)))
}

#[derive(Deserialize)]
pub struct SaveContextRequest {
    pub snapshot: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

pub async fn save_context(
    State(state): State<Arc<AppState>>,
    Path((_project_id, card_id)): Path<(String, String)>,
    Json(req): Json<SaveContextRequest>,
) -> Result<Json<Envelope<KanbanCard>>, ApiError> {
    let card = state
        .kanban
        .save_context(&card_id, &req.snapshot, req.session_id.as_deref())
        .await?;
    Ok(Json(Envelope::ok(card)))
}
