//! `POST /heartbeat/submit` — task brief intake. `projectId` is optional;
//! this boundary resolves a missing one to the most-recently-active
//! project rather than widening
//! [`cw_scheduler::SchedulerEngine::submit_task_brief`]'s signature, since
//! every other caller of that method always knows its project.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use cw_core::{Envelope, ProjectStatus};
use cw_store::KanbanCard;
use serde::Deserialize;

use crate::app::AppState;
use crate::error::{validation, ApiError};

#[derive(Deserialize)]
pub struct SubmitBriefRequest {
    #[serde(default)]
    pub project_id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub immediate: bool,
}

pub async fn submit_brief(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitBriefRequest>,
) -> Result<Json<Envelope<KanbanCard>>, ApiError> {
    if req.text.trim().is_empty() {
        return Err(validation("text must not be empty"));
    }

    let project_id = match req.project_id {
        Some(id) => id,
        None => {
            let projects = state.store.list_projects()?;
            projects
                .into_iter()
                .find(|p| p.status == ProjectStatus::Active)
                .map(|p| p.id)
                .ok_or_else(|| validation("no project_id given and no active project to default to"))?
        }
    };

    let card = state
        .scheduler
        .submit_task_brief(&project_id, &req.text, req.immediate)
        .await?;
    Ok(Json(Envelope::ok(card)))
}
