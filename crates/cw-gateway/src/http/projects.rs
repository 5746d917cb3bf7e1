//! `/projects` REST surface. Projects are created/deleted only through this
//! API — agents never mutate them.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use cw_core::Envelope;
use cw_store::Project;
use serde::Deserialize;

use crate::app::AppState;
use crate::error::{validation, ApiError};

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub agent_timeout_minutes: Option<u32>,
}

pub async fn create_project(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<Json<Envelope<Project>>, ApiError> {
    if req.name.trim().is_empty() {
        return Err(validation("name must not be empty"));
    }
    let timeout = req
        .agent_timeout_minutes
        .unwrap_or(state.config.orchestrator.agent_timeout_minutes);
    let project = state
        .store
        .create_project(req.name.trim(), &req.description, req.color.as_deref(), timeout)?;
    Ok(Json(Envelope::ok(project)))
}

pub async fn list_projects(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Envelope<Vec<Project>>>, ApiError> {
    let projects = state.store.list_projects()?;
    Ok(Json(Envelope::ok(projects)))
}

pub async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Project>>, ApiError> {
    let project = state.store.get_project(&id)?;
    Ok(Json(Envelope::ok(project)))
}

pub async fn delete_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<()>>, ApiError> {
    state.store.delete_project(&id)?;
    Ok(Json(Envelope::ok(())))
}
