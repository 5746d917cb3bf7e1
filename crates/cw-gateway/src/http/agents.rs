//! `/agents` REST surface. `cwd` is never accepted from the caller — it is
//! always the server's configured workspace path; if a client sends one
//! anyway it is logged and discarded.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use cw_agent::AgentProcessSnapshot;
use cw_core::{AssignedAgent, Envelope};
use serde::Deserialize;
use tracing::warn;

use crate::app::AppState;
use crate::error::{validation, ApiError};

#[derive(Deserialize)]
pub struct SpawnAgentRequest {
    pub card_id: String,
    pub project_id: String,
    pub agent: String,
    /// Accepted and ignored; see module docs.
    #[serde(default)]
    pub cwd: Option<String>,
}

pub async fn spawn_agent(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SpawnAgentRequest>,
) -> Result<Json<Envelope<AgentProcessSnapshot>>, ApiError> {
    if req.cwd.is_some() {
        warn!(card_id = %req.card_id, "client-supplied cwd on /agents/spawn ignored");
    }
    let agent: AssignedAgent = req.agent.parse().map_err(validation)?;
    let snapshot = state
        .orchestrator
        .spawn_agent(&req.card_id, &req.project_id, agent)
        .await?;
    Ok(Json(Envelope::ok(snapshot)))
}

pub async fn list_agents(
    State(state): State<Arc<AppState>>,
) -> Json<Envelope<Vec<AgentProcessSnapshot>>> {
    Json(Envelope::ok(state.orchestrator.get_running_agents()))
}

pub async fn stop_agent(
    State(state): State<Arc<AppState>>,
    Path(card_id): Path<String>,
) -> Result<Json<Envelope<()>>, ApiError> {
    state.orchestrator.stop_agent(&card_id).await?;
    Ok(Json(Envelope::ok(())))
}

#[derive(Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn agent_logs(
    State(state): State<Arc<AppState>>,
    Path(card_id): Path<String>,
    Query(q): Query<LogsQuery>,
) -> Result<Json<Envelope<Vec<String>>>, ApiError> {
    let logs = state.orchestrator.get_agent_logs(&card_id, q.limit)?;
    Ok(Json(Envelope::ok(logs)))
}
