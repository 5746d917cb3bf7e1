use cw_core::{AgentStatus, AssignedAgent, CardId, ProjectId, SpanId};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::log_ring::LogRing;

/// The authoritative in-memory agent record.
/// Never persisted directly; the durable mirror lives on the card row plus
/// the audit log.
///
/// The child process handle itself is *not* stored here — it is owned
/// exclusively by the task driving that spawn (`orchestrator::run_agent`),
/// which needs `&mut Child` for `wait()`. This record instead carries the
/// child's `pid` so `stop_agent`/timeout handling can signal it from
/// outside that task: the registry holds the pid, the owning task holds
/// the handle.
pub struct AgentProcess {
    pub card_id: CardId,
    pub project_id: ProjectId,
    pub agent: AssignedAgent,
    pub status: AgentStatus,
    pub started_at: String,
    pub logs: LogRing,
    pub branch_name: String,
    pub span_id: SpanId,
    pub pid: Option<u32>,
    /// Signalled by `stop_agent`/`shutdown_all` so the driving task wakes up
    /// and runs the graceful-stop path instead of waiting for natural exit.
    pub cancel_tx: Option<oneshot::Sender<()>>,
    /// Set once the process reaches a terminal status; pruning only
    /// considers entries older than 1h past this mark.
    pub terminal_at: Option<String>,
}

impl AgentProcess {
    pub fn is_running(&self) -> bool {
        self.status == AgentStatus::Running
    }
}

/// A safe snapshot of [`AgentProcess`] for callers that must not touch the
/// child handle directly.
#[derive(Debug, Clone, Serialize)]
pub struct AgentProcessSnapshot {
    pub card_id: String,
    pub project_id: String,
    pub agent: String,
    pub status: String,
    pub started_at: String,
    pub branch_name: String,
    pub span_id: String,
}

impl From<&AgentProcess> for AgentProcessSnapshot {
    fn from(p: &AgentProcess) -> Self {
        Self {
            card_id: p.card_id.to_string(),
            project_id: p.project_id.to_string(),
            agent: p.agent.to_string(),
            status: p.status.to_string(),
            started_at: p.started_at.clone(),
            branch_name: p.branch_name.clone(),
            span_id: p.span_id.to_string(),
        }
    }
}
