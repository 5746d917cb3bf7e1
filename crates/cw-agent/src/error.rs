use thiserror::Error;

/// Agent orchestrator error taxonomy.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("concurrency limit reached: {running}/{limit} agents already running")]
    ConcurrencyLimitReached { running: u32, limit: u32 },

    #[error("project {project_id} already has a running agent")]
    ProjectBusy { project_id: String },

    #[error("card {card_id} already has a running agent")]
    CardBusy { card_id: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("card {card_id} is not spawnable: {reason}")]
    NotSpawnable { card_id: String, reason: String },

    #[error("worktree setup failed: {0}")]
    WorktreeFailed(String),

    #[error("subprocess error: {0}")]
    Subprocess(String),

    #[error(transparent)]
    Store(#[from] cw_store::StoreError),

    #[error(transparent)]
    Kanban(#[from] cw_kanban::KanbanError),
}

impl From<AgentError> for cw_core::CwError {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::ConcurrencyLimitReached { .. } => {
                cw_core::CwError::ResourceBusy(e.to_string())
            }
            AgentError::ProjectBusy { .. } => cw_core::CwError::ResourceBusy(e.to_string()),
            AgentError::CardBusy { .. } => cw_core::CwError::ResourceBusy(e.to_string()),
            AgentError::NotFound(id) => cw_core::CwError::NotFound(id),
            AgentError::NotSpawnable { .. } => cw_core::CwError::ConflictState(e.to_string()),
            AgentError::WorktreeFailed(m) => cw_core::CwError::ExternalTool(m),
            AgentError::Subprocess(m) => cw_core::CwError::Subprocess(m),
            AgentError::Store(e) => e.into(),
            AgentError::Kanban(e) => e.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
