use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] cw_store::StoreError),

    #[error(transparent)]
    Kanban(#[from] cw_kanban::KanbanError),

    #[error(transparent)]
    Agent(#[from] cw_agent::AgentError),

    #[error("checklist read failed: {0}")]
    Checklist(String),
}

impl From<SchedulerError> for cw_core::CwError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::Store(e) => e.into(),
            SchedulerError::Kanban(e) => e.into(),
            SchedulerError::Agent(e) => e.into(),
            SchedulerError::Checklist(m) => cw_core::CwError::ExternalTool(m),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
