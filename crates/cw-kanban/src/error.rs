use thiserror::Error;

/// Kanban-layer error taxonomy.
#[derive(Debug, Error)]
pub enum KanbanError {
    #[error("card {card_id} cannot transition: {reason}")]
    IllegalTransition { card_id: String, reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] cw_store::StoreError),
}

impl From<KanbanError> for cw_core::CwError {
    fn from(e: KanbanError) -> Self {
        match e {
            KanbanError::IllegalTransition { card_id, reason } => {
                cw_core::CwError::ConflictState(format!("{card_id}: {reason}"))
            }
            KanbanError::NotFound(id) => cw_core::CwError::NotFound(id),
            KanbanError::Store(e) => e.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, KanbanError>;
