use thiserror::Error;

/// Persistence-layer error taxonomy.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {kind} {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("encryption error: {0}")]
    Crypto(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for cw_core::CwError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(m) => cw_core::CwError::ConflictState(m),
            StoreError::NotFound { kind, id } => {
                cw_core::CwError::NotFound(format!("{kind} {id}"))
            }
            StoreError::Database(e) => cw_core::CwError::Storage(e.to_string()),
            StoreError::Storage(m) => cw_core::CwError::Storage(m),
            StoreError::Crypto(m) => cw_core::CwError::Storage(m),
            StoreError::Serialization(e) => cw_core::CwError::Storage(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
