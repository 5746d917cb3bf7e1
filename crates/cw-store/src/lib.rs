pub mod crypto;
pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use store::{SearchHit, Store};
pub use types::{
    AuditEntry, Conversation, ConversationStatus, Decision, DocumentType, KanbanCard, Message,
    MessageRole, Project, ProjectDocument, SteeringCorrection, TokenUsage,
};
