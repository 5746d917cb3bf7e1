pub mod error;
pub mod kanban;

pub use error::KanbanError;
pub use kanban::KanbanQueue;
