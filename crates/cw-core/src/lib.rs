pub mod config;
pub mod error;
pub mod types;

pub use config::CwConfig;
pub use error::{CwError, Result};
pub use types::{
    AgentStatus, AssignedAgent, CardId, Column, Envelope, ProjectId, ProjectStatus, SpanId,
    VerificationStatus,
};
