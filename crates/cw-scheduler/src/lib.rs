mod checklist;
mod engine;
mod error;
mod synth;

pub use checklist::HeartbeatChecklist;
pub use engine::SchedulerEngine;
pub use error::{Result, SchedulerError};
pub use synth::MergeOutcome;
