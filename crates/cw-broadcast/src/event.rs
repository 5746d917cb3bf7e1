use serde::Serialize;
use serde_json::Value;

/// A lifecycle event fanned out to every WS subscriber. The open set of
/// tagged variants plus a catch-all `Extension` leaves room for any number
/// of open-ended extension types.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "agent.spawned")]
    AgentSpawned {
        card_id: String,
        project_id: String,
        agent: String,
        span_id: String,
        branch_name: String,
    },
    #[serde(rename = "agent.log")]
    AgentLog {
        card_id: String,
        span_id: String,
        line: String,
    },
    #[serde(rename = "agent.completed")]
    AgentCompleted {
        card_id: String,
        project_id: String,
        span_id: String,
    },
    #[serde(rename = "agent.failed")]
    AgentFailed {
        card_id: String,
        project_id: String,
        span_id: String,
        reason: String,
        stderr_tail: Vec<String>,
    },
    #[serde(rename = "agent.timeout")]
    AgentTimeout {
        card_id: String,
        project_id: String,
        span_id: String,
    },
    #[serde(rename = "agent.stopped")]
    AgentStopped {
        card_id: String,
        project_id: String,
        span_id: String,
    },
    #[serde(rename = "heartbeat.tick")]
    HeartbeatTick { projects_checked: usize },
    #[serde(rename = "heartbeat.skipped")]
    HeartbeatSkipped { job: String, reason: String },
    #[serde(rename = "card.assigned")]
    CardAssigned {
        card_id: String,
        project_id: String,
        agent: String,
    },
    #[serde(rename = "card.status")]
    CardStatus {
        card_id: String,
        project_id: String,
        column: String,
        agent_status: String,
    },
    #[serde(rename = "card.context")]
    CardContext { card_id: String, project_id: String },
    /// Forward-compatible escape hatch for event kinds not yet modeled as a
    /// dedicated variant.
    #[serde(rename = "extension")]
    Extension { kind: String, payload: Value },
}
