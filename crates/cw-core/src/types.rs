use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque stable identifier for a project. UUIDv4 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub String);

impl ProjectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque stable identifier for a kanban card. UUIDv4 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardId(pub String);

impl CardId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 hex chars — used in branch names and worktree directory names.
    pub fn short(&self) -> String {
        self.0.chars().take(8).collect()
    }
}

impl Default for CardId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CardId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
impl From<&str> for CardId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Correlates every log line, broadcast event, and audit entry for one spawn
/// attempt of one card.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpanId(pub String);

impl SpanId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SpanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which kanban column a card is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Backlog,
    InProgress,
    Done,
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Column::Backlog => write!(f, "backlog"),
            Column::InProgress => write!(f, "in_progress"),
            Column::Done => write!(f, "done"),
        }
    }
}

impl std::str::FromStr for Column {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backlog" => Ok(Column::Backlog),
            "in_progress" => Ok(Column::InProgress),
            "done" => Ok(Column::Done),
            other => Err(format!("unknown column: {other}")),
        }
    }
}

/// Which CLI agent type is assigned to a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignedAgent {
    Claude,
    Codex,
    Gemini,
}

impl fmt::Display for AssignedAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignedAgent::Claude => write!(f, "claude"),
            AssignedAgent::Codex => write!(f, "codex"),
            AssignedAgent::Gemini => write!(f, "gemini"),
        }
    }
}

impl std::str::FromStr for AssignedAgent {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude" => Ok(AssignedAgent::Claude),
            "codex" => Ok(AssignedAgent::Codex),
            "gemini" => Ok(AssignedAgent::Gemini),
            other => Err(format!("unknown agent type: {other}")),
        }
    }
}

/// Per-card agent lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Running,
    Blocked,
    Completed,
    Failed,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentStatus::Idle => write!(f, "idle"),
            AgentStatus::Running => write!(f, "running"),
            AgentStatus::Blocked => write!(f, "blocked"),
            AgentStatus::Completed => write!(f, "completed"),
            AgentStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for AgentStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(AgentStatus::Idle),
            "running" => Ok(AgentStatus::Running),
            "blocked" => Ok(AgentStatus::Blocked),
            "completed" => Ok(AgentStatus::Completed),
            "failed" => Ok(AgentStatus::Failed),
            other => Err(format!("unknown agent status: {other}")),
        }
    }
}

/// PR/merge verification pipeline state for a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Unverified,
    BranchPassed,
    BranchFailed,
    MergePassed,
    MergeFailed,
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationStatus::Unverified => write!(f, "unverified"),
            VerificationStatus::BranchPassed => write!(f, "branch_passed"),
            VerificationStatus::BranchFailed => write!(f, "branch_failed"),
            VerificationStatus::MergePassed => write!(f, "merge_passed"),
            VerificationStatus::MergeFailed => write!(f, "merge_failed"),
        }
    }
}

impl std::str::FromStr for VerificationStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unverified" => Ok(VerificationStatus::Unverified),
            "branch_passed" => Ok(VerificationStatus::BranchPassed),
            "branch_failed" => Ok(VerificationStatus::BranchFailed),
            "merge_passed" => Ok(VerificationStatus::MergePassed),
            "merge_failed" => Ok(VerificationStatus::MergeFailed),
            other => Err(format!("unknown verification status: {other}")),
        }
    }
}

/// Project lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Paused,
    Archived,
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectStatus::Active => write!(f, "active"),
            ProjectStatus::Paused => write!(f, "paused"),
            ProjectStatus::Archived => write!(f, "archived"),
        }
    }
}

impl std::str::FromStr for ProjectStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ProjectStatus::Active),
            "paused" => Ok(ProjectStatus::Paused),
            "archived" => Ok(ProjectStatus::Archived),
            other => Err(format!("unknown project status: {other}")),
        }
    }
}

/// Uniform API response envelope: `{ok:true,data}` or
/// `{ok:false,error}`. Reused by both REST handlers and WS `ResFrame`-style
/// replies.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Envelope<T: Serialize> {
    Ok { ok: bool, data: T },
    Err { ok: bool, error: String },
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Envelope::Ok { ok: true, data }
    }
}

impl Envelope<()> {
    pub fn err(message: impl Into<String>) -> Self {
        Envelope::Err {
            ok: false,
            error: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_short_id_is_8_chars() {
        let id = CardId("abcdef0123456789".to_string());
        assert_eq!(id.short(), "abcdef01");
    }

    #[test]
    fn column_roundtrip() {
        for c in [Column::Backlog, Column::InProgress, Column::Done] {
            let s = c.to_string();
            let parsed: Column = s.parse().unwrap();
            assert_eq!(parsed, c);
        }
    }

    #[test]
    fn agent_status_roundtrip() {
        for s in [
            AgentStatus::Idle,
            AgentStatus::Running,
            AgentStatus::Blocked,
            AgentStatus::Completed,
            AgentStatus::Failed,
        ] {
            let text = s.to_string();
            let parsed: AgentStatus = text.parse().unwrap();
            assert_eq!(parsed, s);
        }
    }
}
