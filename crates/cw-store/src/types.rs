use cw_core::{AgentStatus, AssignedAgent, Column, ProjectStatus, VerificationStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: ProjectStatus,
    pub color: Option<String>,
    pub agent_timeout_minutes: u32,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KanbanCard {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub description: String,
    pub column: Column,
    pub position: i64,
    pub labels: Vec<String>,
    pub priority: i64,
    pub context_snapshot: Option<String>,
    pub last_session_id: Option<String>,
    pub assigned_agent: Option<AssignedAgent>,
    pub agent_status: AgentStatus,
    pub blocked_reason: Option<String>,
    pub verification_status: VerificationStatus,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "system" => Ok(MessageRole::System),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// `contentCiphertext` holds nonce-prepended AES-256-GCM bytes; plaintext
/// never persists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub project_id: Option<String>,
    pub conversation_id: String,
    pub role: MessageRole,
    #[serde(skip_serializing)]
    pub content_ciphertext: Vec<u8>,
    pub metadata: serde_json::Value,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Archived,
}

impl std::fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationStatus::Active => write!(f, "active"),
            ConversationStatus::Archived => write!(f, "archived"),
        }
    }
}

impl std::str::FromStr for ConversationStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ConversationStatus::Active),
            "archived" => Ok(ConversationStatus::Archived),
            other => Err(format!("unknown conversation status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub project_id: Option<String>,
    pub status: ConversationStatus,
    pub summary: Option<String>,
    pub session_id: Option<String>,
    pub message_count: i64,
    pub first_message_at: String,
    pub last_message_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Brief,
    Instructions,
    Reference,
    State,
    Assumptions,
    Decisions,
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DocumentType::Brief => "brief",
            DocumentType::Instructions => "instructions",
            DocumentType::Reference => "reference",
            DocumentType::State => "state",
            DocumentType::Assumptions => "assumptions",
            DocumentType::Decisions => "decisions",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for DocumentType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "brief" => Ok(DocumentType::Brief),
            "instructions" => Ok(DocumentType::Instructions),
            "reference" => Ok(DocumentType::Reference),
            "state" => Ok(DocumentType::State),
            "assumptions" => Ok(DocumentType::Assumptions),
            "decisions" => Ok(DocumentType::Decisions),
            other => Err(format!("unknown document type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDocument {
    pub id: String,
    pub project_id: String,
    pub doc_type: DocumentType,
    pub title: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub reasoning: String,
    pub alternatives: Vec<String>,
    pub tradeoffs: String,
    pub created_at: String,
    pub revised_at: Option<String>,
}

/// Append-only lifecycle record. Never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub metadata: serde_json::Value,
    pub actor: Option<String>,
    pub timestamp: String,
}

/// Append-only per-call token/cost record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub id: String,
    pub card_id: Option<String>,
    pub project_id: String,
    pub agent: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_read_tokens: i64,
    pub cache_write_tokens: i64,
    pub cost_usd: f64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SteeringCorrection {
    pub id: String,
    pub project_id: Option<String>,
    pub domain: String,
    pub text: String,
    pub active: bool,
    pub created_at: String,
}
