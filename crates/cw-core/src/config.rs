use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Default gateway bind address and port.
pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// 5 MB hard cap per WebSocket frame.
pub const MAX_WS_PAYLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Paging / day-range clamp bounds for query parameters.
pub const PAGE_LIMIT_MIN: i64 = 1;
pub const PAGE_LIMIT_MAX: i64 = 1000;
pub const DAYS_MIN: i64 = 1;
pub const DAYS_MAX: i64 = 365;

/// Default scheduler cadence and orchestration limits.
pub const DEFAULT_MAX_CONCURRENT_AGENTS: u32 = 3;
pub const DEFAULT_AGENT_TIMEOUT_MINUTES: u32 = 30;
pub const DEFAULT_BLOCKED_RETRY_MINUTES: u32 = 30;

/// Hard character budget for one assembled agent prompt.
pub const PROMPT_BUDGET_CHARS: usize = 50_000;

/// Per-document prompt section truncation.
pub const PROMPT_DOCUMENT_CHARS: usize = 2_000;

/// Number of most-recent architecture decisions included in a prompt.
pub const PROMPT_TOP_DECISIONS: i64 = 10;

/// Number of most-recently-done sibling cards included in board context.
pub const PROMPT_RECENT_DONE_CARDS: i64 = 10;

/// Stderr tail length attached to `agent.failed`.
pub const STDERR_TAIL_LINES: usize = 20;

/// Grace period between SIGTERM and SIGKILL, both for timeout and for
/// `stopAgent`.
pub const SIGTERM_GRACE_SECS: u64 = 5;

/// Graceful-shutdown window before SIGKILLing stragglers.
pub const SHUTDOWN_GRACE_SECS: u64 = 30;

/// Push retry count and fixed backoff.
pub const PUSH_RETRY_COUNT: u32 = 3;
pub const PUSH_RETRY_BACKOFF_SECS: u64 = 5;

/// Age after which a non-running `AgentProcess` entry is pruned from the
/// in-memory map.
pub const AGENT_PROCESS_PRUNE_AGE_SECS: i64 = 3600;

/// Top-level config (cardwright.toml + CW_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CwConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
}

impl Default for CwConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            workspace: WorkspaceConfig::default(),
            database: DatabaseConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            telegram: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    pub auth: AuthConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            auth: AuthConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub token: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::Token,
            token: Some("change-me".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    Token,
    None,
}

/// Where the orchestrator keeps git worktrees and runs `git`/`gh` commands.
/// Never user-controlled at request time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default = "default_workspace_path")]
    pub path: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            path: default_workspace_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Base64 or hex 32-byte key used to derive the AES-256-GCM message cipher.
    /// Required for non-empty `cw-store::crypto` use; defaults to a dev-only
    /// fixed key so a fresh checkout still boots.
    #[serde(default = "default_encryption_key")]
    pub message_encryption_key: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            message_encryption_key: default_encryption_key(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_agents: u32,
    #[serde(default = "default_agent_timeout")]
    pub agent_timeout_minutes: u32,
    #[serde(default = "default_blocked_retry")]
    pub blocked_retry_minutes: u32,
    #[serde(default = "default_heartbeat_checklist_path")]
    pub heartbeat_checklist_path: String,
    /// Binary name or path for each agent CLI. Defaults assume the CLI is on `$PATH`.
    #[serde(default = "default_claude_command")]
    pub claude_command: String,
    #[serde(default = "default_codex_command")]
    pub codex_command: String,
    #[serde(default = "default_gemini_command")]
    pub gemini_command: String,
    /// Hard character budget for assembled prompts.
    #[serde(default = "default_prompt_budget_chars")]
    pub prompt_budget_chars: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_agents: default_max_concurrent(),
            agent_timeout_minutes: default_agent_timeout(),
            blocked_retry_minutes: default_blocked_retry(),
            heartbeat_checklist_path: default_heartbeat_checklist_path(),
            claude_command: default_claude_command(),
            codex_command: default_codex_command(),
            gemini_command: default_gemini_command(),
            prompt_budget_chars: default_prompt_budget_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_workspace_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cardwright/workspace", home)
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cardwright/cardwright.db", home)
}
fn default_encryption_key() -> String {
    "0".repeat(64)
}
fn default_max_concurrent() -> u32 {
    DEFAULT_MAX_CONCURRENT_AGENTS
}
fn default_agent_timeout() -> u32 {
    DEFAULT_AGENT_TIMEOUT_MINUTES
}
fn default_blocked_retry() -> u32 {
    DEFAULT_BLOCKED_RETRY_MINUTES
}
fn default_claude_command() -> String {
    "claude".to_string()
}
fn default_codex_command() -> String {
    "codex".to_string()
}
fn default_gemini_command() -> String {
    "gemini".to_string()
}
fn default_prompt_budget_chars() -> usize {
    PROMPT_BUDGET_CHARS
}
fn default_heartbeat_checklist_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cardwright/HEARTBEAT.md", home)
}

impl CwConfig {
    /// Load config from a TOML file with `CW_*` env var overrides.
    ///
    /// Checks in order: explicit path argument > `CW_CONFIG` env var >
    /// `~/.cardwright/cardwright.toml`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("CW_CONFIG").ok())
            .unwrap_or_else(default_config_path);

        let config: CwConfig = Figment::from(figment::providers::Serialized::defaults(
            CwConfig::default(),
        ))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("CW_").split("__"))
        .extract()
        .map_err(|e| crate::error::CwError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cardwright/cardwright.toml", home)
}

/// Clamp a paging `limit` query parameter into `[1, 1000]`.
pub fn clamp_page_limit(v: i64) -> i64 {
    v.clamp(PAGE_LIMIT_MIN, PAGE_LIMIT_MAX)
}

/// Clamp a `days` query parameter into `[1, 365]`.
pub fn clamp_days(v: i64) -> i64 {
    v.clamp(DAYS_MIN, DAYS_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_bounds() {
        let cfg = CwConfig::default();
        assert_eq!(cfg.gateway.port, DEFAULT_PORT);
        assert_eq!(cfg.orchestrator.max_concurrent_agents, 3);
    }

    #[test]
    fn clamp_page_limit_bounds() {
        assert_eq!(clamp_page_limit(0), 1);
        assert_eq!(clamp_page_limit(50), 50);
        assert_eq!(clamp_page_limit(5000), 1000);
    }

    #[test]
    fn clamp_days_bounds() {
        assert_eq!(clamp_days(-3), 1);
        assert_eq!(clamp_days(400), 365);
    }
}
