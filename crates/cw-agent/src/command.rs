//! Per-agent-type CLI argument construction: one function per
//! [`AssignedAgent`] variant, since each CLI takes a different flag shape
//! for the same "run non-interactively, auto-approve, take this prompt"
//! intent.

use cw_core::AssignedAgent;

/// LLM-provider API keys the host environment may carry for *this* process
/// (e.g. a dashboard or CI runner using the API directly). Agent CLIs
/// authenticate via their own OAuth session, so inheriting any of these
/// would either be ignored or — worse — silently switch the CLI from OAuth
/// to API-key billing.
pub const SANITIZED_ENV_VARS: &[&str] = &[
    "ANTHROPIC_API_KEY",
    "OPENAI_API_KEY",
    "GEMINI_API_KEY",
    "GOOGLE_API_KEY",
];

/// Build the argument vector for one agent invocation, given the resolved
/// command name (from [`cw_core::config::OrchestratorConfig`]) and the fully
/// assembled prompt text.
pub fn build_args(agent: AssignedAgent, prompt: &str) -> Vec<String> {
    match agent {
        AssignedAgent::Claude => vec![
            "-p".to_string(),
            "--verbose".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--permission-mode".to_string(),
            "bypassPermissions".to_string(),
            "--max-turns".to_string(),
            "50".to_string(),
            prompt.to_string(),
        ],
        AssignedAgent::Codex => vec![
            "--approval-mode".to_string(),
            "full-auto".to_string(),
            "-q".to_string(),
            prompt.to_string(),
        ],
        AssignedAgent::Gemini => vec!["-y".to_string(), prompt.to_string()],
    }
}

/// Apply environment sanitization to a [`tokio::process::Command`] in place.
pub fn sanitize_env(cmd: &mut tokio::process::Command) {
    for var in SANITIZED_ENV_VARS {
        cmd.env_remove(var);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claude_args_are_stream_json_bypass() {
        let args = build_args(AssignedAgent::Claude, "do the thing");
        assert_eq!(
            args,
            vec![
                "-p",
                "--verbose",
                "--output-format",
                "stream-json",
                "--permission-mode",
                "bypassPermissions",
                "--max-turns",
                "50",
                "do the thing",
            ]
        );
    }

    #[test]
    fn codex_args_are_full_auto() {
        let args = build_args(AssignedAgent::Codex, "do the thing");
        assert_eq!(args, vec!["--approval-mode", "full-auto", "-q", "do the thing"]);
    }

    #[test]
    fn gemini_args_are_yolo_flag() {
        let args = build_args(AssignedAgent::Gemini, "do the thing");
        assert_eq!(args, vec!["-y", "do the thing"]);
    }
}
