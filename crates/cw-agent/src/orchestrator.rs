//! The agent orchestrator — spawn gating, worktree lifecycle, subprocess
//! streaming, timeout, and exit handling.
//!
//! One struct holds every collaborator plus a `DashMap` registry of running
//! agents; spawning holds the gating lock across the entire
//! check-then-register sequence so two concurrent spawn attempts for the
//! same project can't both pass the "nothing else running" check.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cw_broadcast::{BroadcastHub, Event};
use cw_core::config::{
    OrchestratorConfig, AGENT_PROCESS_PRUNE_AGE_SECS, PUSH_RETRY_BACKOFF_SECS, PUSH_RETRY_COUNT,
    SHUTDOWN_GRACE_SECS, SIGTERM_GRACE_SECS, STDERR_TAIL_LINES,
};
use cw_core::{AgentStatus, AssignedAgent, CardId, Column, ProjectId, SpanId};
use cw_kanban::KanbanQueue;
use cw_notify::{ChannelManager, OutboundMessage};
use cw_steering::SteeringEngine;
use cw_store::Store;
use dashmap::DashMap;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{error, info, instrument, warn};

use crate::command::{build_args, sanitize_env};
use crate::error::{AgentError, Result};
use crate::log_ring::LogRing;
use crate::prompt::build_prompt;
use crate::types::{AgentProcess, AgentProcessSnapshot};
use crate::worktree;

/// Outcome of the `tokio::select!` race driving one subprocess, resolved in
/// [`AgentOrchestrator::drive_agent`].
enum Outcome {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Owns the in-memory [`AgentProcess`] registry and drives every spawned
/// agent subprocess to a terminal state. One instance per running service.
pub struct AgentOrchestrator {
    store: Arc<Store>,
    kanban: Arc<KanbanQueue>,
    broadcast: Arc<BroadcastHub>,
    steering: Arc<SteeringEngine>,
    notify: Option<Arc<ChannelManager>>,
    config: OrchestratorConfig,
    workspace_path: PathBuf,
    /// The single-slot spawn gate. Held across the entire
    /// check-then-register sequence so two concurrent
    /// `spawn_agent` calls can never both pass the concurrency/busy checks.
    spawn_gate: Mutex<()>,
    agents: DashMap<String, AgentProcess>,
}

impl AgentOrchestrator {
    pub fn new(
        store: Arc<Store>,
        kanban: Arc<KanbanQueue>,
        broadcast: Arc<BroadcastHub>,
        steering: Arc<SteeringEngine>,
        notify: Option<Arc<ChannelManager>>,
        config: OrchestratorConfig,
        workspace_path: PathBuf,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            kanban,
            broadcast,
            steering,
            notify,
            config,
            workspace_path,
            spawn_gate: Mutex::new(()),
            agents: DashMap::new(),
        })
    }

    /// `spawnAgent({cardId, projectId, agent}) → AgentProcess | Error`.
    /// `cwd` is never accepted from the caller — it is always the
    /// orchestrator's configured workspace path, never user-controlled.
    #[instrument(skip(self), fields(card_id, project_id, agent = %agent))]
    pub async fn spawn_agent(
        self: &Arc<Self>,
        card_id: &str,
        project_id: &str,
        agent: AssignedAgent,
    ) -> Result<AgentProcessSnapshot> {
        let _gate = self.spawn_gate.lock().await;

        let running = self
            .agents
            .iter()
            .filter(|e| e.value().is_running())
            .count() as u32;
        if running >= self.config.max_concurrent_agents {
            return Err(AgentError::ConcurrencyLimitReached {
                running,
                limit: self.config.max_concurrent_agents,
            });
        }

        if self
            .agents
            .iter()
            .any(|e| e.value().is_running() && e.value().project_id.as_str() == project_id)
        {
            return Err(AgentError::ProjectBusy {
                project_id: project_id.to_string(),
            });
        }

        if self
            .agents
            .get(card_id)
            .map(|e| e.is_running())
            .unwrap_or(false)
        {
            return Err(AgentError::CardBusy {
                card_id: card_id.to_string(),
            });
        }

        let card = self.store.get_card(card_id)?;
        let project = self.store.get_project(project_id)?;

        if card.column != Column::Backlog {
            return Err(AgentError::NotSpawnable {
                card_id: card_id.to_string(),
                reason: format!("card is in column {} (expected backlog)", card.column),
            });
        }

        let short_id = CardId::from(card_id.to_string()).short();
        let branch = worktree::branch_name(agent, &card.title, &short_id);
        let worktree_path =
            worktree::create_worktree(&self.workspace_path, &short_id, &branch).await?;

        let prompt = build_prompt(&self.store, &self.steering, &project, &card, &agent.to_string())?;

        let command_name = match agent {
            AssignedAgent::Claude => &self.config.claude_command,
            AssignedAgent::Codex => &self.config.codex_command,
            AssignedAgent::Gemini => &self.config.gemini_command,
        };
        let args = build_args(agent, &prompt);

        let mut cmd = Command::new(command_name);
        cmd.args(&args)
            .current_dir(&worktree_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        sanitize_env(&mut cmd);

        let mut child = cmd.spawn().map_err(|e| {
            AgentError::Subprocess(format!("failed to spawn {command_name}: {e}"))
        })?;

        // Some agent CLIs block waiting for stdin; we never write to it.
        drop(child.stdin.take());

        let pid = child.id();
        let span_id = SpanId::new();
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let process = AgentProcess {
            card_id: CardId::from(card_id.to_string()),
            project_id: ProjectId::from(project_id.to_string()),
            agent,
            status: AgentStatus::Running,
            started_at: Utc::now().to_rfc3339(),
            logs: LogRing::new(),
            branch_name: branch.clone(),
            span_id: span_id.clone(),
            pid,
            cancel_tx: Some(cancel_tx),
            terminal_at: None,
        };
        let snapshot = AgentProcessSnapshot::from(&process);
        self.agents.insert(card_id.to_string(), process);

        if let Err(e) = self.kanban.start_work(card_id, agent).await {
            self.agents.remove(card_id);
            let _ = child.kill().await;
            worktree::remove_worktree(&self.workspace_path, &worktree_path).await;
            return Err(e.into());
        }
        if let Err(e) = self.store.insert_audit(
            "card",
            card_id,
            "agent.spawned",
            serde_json::json!({ "agent": agent.to_string(), "branch": branch, "spanId": span_id.to_string() }),
            None,
        ) {
            self.agents.remove(card_id);
            let _ = child.kill().await;
            worktree::remove_worktree(&self.workspace_path, &worktree_path).await;
            return Err(e.into());
        }
        self.broadcast.publish(Event::AgentSpawned {
            card_id: card_id.to_string(),
            project_id: project_id.to_string(),
            agent: agent.to_string(),
            span_id: span_id.to_string(),
            branch_name: branch.clone(),
        });

        let orchestrator = Arc::clone(self);
        let card_id_owned = card_id.to_string();
        let project_id_owned = project_id.to_string();
        tokio::spawn(async move {
            orchestrator
                .drive_agent(
                    card_id_owned,
                    project_id_owned,
                    child,
                    cancel_rx,
                    span_id,
                    worktree_path,
                    branch,
                )
                .await;
        });

        Ok(snapshot)
    }

    /// `stopAgent(cardId)`: signal the driving task to run the graceful-stop
    /// path instead of waiting for natural exit (`running --stopAgent-->
    /// idle`).
    #[instrument(skip(self), fields(card_id))]
    pub async fn stop_agent(&self, card_id: &str) -> Result<()> {
        let cancel_tx = self
            .agents
            .get_mut(card_id)
            .and_then(|mut e| e.cancel_tx.take());
        match cancel_tx {
            Some(tx) => {
                let _ = tx.send(());
                Ok(())
            }
            None => Err(AgentError::NotFound(card_id.to_string())),
        }
    }

    /// `getRunningAgents() → list<AgentProcess>`, returned as safe snapshots.
    pub fn get_running_agents(&self) -> Vec<AgentProcessSnapshot> {
        self.agents
            .iter()
            .filter(|e| e.value().is_running())
            .map(|e| AgentProcessSnapshot::from(e.value()))
            .collect()
    }

    /// `getAgentLogs(cardId, limit?) → list<string>`.
    pub fn get_agent_logs(&self, card_id: &str, limit: Option<usize>) -> Result<Vec<String>> {
        self.agents
            .get(card_id)
            .map(|e| e.logs.tail(limit))
            .ok_or_else(|| AgentError::NotFound(card_id.to_string()))
    }

    /// `shutdownAll() → void`: SIGTERM every running agent, wait up to
    /// [`SHUTDOWN_GRACE_SECS`], SIGKILL survivors. Each agent's driving task
    /// persists a context snapshot on its own graceful-stop path, so this
    /// only needs to request cancellation and wait.
    #[instrument(skip(self))]
    pub async fn shutdown_all(&self) {
        let card_ids: Vec<String> = self
            .agents
            .iter()
            .filter(|e| e.value().is_running())
            .map(|e| e.key().clone())
            .collect();

        for card_id in &card_ids {
            if let Err(e) = self.stop_agent(card_id).await {
                warn!(card_id, error = %e, "failed to signal agent during shutdown");
            }
        }

        let deadline = tokio::time::Instant::now() + Duration::from_secs(SHUTDOWN_GRACE_SECS);
        while tokio::time::Instant::now() < deadline {
            let still_running = card_ids
                .iter()
                .any(|id| self.agents.get(id).map(|e| e.is_running()).unwrap_or(false));
            if !still_running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    /// Remove non-running entries older than [`AGENT_PROCESS_PRUNE_AGE_SECS`]
    /// past their terminal transition. Running agents are never pruned.
    fn prune(&self) {
        let cutoff = Utc::now() - chrono::Duration::seconds(AGENT_PROCESS_PRUNE_AGE_SECS);
        let stale: Vec<String> = self
            .agents
            .iter()
            .filter(|e| {
                !e.value().is_running()
                    && e.value()
                        .terminal_at
                        .as_deref()
                        .and_then(|t| chrono::DateTime::parse_from_rfc3339(t).ok())
                        .map(|t| t.with_timezone(&Utc) < cutoff)
                        .unwrap_or(false)
            })
            .map(|e| e.key().clone())
            .collect();
        for card_id in stale {
            self.agents.remove(&card_id);
        }
    }

    async fn drive_agent(
        self: Arc<Self>,
        card_id: String,
        project_id: String,
        mut child: Child,
        mut cancel_rx: oneshot::Receiver<()>,
        span_id: SpanId,
        worktree_path: PathBuf,
        branch: String,
    ) {
        let timeout_minutes = self
            .store
            .get_project(&project_id)
            .map(|p| p.agent_timeout_minutes)
            .unwrap_or(self.config.agent_timeout_minutes);
        let timeout_dur = Duration::from_secs(timeout_minutes as u64 * 60);

        let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();

        if let Some(stdout) = child.stdout.take() {
            let tx = line_tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let tx = line_tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send(format!("[stderr] {line}")).is_err() {
                        break;
                    }
                }
            });
        }
        drop(line_tx);

        let mut stderr_tail: Vec<String> = Vec::new();

        // Pinned once so the deadline is wall-clock from spawn, not reset by
        // every winning `line_rx.recv()` arm below.
        let timeout = tokio::time::sleep(timeout_dur);
        tokio::pin!(timeout);

        let outcome = loop {
            tokio::select! {
                biased;
                Some(line) = line_rx.recv() => {
                    self.handle_line(&card_id, &span_id, &line, &mut stderr_tail);
                }
                status = child.wait() => {
                    break Outcome::Exited(status);
                }
                _ = &mut timeout => {
                    break Outcome::TimedOut;
                }
                _ = &mut cancel_rx => {
                    break Outcome::Cancelled;
                }
            }
        };

        // Drain whatever buffered output arrived between the terminal event
        // and this point so the log ring isn't missing the final lines.
        while let Ok(line) = line_rx.try_recv() {
            self.handle_line(&card_id, &span_id, &line, &mut stderr_tail);
        }

        match outcome {
            Outcome::Exited(Ok(status)) if status.success() => {
                self.handle_success(&card_id, &project_id, &span_id, &worktree_path, &branch)
                    .await;
            }
            Outcome::Exited(Ok(status)) => {
                let reason = format!("exited with status {status}");
                self.handle_failure(&card_id, &project_id, &span_id, &reason, &stderr_tail, &worktree_path)
                    .await;
            }
            Outcome::Exited(Err(e)) => {
                let reason = format!("wait() failed: {e}");
                self.handle_failure(&card_id, &project_id, &span_id, &reason, &stderr_tail, &worktree_path)
                    .await;
            }
            Outcome::TimedOut => {
                self.terminate_child(&mut child).await;
                self.handle_timeout(&card_id, &project_id, &span_id, &worktree_path).await;
            }
            Outcome::Cancelled => {
                self.terminate_child(&mut child).await;
                self.handle_stopped(&card_id, &project_id, &span_id, &worktree_path).await;
            }
        }

        self.mark_terminal(&card_id);
        self.prune();
    }

    fn handle_line(&self, card_id: &str, span_id: &SpanId, line: &str, stderr_tail: &mut Vec<String>) {
        if let Some(mut entry) = self.agents.get_mut(card_id) {
            entry.logs.push(line.to_string());
        }
        self.broadcast.publish(Event::AgentLog {
            card_id: card_id.to_string(),
            span_id: span_id.to_string(),
            line: line.to_string(),
        });

        if let Some(stripped) = line.strip_prefix("[stderr] ") {
            stderr_tail.push(stripped.to_string());
            if stderr_tail.len() > STDERR_TAIL_LINES {
                stderr_tail.remove(0);
            }
            return;
        }

        if let Ok(value) = serde_json::from_str::<serde_json::Value>(line) {
            if value.get("type").and_then(|t| t.as_str()) == Some("result") {
                self.record_token_usage(card_id, &value);
            }
        }
    }

    fn record_token_usage(&self, card_id: &str, frame: &serde_json::Value) {
        let Some(entry) = self.agents.get(card_id) else { return };
        let project_id = entry.project_id.to_string();
        let agent = entry.agent.to_string();
        drop(entry);

        let input_tokens = frame
            .pointer("/modelUsage/input_tokens")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        let output_tokens = frame
            .pointer("/modelUsage/output_tokens")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        let cache_read = frame
            .pointer("/modelUsage/cache_read_input_tokens")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        let cache_write = frame
            .pointer("/modelUsage/cache_creation_input_tokens")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        let cost_usd = frame.get("total_cost_usd").and_then(|v| v.as_f64()).unwrap_or(0.0);

        if let Err(e) = self.store.insert_token_usage(
            Some(card_id),
            &project_id,
            &agent,
            input_tokens,
            output_tokens,
            cache_read,
            cache_write,
            cost_usd,
        ) {
            warn!(error = %e, "failed to persist token usage");
        }
    }

    /// Exit 0 path: complete the card, then best-effort push + PR. Status only reaches `completed` after push/PR
    /// succeeds or is intentionally skipped (no `gh` auth); a push failure
    /// after retries leaves the card `completed` with an audit note, never
    /// rolls the column back.
    async fn handle_success(
        &self,
        card_id: &str,
        project_id: &str,
        span_id: &SpanId,
        worktree_path: &std::path::Path,
        branch: &str,
    ) {
        self.broadcast.publish(Event::AgentLog {
            card_id: card_id.to_string(),
            span_id: span_id.to_string(),
            line: "completed successfully".to_string(),
        });

        if let Err(e) = self.kanban.complete_work(card_id).await {
            error!(card_id, error = %e, "failed to transition completed card");
        }
        if let Err(e) = self
            .kanban
            .save_context(card_id, "Completed; see branch for changes.", None)
            .await
        {
            warn!(card_id, error = %e, "failed to save completion context");
        }
        let _ = self.store.insert_audit(
            "card",
            card_id,
            "agent.completed",
            serde_json::json!({ "branch": branch, "spanId": span_id.to_string() }),
            None,
        );
        self.broadcast.publish(Event::AgentCompleted {
            card_id: card_id.to_string(),
            project_id: project_id.to_string(),
            span_id: span_id.to_string(),
        });

        self.push_and_open_pr(card_id, worktree_path, branch).await;
        worktree::remove_worktree(&self.workspace_path, worktree_path).await;
    }

    /// `git push -u origin <branch>` with up to [`PUSH_RETRY_COUNT`] retries
    /// and a fixed [`PUSH_RETRY_BACKOFF_SECS`] backoff; `gh pr create` on
    /// success. Skipped entirely (not an error) when `gh auth status` fails.
    async fn push_and_open_pr(&self, card_id: &str, worktree_path: &std::path::Path, branch: &str) {
        let authed = Command::new("gh")
            .args(["auth", "status"])
            .current_dir(worktree_path)
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false);

        if !authed {
            let _ = self.store.insert_audit(
                "card",
                card_id,
                "agent.push_skipped",
                serde_json::json!({ "reason": "gh not authenticated" }),
                None,
            );
            return;
        }

        let mut pushed = false;
        for attempt in 1..=PUSH_RETRY_COUNT {
            let output = Command::new("git")
                .args(["push", "-u", "origin", branch])
                .current_dir(worktree_path)
                .output()
                .await;
            match output {
                Ok(o) if o.status.success() => {
                    pushed = true;
                    break;
                }
                Ok(o) => {
                    warn!(
                        card_id,
                        attempt,
                        stderr = %String::from_utf8_lossy(&o.stderr),
                        "git push failed"
                    );
                }
                Err(e) => {
                    warn!(card_id, attempt, error = %e, "failed to spawn git push");
                }
            }
            if attempt < PUSH_RETRY_COUNT {
                tokio::time::sleep(Duration::from_secs(PUSH_RETRY_BACKOFF_SECS)).await;
            }
        }

        if !pushed {
            let _ = self.store.insert_audit(
                "card",
                card_id,
                "agent.push_failed",
                serde_json::json!({ "branch": branch, "note": "work remains on local branch only" }),
                None,
            );
            return;
        }

        let card = match self.store.get_card(card_id) {
            Ok(c) => c,
            Err(_) => return,
        };
        let body = format!("Automated change for card {card_id}.\n\n{}", card.description);
        let pr_output = Command::new("gh")
            .args(["pr", "create", "--title", &card.title, "--body", &body, "--head", branch])
            .current_dir(worktree_path)
            .output()
            .await;

        match pr_output {
            Ok(o) if o.status.success() => {
                let _ = self.store.insert_audit(
                    "card",
                    card_id,
                    "agent.pr_created",
                    serde_json::json!({ "branch": branch }),
                    None,
                );
            }
            Ok(o) => {
                warn!(card_id, stderr = %String::from_utf8_lossy(&o.stderr), "gh pr create failed");
                let _ = self.store.insert_audit(
                    "card",
                    card_id,
                    "agent.pr_failed",
                    serde_json::json!({ "branch": branch }),
                    None,
                );
            }
            Err(e) => {
                warn!(card_id, error = %e, "failed to spawn gh pr create");
            }
        }
    }

    /// Exit non-zero or a `wait()` error.
    async fn handle_failure(
        &self,
        card_id: &str,
        project_id: &str,
        span_id: &SpanId,
        reason: &str,
        stderr_tail: &[String],
        worktree_path: &std::path::Path,
    ) {
        if let Err(e) = self
            .kanban
            .update_agent_status(card_id, AgentStatus::Failed, Some(reason))
            .await
        {
            error!(card_id, error = %e, "failed to mark card failed");
        }
        let _ = self.store.insert_audit(
            "card",
            card_id,
            "agent.failed",
            serde_json::json!({ "reason": reason, "spanId": span_id.to_string() }),
            None,
        );
        self.broadcast.publish(Event::AgentFailed {
            card_id: card_id.to_string(),
            project_id: project_id.to_string(),
            span_id: span_id.to_string(),
            reason: reason.to_string(),
            stderr_tail: stderr_tail.to_vec(),
        });

        self.notify_failure(card_id, project_id, reason).await;
        worktree::remove_worktree(&self.workspace_path, worktree_path).await;
    }

    async fn handle_timeout(
        &self,
        card_id: &str,
        project_id: &str,
        span_id: &SpanId,
        worktree_path: &std::path::Path,
    ) {
        if let Err(e) = self
            .kanban
            .update_agent_status(card_id, AgentStatus::Failed, Some("Timed out"))
            .await
        {
            error!(card_id, error = %e, "failed to mark timed-out card failed");
        }
        let _ = self.store.insert_audit(
            "card",
            card_id,
            "agent.timeout",
            serde_json::json!({ "spanId": span_id.to_string() }),
            None,
        );
        self.broadcast.publish(Event::AgentTimeout {
            card_id: card_id.to_string(),
            project_id: project_id.to_string(),
            span_id: span_id.to_string(),
        });

        self.notify_failure(card_id, project_id, "Timed out").await;
        worktree::remove_worktree(&self.workspace_path, worktree_path).await;
    }

    async fn handle_stopped(
        &self,
        card_id: &str,
        project_id: &str,
        span_id: &SpanId,
        worktree_path: &std::path::Path,
    ) {
        if let Err(e) = self
            .kanban
            .save_context(card_id, "Stopped by operator; resume from here.", None)
            .await
        {
            warn!(card_id, error = %e, "failed to save context on stop");
        }
        if let Err(e) = self
            .kanban
            .update_agent_status(card_id, AgentStatus::Idle, None)
            .await
        {
            warn!(card_id, error = %e, "failed to mark stopped card idle");
        }
        let _ = self.store.insert_audit(
            "card",
            card_id,
            "agent.stopped",
            serde_json::json!({ "spanId": span_id.to_string() }),
            None,
        );
        self.broadcast.publish(Event::AgentStopped {
            card_id: card_id.to_string(),
            project_id: project_id.to_string(),
            span_id: span_id.to_string(),
        });
        worktree::remove_worktree(&self.workspace_path, worktree_path).await;
    }

    async fn notify_failure(&self, card_id: &str, project_id: &str, reason: &str) {
        let Some(notify) = &self.notify else { return };
        let text = format!("Agent failed on card {card_id} (project {project_id}): {reason}");
        notify
            .try_send("telegram", &OutboundMessage { recipient: String::new(), text })
            .await;
    }

    /// SIGTERM, then SIGKILL after [`SIGTERM_GRACE_SECS`] if the process
    /// hasn't exited.
    async fn terminate_child(&self, child: &mut Child) {
        if let Some(pid) = child.id() {
            if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!(pid, error = %e, "failed to send SIGTERM");
            }
        }

        let grace = Duration::from_secs(SIGTERM_GRACE_SECS);
        if tokio::time::timeout(grace, child.wait()).await.is_err() {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to SIGKILL child after grace period");
            }
        }
    }

    fn mark_terminal(&self, card_id: &str) {
        if let Some(mut entry) = self.agents.get_mut(card_id) {
            entry.status = AgentStatus::Idle;
            entry.terminal_at = Some(Utc::now().to_rfc3339());
            entry.cancel_tx = None;
        }
    }
}
