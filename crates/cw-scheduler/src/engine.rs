//! The heartbeat engine: a `run(shutdown: watch::Receiver<bool>)` select
//! loop with a startup reconciliation step, driving a fixed `tick`/
//! `synthesize`/checklist set of jobs.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Timelike, Utc};
use cw_agent::AgentOrchestrator;
use cw_broadcast::{BroadcastHub, Event};
use cw_core::config::OrchestratorConfig;
use cw_core::{AssignedAgent, Column, ProjectStatus, VerificationStatus};
use cw_kanban::KanbanQueue;
use cw_store::{KanbanCard, Store};
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::checklist::{self, HeartbeatChecklist};
use crate::error::Result;
use crate::synth;

/// Tick fires at most once every 10 minutes.
const TICK_INTERVAL_MINUTES: i64 = 10;

/// RAII guard resetting an overlap-guard `AtomicBool` to `false` on drop, so
/// the guard clears even if the guarded job panics or returns early.
struct OverlapGuard(Arc<AtomicBool>);

impl Drop for OverlapGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct SchedulerEngine {
    store: Arc<Store>,
    kanban: Arc<KanbanQueue>,
    orchestrator: Arc<AgentOrchestrator>,
    broadcast: Arc<BroadcastHub>,
    config: OrchestratorConfig,
    workspace_path: PathBuf,
    tick_in_progress: Arc<AtomicBool>,
    synth_in_progress: Arc<AtomicBool>,
}

impl SchedulerEngine {
    pub fn new(
        store: Arc<Store>,
        kanban: Arc<KanbanQueue>,
        orchestrator: Arc<AgentOrchestrator>,
        broadcast: Arc<BroadcastHub>,
        config: OrchestratorConfig,
        workspace_path: PathBuf,
    ) -> Self {
        Self {
            store,
            kanban,
            orchestrator,
            broadcast,
            config,
            workspace_path,
            tick_in_progress: Arc::new(AtomicBool::new(false)),
            synth_in_progress: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Poll once a minute, driving `tick` (every [`TICK_INTERVAL_MINUTES`]),
    /// `synthesize` (at :19 and :39), and the checklist-driven jobs. Runs
    /// until `shutdown` broadcasts `true`.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("scheduler engine started");
        self.reconcile_on_start().await;

        let mut interval = tokio::time::interval(Duration::from_secs(60));
        let mut last_tick_minute: Option<i64> = None;
        let mut last_synth_slot: Option<(u32, u32)> = None;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = Local::now();
                    let minute_of_day = now.hour() as i64 * 60 + now.minute() as i64;

                    let due = last_tick_minute
                        .map(|m| minute_of_day - m >= TICK_INTERVAL_MINUTES)
                        .unwrap_or(true);
                    if due {
                        last_tick_minute = Some(minute_of_day);
                        let this = Arc::clone(&self);
                        tokio::spawn(async move { this.tick().await; });
                    }

                    let slot = match now.minute() {
                        19 => Some((now.hour(), 19)),
                        39 => Some((now.hour(), 39)),
                        _ => None,
                    };
                    if let Some(slot) = slot {
                        if last_synth_slot != Some(slot) {
                            last_synth_slot = Some(slot);
                            let this = Arc::clone(&self);
                            tokio::spawn(async move { this.synthesize().await; });
                        }
                    }

                    self.run_checklist_jobs(now).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// On startup, crash-survivor cards still marked `running` are recovered
    /// to `backlog`, and any worktree not matching a live agent is removed
    /// on startup.
    #[instrument(skip(self))]
    async fn reconcile_on_start(&self) {
        match self.store.list_all_running_cards() {
            Ok(cards) => {
                for card in cards {
                    if let Err(e) = self.kanban.skip_to_back(&card.id).await {
                        warn!(card_id = %card.id, error = %e, "reconcile: failed to recover crashed card");
                        continue;
                    }
                    let _ = self.store.insert_audit(
                        "card",
                        &card.id,
                        "reconcile.card_recovered",
                        serde_json::json!({}),
                        None,
                    );
                }
            }
            Err(e) => error!(error = %e, "reconcile: failed to list running cards"),
        }

        let live_short_ids: Vec<String> = self
            .orchestrator
            .get_running_agents()
            .into_iter()
            .map(|a| cw_core::CardId::from(a.card_id).short())
            .collect();
        match cw_agent::gc_worktrees(&self.workspace_path, &live_short_ids).await {
            Ok(removed) if !removed.is_empty() => {
                info!(count = removed.len(), "reconcile: pruned stale worktrees")
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "reconcile: worktree gc failed"),
        }
    }

    /// `tick()`, guarded against overlapping
    /// with itself.
    #[instrument(skip(self))]
    async fn tick(&self) {
        if self.tick_in_progress.swap(true, Ordering::SeqCst) {
            self.broadcast.publish(Event::HeartbeatSkipped {
                job: "tick".into(),
                reason: "tick_in_progress".into(),
            });
            return;
        }
        let _guard = OverlapGuard(Arc::clone(&self.tick_in_progress));

        let projects = match self.store.list_projects() {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "tick: failed to list projects");
                return;
            }
        };
        let active: Vec<_> = projects
            .into_iter()
            .filter(|p| p.status == ProjectStatus::Active)
            .collect();

        let mut checked = 0usize;
        for project in &active {
            checked += 1;

            let already_running = self
                .orchestrator
                .get_running_agents()
                .into_iter()
                .any(|a| a.project_id == project.id);
            if already_running {
                continue;
            }

            let global_running = self.store.count_running_globally().unwrap_or(0) as u32;
            if global_running >= self.config.max_concurrent_agents {
                break;
            }

            match self.kanban.get_next(&project.id).await {
                Ok(Some(card)) => {
                    if let Err(e) = self
                        .orchestrator
                        .spawn_agent(&card.id, &project.id, AssignedAgent::Claude)
                        .await
                    {
                        warn!(
                            project_id = %project.id,
                            card_id = %card.id,
                            error = %e,
                            "tick: spawn_agent failed, will retry next tick"
                        );
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(project_id = %project.id, error = %e, "tick: get_next failed"),
            }

            let cutoff = (Utc::now()
                - chrono::Duration::minutes(self.config.blocked_retry_minutes as i64))
            .to_rfc3339();
            match self.store.list_blocked_cards_older_than(&project.id, &cutoff) {
                Ok(blocked) => {
                    for card in blocked {
                        if let Err(e) = self.kanban.skip_to_back(&card.id).await {
                            warn!(card_id = %card.id, error = %e, "tick: skip_to_back failed");
                        }
                    }
                }
                Err(e) => warn!(project_id = %project.id, error = %e, "tick: list_blocked_cards_older_than failed"),
            }
        }

        self.broadcast
            .publish(Event::HeartbeatTick { projects_checked: checked });
    }

    /// `synthesize()`, guarded against
    /// overlapping with itself; may run concurrently with `tick`.
    #[instrument(skip(self))]
    async fn synthesize(&self) {
        if self.synth_in_progress.swap(true, Ordering::SeqCst) {
            self.broadcast.publish(Event::HeartbeatSkipped {
                job: "synthesize".into(),
                reason: "synth_in_progress".into(),
            });
            return;
        }
        let _guard = OverlapGuard(Arc::clone(&self.synth_in_progress));

        let candidates = match self
            .kanban
            .list_cards_with_verification(VerificationStatus::BranchPassed)
        {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "synthesize: failed to list candidates");
                return;
            }
        };
        if candidates.is_empty() {
            return;
        }

        let integration_branch = format!("merge-{}", Utc::now().format("%Y%m%d"));
        if let Err(e) = prepare_integration_branch(&self.workspace_path, &integration_branch).await
        {
            error!(error = %e, "synthesize: failed to prepare integration branch");
            return;
        }

        let mut seen = std::collections::HashSet::new();
        let mut outcomes = Vec::new();
        for card in candidates {
            // invariant: never operate on the same card twice within one run.
            if !seen.insert(card.id.clone()) {
                continue;
            }
            let outcome = synth::merge_card(&self.workspace_path, &integration_branch, &card).await;
            let status = synth::outcome_verification_status(&outcome);
            if let Err(e) = self.kanban.update_verification_status(&card.id, status).await {
                warn!(card_id = %card.id, error = %e, "synthesize: failed to persist verification status");
            }
            outcomes.push(outcome);
        }

        let report = synth::format_report(&integration_branch, &outcomes);
        let report_path = self
            .workspace_path
            .join(format!("{integration_branch}-report.md"));
        if let Err(e) = tokio::fs::write(&report_path, report).await {
            warn!(error = %e, "synthesize: failed to write merge report");
        }
    }

    /// `submitTaskBrief({projectId, text, immediate})`.
    pub async fn submit_task_brief(
        self: &Arc<Self>,
        project_id: &str,
        text: &str,
        immediate: bool,
    ) -> Result<KanbanCard> {
        let title = derive_title(text);
        let card = self
            .kanban
            .create_card(project_id, &title, text, vec![], 0)
            .await?;
        if immediate {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.tick().await; });
        }
        Ok(card)
    }

    async fn run_checklist_jobs(&self, now: DateTime<Local>) {
        let checklist = HeartbeatChecklist::load(&self.config.heartbeat_checklist_path).await;

        if now.hour() == 22 && now.minute() == 0 && checklist.is_enabled(checklist::DAILY_DIGEST) {
            self.run_digest().await;
        }
        if now.hour() == 9 && now.minute() == 0 && checklist.is_enabled(checklist::MORNING_BRIEFING) {
            self.run_briefing().await;
        }
        if now.hour() == 20 && now.minute() == 0 && checklist.is_enabled(checklist::EVENING_REFLECTION) {
            self.run_reflection().await;
        }
        if now.minute() == 0 && now.hour() % 2 == 0 && checklist.is_enabled(checklist::DEADLINE_SCAN) {
            self.run_deadline_scan().await;
        }
    }

    async fn run_digest(&self) {
        let projects = self.store.list_projects().unwrap_or_default();
        let today = Utc::now().date_naive();
        let mut completed_today = 0usize;
        for project in &projects {
            if let Ok(done) = self.store.list_cards_by_column(&project.id, Column::Done, 500, 0) {
                completed_today += done
                    .iter()
                    .filter(|c| {
                        c.completed_at
                            .as_deref()
                            .and_then(|t| chrono::DateTime::parse_from_rfc3339(t).ok())
                            .map(|t| t.date_naive() == today)
                            .unwrap_or(false)
                    })
                    .count();
            }
        }
        info!(completed_today, "heartbeat: daily digest");
        self.broadcast.publish(Event::Extension {
            kind: "heartbeat.daily_digest".into(),
            payload: serde_json::json!({ "completedToday": completed_today }),
        });
    }

    async fn run_briefing(&self) {
        let projects = self.store.list_projects().unwrap_or_default();
        let active = projects
            .iter()
            .filter(|p| p.status == ProjectStatus::Active)
            .count();
        info!(active_projects = active, "heartbeat: morning briefing");
        self.broadcast.publish(Event::Extension {
            kind: "heartbeat.morning_briefing".into(),
            payload: serde_json::json!({ "activeProjects": active }),
        });
    }

    async fn run_reflection(&self) {
        info!("heartbeat: evening reflection");
        self.broadcast.publish(Event::Extension {
            kind: "heartbeat.evening_reflection".into(),
            payload: serde_json::json!({}),
        });
    }

    async fn run_deadline_scan(&self) {
        let projects = self.store.list_projects().unwrap_or_default();
        let cutoff = (Utc::now()
            - chrono::Duration::minutes(self.config.blocked_retry_minutes as i64 * 4))
        .to_rfc3339();
        let mut stale = 0usize;
        for project in &projects {
            if let Ok(blocked) = self.store.list_blocked_cards_older_than(&project.id, &cutoff) {
                stale += blocked.len();
            }
        }
        info!(stale_blocked_cards = stale, "heartbeat: deadline scan");
        self.broadcast.publish(Event::Extension {
            kind: "heartbeat.deadline_scan".into(),
            payload: serde_json::json!({ "staleBlockedCards": stale }),
        });
    }
}

async fn prepare_integration_branch(repo_path: &std::path::Path, branch: &str) -> std::io::Result<()> {
    let exists = tokio::process::Command::new("git")
        .args(["rev-parse", "--verify", branch])
        .current_dir(repo_path)
        .output()
        .await?
        .status
        .success();

    let mut cmd = tokio::process::Command::new("git");
    if exists {
        cmd.args(["checkout", branch]);
    } else {
        cmd.args(["checkout", "-b", branch]);
    }
    cmd.current_dir(repo_path).output().await?;
    Ok(())
}

/// First line (or first 60 chars if the first line is longer) of a brief's
/// free text becomes the derived card title.
fn derive_title(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    if first_line.is_empty() {
        return "Untitled task".to_string();
    }
    if first_line.chars().count() <= 60 {
        first_line.to_string()
    } else {
        first_line.chars().take(60).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_title_uses_first_line() {
        assert_eq!(derive_title("Fix the login bug\nDetails here"), "Fix the login bug");
    }

    #[test]
    fn derive_title_truncates_long_first_line() {
        let text = "x".repeat(100);
        assert_eq!(derive_title(&text).chars().count(), 60);
    }

    #[test]
    fn derive_title_falls_back_on_empty_text() {
        assert_eq!(derive_title(""), "Untitled task");
    }
}
