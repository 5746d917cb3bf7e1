use std::sync::Arc;

use chrono::Utc;
use cw_broadcast::{BroadcastHub, Event};
use cw_core::{AgentStatus, AssignedAgent, Column, VerificationStatus};
use cw_store::{KanbanCard, Store};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{KanbanError, Result};

/// A modest position penalty applied by `skip_to_back`, giving a blocked or
/// deprioritized card a retry cooldown without sending it all the way to
/// the end of the backlog.
const SKIP_PRIORITY_PENALTY: i64 = 10;

/// Pull-based work queue layered over [`cw_store::Store`].
///
/// Invariant enforcement uses a *single-writer discipline*: each mutating
/// call holds a per-project critical section for its duration, so a
/// check-then-register sequence (is anything else running in this
/// project?) can never race against a concurrent call for the same
/// project.
pub struct KanbanQueue {
    store: Arc<Store>,
    broadcast: Arc<BroadcastHub>,
    project_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KanbanQueue {
    pub fn new(store: Arc<Store>, broadcast: Arc<BroadcastHub>) -> Self {
        Self {
            store,
            broadcast,
            project_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, project_id: &str) -> Arc<Mutex<()>> {
        self.project_locks
            .entry(project_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    #[instrument(skip(self), fields(project_id, title))]
    pub async fn create_card(
        &self,
        project_id: &str,
        title: &str,
        description: &str,
        labels: Vec<String>,
        priority: i64,
    ) -> Result<KanbanCard> {
        let lock = self.lock_for(project_id);
        let _guard = lock.lock().await;

        let backlog = self
            .store
            .list_cards_by_column(project_id, Column::Backlog, i64::MAX, 0)?;
        let now = Utc::now().to_rfc3339();
        let card = KanbanCard {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            column: Column::Backlog,
            position: backlog.len() as i64,
            labels,
            priority,
            context_snapshot: None,
            last_session_id: None,
            assigned_agent: None,
            agent_status: AgentStatus::Idle,
            blocked_reason: None,
            verification_status: VerificationStatus::Unverified,
            started_at: None,
            completed_at: None,
            created_at: now.clone(),
            updated_at: now,
        };
        self.store.insert_card(&card)?;
        self.store.insert_audit(
            "card",
            &card.id,
            "card.created",
            serde_json::json!({ "title": title }),
            None,
        )?;
        Ok(card)
    }

    /// `getNext(projectId)`: highest-priority backlog card, ties broken by
    /// `createdAt asc`. Returns `None` on an empty backlog. Idempotent up to
    /// the card it returns until `start_work` is called.
    #[instrument(skip(self), fields(project_id))]
    pub async fn get_next(&self, project_id: &str) -> Result<Option<KanbanCard>> {
        Ok(self.store.get_next_eligible_card(project_id)?)
    }

    /// `startWork(cardId, agent)`: atomic `backlog -> in_progress`
    /// transition. Fails if the card is not in backlog or another card in
    /// the same project is already running — at most one card per project
    /// runs at a time.
    #[instrument(skip(self), fields(card_id, agent = %agent))]
    pub async fn start_work(&self, card_id: &str, agent: AssignedAgent) -> Result<KanbanCard> {
        let mut card = self.store.get_card(card_id)?;
        let lock = self.lock_for(&card.project_id);
        let _guard = lock.lock().await;

        // re-read under the lock: another caller may have mutated it first.
        card = self.store.get_card(card_id)?;
        if card.column != Column::Backlog {
            return Err(KanbanError::IllegalTransition {
                card_id: card_id.to_string(),
                reason: format!("card is in {} not backlog", card.column),
            });
        }
        if let Some(running) = self.store.get_running_card(&card.project_id)? {
            if running.id != card.id {
                return Err(KanbanError::IllegalTransition {
                    card_id: card_id.to_string(),
                    reason: format!("project already running card {}", running.id),
                });
            }
        }

        let now = Utc::now().to_rfc3339();
        card.column = Column::InProgress;
        card.assigned_agent = Some(agent);
        card.agent_status = AgentStatus::Running;
        card.started_at = Some(now.clone());
        card.updated_at = now;
        self.store.update_card(&card)?;
        self.store
            .move_card(&card.id, Column::InProgress, 0)?;
        card = self.store.get_card(card_id)?;

        self.store.insert_audit(
            "card",
            &card.id,
            "card.started",
            serde_json::json!({ "agent": agent.to_string() }),
            None,
        )?;
        self.broadcast.publish(Event::CardStatus {
            card_id: card.id.clone(),
            project_id: card.project_id.clone(),
            column: card.column.to_string(),
            agent_status: card.agent_status.to_string(),
        });
        Ok(card)
    }

    /// `completeWork(cardId)`: atomic transition to `done`.
    #[instrument(skip(self), fields(card_id))]
    pub async fn complete_work(&self, card_id: &str) -> Result<KanbanCard> {
        let mut card = self.store.get_card(card_id)?;
        let lock = self.lock_for(&card.project_id);
        let _guard = lock.lock().await;

        card = self.store.get_card(card_id)?;
        let now = Utc::now().to_rfc3339();
        card.column = Column::Done;
        card.agent_status = AgentStatus::Completed;
        card.completed_at = Some(now.clone());
        card.updated_at = now;
        self.store.update_card(&card)?;
        self.store.move_card(&card.id, Column::Done, 0)?;
        card = self.store.get_card(card_id)?;

        self.store
            .insert_audit("card", &card.id, "card.completed", serde_json::json!({}), None)?;
        self.broadcast.publish(Event::CardStatus {
            card_id: card.id.clone(),
            project_id: card.project_id.clone(),
            column: card.column.to_string(),
            agent_status: card.agent_status.to_string(),
        });
        Ok(card)
    }

    /// `skipToBack(cardId)`: moves a card to the end of backlog with a
    /// modest priority penalty, used for blocked-retry churn.
    #[instrument(skip(self), fields(card_id))]
    pub async fn skip_to_back(&self, card_id: &str) -> Result<KanbanCard> {
        let mut card = self.store.get_card(card_id)?;
        let lock = self.lock_for(&card.project_id);
        let _guard = lock.lock().await;

        card = self.store.get_card(card_id)?;
        let backlog = self
            .store
            .list_cards_by_column(&card.project_id, Column::Backlog, i64::MAX, 0)?;
        let now = Utc::now().to_rfc3339();

        card.column = Column::Backlog;
        card.agent_status = AgentStatus::Idle;
        card.assigned_agent = None;
        card.priority += SKIP_PRIORITY_PENALTY;
        card.updated_at = now;
        self.store.update_card(&card)?;
        self.store
            .move_card(&card.id, Column::Backlog, backlog.len() as i64)?;
        card = self.store.get_card(card_id)?;

        self.store
            .insert_audit("card", &card.id, "card.skipped_to_back", serde_json::json!({}), None)?;
        Ok(card)
    }

    /// `saveContext(cardId, snapshot, sessionId?)`.
    #[instrument(skip(self, snapshot), fields(card_id))]
    pub async fn save_context(
        &self,
        card_id: &str,
        snapshot: &str,
        session_id: Option<&str>,
    ) -> Result<KanbanCard> {
        let mut card = self.store.get_card(card_id)?;
        let lock = self.lock_for(&card.project_id);
        let _guard = lock.lock().await;

        card = self.store.get_card(card_id)?;
        card.context_snapshot = Some(snapshot.to_string());
        if let Some(sid) = session_id {
            card.last_session_id = Some(sid.to_string());
        }
        card.updated_at = Utc::now().to_rfc3339();
        self.store.update_card(&card)?;
        self.broadcast.publish(Event::CardContext {
            card_id: card.id.clone(),
            project_id: card.project_id.clone(),
        });
        Ok(card)
    }

    /// `updateAgentStatus(cardId, status, reason?)`: narrow status
    /// transitions; `blocked` sets `blockedReason`. Moving a card out of
    /// `in_progress` clears `assignedAgent`.
    #[instrument(skip(self), fields(card_id, status = %status))]
    pub async fn update_agent_status(
        &self,
        card_id: &str,
        status: AgentStatus,
        reason: Option<&str>,
    ) -> Result<KanbanCard> {
        let mut card = self.store.get_card(card_id)?;
        let lock = self.lock_for(&card.project_id);
        let _guard = lock.lock().await;

        card = self.store.get_card(card_id)?;
        card.agent_status = status;
        card.blocked_reason = if matches!(status, AgentStatus::Blocked | AgentStatus::Failed) {
            reason.map(str::to_string).or(card.blocked_reason)
        } else {
            None
        };
        if matches!(status, AgentStatus::Failed | AgentStatus::Completed) {
            card.assigned_agent = None;
        }
        card.updated_at = Utc::now().to_rfc3339();
        self.store.update_card(&card)?;

        self.broadcast.publish(Event::CardStatus {
            card_id: card.id.clone(),
            project_id: card.project_id.clone(),
            column: card.column.to_string(),
            agent_status: card.agent_status.to_string(),
        });
        Ok(card)
    }

    /// `assignAgent(cardId, agent)`: pre-registration of an agent before
    /// spawn (optional fast-path).
    #[instrument(skip(self), fields(card_id, agent = %agent))]
    pub async fn assign_agent(&self, card_id: &str, agent: AssignedAgent) -> Result<KanbanCard> {
        let mut card = self.store.get_card(card_id)?;
        let lock = self.lock_for(&card.project_id);
        let _guard = lock.lock().await;

        card = self.store.get_card(card_id)?;
        card.assigned_agent = Some(agent);
        card.updated_at = Utc::now().to_rfc3339();
        self.store.update_card(&card)?;

        self.broadcast.publish(Event::CardAssigned {
            card_id: card.id.clone(),
            project_id: card.project_id.clone(),
            agent: agent.to_string(),
        });
        Ok(card)
    }

    pub fn list_by_column(
        &self,
        project_id: &str,
        column: Column,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<KanbanCard>> {
        Ok(self
            .store
            .list_cards_by_column(project_id, column, limit, offset)?)
    }

    /// Sets a card's post-merge verification state, set by the `synthesize`
    /// job. Not itself a column/agent-status transition, so it does not
    /// need the full per-project critical section — synthesize already
    /// guards itself against concurrent runs.
    #[instrument(skip(self), fields(card_id, status = %status))]
    pub async fn update_verification_status(
        &self,
        card_id: &str,
        status: VerificationStatus,
    ) -> Result<KanbanCard> {
        let mut card = self.store.get_card(card_id)?;
        let lock = self.lock_for(&card.project_id);
        let _guard = lock.lock().await;

        card = self.store.get_card(card_id)?;
        card.verification_status = status;
        card.updated_at = Utc::now().to_rfc3339();
        self.store.update_card(&card)?;
        Ok(card)
    }

    pub fn list_cards_with_verification(
        &self,
        status: VerificationStatus,
    ) -> Result<Vec<KanbanCard>> {
        Ok(self.store.list_cards_with_verification(status)?)
    }

    pub fn get_card(&self, card_id: &str) -> Result<KanbanCard> {
        Ok(self.store.get_card(card_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> (KanbanQueue, String) {
        let store = Arc::new(Store::open_in_memory(&"d".repeat(64)).unwrap());
        let project = store.create_project("demo", "", None, 30).unwrap();
        let broadcast = Arc::new(BroadcastHub::new());
        (KanbanQueue::new(store, broadcast), project.id)
    }

    #[tokio::test]
    async fn create_then_get_next_returns_same_card_until_started() {
        let (q, project_id) = queue();
        let card = q
            .create_card(&project_id, "Add /health", "wire it up", vec![], 5)
            .await
            .unwrap();

        let first = q.get_next(&project_id).await.unwrap().unwrap();
        let second = q.get_next(&project_id).await.unwrap().unwrap();
        assert_eq!(first.id, card.id);
        assert_eq!(second.id, card.id);
    }

    #[tokio::test]
    async fn start_work_then_complete_work_transitions_card() {
        let (q, project_id) = queue();
        let card = q
            .create_card(&project_id, "Add /health", "", vec![], 5)
            .await
            .unwrap();

        let running = q.start_work(&card.id, AssignedAgent::Claude).await.unwrap();
        assert_eq!(running.column, Column::InProgress);
        assert_eq!(running.agent_status, AgentStatus::Running);
        assert!(running.started_at.is_some());

        let done = q.complete_work(&card.id).await.unwrap();
        assert_eq!(done.column, Column::Done);
        assert_eq!(done.agent_status, AgentStatus::Completed);
        assert!(done.completed_at.is_some());
    }

    #[tokio::test]
    async fn start_work_rejects_second_running_card_in_same_project() {
        let (q, project_id) = queue();
        let a = q.create_card(&project_id, "a", "", vec![], 1).await.unwrap();
        let b = q.create_card(&project_id, "b", "", vec![], 2).await.unwrap();

        q.start_work(&a.id, AssignedAgent::Claude).await.unwrap();
        let err = q.start_work(&b.id, AssignedAgent::Claude).await.unwrap_err();
        assert!(matches!(err, KanbanError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn skip_to_back_reopens_card_in_backlog() {
        let (q, project_id) = queue();
        let card = q.create_card(&project_id, "a", "", vec![], 1).await.unwrap();
        q.start_work(&card.id, AssignedAgent::Claude).await.unwrap();
        q.update_agent_status(&card.id, AgentStatus::Blocked, Some("stuck"))
            .await
            .unwrap();

        let skipped = q.skip_to_back(&card.id).await.unwrap();
        assert_eq!(skipped.column, Column::Backlog);
        assert_eq!(skipped.agent_status, AgentStatus::Idle);
        assert!(skipped.assigned_agent.is_none());
    }
}
