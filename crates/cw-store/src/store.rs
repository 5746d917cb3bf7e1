use std::str::FromStr;
use std::sync::Mutex;

use chrono::Utc;
use cw_core::{AgentStatus, AssignedAgent, Column, ProjectStatus, VerificationStatus};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::crypto;
use crate::db;
use crate::error::{Result, StoreError};
use crate::types::{
    AuditEntry, Conversation, ConversationStatus, Decision, DocumentType, KanbanCard, Message,
    MessageRole, Project, ProjectDocument, SteeringCorrection, TokenUsage,
};

/// A full-text search hit across cards, documents, and decisions.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub source_table: String,
    pub source_id: String,
    pub title: String,
    pub snippet: String,
}

/// Embedded SQLite store, wrapping its connection in a `Mutex` so writers
/// are serialized within the process.
pub struct Store {
    conn: Mutex<Connection>,
    message_key: [u8; 32],
}

impl Store {
    pub fn open(path: &str, message_encryption_key: &str) -> Result<Self> {
        let conn = db::open(path)?;
        let message_key = crypto::parse_key(message_encryption_key)?;
        Ok(Self {
            conn: Mutex::new(conn),
            message_key,
        })
    }

    /// In-memory store, used by tests: `:memory:` still runs every
    /// migration via `db::open`.
    pub fn open_in_memory(message_encryption_key: &str) -> Result<Self> {
        Self::open(":memory:", message_encryption_key)
    }

    fn now() -> String {
        Utc::now().to_rfc3339()
    }

    // ---------------------------------------------------------------
    // Projects
    // ---------------------------------------------------------------

    pub fn create_project(
        &self,
        name: &str,
        description: &str,
        color: Option<&str>,
        agent_timeout_minutes: u32,
    ) -> Result<Project> {
        let now = Self::now();
        let project = Project {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            status: ProjectStatus::Active,
            color: color.map(str::to_string),
            agent_timeout_minutes,
            created_at: now.clone(),
            updated_at: now,
        };
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO projects (id, name, description, status, color, agent_timeout_minutes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                project.id,
                project.name,
                project.description,
                project.status.to_string(),
                project.color,
                project.agent_timeout_minutes,
                project.created_at,
                project.updated_at,
            ],
        )?;
        Ok(project)
    }

    pub fn get_project(&self, id: &str) -> Result<Project> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, description, status, color, agent_timeout_minutes, created_at, updated_at
             FROM projects WHERE id = ?1",
            params![id],
            row_to_project,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound {
            kind: "project",
            id: id.to_string(),
        })
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, description, status, color, agent_timeout_minutes, created_at, updated_at
             FROM projects ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map([], row_to_project)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::from)
    }

    pub fn delete_project(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                kind: "project",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Cards
    // ---------------------------------------------------------------

    pub fn insert_card(&self, card: &KanbanCard) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        insert_card_with(&conn, card)?;
        sync_fts_card(&conn, card)?;
        Ok(())
    }

    pub fn get_card(&self, id: &str) -> Result<KanbanCard> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(CARD_SELECT_COLUMNS_WHERE_ID, params![id], row_to_card)
            .optional()?
            .ok_or_else(|| StoreError::NotFound {
                kind: "card",
                id: id.to_string(),
            })
    }

    pub fn update_card(&self, card: &KanbanCard) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        update_card_with(&conn, card)?;
        sync_fts_card(&conn, card)?;
        Ok(())
    }

    pub fn delete_card(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM cards WHERE id = ?1", params![id])?;
        conn.execute(
            "DELETE FROM search_index WHERE source_table = 'cards' AND source_id = ?1",
            params![id],
        )?;
        Ok(())
    }

    /// `listCardsByColumn(projectId, column, limit, offset)` ordered by
    /// `position asc`.
    pub fn list_cards_by_column(
        &self,
        project_id: &str,
        column: Column,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<KanbanCard>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, project_id, title, description, column_name, position, labels, priority,
                    context_snapshot, last_session_id, assigned_agent, agent_status, blocked_reason,
                    verification_status, started_at, completed_at, created_at, updated_at
             FROM cards WHERE project_id = ?1 AND column_name = ?2
             ORDER BY position ASC LIMIT ?3 OFFSET ?4",
        )?;
        let rows = stmt.query_map(
            params![project_id, column.to_string(), limit, offset],
            row_to_card,
        )?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::from)
    }

    /// `getNextEligibleCard(projectId)`: lowest-priority backlog card not
    /// tagged `interactive-only`, ties broken by `createdAt asc`.
    pub fn get_next_eligible_card(&self, project_id: &str) -> Result<Option<KanbanCard>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, project_id, title, description, column_name, position, labels, priority,
                    context_snapshot, last_session_id, assigned_agent, agent_status, blocked_reason,
                    verification_status, started_at, completed_at, created_at, updated_at
             FROM cards
             WHERE project_id = ?1 AND column_name = 'backlog'
               AND labels NOT LIKE '%\"interactive-only\"%'
             ORDER BY priority ASC, created_at ASC
             LIMIT 1",
        )?;
        stmt.query_row(params![project_id], row_to_card)
            .optional()
            .map_err(StoreError::from)
    }

    /// Any card currently `agentStatus=running` for this project, used to
    /// enforce "at most one running agent per project".
    pub fn get_running_card(&self, project_id: &str) -> Result<Option<KanbanCard>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, project_id, title, description, column_name, position, labels, priority,
                    context_snapshot, last_session_id, assigned_agent, agent_status, blocked_reason,
                    verification_status, started_at, completed_at, created_at, updated_at
             FROM cards WHERE project_id = ?1 AND agent_status = 'running' LIMIT 1",
            params![project_id],
            row_to_card,
        )
        .optional()
        .map_err(StoreError::from)
    }

    pub fn count_running_globally(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM cards WHERE agent_status = 'running'",
            [],
            |r| r.get(0),
        )
        .map_err(StoreError::from)
    }

    pub fn list_blocked_cards_older_than(
        &self,
        project_id: &str,
        before_rfc3339: &str,
    ) -> Result<Vec<KanbanCard>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, project_id, title, description, column_name, position, labels, priority,
                    context_snapshot, last_session_id, assigned_agent, agent_status, blocked_reason,
                    verification_status, started_at, completed_at, created_at, updated_at
             FROM cards WHERE project_id = ?1 AND agent_status = 'blocked' AND updated_at < ?2",
        )?;
        let rows = stmt.query_map(params![project_id, before_rfc3339], row_to_card)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::from)
    }

    pub fn list_cards_with_verification(
        &self,
        verification_status: VerificationStatus,
    ) -> Result<Vec<KanbanCard>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, project_id, title, description, column_name, position, labels, priority,
                    context_snapshot, last_session_id, assigned_agent, agent_status, blocked_reason,
                    verification_status, started_at, completed_at, created_at, updated_at
             FROM cards WHERE verification_status = ?1",
        )?;
        let rows = stmt.query_map(params![verification_status.to_string()], row_to_card)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::from)
    }

    pub fn list_cards_by_status(
        &self,
        project_id: &str,
        agent_status: AgentStatus,
    ) -> Result<Vec<KanbanCard>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, project_id, title, description, column_name, position, labels, priority,
                    context_snapshot, last_session_id, assigned_agent, agent_status, blocked_reason,
                    verification_status, started_at, completed_at, created_at, updated_at
             FROM cards WHERE project_id = ?1 AND agent_status = ?2",
        )?;
        let rows = stmt.query_map(params![project_id, agent_status.to_string()], row_to_card)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::from)
    }

    /// All cards whose persisted `agentStatus` is `running`, across every
    /// project — used for startup crash recovery.
    pub fn list_all_running_cards(&self) -> Result<Vec<KanbanCard>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, project_id, title, description, column_name, position, labels, priority,
                    context_snapshot, last_session_id, assigned_agent, agent_status, blocked_reason,
                    verification_status, started_at, completed_at, created_at, updated_at
             FROM cards WHERE agent_status = 'running'",
        )?;
        let rows = stmt.query_map([], row_to_card)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::from)
    }

    /// `moveCard(cardId, column, position)`: shifts siblings in both the
    /// source and destination column to keep positions a contiguous
    /// `0..n-1` sequence, ties broken by `updatedAt asc`.
    pub fn move_card(&self, card_id: &str, column: Column, position: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;

        let (project_id, old_column): (String, String) = tx.query_row(
            "SELECT project_id, column_name FROM cards WHERE id = ?1",
            params![card_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;

        let now = Self::now();
        tx.execute(
            "UPDATE cards SET column_name = ?1, position = ?2, updated_at = ?3 WHERE id = ?4",
            params![column.to_string(), position, now, card_id],
        )?;

        compact_column(&tx, &project_id, &old_column)?;
        compact_column(&tx, &project_id, &column.to_string())?;

        tx.commit()?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Conversations & Messages
    // ---------------------------------------------------------------

    pub fn create_conversation(&self, project_id: Option<&str>) -> Result<Conversation> {
        let now = Self::now();
        let conversation = Conversation {
            id: Uuid::now_v7().to_string(),
            project_id: project_id.map(str::to_string),
            status: ConversationStatus::Active,
            summary: None,
            session_id: None,
            message_count: 0,
            first_message_at: now.clone(),
            last_message_at: now,
        };
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO conversations (id, project_id, status, summary, session_id, message_count, first_message_at, last_message_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                conversation.id,
                conversation.project_id,
                conversation.status.to_string(),
                conversation.summary,
                conversation.session_id,
                conversation.message_count,
                conversation.first_message_at,
                conversation.last_message_at,
            ],
        )?;
        Ok(conversation)
    }

    /// Spec.md §3: "at most one active conversation per projectId at any
    /// instant" — callers must check this before creating a new one.
    pub fn get_active_conversation(&self, project_id: &str) -> Result<Option<Conversation>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, project_id, status, summary, session_id, message_count, first_message_at, last_message_at
             FROM conversations WHERE project_id = ?1 AND status = 'active' LIMIT 1",
            params![project_id],
            row_to_conversation,
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// Encrypts `plaintext` before persisting — content is stored
    /// encrypted at rest.
    pub fn insert_message(
        &self,
        conversation_id: &str,
        project_id: Option<&str>,
        role: MessageRole,
        plaintext: &str,
        metadata: serde_json::Value,
    ) -> Result<Message> {
        let ciphertext = crypto::encrypt_message(&self.message_key, plaintext.as_bytes())?;
        let now = Self::now();
        let message = Message {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.map(str::to_string),
            conversation_id: conversation_id.to_string(),
            role,
            content_ciphertext: ciphertext,
            metadata,
            timestamp: now.clone(),
        };
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO messages (id, project_id, conversation_id, role, content_ciphertext, metadata, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                message.id,
                message.project_id,
                message.conversation_id,
                message.role.to_string(),
                message.content_ciphertext,
                message.metadata.to_string(),
                message.timestamp,
            ],
        )?;
        conn.execute(
            "UPDATE conversations SET message_count = message_count + 1, last_message_at = ?1 WHERE id = ?2",
            params![now, conversation_id],
        )?;
        Ok(message)
    }

    /// Returns `(message, plaintext)` pairs, decrypting on read.
    pub fn get_history(&self, conversation_id: &str, limit: i64) -> Result<Vec<(Message, String)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, project_id, conversation_id, role, content_ciphertext, metadata, timestamp
             FROM messages WHERE conversation_id = ?1 ORDER BY timestamp ASC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![conversation_id, limit], row_to_message)?;
        let messages = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        messages
            .into_iter()
            .map(|m| {
                let plaintext = crypto::decrypt_message(&self.message_key, &m.content_ciphertext)?;
                let text = String::from_utf8(plaintext)
                    .map_err(|e| StoreError::Crypto(e.to_string()))?;
                Ok((m, text))
            })
            .collect()
    }

    // ---------------------------------------------------------------
    // Documents
    // ---------------------------------------------------------------

    pub fn upsert_document(
        &self,
        project_id: &str,
        doc_type: DocumentType,
        title: &str,
        content: &str,
    ) -> Result<ProjectDocument> {
        let conn = self.conn.lock().unwrap();
        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM project_documents WHERE project_id = ?1 AND doc_type = ?2",
                params![project_id, doc_type.to_string()],
                |r| r.get(0),
            )
            .optional()?;

        let now = Self::now();
        let doc = ProjectDocument {
            id: existing.clone().unwrap_or_else(|| Uuid::new_v4().to_string()),
            project_id: project_id.to_string(),
            doc_type,
            title: title.to_string(),
            content: content.to_string(),
            created_at: now.clone(),
            updated_at: now,
        };

        if existing.is_some() {
            conn.execute(
                "UPDATE project_documents SET title = ?1, content = ?2, updated_at = ?3 WHERE id = ?4",
                params![doc.title, doc.content, doc.updated_at, doc.id],
            )?;
        } else {
            conn.execute(
                "INSERT INTO project_documents (id, project_id, doc_type, title, content, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    doc.id,
                    doc.project_id,
                    doc.doc_type.to_string(),
                    doc.title,
                    doc.content,
                    doc.created_at,
                    doc.updated_at,
                ],
            )?;
        }
        sync_fts_document(&conn, &doc)?;
        Ok(doc)
    }

    pub fn list_documents(&self, project_id: &str) -> Result<Vec<ProjectDocument>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, project_id, doc_type, title, content, created_at, updated_at
             FROM project_documents WHERE project_id = ?1",
        )?;
        let rows = stmt.query_map(params![project_id], row_to_document)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::from)
    }

    pub fn get_document(&self, project_id: &str, doc_type: DocumentType) -> Result<Option<ProjectDocument>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, project_id, doc_type, title, content, created_at, updated_at
             FROM project_documents WHERE project_id = ?1 AND doc_type = ?2",
            params![project_id, doc_type.to_string()],
            row_to_document,
        )
        .optional()
        .map_err(StoreError::from)
    }

    // ---------------------------------------------------------------
    // Decisions
    // ---------------------------------------------------------------

    pub fn insert_decision(
        &self,
        project_id: &str,
        title: &str,
        reasoning: &str,
        alternatives: &[String],
        tradeoffs: &str,
    ) -> Result<Decision> {
        let decision = Decision {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            title: title.to_string(),
            reasoning: reasoning.to_string(),
            alternatives: alternatives.to_vec(),
            tradeoffs: tradeoffs.to_string(),
            created_at: Self::now(),
            revised_at: None,
        };
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO decisions (id, project_id, title, reasoning, alternatives, tradeoffs, created_at, revised_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                decision.id,
                decision.project_id,
                decision.title,
                decision.reasoning,
                serde_json::to_string(&decision.alternatives)?,
                decision.tradeoffs,
                decision.created_at,
                decision.revised_at,
            ],
        )?;
        sync_fts_decision(&conn, &decision)?;
        Ok(decision)
    }

    /// Most recent `limit` decisions, newest first — used for prompt
    /// assembly's "Architecture decisions (top 10)" section.
    pub fn list_recent_decisions(&self, project_id: &str, limit: i64) -> Result<Vec<Decision>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, project_id, title, reasoning, alternatives, tradeoffs, created_at, revised_at
             FROM decisions WHERE project_id = ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![project_id, limit], row_to_decision)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::from)
    }

    // ---------------------------------------------------------------
    // Audit & token usage (append-only)
    // ---------------------------------------------------------------

    pub fn insert_audit(
        &self,
        entity_type: &str,
        entity_id: &str,
        action: &str,
        metadata: serde_json::Value,
        actor: Option<&str>,
    ) -> Result<AuditEntry> {
        let entry = AuditEntry {
            id: Uuid::new_v4().to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            action: action.to_string(),
            metadata,
            actor: actor.map(str::to_string),
            timestamp: Self::now(),
        };
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO audit_entries (id, entity_type, entity_id, action, metadata, actor, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.id,
                entry.entity_type,
                entry.entity_id,
                entry.action,
                entry.metadata.to_string(),
                entry.actor,
                entry.timestamp,
            ],
        )?;
        Ok(entry)
    }

    pub fn list_audit_for_entity(&self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, entity_type, entity_id, action, metadata, actor, timestamp
             FROM audit_entries WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY timestamp ASC",
        )?;
        let rows = stmt.query_map(params![entity_type, entity_id], row_to_audit)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::from)
    }

    pub fn insert_token_usage(
        &self,
        card_id: Option<&str>,
        project_id: &str,
        agent: &str,
        input_tokens: i64,
        output_tokens: i64,
        cache_read_tokens: i64,
        cache_write_tokens: i64,
        cost_usd: f64,
    ) -> Result<TokenUsage> {
        let usage = TokenUsage {
            id: Uuid::new_v4().to_string(),
            card_id: card_id.map(str::to_string),
            project_id: project_id.to_string(),
            agent: agent.to_string(),
            input_tokens,
            output_tokens,
            cache_read_tokens,
            cache_write_tokens,
            cost_usd,
            created_at: Self::now(),
        };
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO token_usage (id, card_id, project_id, agent, input_tokens, output_tokens, cache_read_tokens, cache_write_tokens, cost_usd, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                usage.id,
                usage.card_id,
                usage.project_id,
                usage.agent,
                usage.input_tokens,
                usage.output_tokens,
                usage.cache_read_tokens,
                usage.cache_write_tokens,
                usage.cost_usd,
                usage.created_at,
            ],
        )?;
        Ok(usage)
    }

    // ---------------------------------------------------------------
    // Steering corrections
    // ---------------------------------------------------------------

    pub fn insert_steering_correction(
        &self,
        project_id: Option<&str>,
        domain: &str,
        text: &str,
    ) -> Result<SteeringCorrection> {
        let correction = SteeringCorrection {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.map(str::to_string),
            domain: domain.to_string(),
            text: text.to_string(),
            active: true,
            created_at: Self::now(),
        };
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO steering_corrections (id, project_id, domain, text, active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                correction.id,
                correction.project_id,
                correction.domain,
                correction.text,
                correction.active,
                correction.created_at,
            ],
        )?;
        Ok(correction)
    }

    /// Active corrections scoped to `project_id` or global (`project_id IS
    /// NULL`), used by `cw-steering::build_prompt_block`.
    pub fn list_active_corrections(&self, project_id: &str) -> Result<Vec<SteeringCorrection>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, project_id, domain, text, active, created_at
             FROM steering_corrections
             WHERE active = 1 AND (project_id = ?1 OR project_id IS NULL)
             ORDER BY domain ASC",
        )?;
        let rows = stmt.query_map(params![project_id], row_to_steering)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::from)
    }

    // ---------------------------------------------------------------
    // Full-text search
    // ---------------------------------------------------------------

    /// `searchFullText(query, limit)` across cards, documents, and
    /// decisions via the unified FTS5 index.
    pub fn search_full_text(&self, query: &str, limit: i64) -> Result<Vec<SearchHit>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT source_table, source_id, title, snippet(search_index, 3, '[', ']', '...', 12)
             FROM search_index WHERE search_index MATCH ?1 ORDER BY rank LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![query, limit], |r| {
            Ok(SearchHit {
                source_table: r.get(0)?,
                source_id: r.get(1)?,
                title: r.get(2)?,
                snippet: r.get(3)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::from)
    }
}

const CARD_SELECT_COLUMNS_WHERE_ID: &str =
    "SELECT id, project_id, title, description, column_name, position, labels, priority,
            context_snapshot, last_session_id, assigned_agent, agent_status, blocked_reason,
            verification_status, started_at, completed_at, created_at, updated_at
     FROM cards WHERE id = ?1";

fn insert_card_with(conn: &Connection, card: &KanbanCard) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO cards (id, project_id, title, description, column_name, position, labels, priority,
                             context_snapshot, last_session_id, assigned_agent, agent_status, blocked_reason,
                             verification_status, started_at, completed_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        card_params(card),
    )?;
    Ok(())
}

fn update_card_with(conn: &Connection, card: &KanbanCard) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE cards SET project_id=?2, title=?3, description=?4, column_name=?5, position=?6,
                          labels=?7, priority=?8, context_snapshot=?9, last_session_id=?10,
                          assigned_agent=?11, agent_status=?12, blocked_reason=?13,
                          verification_status=?14, started_at=?15, completed_at=?16,
                          created_at=?17, updated_at=?18
         WHERE id=?1",
        card_params(card),
    )?;
    Ok(())
}

fn card_params(card: &KanbanCard) -> impl rusqlite::Params {
    params![
        card.id,
        card.project_id,
        card.title,
        card.description,
        card.column.to_string(),
        card.position,
        serde_json::to_string(&card.labels).unwrap_or_else(|_| "[]".to_string()),
        card.priority,
        card.context_snapshot,
        card.last_session_id,
        card.assigned_agent.map(|a| a.to_string()),
        card.agent_status.to_string(),
        card.blocked_reason,
        card.verification_status.to_string(),
        card.started_at,
        card.completed_at,
        card.created_at,
        card.updated_at,
    ]
}

/// Renumbers `position` within one `(project_id, column)` pair to a
/// contiguous `0..n-1` run, ordered by existing position then `updated_at`.
fn compact_column(conn: &Connection, project_id: &str, column_name: &str) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(
        "SELECT id FROM cards WHERE project_id = ?1 AND column_name = ?2
         ORDER BY position ASC, updated_at ASC",
    )?;
    let ids: Vec<String> = stmt
        .query_map(params![project_id, column_name], |r| r.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for (i, id) in ids.into_iter().enumerate() {
        conn.execute(
            "UPDATE cards SET position = ?1 WHERE id = ?2",
            params![i as i64, id],
        )?;
    }
    Ok(())
}

fn sync_fts_card(conn: &Connection, card: &KanbanCard) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM search_index WHERE source_table = 'cards' AND source_id = ?1",
        params![card.id],
    )?;
    conn.execute(
        "INSERT INTO search_index (source_table, source_id, title, body) VALUES ('cards', ?1, ?2, ?3)",
        params![card.id, card.title, card.description],
    )?;
    Ok(())
}

fn sync_fts_document(
    conn: &Connection,
    doc: &crate::types::ProjectDocument,
) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM search_index WHERE source_table = 'project_documents' AND source_id = ?1",
        params![doc.id],
    )?;
    conn.execute(
        "INSERT INTO search_index (source_table, source_id, title, body) VALUES ('project_documents', ?1, ?2, ?3)",
        params![doc.id, doc.title, doc.content],
    )?;
    Ok(())
}

fn sync_fts_decision(conn: &Connection, decision: &Decision) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM search_index WHERE source_table = 'decisions' AND source_id = ?1",
        params![decision.id],
    )?;
    conn.execute(
        "INSERT INTO search_index (source_table, source_id, title, body) VALUES ('decisions', ?1, ?2, ?3)",
        params![decision.id, decision.title, decision.reasoning],
    )?;
    Ok(())
}

fn row_to_project(row: &Row) -> rusqlite::Result<Project> {
    let status_str: String = row.get(3)?;
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        status: ProjectStatus::from_str(&status_str).unwrap_or(ProjectStatus::Active),
        color: row.get(4)?,
        agent_timeout_minutes: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn row_to_card(row: &Row) -> rusqlite::Result<KanbanCard> {
    let column_str: String = row.get(4)?;
    let labels_str: String = row.get(6)?;
    let assigned_agent_str: Option<String> = row.get(10)?;
    let agent_status_str: String = row.get(11)?;
    let verification_status_str: String = row.get(13)?;
    Ok(KanbanCard {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        column: Column::from_str(&column_str).unwrap_or(Column::Backlog),
        position: row.get(5)?,
        labels: serde_json::from_str(&labels_str).unwrap_or_default(),
        priority: row.get(7)?,
        context_snapshot: row.get(8)?,
        last_session_id: row.get(9)?,
        assigned_agent: assigned_agent_str.and_then(|s| AssignedAgent::from_str(&s).ok()),
        agent_status: AgentStatus::from_str(&agent_status_str).unwrap_or(AgentStatus::Idle),
        blocked_reason: row.get(12)?,
        verification_status: VerificationStatus::from_str(&verification_status_str)
            .unwrap_or(VerificationStatus::Unverified),
        started_at: row.get(14)?,
        completed_at: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

fn row_to_conversation(row: &Row) -> rusqlite::Result<Conversation> {
    let status_str: String = row.get(2)?;
    Ok(Conversation {
        id: row.get(0)?,
        project_id: row.get(1)?,
        status: ConversationStatus::from_str(&status_str).unwrap_or(ConversationStatus::Active),
        summary: row.get(3)?,
        session_id: row.get(4)?,
        message_count: row.get(5)?,
        first_message_at: row.get(6)?,
        last_message_at: row.get(7)?,
    })
}

fn row_to_message(row: &Row) -> rusqlite::Result<Message> {
    let role_str: String = row.get(3)?;
    let metadata_str: String = row.get(5)?;
    Ok(Message {
        id: row.get(0)?,
        project_id: row.get(1)?,
        conversation_id: row.get(2)?,
        role: MessageRole::from_str(&role_str).unwrap_or(MessageRole::User),
        content_ciphertext: row.get(4)?,
        metadata: serde_json::from_str(&metadata_str).unwrap_or(serde_json::Value::Null),
        timestamp: row.get(6)?,
    })
}

fn row_to_document(row: &Row) -> rusqlite::Result<ProjectDocument> {
    let doc_type_str: String = row.get(2)?;
    Ok(ProjectDocument {
        id: row.get(0)?,
        project_id: row.get(1)?,
        doc_type: DocumentType::from_str(&doc_type_str).unwrap_or(DocumentType::Reference),
        title: row.get(3)?,
        content: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn row_to_decision(row: &Row) -> rusqlite::Result<Decision> {
    let alternatives_str: String = row.get(4)?;
    Ok(Decision {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        reasoning: row.get(3)?,
        alternatives: serde_json::from_str(&alternatives_str).unwrap_or_default(),
        tradeoffs: row.get(5)?,
        created_at: row.get(6)?,
        revised_at: row.get(7)?,
    })
}

fn row_to_audit(row: &Row) -> rusqlite::Result<AuditEntry> {
    let metadata_str: String = row.get(4)?;
    Ok(AuditEntry {
        id: row.get(0)?,
        entity_type: row.get(1)?,
        entity_id: row.get(2)?,
        action: row.get(3)?,
        metadata: serde_json::from_str(&metadata_str).unwrap_or(serde_json::Value::Null),
        actor: row.get(5)?,
        timestamp: row.get(6)?,
    })
}

fn row_to_steering(row: &Row) -> rusqlite::Result<SteeringCorrection> {
    Ok(SteeringCorrection {
        id: row.get(0)?,
        project_id: row.get(1)?,
        domain: row.get(2)?,
        text: row.get(3)?,
        active: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> Store {
        Store::open_in_memory(&"c".repeat(64)).unwrap()
    }

    #[test]
    fn create_and_get_project() {
        let store = test_store();
        let p = store.create_project("demo", "a demo project", None, 30).unwrap();
        let fetched = store.get_project(&p.id).unwrap();
        assert_eq!(fetched.name, "demo");
        assert_eq!(fetched.status, ProjectStatus::Active);
    }

    #[test]
    fn get_project_missing_is_not_found() {
        let store = test_store();
        let err = store.get_project("nope").unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn card_crud_roundtrip() {
        let store = test_store();
        let project = store.create_project("demo", "", None, 30).unwrap();
        let now = Store::now();
        let card = KanbanCard {
            id: Uuid::new_v4().to_string(),
            project_id: project.id.clone(),
            title: "Add /health".to_string(),
            description: "wire up a health endpoint".to_string(),
            column: Column::Backlog,
            position: 0,
            labels: vec![],
            priority: 100,
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
        store.insert_card(&card).unwrap();
        let fetched = store.get_card(&card.id).unwrap();
        assert_eq!(fetched.title, "Add /health");
    }

    #[test]
    fn get_next_eligible_skips_interactive_only() {
        let store = test_store();
        let project = store.create_project("demo", "", None, 30).unwrap();
        let now = Store::now();
        let mut interactive = KanbanCard {
            id: Uuid::new_v4().to_string(),
            project_id: project.id.clone(),
            title: "needs a human".to_string(),
            description: String::new(),
            column: Column::Backlog,
            position: 0,
            labels: vec!["interactive-only".to_string()],
            priority: 1,
            context_snapshot: None,
            last_session_id: None,
            assigned_agent: None,
            agent_status: AgentStatus::Idle,
            blocked_reason: None,
            verification_status: VerificationStatus::Unverified,
            started_at: None,
            completed_at: None,
            created_at: now.clone(),
            updated_at: now.clone(),
        };
        store.insert_card(&interactive).unwrap();
        interactive.id = Uuid::new_v4().to_string();
        interactive.labels = vec![];
        interactive.title = "normal card".to_string();
        interactive.priority = 5;
        store.insert_card(&interactive).unwrap();

        let next = store.get_next_eligible_card(&project.id).unwrap().unwrap();
        assert_eq!(next.title, "normal card");
    }

    #[test]
    fn move_card_compacts_positions() {
        let store = test_store();
        let project = store.create_project("demo", "", None, 30).unwrap();
        let now = Store::now();
        let mut ids = vec![];
        for i in 0..3 {
            let card = KanbanCard {
                id: Uuid::new_v4().to_string(),
                project_id: project.id.clone(),
                title: format!("card {i}"),
                description: String::new(),
                column: Column::Backlog,
                position: i,
                labels: vec![],
                priority: 100,
                context_snapshot: None,
                last_session_id: None,
                assigned_agent: None,
                agent_status: AgentStatus::Idle,
                blocked_reason: None,
                verification_status: VerificationStatus::Unverified,
                started_at: None,
                completed_at: None,
                created_at: now.clone(),
                updated_at: now.clone(),
            };
            store.insert_card(&card).unwrap();
            ids.push(card.id);
        }

        store.move_card(&ids[1], Column::InProgress, 0).unwrap();

        let backlog = store
            .list_cards_by_column(&project.id, Column::Backlog, 10, 0)
            .unwrap();
        let positions: Vec<i64> = backlog.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![0, 1]);
    }

    #[test]
    fn message_roundtrip_is_decrypted_on_read() {
        let store = test_store();
        let conversation = store.create_conversation(None).unwrap();
        store
            .insert_message(
                &conversation.id,
                None,
                MessageRole::User,
                "hello there",
                serde_json::json!({}),
            )
            .unwrap();
        let history = store.get_history(&conversation.id, 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].1, "hello there");
    }

    #[test]
    fn search_full_text_finds_card_title() {
        let store = test_store();
        let project = store.create_project("demo", "", None, 30).unwrap();
        let now = Store::now();
        let card = KanbanCard {
            id: Uuid::new_v4().to_string(),
            project_id: project.id.clone(),
            title: "Add health endpoint".to_string(),
            description: "exposes liveness".to_string(),
            column: Column::Backlog,
            position: 0,
            labels: vec![],
            priority: 100,
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
        store.insert_card(&card).unwrap();
        let hits = store.search_full_text("health", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_id, card.id);
    }
}
