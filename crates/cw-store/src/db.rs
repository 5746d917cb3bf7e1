use rusqlite::Connection;

use crate::error::Result;

/// Open (or create) the SQLite database at `path`, enabling WAL and
/// foreign-key enforcement, then run every idempotent migration.
///
/// Safe to call on every startup — migrations are additive only.
pub fn open(path: &str) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    init_all(&conn)?;
    Ok(conn)
}

pub fn init_all(conn: &Connection) -> Result<()> {
    init_projects(conn)?;
    init_cards(conn)?;
    init_conversations(conn)?;
    init_messages(conn)?;
    init_documents(conn)?;
    init_decisions(conn)?;
    init_audit(conn)?;
    init_token_usage(conn)?;
    init_steering(conn)?;
    init_fts(conn)?;
    Ok(())
}

fn init_projects(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS projects (
            id                     TEXT PRIMARY KEY,
            name                   TEXT NOT NULL,
            description            TEXT NOT NULL DEFAULT '',
            status                 TEXT NOT NULL DEFAULT 'active',
            color                  TEXT,
            agent_timeout_minutes  INTEGER NOT NULL DEFAULT 30,
            created_at             TEXT NOT NULL,
            updated_at             TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_projects_updated
            ON projects(updated_at DESC);",
    )?;
    Ok(())
}

fn init_cards(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS cards (
            id                   TEXT PRIMARY KEY,
            project_id           TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            title                TEXT NOT NULL,
            description          TEXT NOT NULL DEFAULT '',
            column_name          TEXT NOT NULL DEFAULT 'backlog',
            position             INTEGER NOT NULL DEFAULT 0,
            labels               TEXT NOT NULL DEFAULT '[]',
            priority             INTEGER NOT NULL DEFAULT 100,
            context_snapshot     TEXT,
            last_session_id      TEXT,
            assigned_agent       TEXT,
            agent_status         TEXT NOT NULL DEFAULT 'idle',
            blocked_reason       TEXT,
            verification_status TEXT NOT NULL DEFAULT 'unverified',
            started_at           TEXT,
            completed_at         TEXT,
            created_at           TEXT NOT NULL,
            updated_at           TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_cards_project_column
            ON cards(project_id, column_name, position);
        CREATE INDEX IF NOT EXISTS idx_cards_project_status
            ON cards(project_id, agent_status);",
    )?;
    Ok(())
}

fn init_conversations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS conversations (
            id                TEXT PRIMARY KEY,
            project_id        TEXT REFERENCES projects(id) ON DELETE CASCADE,
            status            TEXT NOT NULL DEFAULT 'active',
            summary           TEXT,
            session_id        TEXT,
            message_count     INTEGER NOT NULL DEFAULT 0,
            first_message_at  TEXT NOT NULL,
            last_message_at   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_conversations_project
            ON conversations(project_id, status);",
    )?;
    Ok(())
}

fn init_messages(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS messages (
            id                  TEXT PRIMARY KEY,
            project_id          TEXT REFERENCES projects(id) ON DELETE CASCADE,
            conversation_id     TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            role                TEXT NOT NULL,
            content_ciphertext  BLOB NOT NULL,
            metadata            TEXT NOT NULL DEFAULT '{}',
            timestamp           TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, timestamp);",
    )?;
    Ok(())
}

fn init_documents(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS project_documents (
            id          TEXT PRIMARY KEY,
            project_id  TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            doc_type    TEXT NOT NULL,
            title       TEXT NOT NULL,
            content     TEXT NOT NULL DEFAULT '',
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_documents_project
            ON project_documents(project_id, doc_type);",
    )?;
    Ok(())
}

fn init_decisions(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS decisions (
            id           TEXT PRIMARY KEY,
            project_id   TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            title        TEXT NOT NULL,
            reasoning    TEXT NOT NULL DEFAULT '',
            alternatives TEXT NOT NULL DEFAULT '[]',
            tradeoffs    TEXT NOT NULL DEFAULT '',
            created_at   TEXT NOT NULL,
            revised_at   TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_decisions_project
            ON decisions(project_id, created_at DESC);",
    )?;
    Ok(())
}

/// Append-only; no foreign-key cascade — entries reference cards by id but
/// are never deleted when the card is.
fn init_audit(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS audit_entries (
            id          TEXT PRIMARY KEY,
            entity_type TEXT NOT NULL,
            entity_id   TEXT NOT NULL,
            action      TEXT NOT NULL,
            metadata    TEXT NOT NULL DEFAULT '{}',
            actor       TEXT,
            timestamp   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_audit_entity
            ON audit_entries(entity_type, entity_id, timestamp);",
    )?;
    Ok(())
}

fn init_token_usage(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS token_usage (
            id                 TEXT PRIMARY KEY,
            card_id            TEXT,
            project_id         TEXT NOT NULL,
            agent              TEXT NOT NULL,
            input_tokens       INTEGER NOT NULL DEFAULT 0,
            output_tokens      INTEGER NOT NULL DEFAULT 0,
            cache_read_tokens  INTEGER NOT NULL DEFAULT 0,
            cache_write_tokens INTEGER NOT NULL DEFAULT 0,
            cost_usd           REAL NOT NULL DEFAULT 0,
            created_at         TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_token_usage_project
            ON token_usage(project_id, created_at DESC);",
    )?;
    Ok(())
}

fn init_steering(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS steering_corrections (
            id          TEXT PRIMARY KEY,
            project_id  TEXT,
            domain      TEXT NOT NULL,
            text        TEXT NOT NULL,
            active      INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_steering_project
            ON steering_corrections(project_id, active);",
    )?;
    Ok(())
}

/// External-content FTS5 index spanning cards, documents, and decisions.
/// `content=''` (contentless) since rows come from three distinct tables;
/// synced manually on every write via `sync_fts` in `store.rs` with a
/// delete+reinsert on each update.
fn init_fts(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS search_index
            USING fts5(source_table, source_id, title, body);",
    )?;
    Ok(())
}
