//! SQLite Durable Store
//!
//! Holds the structured fields of §3's data model (memories, chunks,
//! projects, sessions). Chunk *text* is duplicated here for recovery/rebuild
//! of the lexical/vector indices; those indices are the source of truth for
//! retrieval, this store is the source of truth for everything else.
//!
//! Wraps a single connection behind a `Mutex` for interior mutability,
//! mirroring how the rest of this crate favors `&self` methods over
//! `&mut self` so callers can share one `Store` behind an `Arc`.

use crate::error::StoreError;
use crate::model::{Chunk, Memory, MemoryTier, Project, SchemaType, Session};
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use std::sync::Mutex;

use super::migrations::MIGRATIONS;

pub struct Store {
    conn: Mutex<Connection>,
}

fn configure_connection(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(())
}

fn apply_migrations(conn: &Connection) -> Result<(), StoreError> {
    let current: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    for migration in MIGRATIONS {
        if migration.version > current {
            conn.execute_batch(migration.up)?;
            conn.pragma_update(None, "user_version", migration.version)?;
            tracing::debug!(version = migration.version, description = migration.description, "applied migration");
        }
    }
    Ok(())
}

fn tags_to_json(tags: &[String]) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
}

fn tags_from_json(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

impl Store {
    fn default_db_path() -> Result<PathBuf, StoreError> {
        let dirs = ProjectDirs::from("dev", "external-brain", "brain")
            .ok_or_else(|| StoreError::Init("could not determine project directories".to_string()))?;
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;
        Ok(data_dir.join("memories.db"))
    }

    pub fn new(db_path: Option<PathBuf>) -> Result<Self, StoreError> {
        let path = match db_path {
            Some(p) => p,
            None => Self::default_db_path()?,
        };

        let conn = Connection::open(&path)?;
        configure_connection(&conn)?;
        apply_migrations(&conn)?;

        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        configure_connection(&conn)?;
        apply_migrations(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    // -- memories ---------------------------------------------------------

    pub fn upsert_memory(&self, memory: &Memory) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO memories (
                id, schema_type, content, summary, created_at, updated_at,
                last_referenced_at, memory_type, tags, refs, project_id,
                importance, confidence, is_memory_entry, reference_count,
                superseded_by, compressed
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            ON CONFLICT(id) DO UPDATE SET
                schema_type = excluded.schema_type,
                content = excluded.content,
                summary = excluded.summary,
                updated_at = excluded.updated_at,
                last_referenced_at = excluded.last_referenced_at,
                memory_type = excluded.memory_type,
                tags = excluded.tags,
                refs = excluded.refs,
                project_id = excluded.project_id,
                importance = excluded.importance,
                confidence = excluded.confidence,
                is_memory_entry = excluded.is_memory_entry,
                reference_count = excluded.reference_count,
                superseded_by = excluded.superseded_by,
                compressed = excluded.compressed",
            params![
                memory.id,
                memory.schema_type.as_str(),
                memory.content,
                memory.summary,
                memory.created_at.to_rfc3339(),
                memory.updated_at.to_rfc3339(),
                memory.last_referenced_at.to_rfc3339(),
                memory.memory_type.as_str(),
                tags_to_json(&memory.tags),
                tags_to_json(&memory.refs),
                memory.project_id,
                memory.importance,
                memory.confidence,
                memory.is_memory_entry,
                memory.reference_count as i64,
                memory.superseded_by,
                memory.compressed,
            ],
        )?;
        Ok(())
    }

    fn row_to_memory(row: &rusqlite::Row) -> rusqlite::Result<Memory> {
        let schema_raw: String = row.get("schema_type")?;
        let tier_raw: String = row.get("memory_type")?;
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        let last_referenced_at: String = row.get("last_referenced_at")?;
        let tags_raw: String = row.get("tags")?;
        let refs_raw: String = row.get("refs")?;

        Ok(Memory {
            id: row.get("id")?,
            schema_type: SchemaType::parse_name(&schema_raw).unwrap_or_default(),
            content: row.get("content")?,
            summary: row.get("summary")?,
            created_at: parse_rfc3339(&created_at),
            updated_at: parse_rfc3339(&updated_at),
            last_referenced_at: parse_rfc3339(&last_referenced_at),
            memory_type: parse_tier(&tier_raw),
            tags: tags_from_json(&tags_raw),
            refs: tags_from_json(&refs_raw),
            project_id: row.get("project_id")?,
            importance: row.get("importance")?,
            confidence: row.get("confidence")?,
            is_memory_entry: row.get("is_memory_entry")?,
            reference_count: row.get::<_, i64>("reference_count")? as u64,
            superseded_by: row.get("superseded_by")?,
            compressed: row.get("compressed")?,
        })
    }

    pub fn get_memory(&self, id: &str) -> Result<Memory, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM memories WHERE id = ?1", params![id], Self::row_to_memory)
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("memory {id}")))
    }

    pub fn delete_memory(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    pub fn list_memories_by_tier(&self, tier: MemoryTier) -> Result<Vec<Memory>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM memories WHERE memory_type = ?1")?;
        let rows = stmt.query_map(params![tier.as_str()], Self::row_to_memory)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    pub fn list_memories_for_project(&self, project_id: &str) -> Result<Vec<Memory>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM memories WHERE project_id = ?1")?;
        let rows = stmt.query_map(params![project_id], Self::row_to_memory)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    pub fn all_memories(&self) -> Result<Vec<Memory>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM memories")?;
        let rows = stmt.query_map([], Self::row_to_memory)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    // -- chunks -------------------------------------------------------------

    pub fn upsert_chunk(&self, chunk: &Chunk) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let metadata = serde_json::to_string(&chunk.metadata).unwrap_or_else(|_| "{}".to_string());
        conn.execute(
            "INSERT INTO chunks (id, memory_id, chunk_index, content, tokens, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                tokens = excluded.tokens,
                metadata = excluded.metadata",
            params![chunk.id, chunk.memory_id, chunk.chunk_index, chunk.content, chunk.tokens, metadata],
        )?;
        Ok(())
    }

    fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<Chunk> {
        let metadata_raw: String = row.get("metadata")?;
        Ok(Chunk {
            id: row.get("id")?,
            memory_id: row.get("memory_id")?,
            chunk_index: row.get::<_, i64>("chunk_index")? as u32,
            content: row.get("content")?,
            tokens: row.get::<_, i64>("tokens")? as u32,
            metadata: serde_json::from_str(&metadata_raw).unwrap_or_default(),
        })
    }

    pub fn chunks_for_memory(&self, memory_id: &str) -> Result<Vec<Chunk>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM chunks WHERE memory_id = ?1 ORDER BY chunk_index ASC")?;
        let rows = stmt.query_map(params![memory_id], Self::row_to_chunk)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    pub fn delete_chunks_for_memory(&self, memory_id: &str) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.execute("DELETE FROM chunks WHERE memory_id = ?1", params![memory_id])?)
    }

    // -- projects -------------------------------------------------------------

    pub fn upsert_project(&self, project: &Project) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO projects (id, name, description, tags, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                tags = excluded.tags",
            params![
                project.id,
                project.name,
                project.description,
                tags_to_json(&project.tags),
                project.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_project(&self, id: &str) -> Result<Project, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM projects WHERE id = ?1", params![id], |row| {
            let tags_raw: String = row.get("tags")?;
            let created_at: String = row.get("created_at")?;
            Ok(Project {
                id: row.get("id")?,
                name: row.get("name")?,
                description: row.get("description")?,
                tags: tags_from_json(&tags_raw),
                created_at: parse_rfc3339(&created_at),
            })
        })
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("project {id}")))
    }

    pub fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM projects ORDER BY created_at ASC")?;
        let rows = stmt.query_map([], |row| {
            let tags_raw: String = row.get("tags")?;
            let created_at: String = row.get("created_at")?;
            Ok(Project {
                id: row.get("id")?,
                name: row.get("name")?,
                description: row.get("description")?,
                tags: tags_from_json(&tags_raw),
                created_at: parse_rfc3339(&created_at),
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    // -- sessions -------------------------------------------------------------

    pub fn upsert_session(&self, session: &Session) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sessions (id, project_id, started_at, ended_at, summary)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                ended_at = excluded.ended_at,
                summary = excluded.summary",
            params![
                session.id,
                session.project_id,
                session.started_at.to_rfc3339(),
                session.ended_at.map(|t| t.to_rfc3339()),
                session.summary,
            ],
        )?;
        Ok(())
    }

    pub fn get_session(&self, id: &str) -> Result<Session, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM sessions WHERE id = ?1", params![id], |row| {
            let started_at: String = row.get("started_at")?;
            let ended_at: Option<String> = row.get("ended_at")?;
            Ok(Session {
                id: row.get("id")?,
                project_id: row.get("project_id")?,
                started_at: parse_rfc3339(&started_at),
                ended_at: ended_at.map(|s| parse_rfc3339(&s)),
                summary: row.get("summary")?,
            })
        })
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("session {id}")))
    }

    // -- consolidation run history (C12) -------------------------------------

    pub fn record_consolidation_run(
        &self,
        ran_at: DateTime<Utc>,
        clusters_merged: u64,
        memories_forgotten: u64,
        memories_promoted: u64,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO consolidation_runs (id, ran_at, clusters_merged, memories_forgotten, memories_promoted)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                uuid::Uuid::new_v4().to_string(),
                ran_at.to_rfc3339(),
                clusters_merged as i64,
                memories_forgotten as i64,
                memories_promoted as i64,
            ],
        )?;
        Ok(())
    }

    /// Timestamp of the most recent consolidation run, if any have completed.
    pub fn last_consolidation_run(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let raw: Option<String> = conn
            .query_row("SELECT ran_at FROM consolidation_runs ORDER BY ran_at DESC LIMIT 1", [], |row| row.get(0))
            .optional()?;
        Ok(raw.map(|s| parse_rfc3339(&s)))
    }
}

fn parse_rfc3339(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_tier(raw: &str) -> MemoryTier {
    match raw {
        "short_term" => MemoryTier::ShortTerm,
        "long_term" => MemoryTier::LongTerm,
        _ => MemoryTier::Working,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_and_get_memory_round_trips() {
        let store = Store::in_memory().unwrap();
        let memory = Memory::new("hello world", SchemaType::Note);
        store.upsert_memory(&memory).unwrap();
        let fetched = store.get_memory(&memory.id).unwrap();
        assert_eq!(fetched.content, "hello world");
        assert_eq!(fetched.schema_type, SchemaType::Note);
    }

    #[test]
    fn get_missing_memory_is_not_found() {
        let store = Store::in_memory().unwrap();
        let result = store.get_memory("nonexistent");
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn upsert_memory_is_idempotent_by_id() {
        let store = Store::in_memory().unwrap();
        let mut memory = Memory::new("v1", SchemaType::Note);
        store.upsert_memory(&memory).unwrap();
        memory.content = "v2".to_string();
        store.upsert_memory(&memory).unwrap();

        let all = store.all_memories().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content, "v2");
    }

    #[test]
    fn chunks_round_trip_for_a_memory() {
        let store = Store::in_memory().unwrap();
        let memory = Memory::new("content", SchemaType::Snippet);
        store.upsert_memory(&memory).unwrap();

        let chunk = Chunk {
            id: Chunk::make_id(&memory.id, 0),
            memory_id: memory.id.clone(),
            chunk_index: 0,
            content: "content".to_string(),
            tokens: 1,
            metadata: Default::default(),
        };
        store.upsert_chunk(&chunk).unwrap();

        let chunks = store.chunks_for_memory(&memory.id).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, chunk.id);
    }

    #[test]
    fn deleting_memory_cascades_to_chunks() {
        let store = Store::in_memory().unwrap();
        let memory = Memory::new("content", SchemaType::Snippet);
        store.upsert_memory(&memory).unwrap();
        let chunk = Chunk {
            id: Chunk::make_id(&memory.id, 0),
            memory_id: memory.id.clone(),
            chunk_index: 0,
            content: "content".to_string(),
            tokens: 1,
            metadata: Default::default(),
        };
        store.upsert_chunk(&chunk).unwrap();

        store.delete_memory(&memory.id).unwrap();
        let chunks = store.chunks_for_memory(&memory.id).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn list_memories_by_tier_filters_correctly() {
        let store = Store::in_memory().unwrap();
        let mut long_term = Memory::new("archived", SchemaType::Note);
        long_term.memory_type = MemoryTier::LongTerm;
        store.upsert_memory(&long_term).unwrap();
        store.upsert_memory(&Memory::new("fresh", SchemaType::Note)).unwrap();

        let results = store.list_memories_by_tier(MemoryTier::LongTerm).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "archived");
    }

    #[test]
    fn session_lifecycle_round_trips() {
        let store = Store::in_memory().unwrap();
        let mut session = Session::new(None);
        store.upsert_session(&session).unwrap();
        session.end(Some("wrapped up".to_string()));
        store.upsert_session(&session).unwrap();

        let fetched = store.get_session(&session.id).unwrap();
        assert!(!fetched.is_active());
        assert_eq!(fetched.summary.as_deref(), Some("wrapped up"));
    }
}
