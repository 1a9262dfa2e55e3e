//! Database Migrations
//!
//! Versioned, additive SQL migrations applied in order against
//! `PRAGMA user_version`. Durable relational state only: chunk text and
//! vectors live in the lexical/vector indices (C1/C2), not here.

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "memories table",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "chunks table",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "projects table",
        up: MIGRATION_V3_UP,
    },
    Migration {
        version: 4,
        description: "sessions table",
        up: MIGRATION_V4_UP,
    },
    Migration {
        version: 5,
        description: "consolidation run history for the regression harness (C12)",
        up: MIGRATION_V5_UP,
    },
];

/// A single versioned schema migration.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    schema_type TEXT NOT NULL,
    content TEXT NOT NULL,
    summary TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_referenced_at TEXT NOT NULL,
    memory_type TEXT NOT NULL DEFAULT 'working',
    tags TEXT NOT NULL DEFAULT '[]',
    refs TEXT NOT NULL DEFAULT '[]',
    project_id TEXT,
    importance REAL NOT NULL DEFAULT 0.5,
    confidence REAL NOT NULL DEFAULT 0.5,
    is_memory_entry INTEGER NOT NULL DEFAULT 1,
    reference_count INTEGER NOT NULL DEFAULT 0,
    superseded_by TEXT,
    compressed INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_memories_project ON memories(project_id);
CREATE INDEX IF NOT EXISTS idx_memories_tier ON memories(memory_type);
CREATE INDEX IF NOT EXISTS idx_memories_last_referenced ON memories(last_referenced_at);
"#;

const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    chunk_index INTEGER NOT NULL,
    content TEXT NOT NULL,
    tokens INTEGER NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_chunks_memory ON chunks(memory_id);
"#;

const MIGRATION_V3_UP: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    tags TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL
);
"#;

const MIGRATION_V4_UP: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    project_id TEXT,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    summary TEXT
);
CREATE INDEX IF NOT EXISTS idx_sessions_project ON sessions(project_id);
"#;

const MIGRATION_V5_UP: &str = r#"
CREATE TABLE IF NOT EXISTS consolidation_runs (
    id TEXT PRIMARY KEY,
    ran_at TEXT NOT NULL,
    clusters_merged INTEGER NOT NULL DEFAULT 0,
    memories_forgotten INTEGER NOT NULL DEFAULT 0,
    memories_promoted INTEGER NOT NULL DEFAULT 0
);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_apply_cleanly_to_a_fresh_connection() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        for migration in MIGRATIONS {
            conn.execute_batch(migration.up).unwrap();
        }
        let table_count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='memories'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(table_count, 1);
    }

    #[test]
    fn migration_versions_are_sequential() {
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(migration.version as usize, i + 1);
        }
    }
}
