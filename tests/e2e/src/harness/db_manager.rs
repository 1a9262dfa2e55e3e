//! Test Database Manager
//!
//! Provides isolated store and brain-context instances for testing:
//! - temporary SQLite databases that clean up on drop
//! - pre-seeded stores for search/consolidation scenarios
//! - a temp-directory-backed `BrainContext` for full-pipeline tests

use brain_core::{Config, Memory, MemoryTier, Project, SchemaType, Store};
use tempfile::TempDir;

/// Isolated `Store` instance for tests that exercise storage directly
/// without going through the embedding/vector pipeline.
pub struct TestDatabaseManager {
    pub store: Store,
    _temp_dir: TempDir,
}

impl TestDatabaseManager {
    pub fn new_temp() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let store = Store::new(Some(temp_dir.path().join("test_brain.db"))).expect("failed to open test store");
        Self { store, _temp_dir: temp_dir }
    }

    pub fn is_empty(&self) -> bool {
        self.store.all_memories().map(|m| m.is_empty()).unwrap_or(true)
    }

    pub fn memory_count(&self) -> usize {
        self.store.all_memories().map(|m| m.len()).unwrap_or(0)
    }

    /// Seed `count` plain memories, returning their ids.
    pub fn seed_memories(&mut self, count: usize) -> Vec<String> {
        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            let memory = Memory::new(format!("test memory content {i}"), SchemaType::Note);
            self.store.upsert_memory(&memory).expect("failed to seed memory");
            ids.push(memory.id);
        }
        ids
    }

    /// Seed one memory per schema type.
    pub fn seed_diverse(&mut self) -> Vec<String> {
        let types = [
            SchemaType::Incident,
            SchemaType::Snippet,
            SchemaType::Decision,
            SchemaType::Pattern,
            SchemaType::Runbook,
            SchemaType::Note,
            SchemaType::Conversation,
        ];
        let mut ids = Vec::with_capacity(types.len());
        for schema_type in types {
            let memory = Memory::new(format!("a {schema_type} memory"), schema_type);
            self.store.upsert_memory(&memory).expect("failed to seed memory");
            ids.push(memory.id);
        }
        ids
    }

    /// Seed memories across all three retention tiers.
    pub fn seed_tiers(&mut self) -> Vec<String> {
        let mut ids = Vec::new();
        for tier in [MemoryTier::Working, MemoryTier::ShortTerm, MemoryTier::LongTerm] {
            let mut memory = Memory::new(format!("a {tier} memory"), SchemaType::Note);
            memory.memory_type = tier;
            self.store.upsert_memory(&memory).expect("failed to seed memory");
            ids.push(memory.id);
        }
        ids
    }

    pub fn seed_project(&mut self, name: &str) -> String {
        let project = Project::new(name, format!("{name} description"));
        self.store.upsert_project(&project).expect("failed to seed project");
        project.id
    }
}

/// Temp-directory-backed `BrainContext`, for tests exercising the full
/// ingest/search/session pipeline. Constructing one loads the local
/// embedding model, so tests using it are marked `#[ignore]`.
pub struct TestBrainManager {
    pub ctx: brain_core::BrainContext,
    _temp_dir: TempDir,
}

impl TestBrainManager {
    pub fn new_temp() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let mut config = Config::default();
        config.data_dir = Some(temp_dir.path().to_path_buf());
        let ctx = brain_core::BrainContext::new(config).expect("failed to construct brain context");
        Self { ctx, _temp_dir: temp_dir }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_database_starts_empty() {
        let db = TestDatabaseManager::new_temp();
        assert!(db.is_empty());
    }

    #[test]
    fn seed_memories_populates_store() {
        let mut db = TestDatabaseManager::new_temp();
        let ids = db.seed_memories(10);
        assert_eq!(ids.len(), 10);
        assert_eq!(db.memory_count(), 10);
    }

    #[test]
    fn seed_diverse_covers_every_schema_type() {
        let mut db = TestDatabaseManager::new_temp();
        let ids = db.seed_diverse();
        assert_eq!(ids.len(), 7);
        assert_eq!(db.memory_count(), 7);
    }

    #[test]
    fn seed_tiers_spans_working_short_long() {
        let mut db = TestDatabaseManager::new_temp();
        let ids = db.seed_tiers();
        assert_eq!(ids.len(), 3);
        for id in ids {
            assert!(db.store.get_memory(&id).is_ok());
        }
    }
}
