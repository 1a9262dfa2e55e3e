//! Test Data Factory
//!
//! Utilities for generating realistic memories without going through the
//! embedding/vector pipeline: batch generation for stress testing, and
//! pre-built scenarios for common test cases (decay, tiering, search).

use brain_core::{Memory, MemoryTier, SchemaType, Store};
use chrono::{Duration, Utc};

/// Factory for creating test memories directly against a `Store`.
pub struct TestDataFactory;

/// Configuration for batch memory generation.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub count: usize,
    pub schema_type: Option<SchemaType>,
    pub content_prefix: String,
    pub tags: Vec<String>,
    pub importance: f64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            count: 10,
            schema_type: None,
            content_prefix: "test memory".to_string(),
            tags: vec![],
            importance: 0.5,
        }
    }
}

/// A named group of related memories, for scenario-level assertions.
#[derive(Debug)]
pub struct TestScenario {
    pub memory_ids: Vec<String>,
    pub description: String,
    pub metadata: std::collections::HashMap<String, String>,
}

impl TestDataFactory {
    pub fn create_memory(store: &Store, content: &str) -> Option<Memory> {
        let memory = Memory::new(content.to_string(), SchemaType::Note);
        store.upsert_memory(&memory).ok()?;
        Some(memory)
    }

    pub fn create_memory_full(
        store: &Store,
        content: &str,
        schema_type: SchemaType,
        tags: Vec<&str>,
        importance: f64,
        project_id: Option<&str>,
    ) -> Option<Memory> {
        let mut memory = Memory::new(content.to_string(), schema_type);
        memory.tags = tags.iter().map(|t| t.to_string()).collect();
        memory.importance = importance;
        memory.project_id = project_id.map(String::from);
        store.upsert_memory(&memory).ok()?;
        Some(memory)
    }

    /// A memory backdated by `age_days`, useful for decay/forgetting tests.
    pub fn create_aged_memory(store: &Store, content: &str, age_days: i64, importance: f64) -> Option<Memory> {
        let mut memory = Memory::new(content.to_string(), SchemaType::Note);
        let backdated = Utc::now() - Duration::days(age_days);
        memory.created_at = backdated;
        memory.updated_at = backdated;
        memory.last_referenced_at = backdated;
        memory.importance = importance;
        store.upsert_memory(&memory).ok()?;
        Some(memory)
    }

    pub fn create_batch(store: &Store, count: usize) -> Vec<String> {
        Self::create_batch_with_config(store, BatchConfig { count, ..Default::default() })
    }

    pub fn create_batch_with_config(store: &Store, config: BatchConfig) -> Vec<String> {
        let schema_types = [
            SchemaType::Incident,
            SchemaType::Snippet,
            SchemaType::Decision,
            SchemaType::Pattern,
            SchemaType::Note,
        ];
        let mut ids = Vec::with_capacity(config.count);

        for i in 0..config.count {
            let schema_type = config.schema_type.unwrap_or(schema_types[i % schema_types.len()]);
            let mut memory = Memory::new(format!("{} {}", config.content_prefix, i), schema_type);
            memory.tags = config.tags.clone();
            memory.importance = config.importance;

            if store.upsert_memory(&memory).is_ok() {
                ids.push(memory.id);
            }
        }

        ids
    }

    /// Memories with varied importance and age, for exercising C11's
    /// compression/forgetting passes.
    pub fn create_consolidation_scenario(store: &Store) -> TestScenario {
        let mut ids = Vec::new();
        let mut metadata = std::collections::HashMap::new();

        if let Some(m) = Self::create_aged_memory(store, "stale unreferenced memory", 200, 0.05) {
            metadata.insert("forgettable".to_string(), m.id.clone());
            ids.push(m.id);
        }

        if let Some(m) = Self::create_aged_memory(store, "old low importance memory", 45, 0.2) {
            metadata.insert("compressible".to_string(), m.id.clone());
            ids.push(m.id);
        }

        if let Some(m) = Self::create_memory_full(store, "fresh, important memory", SchemaType::Decision, vec!["active"], 0.9, None) {
            metadata.insert("retained".to_string(), m.id.clone());
            ids.push(m.id);
        }

        TestScenario {
            memory_ids: ids,
            description: "consolidation scenario with forgettable/compressible/retained memories".to_string(),
            metadata,
        }
    }

    /// Memories spanning all three retention tiers.
    pub fn create_tiering_scenario(store: &Store) -> TestScenario {
        let mut ids = Vec::new();
        let mut metadata = std::collections::HashMap::new();

        for tier in [MemoryTier::Working, MemoryTier::ShortTerm, MemoryTier::LongTerm] {
            let mut memory = Memory::new(format!("a {tier} memory"), SchemaType::Note);
            memory.memory_type = tier;
            if store.upsert_memory(&memory).is_ok() {
                metadata.insert(tier.as_str().to_string(), memory.id.clone());
                ids.push(memory.id);
            }
        }

        TestScenario {
            memory_ids: ids,
            description: "tiering scenario spanning working/short_term/long_term".to_string(),
            metadata,
        }
    }

    /// Categorized memories for lexical/topical search assertions.
    pub fn create_search_scenario(store: &Store) -> TestScenario {
        let mut ids = Vec::new();
        let mut metadata = std::collections::HashMap::new();

        for content in [
            "Rust ownership rules prevent data races at compile time",
            "Python is popular for data science and machine learning",
            "JavaScript runs in web browsers and in Node.js",
        ] {
            if let Some(m) = Self::create_memory_full(store, content, SchemaType::Snippet, vec!["programming"], 0.5, None) {
                ids.push(m.id);
            }
        }
        metadata.insert("programming_count".to_string(), "3".to_string());

        for content in ["Postmortem: database failover took 40 minutes", "Runbook: rotating expired TLS certificates"] {
            if let Some(m) = Self::create_memory_full(store, content, SchemaType::Incident, vec!["ops"], 0.7, None) {
                ids.push(m.id);
            }
        }
        metadata.insert("incident_count".to_string(), "2".to_string());

        TestScenario {
            memory_ids: ids,
            description: "search scenario with categorized content".to_string(),
            metadata,
        }
    }

    pub fn generate_tags(count: usize, seed: usize) -> Vec<String> {
        const TAGS: [&str; 10] = [
            "important", "review", "todo", "concept", "incident", "code", "note", "idea", "question", "reference",
        ];
        (0..count).map(|i| TAGS[(seed + i) % TAGS.len()].to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_store() -> Store {
        let dir = tempdir().unwrap();
        Store::new(Some(dir.path().join("test.db"))).unwrap()
    }

    #[test]
    fn create_memory_round_trips_content() {
        let store = test_store();
        let memory = TestDataFactory::create_memory(&store, "hello world").unwrap();
        assert_eq!(memory.content, "hello world");
        assert_eq!(store.get_memory(&memory.id).unwrap().content, "hello world");
    }

    #[test]
    fn create_batch_produces_requested_count() {
        let store = test_store();
        let ids = TestDataFactory::create_batch(&store, 10);
        assert_eq!(ids.len(), 10);
        assert_eq!(store.all_memories().unwrap().len(), 10);
    }

    #[test]
    fn consolidation_scenario_covers_all_three_cases() {
        let store = test_store();
        let scenario = TestDataFactory::create_consolidation_scenario(&store);
        assert!(scenario.metadata.contains_key("forgettable"));
        assert!(scenario.metadata.contains_key("compressible"));
        assert!(scenario.metadata.contains_key("retained"));
    }

    #[test]
    fn tiering_scenario_covers_all_tiers() {
        let store = test_store();
        let scenario = TestDataFactory::create_tiering_scenario(&store);
        assert_eq!(scenario.memory_ids.len(), 3);
    }

    #[test]
    fn generate_tags_produces_requested_count() {
        let tags = TestDataFactory::generate_tags(5, 0);
        assert_eq!(tags.len(), 5);
        assert!(tags.iter().all(|t| !t.is_empty()));
    }
}
