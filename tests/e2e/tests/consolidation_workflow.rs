//! Consolidation (C11) journey: forgetting, promotion, and the pure decay
//! helpers. The full `Consolidation::run` pass always attempts to embed
//! every memory for clustering, so that part is `#[ignore]`; the pure decay
//! functions run unconditionally.

use brain_core::config::ConsolidationConfig;
use brain_core::consolidation::{decay_confidence, decay_importance, Consolidation};
use brain_core::{EventLog, LexicalIndex, MemoryTier, Router, VectorStore};
use brain_core_e2e::harness::db_manager::TestDatabaseManager;
use brain_core_e2e::mocks::fixtures::TestDataFactory;
use std::sync::Mutex;

#[test]
fn confidence_moves_toward_outcome_without_overshooting() {
    let updated = decay_confidence(0.5, true);
    assert!(updated > 0.5 && updated < 0.6);
}

#[test]
fn importance_never_increases_past_the_age_threshold() {
    let decayed = decay_importance(0.5, 60, 30);
    assert!(decayed <= 0.5);
}

#[tokio::test]
#[ignore = "requires the local embedding model"]
async fn stale_unreferenced_memories_are_forgotten() {
    let db = TestDatabaseManager::new_temp();
    let scenario = TestDataFactory::create_consolidation_scenario(&db.store);

    let dir = tempfile::tempdir().unwrap();
    let event_log = EventLog::new(dir.path().join("events.jsonl"));
    let vector = Mutex::new(VectorStore::new().unwrap());
    let lexical = Mutex::new(LexicalIndex::new());
    let embedder = brain_core::EmbeddingService::new();
    let indexer = brain_core::Indexer::new(&vector, &lexical, &db.store, &event_log, &embedder);
    let router: std::sync::Arc<dyn Router> = std::sync::Arc::new(brain_core::LocalRouter::new());
    let reranker = brain_core::Reranker::new(Default::default());

    let consolidation = Consolidation::new(ConsolidationConfig::default());
    let report = consolidation
        .run(&db.store, &indexer, &embedder, router.as_ref(), &reranker, 8)
        .await
        .unwrap();

    assert_eq!(report.memories_forgotten, 1);
    let forgotten_id = scenario.metadata.get("forgettable").unwrap();
    assert!(db.store.get_memory(forgotten_id).is_err());

    let retained_id = scenario.metadata.get("retained").unwrap();
    assert!(db.store.get_memory(retained_id).is_ok());
}

#[test]
fn tiering_scenario_never_demotes_already_promoted_memories() {
    let db = TestDatabaseManager::new_temp();
    let scenario = TestDataFactory::create_tiering_scenario(&db.store);

    let long_term_id = scenario.metadata.get("long_term").unwrap();
    let memory = db.store.get_memory(long_term_id).unwrap();
    assert_eq!(memory.memory_type, MemoryTier::LongTerm);
    assert!(!memory.memory_type.can_promote_to(MemoryTier::Working));
    assert_eq!(db.memory_count(), 3);
}
