//! Ingest -> search journey.
//!
//! Exercises `BrainContext::ingest` and `BrainContext::search` end to end.
//! Requires the local embedding model, so every test here is `#[ignore]`.

use brain_core::SearchOptions;
use brain_core_e2e::harness::db_manager::TestBrainManager;

#[tokio::test]
#[ignore = "requires the local embedding model"]
async fn ingested_memory_is_recallable_by_keyword() {
    let brain = TestBrainManager::new_temp();

    let memory_id = brain
        .ctx
        .ingest(
            "what's our retry policy for flaky downstream calls?",
            "exponential backoff starting at 100ms, five attempts max",
            vec![],
            Default::default(),
            None,
        )
        .await
        .unwrap();

    let response = brain.ctx.search("retry policy backoff", SearchOptions::default()).await.unwrap();
    assert!(response.results.iter().any(|r| r.id == memory_id));
}

#[tokio::test]
#[ignore = "requires the local embedding model"]
async fn project_scoped_search_excludes_other_projects() {
    let brain = TestBrainManager::new_temp();
    let project_a = brain.ctx.create_project("project-a", "first project").unwrap();
    let project_b = brain.ctx.create_project("project-b", "second project").unwrap();

    brain
        .ctx
        .ingest("deploy notes", "use the blue/green pipeline", vec![], Default::default(), Some(project_a.clone()))
        .await
        .unwrap();
    brain
        .ctx
        .ingest("unrelated notes", "completely different topic", vec![], Default::default(), Some(project_b))
        .await
        .unwrap();

    let response = brain
        .ctx
        .search_in_project(&project_a, "deploy pipeline", SearchOptions::default())
        .await
        .unwrap();

    assert!(!response.results.is_empty());
}

#[tokio::test]
#[ignore = "requires the local embedding model"]
async fn re_ingesting_the_same_external_id_updates_in_place() {
    let brain = TestBrainManager::new_temp();
    let mut metadata = std::collections::HashMap::new();
    metadata.insert("external_id".to_string(), "ext-1".to_string());

    let first_id = brain
        .ctx
        .ingest("question", "first answer", vec!["ext-1".to_string()], metadata.clone(), None)
        .await
        .unwrap();

    let second_id = brain
        .ctx
        .ingest("question", "revised answer", vec!["ext-1".to_string()], metadata, None)
        .await
        .unwrap();

    assert_eq!(first_id, second_id);
}
