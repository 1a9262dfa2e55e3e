//! Session lifecycle journey: start -> add_event (x N) -> end_session.
//!
//! `TestBrainManager` constructs a full `BrainContext`, including the local
//! vector index and embedding service, so every test here is `#[ignore]`.

use brain_core_e2e::harness::db_manager::TestBrainManager;

#[test]
#[ignore = "requires the local embedding model"]
fn start_session_returns_a_fresh_id() {
    let brain = TestBrainManager::new_temp();
    let session_id = brain.ctx.start_session(None).unwrap();
    assert!(!session_id.is_empty());
}

#[test]
#[ignore = "requires the local embedding model"]
fn add_event_fails_for_unknown_session() {
    let brain = TestBrainManager::new_temp();
    let result = brain.ctx.add_event("no-such-session", "message", "hello");
    assert!(result.is_err());
}

#[tokio::test]
#[ignore = "requires the local embedding model"]
async fn ending_a_session_produces_a_memory() {
    let brain = TestBrainManager::new_temp();
    let project_id = brain.ctx.create_project("notebook", "session scratch project").unwrap();

    let session_id = brain.ctx.start_session(Some(project_id.clone())).unwrap();
    brain.ctx.add_event(&session_id, "message", "we decided to use postgres for the event log").unwrap();
    brain.ctx.add_event(&session_id, "message", "schema migrations will run via a CI job").unwrap();

    let memory_id = brain.ctx.end_session(&session_id, Some(project_id)).await.unwrap();
    assert!(!memory_id.is_empty());

    // Session is no longer active; a second end attempt fails.
    assert!(brain.ctx.end_session(&session_id, None).await.is_err());
}
