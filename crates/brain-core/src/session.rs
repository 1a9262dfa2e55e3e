//! Session Interface (§6)
//!
//! `start_session`/`add_event`/`end_session` around [`crate::model::Session`].
//! Sessions are append-only while active; ending one triggers summarization
//! (hierarchical once the accumulated text crosses the chunker's per-chunk
//! threshold) and a single consolidated [`Memory`] creation through C6.

use crate::chunker;
use crate::classifier;
use crate::error::BrainError;
use crate::indexer::Indexer;
use crate::model::{EventLogEntry, Memory, Session};
use crate::router::{RouteRequest, Router, TaskType};
use crate::storage::{EventLog, Store};
use std::collections::HashMap;
use std::sync::Mutex;

struct ActiveSession {
    session: Session,
    events: Vec<String>,
}

/// Tracks active sessions in memory; event payloads accumulate until the
/// session ends. Holds no reference to the durable store or event log so a
/// single instance can be owned alongside them by a caller's top-level
/// context rather than borrowing from it.
#[derive(Default)]
pub struct SessionManager {
    active: Mutex<HashMap<String, ActiveSession>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_session(&self, store: &Store, project_id: Option<String>) -> Result<String, BrainError> {
        let session = Session::new(project_id);
        store.upsert_session(&session)?;
        let id = session.id.clone();
        self.active.lock().unwrap().insert(id.clone(), ActiveSession { session, events: Vec::new() });
        Ok(id)
    }

    /// Append `text` to the session's transcript and emit a structured event
    /// log entry tagged with the session id.
    pub fn add_event(&self, event_log: &EventLog, session_id: &str, kind: &str, text: &str) -> Result<(), BrainError> {
        let mut active = self.active.lock().unwrap();
        let entry = active
            .get_mut(session_id)
            .ok_or_else(|| BrainError::NotFound(crate::error::NotFoundError::Session(session_id.to_string())))?;
        entry.events.push(text.to_string());
        drop(active);

        let log_entry = EventLogEntry::new(kind, session_id)
            .with_session(session_id)
            .with_new(serde_json::json!({ "text": text }));
        event_log.append(&log_entry)?;
        Ok(())
    }

    /// End a session: summarize its transcript (hierarchically if it exceeds
    /// the chunker's per-chunk token budget), classify and index a single
    /// consolidated memory, and mark the session ended.
    pub async fn end_session(
        &self,
        store: &Store,
        session_id: &str,
        router: &dyn Router,
        indexer: &Indexer<'_>,
        project_id: Option<String>,
    ) -> Result<String, BrainError> {
        let mut active = self.active.lock().unwrap();
        let mut entry = active
            .remove(session_id)
            .ok_or_else(|| BrainError::NotFound(crate::error::NotFoundError::Session(session_id.to_string())))?;
        drop(active);

        let transcript = entry.events.join("\n\n");
        let summary = summarize(&transcript, router).await?;

        entry.session.end(Some(summary.clone()));
        store.upsert_session(&entry.session)?;

        let metadata = HashMap::new();
        let (schema_type, _confidence) = classifier::classify(&transcript, &summary, &metadata, router).await;

        let mut memory = Memory::new(transcript.clone(), schema_type);
        memory.summary = summary;
        memory.project_id = project_id.or(entry.session.project_id.clone());

        let chunks = chunker::chunk_document(&memory.id, &memory.content, &metadata, chunker::DEFAULT_MAX_TOKENS);
        indexer.index_memory(&memory, &chunks)?;

        Ok(memory.id)
    }
}

/// Hierarchical if the transcript exceeds one chunk's worth of tokens:
/// summarize each chunk first (short summaries), then summarize the
/// concatenation of those summaries (long summary).
async fn summarize(transcript: &str, router: &dyn Router) -> Result<String, BrainError> {
    if transcript.trim().is_empty() {
        return Ok(String::new());
    }

    let word_count = transcript.split_whitespace().count();
    if word_count <= chunker::DEFAULT_MAX_TOKENS {
        return route_summary(transcript, TaskType::ShortSummary, router).await;
    }

    let metadata = HashMap::new();
    let chunks = chunker::chunk_document("session", transcript, &metadata, chunker::DEFAULT_MAX_TOKENS);
    let mut partial_summaries = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
        partial_summaries.push(route_summary(&chunk.content, TaskType::ShortSummary, router).await?);
    }

    let combined = partial_summaries.join("\n");
    route_summary(&combined, TaskType::LongSummary, router).await
}

async fn route_summary(text: &str, task_type: TaskType, router: &dyn Router) -> Result<String, BrainError> {
    let request = RouteRequest::new(task_type, text.to_string());
    match router.route(request).await {
        Ok(summary) => Ok(summary),
        Err(_) => Ok(chunker_fallback_summary(text)),
    }
}

fn chunker_fallback_summary(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().take(64).collect();
    words.join(" ")
}
