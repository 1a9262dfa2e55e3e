//! Data Model (§3)
//!
//! `Memory` is the unit of durable knowledge; `Chunk` is its indexed
//! fragment. Tagged-union types are used throughout for schema type, memory
//! tier, and event kind per the design notes — no string comparison outside
//! the parser/serializer boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Semantic classification assigned by the schema classifier (C5).
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaType {
    Incident,
    Snippet,
    Decision,
    Pattern,
    Runbook,
    Note,
    Conversation,
}

impl Default for SchemaType {
    fn default() -> Self {
        SchemaType::Conversation
    }
}

impl SchemaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaType::Incident => "incident",
            SchemaType::Snippet => "snippet",
            SchemaType::Decision => "decision",
            SchemaType::Pattern => "pattern",
            SchemaType::Runbook => "runbook",
            SchemaType::Note => "note",
            SchemaType::Conversation => "conversation",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        Some(match s.to_ascii_lowercase().as_str() {
            "incident" => SchemaType::Incident,
            "snippet" => SchemaType::Snippet,
            "decision" => SchemaType::Decision,
            "pattern" => SchemaType::Pattern,
            "runbook" => SchemaType::Runbook,
            "note" => SchemaType::Note,
            "conversation" => SchemaType::Conversation,
            _ => return None,
        })
    }
}

impl std::fmt::Display for SchemaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Retention tier. Transitions are monotone: `Working -> ShortTerm ->
/// LongTerm`; demotion to `Working` is forbidden once promoted (Invariant 5).
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    Working,
    ShortTerm,
    LongTerm,
}

impl Default for MemoryTier {
    fn default() -> Self {
        MemoryTier::Working
    }
}

impl MemoryTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryTier::Working => "working",
            MemoryTier::ShortTerm => "short_term",
            MemoryTier::LongTerm => "long_term",
        }
    }

    /// True if `self -> next` is a forward (allowed) tier transition.
    pub fn can_promote_to(&self, next: MemoryTier) -> bool {
        next > *self
    }
}

impl std::fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Clamp a score-like value into `[0, 1]`, per Invariant 2.
pub fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

/// A durable unit of knowledge (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    pub id: String,
    pub schema_type: SchemaType,
    pub content: String,
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_referenced_at: DateTime<Utc>,
    pub memory_type: MemoryTier,
    pub tags: Vec<String>,
    pub refs: Vec<String>,
    pub project_id: Option<String>,
    pub importance: f64,
    pub confidence: f64,
    pub is_memory_entry: bool,
    /// Number of times a chunk of this memory has appeared in a returned
    /// search result set; drives C11 promotion/forgetting (supplemental).
    pub reference_count: u64,
    /// Forwarding target if this memory was collapsed by C11 (supplemental).
    pub superseded_by: Option<String>,
    /// Prevents further compression once C11 has compressed this memory once.
    pub compressed: bool,
}

impl Memory {
    pub fn new(content: impl Into<String>, schema_type: SchemaType) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            schema_type,
            content: content.into(),
            summary: String::new(),
            created_at: now,
            updated_at: now,
            last_referenced_at: now,
            memory_type: MemoryTier::Working,
            tags: Vec::new(),
            refs: Vec::new(),
            project_id: None,
            importance: 0.5,
            confidence: 0.5,
            is_memory_entry: true,
            reference_count: 0,
            superseded_by: None,
            compressed: false,
        }
    }

    /// Mark referenced, bumping `last_referenced_at` and `reference_count`
    /// (Invariant 4: `last_referenced_at >= created_at` always holds because
    /// `Utc::now()` is monotone relative to construction time).
    pub fn mark_referenced(&mut self) {
        self.last_referenced_at = Utc::now();
        self.reference_count += 1;
    }

    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }
}

/// An indexed fragment of a [`Memory`] (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub id: String,
    pub memory_id: String,
    pub chunk_index: u32,
    pub content: String,
    pub tokens: u32,
    pub metadata: HashMap<String, String>,
}

impl Chunk {
    pub fn make_id(memory_id: &str, chunk_index: u32) -> String {
        format!("{memory_id}-chunk-{chunk_index}")
    }

    /// Recover `(memory_id, chunk_index)` from a chunk id (Invariant 3: the
    /// mapping `id -> (memory_id, chunk_index)` is total for well-formed ids).
    pub fn parse_id(id: &str) -> Option<(String, u32)> {
        let (memory_id, rest) = id.rsplit_once("-chunk-")?;
        let chunk_index = rest.parse().ok()?;
        Some((memory_id.to_string(), chunk_index))
    }
}

/// A project grouping (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            tags: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// A bounded span of interaction that working memory and the scheduler key
/// off of (§3 supplemental `Session` entity). Sessions accumulate
/// `EventLogEntry` rows tagged with their id and are summarized on close.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub project_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
}

impl Session {
    pub fn new(project_id: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            project_id,
            started_at: Utc::now(),
            ended_at: None,
            summary: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    pub fn end(&mut self, summary: Option<String>) {
        self.ended_at = Some(Utc::now());
        self.summary = summary;
    }
}

/// An append-only event log entry (§3), used by the learning loops in C9/C10
/// and by C6/C11 for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLogEntry {
    pub ts: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: String,
    pub subject_id: String,
    pub old: Option<serde_json::Value>,
    pub new: Option<serde_json::Value>,
    pub session_id: Option<String>,
}

impl EventLogEntry {
    pub fn new(kind: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            kind: kind.into(),
            subject_id: subject_id.into(),
            old: None,
            new: None,
            session_id: None,
        }
    }

    pub fn with_new(mut self, value: serde_json::Value) -> Self {
        self.new = Some(value);
        self
    }

    pub fn with_old(mut self, value: serde_json::Value) -> Self {
        self.old = Some(value);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_type_round_trips_through_str() {
        for t in [
            SchemaType::Incident,
            SchemaType::Snippet,
            SchemaType::Decision,
            SchemaType::Pattern,
            SchemaType::Runbook,
            SchemaType::Note,
            SchemaType::Conversation,
        ] {
            assert_eq!(SchemaType::parse_name(t.as_str()), Some(t));
        }
    }

    #[test]
    fn tier_transitions_are_monotone() {
        assert!(MemoryTier::Working.can_promote_to(MemoryTier::ShortTerm));
        assert!(MemoryTier::ShortTerm.can_promote_to(MemoryTier::LongTerm));
        assert!(!MemoryTier::LongTerm.can_promote_to(MemoryTier::Working));
        assert!(!MemoryTier::ShortTerm.can_promote_to(MemoryTier::Working));
    }

    #[test]
    fn chunk_id_round_trips() {
        let id = Chunk::make_id("mem-123", 4);
        assert_eq!(id, "mem-123-chunk-4");
        assert_eq!(Chunk::parse_id(&id), Some(("mem-123".to_string(), 4)));
    }

    #[test]
    fn clamp01_bounds() {
        assert_eq!(clamp01(-1.0), 0.0);
        assert_eq!(clamp01(2.0), 1.0);
        assert_eq!(clamp01(0.5), 0.5);
    }

    #[test]
    fn session_starts_active_and_ends_with_summary() {
        let mut session = Session::new(Some("proj-1".to_string()));
        assert!(session.is_active());
        session.end(Some("did some work".to_string()));
        assert!(!session.is_active());
        assert_eq!(session.summary.as_deref(), Some("did some work"));
    }
}
