//! Error Taxonomy
//!
//! One sub-enum per component family, aggregated into a single crate-level
//! `BrainError` for the public API surface. Mirrors the propagation policy:
//! transport/backend errors retry in the router, storage errors are fatal
//! for the affected operation, validation errors never retry, and
//! budget/deadline errors recover locally in the reranker.

use std::time::Duration;

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, BrainError>;

/// Errors surfaced by [`crate::router::Router`] implementations.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("backend call timed out after {0:?}")]
    BackendTimeout(Duration),

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Errors surfaced by the vector store (C1).
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("corrupt index: {0} (suggestion: {suggestion})", suggestion = .1)]
    CorruptIndex(String, String),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("key not found: {0}")]
    NotFound(String),
}

/// Errors surfaced by the lexical index (C2).
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum LexicalIndexError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("key not found: {0}")]
    NotFound(String),
}

/// Errors surfaced by the durable record store (memories/chunks/projects/sessions).
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("integrity violation on memory {memory_id}: {reason}")]
    IntegrityViolation { memory_id: String, reason: String },

    #[error("init error: {0}")]
    Init(String),
}

/// Errors surfaced by configuration loading/validation.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("io error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse config: {0}")]
    Parse(String),
}

/// Errors surfaced by the indexer (C6).
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error(transparent)]
    VectorStore(#[from] VectorStoreError),

    #[error(transparent)]
    LexicalIndex(#[from] LexicalIndexError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("integrity violation on memory {memory_id}: {reason}")]
    IntegrityViolation { memory_id: String, reason: String },
}

/// Errors surfaced by consolidation (C11).
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ConsolidationError {
    #[error("clustering failed: {0}")]
    ClusteringFailed(String),

    #[error("merge failed for cluster {cluster_id}: {reason}")]
    MergeFailed { cluster_id: String, reason: String },
}

/// Not-found errors for session/memory lookups, surfaced but non-fatal.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum NotFoundError {
    #[error("session not found: {0}")]
    Session(String),

    #[error("memory not found: {0}")]
    Memory(String),

    #[error("project not found: {0}")]
    Project(String),
}

/// Budget/deadline errors, recovered locally by C9 via heuristic fallback and
/// only propagated when an entire query's deadline is exceeded.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum DeadlineError {
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("queue saturated: wait exceeded {0:?}")]
    QueueSaturated(Duration),
}

/// Aggregate crate-level error. Every public fallible operation returns
/// `Result<T, BrainError>`.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum BrainError {
    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    VectorStore(#[from] VectorStoreError),

    #[error(transparent)]
    LexicalIndex(#[from] LexicalIndexError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Indexer(#[from] IndexerError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Consolidation(#[from] ConsolidationError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error(transparent)]
    Deadline(#[from] DeadlineError),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}
