//! # Brain Core
//!
//! A personal external-brain memory engine: hybrid dense-vector + BM25
//! lexical retrieval, a multi-tier cross-encoder reranker, a query attribute
//! model for project-scoped recall, a project memory pool, and a
//! consolidation/forgetting lifecycle driven by a scheduler and replay
//! harness.
//!
//! ## Modules
//!
//! - [`model`]: core record types (`Memory`, `Chunk`, `Project`, `Session`).
//! - [`config`]: on-disk TOML configuration and its defaults.
//! - [`error`]: the crate's error taxonomy (`thiserror`-derived, `#[non_exhaustive]`).
//! - [`storage`]: durable store (SQLite), BM25 lexical index, append-only event log.
//! - [`embeddings`]: local ONNX embedding generation (fastembed).
//! - [`search`]: dense vector index, BM25/vector fusion, cross-encoder reranker.
//! - [`chunker`]: document chunking for indexing and hierarchical summarization.
//! - [`classifier`]: schema-type classification for new memories.
//! - [`qam`]: query attribute extraction (project/topic/doc-type/severity).
//! - [`indexer`]: the single write path across the vector index, lexical index, and store.
//! - [`project_pool`]: per-project memory pools and graduated-degradation filtering.
//! - [`consolidation`]: clustering/merge, compression, promotion, and forgetting passes.
//! - [`scheduler`]: cron-driven consolidation triggers and the replay/regression harness.
//! - [`session`]: `start_session`/`add_event`/`end_session` transcript lifecycle.
//! - [`app`]: [`BrainContext`], the root object wiring every module into one search/ingest API.
//! - [`router`]: the LLM routing trait used for embeddings, summarization, and classification.
//! - [`ops`]: structured-logging decorators around operations.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use brain_core::{BrainContext, Config, SearchOptions};
//!
//! let brain = BrainContext::new(Config::load()?)?;
//! let memory_id = brain.ingest("what's our retry policy?", "exponential backoff, 5 tries", vec![], Default::default(), None).await?;
//! let results = brain.search("retry policy", SearchOptions::default()).await?;
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod app;
pub mod chunker;
pub mod classifier;
pub mod config;
pub mod consolidation;
pub mod embeddings;
pub mod error;
pub mod indexer;
pub mod model;
pub mod ops;
pub mod project_pool;
pub mod qam;
pub mod router;
pub mod scheduler;
pub mod search;
pub mod session;
pub mod storage;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use app::{BrainContext, SearchMetrics, SearchOptions, SearchResponse, SearchResult};

pub use model::{Chunk, EventLogEntry, Memory, MemoryTier, Project, SchemaType, Session};

pub use config::Config;

pub use error::{BrainError, ConsolidationError, IndexerError, RouterError, StoreError};

pub use storage::{EventLog, LexicalIndex, Store};

pub use embeddings::{cosine_similarity, Embedding, EmbeddingError, EmbeddingService, EMBEDDING_DIMENSIONS};

pub use search::{
    CandidateMeta, FusedCandidate, RerankCandidate, Reranker, RerankerMetrics, RerankedItem,
    VectorStore,
};

pub use qam::QueryAttributes;

pub use indexer::Indexer;

pub use project_pool::{PoolStats, ProjectPool};

pub use consolidation::{Consolidation, ConsolidationReport};

pub use scheduler::{ConsolidationTrigger, FeatureRow, ReplayCase, ReplayOutcome, ReplayReport};

pub use session::SessionManager;

pub use router::{LocalRouter, RouteRequest, Router, TaskType};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::{
        BrainContext, BrainError, Config, Memory, MemoryTier, Project, SchemaType,
        SearchMetrics, SearchOptions, SearchResponse, SearchResult, Session, Store,
    };

    pub use crate::{Embedding, EmbeddingService};
    pub use crate::{Reranker, VectorStore};
}
