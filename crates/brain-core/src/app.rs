//! `BrainContext` (§6 External Interfaces)
//!
//! The root object wiring C1-C12 together: one instance each of the durable
//! store, the dual retrieval indices, the embedding service, the router, the
//! reranker, the project pool, the session manager, and consolidation. This
//! is the crate's public entrypoint; callers construct one `BrainContext`
//! per data directory.

use crate::chunker;
use crate::classifier;
use crate::config::Config;
use crate::consolidation::{Consolidation, ConsolidationReport};
use crate::embeddings::EmbeddingService;
use crate::error::BrainError;
use crate::indexer::Indexer;
use crate::model::{Memory, Project, SchemaType};
use crate::project_pool::ProjectPool;
use crate::qam;
use crate::router::{LocalRouter, Router};
use crate::scheduler::ConsolidationTrigger;
use crate::search::{self, CandidateMeta, RerankCandidate, Reranker, VectorStore};
use crate::session::SessionManager;
use crate::storage::{EventLog, LexicalIndex, Store};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One ranked search hit, with the per-feature components behind its score
/// (§6 `components`, consumed by §4.12's feature export).
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: String,
    pub score: f64,
    pub content: String,
    pub summary: String,
    pub metadata: HashMap<String, String>,
    pub components: [f64; 6],
}

#[derive(Debug, Clone, Default)]
pub struct SearchMetrics {
    pub llm_calls: u64,
    pub cache_l1_hits: u64,
    pub cache_l2_hits: u64,
    pub cache_l3_hits: u64,
    pub cache_misses: u64,
    pub rerank_failures: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub metrics: SearchMetrics,
}

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub top_k: Option<usize>,
    pub project_id: Option<String>,
    pub schema_filter: Option<SchemaType>,
    pub attribute_hints: Option<qam::QueryAttributes>,
}

pub struct BrainContext {
    config: Config,
    store: Store,
    event_log: EventLog,
    vector: Mutex<VectorStore>,
    lexical: Mutex<LexicalIndex>,
    embedder: EmbeddingService,
    router: Arc<dyn Router>,
    reranker: Arc<Reranker>,
    project_pool: ProjectPool,
    sessions: SessionManager,
    consolidation: Consolidation,
    trigger: ConsolidationTrigger,
    qam_cost_budget: qam::CostBudget,
}

impl BrainContext {
    pub fn new(config: Config) -> Result<Self, BrainError> {
        config.validate()?;
        let data_dir = config.resolved_data_dir();
        let store = Store::new(Some(data_dir.join("memories.db")))?;
        let event_log = EventLog::new(data_dir.join("events.jsonl"));
        let vector = Mutex::new(VectorStore::new()?);
        let lexical = Mutex::new(LexicalIndex::new());
        let embedder = EmbeddingService::new();
        let router: Arc<dyn Router> = Arc::new(LocalRouter::new());
        let reranker = Arc::new(Reranker::new(config.reranker.clone()));
        let project_pool = ProjectPool::new(config.project.clone());
        let consolidation = Consolidation::new(config.consolidation.clone());
        let trigger = ConsolidationTrigger::new(&config.consolidation.schedule, chrono::Duration::hours(1))?;
        let qam_cost_budget = qam::CostBudget::new(config.qam.llm_call_budget);

        Ok(Self {
            config,
            store,
            event_log,
            vector,
            lexical,
            embedder,
            router,
            reranker,
            project_pool,
            sessions: SessionManager::new(),
            consolidation,
            trigger,
            qam_cost_budget,
        })
    }

    fn indexer(&self) -> Indexer<'_> {
        Indexer::new(&self.vector, &self.lexical, &self.store, &self.event_log, &self.embedder)
    }

    /// Ingest one `(user, assistant)` turn as a memory: classify its schema,
    /// chunk it, embed and index it. Idempotent when `metadata` carries an
    /// `external_id` already seen — the existing memory is updated in place.
    pub async fn ingest(
        &self,
        user_text: &str,
        assistant_text: &str,
        refs: Vec<String>,
        metadata: HashMap<String, String>,
        project_id: Option<String>,
    ) -> Result<String, BrainError> {
        let (schema_type, _confidence) = classifier::classify(user_text, assistant_text, &metadata, self.router.as_ref()).await;

        let content = format!("{user_text}\n\n{assistant_text}");
        let mut memory = match metadata.get("external_id").and_then(|id| self.find_by_external_id(id)) {
            Some(existing) => existing,
            None => Memory::new(content.clone(), schema_type),
        };
        memory.content = content;
        memory.schema_type = schema_type;
        memory.refs = refs;
        memory.project_id = project_id;

        let chunks = chunker::chunk_document(&memory.id, &memory.content, &metadata, chunker::DEFAULT_MAX_TOKENS);
        self.indexer().index_memory(&memory, &chunks)?;
        Ok(memory.id)
    }

    fn find_by_external_id(&self, external_id: &str) -> Option<Memory> {
        self.store
            .all_memories()
            .ok()?
            .into_iter()
            .find(|m| m.refs.iter().any(|r| r == external_id))
    }

    /// Run the full retrieval pipeline: BM25 + vector candidate generation,
    /// C8 fusion, the project pool's graduated filter, and C9 reranking.
    pub async fn search(&self, query: &str, options: SearchOptions) -> Result<SearchResponse, BrainError> {
        let top_k = options.top_k.unwrap_or(self.config.search.top_k);
        let query_embedding = self.embedder.embed(query).map_err(|e| {
            crate::error::IndexerError::Embedding(e.to_string())
        })?.vector;

        // BM25 and vector search are independent, CPU-bound, Mutex-guarded
        // lookups; run them on parallel threads rather than one after another.
        let candidate_count = self.config.search.candidate_count;
        let (bm25_hits, vector_hits) = std::thread::scope(|scope| {
            let bm25_handle = scope.spawn(|| self.lexical.lock().unwrap().search(query, candidate_count));
            let vector_handle =
                scope.spawn(|| self.vector.lock().unwrap().search_filtered(&query_embedding, candidate_count, |_| true));
            (bm25_handle.join().unwrap(), vector_handle.join().unwrap())
        });
        let vector_hits = vector_hits?;

        let known_projects: Vec<String> =
            self.store.list_projects()?.into_iter().map(|p| p.id).collect();
        let attributes = match options.attribute_hints.clone() {
            Some(hints) => hints,
            None => {
                qam::extract(query, &known_projects, self.router.as_ref(), self.config.qam.llm_fallback_enabled, &self.qam_cost_budget)
                    .await
            }
        };

        let weights = self.config.weights.clone();
        let attribute_filters: Vec<String> = [attributes.topic.clone(), attributes.doc_type.clone(), attributes.severity.clone()]
            .into_iter()
            .flatten()
            .collect();

        let bm25_map: HashMap<String, f32> = bm25_hits.iter().cloned().collect();
        let vector_map: HashMap<String, f32> = vector_hits.iter().cloned().collect();
        let bm25_norm = search::min_max_normalize(&bm25_map);
        let vector_norm = search::min_max_normalize(&vector_map);

        let fused = search::fuse(
            &bm25_hits,
            &vector_hits,
            |candidate_id| self.lookup_candidate_meta(candidate_id),
            &weights,
            &attribute_filters,
            self.config.search.candidate_count,
        );

        let fused = self.project_pool.apply_graduated_filter(
            fused,
            options.project_id.as_deref(),
            attributes.confidence,
            top_k,
            self.config.project.prefetch_min_confidence,
            crate::project_pool::DEFAULT_PROJECT_SCORE_THRESHOLD,
        );

        let schema_filtered: Vec<_> = match options.schema_filter {
            Some(filter) => fused
                .into_iter()
                .filter(|c| self.store.get_memory(&c.memory_id).map(|m| m.schema_type == filter).unwrap_or(false))
                .collect(),
            None => fused,
        };

        let rerank_candidates: Vec<RerankCandidate> = schema_filtered
            .iter()
            .filter_map(|c| {
                let memory = self.store.get_memory(&c.memory_id).ok()?;
                Some(RerankCandidate {
                    candidate_id: c.candidate_id.clone(),
                    text: memory.content,
                    composite_score: c.composite_score,
                })
            })
            .collect();

        let kw_sig = search::keyword_signature(query, &self.lexical.lock().unwrap());
        let reranked = self
            .reranker
            .rerank(query, &query_embedding, rerank_candidates, Arc::clone(&self.router), &kw_sig, Some(Duration::from_secs(5)), top_k)
            .await;

        let memory_by_candidate: HashMap<String, String> =
            schema_filtered.iter().map(|c| (c.candidate_id.clone(), c.memory_id.clone())).collect();

        let mut results = Vec::with_capacity(reranked.len());
        for item in &reranked {
            let Some(memory_id) = memory_by_candidate.get(&item.candidate_id) else { continue };
            let Ok(mut memory) = self.store.get_memory(memory_id) else { continue };
            let meta = self.lookup_candidate_meta(&item.candidate_id);
            let components = meta
                .map(|m| {
                    search::component_breakdown(
                        &m,
                        bm25_norm.get(&item.candidate_id).copied().unwrap_or(0.0),
                        vector_norm.get(&item.candidate_id).copied().unwrap_or(0.0),
                        &attribute_filters,
                    )
                })
                .unwrap_or([0.0; 6]);

            memory.mark_referenced();
            self.indexer().update_memory_fields(&memory)?;

            results.push(SearchResult {
                id: memory.id.clone(),
                score: item.score as f64,
                content: memory.content,
                summary: memory.summary,
                metadata: HashMap::new(),
                components,
            });
        }

        let metrics = SearchMetrics {
            llm_calls: self.reranker.metrics.llm_calls.load(std::sync::atomic::Ordering::Relaxed),
            cache_l1_hits: self.reranker.metrics.l1_hits.load(std::sync::atomic::Ordering::Relaxed),
            cache_l2_hits: self.reranker.metrics.l2_hits.load(std::sync::atomic::Ordering::Relaxed),
            cache_l3_hits: self.reranker.metrics.l3_hits.load(std::sync::atomic::Ordering::Relaxed),
            cache_misses: self.reranker.metrics.misses.load(std::sync::atomic::Ordering::Relaxed),
            rerank_failures: self.reranker.metrics.failures.load(std::sync::atomic::Ordering::Relaxed),
        };

        Ok(SearchResponse { results, metrics })
    }

    fn lookup_candidate_meta(&self, candidate_id: &str) -> Option<CandidateMeta> {
        let (memory_id, _) = crate::model::Chunk::parse_id(candidate_id)?;
        let memory = self.store.get_memory(&memory_id).ok()?;
        Some(CandidateMeta {
            memory_id: memory.id,
            importance: memory.importance,
            age_days: memory.age().num_seconds() as f64 / 86_400.0,
            refs_reliability: search::refs_reliability(&memory.refs),
            tags: memory.tags,
        })
    }

    pub async fn search_in_project(&self, project_id: &str, query: &str, options: SearchOptions) -> Result<SearchResponse, BrainError> {
        let mut options = options;
        options.project_id = Some(project_id.to_string());
        self.search(query, options).await
    }

    pub fn create_project(&self, name: &str, description: &str) -> Result<String, BrainError> {
        let project = Project::new(name, description);
        self.store.upsert_project(&project)?;
        Ok(project.id)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>, BrainError> {
        Ok(self.store.list_projects()?)
    }

    /// Pre-warm a project's memory pool and seed C9's L3 cache.
    pub fn prefetch_project(&self, project_id: &str) -> Result<crate::project_pool::PoolStats, BrainError> {
        Ok(self.project_pool.warm(project_id, &self.store, &self.embedder, &self.reranker)?)
    }

    pub fn start_session(&self, project_id: Option<String>) -> Result<String, BrainError> {
        self.sessions.start_session(&self.store, project_id)
    }

    pub fn add_event(&self, session_id: &str, kind: &str, text: &str) -> Result<(), BrainError> {
        self.sessions.add_event(&self.event_log, session_id, kind, text)
    }

    pub async fn end_session(&self, session_id: &str, project_id: Option<String>) -> Result<String, BrainError> {
        self.sessions.end_session(&self.store, session_id, self.router.as_ref(), &self.indexer(), project_id).await
    }

    /// Run C11 now if the cron schedule says it's due (or has never run).
    pub async fn run_consolidation_if_due(&self) -> Result<Option<ConsolidationReport>, BrainError> {
        let last_run = self.store.last_consolidation_run()?;
        let now = Utc::now();
        if !self.trigger.is_due(last_run, now) {
            return Ok(None);
        }
        if self.trigger.missed_grace_window(last_run, now) {
            tracing::warn!("consolidation run missed its misfire grace window, running as catch-up");
        }

        let report = self
            .consolidation
            .run(
                &self.store,
                &self.indexer(),
                &self.embedder,
                self.router.as_ref(),
                &self.reranker,
                self.config.working_memory.retention_hours,
            )
            .await?;
        Ok(Some(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore = "requires the local embedding model"]
    fn context_constructs_with_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = Some(dir.path().to_path_buf());
        let ctx = BrainContext::new(config);
        assert!(ctx.is_ok());
    }
}
