//! Project Memory Pool (C10)
//!
//! Pre-warms C9's L3 cache with a project's memories so the first query
//! against that project does not pay a cold-cache LLM round trip, and
//! implements the graduated degradation protocol that falls back to
//! unfiltered candidates when the project pool doesn't have enough signal.

use crate::config::ProjectConfig;
use crate::embeddings::EmbeddingService;
use crate::error::IndexerError;
use crate::search::{FusedCandidate, Reranker};
use crate::storage::Store;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Candidates whose parent memory is in the pool pass `filter`; a fallback
/// below this score floor is treated as insufficient signal.
const DEFAULT_SCORE_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone)]
pub struct PoolStats {
    pub pool_loaded_at: DateTime<Utc>,
    pub memories_loaded: usize,
    pub cache_entries_added: usize,
}

struct PoolEntry {
    memory_ids: HashSet<String>,
    loaded_at: Instant,
    stats: PoolStats,
}

/// Per-project warm memory pool.
pub struct ProjectPool {
    config: ProjectConfig,
    pools: Mutex<HashMap<String, PoolEntry>>,
}

impl ProjectPool {
    pub fn new(config: ProjectConfig) -> Self {
        Self { config, pools: Mutex::new(HashMap::new()) }
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.config.pool_ttl_seconds)
    }

    fn is_fresh(&self, entry: &PoolEntry) -> bool {
        entry.loaded_at.elapsed() < self.ttl()
    }

    /// Load up to `max_memories` memories for `project_id`, embed their
    /// summaries, and seed C9's L3 cache with `(summary_embedding,
    /// prior_score=importance)` per memory id.
    pub fn warm(
        &self,
        project_id: &str,
        store: &Store,
        embedder: &EmbeddingService,
        reranker: &Reranker,
    ) -> Result<PoolStats, IndexerError> {
        let memories = store.list_memories_for_project(project_id)?;
        let capped: Vec<_> = memories.into_iter().take(self.config.max_memories).collect();

        let mut cache_entries_added = 0usize;
        let mut memory_ids = HashSet::with_capacity(capped.len());
        for memory in &capped {
            memory_ids.insert(memory.id.clone());
            let summary = if memory.summary.is_empty() { &memory.content } else { &memory.summary };
            if let Ok(embedding) = embedder.embed(summary) {
                if reranker.seed_l3(&memory.id, &embedding.vector, memory.importance as f32) {
                    cache_entries_added += 1;
                }
            }
        }

        let stats = PoolStats {
            pool_loaded_at: Utc::now(),
            memories_loaded: capped.len(),
            cache_entries_added,
        };

        self.pools.lock().unwrap().insert(
            project_id.to_string(),
            PoolEntry { memory_ids, loaded_at: Instant::now(), stats: stats.clone() },
        );

        Ok(stats)
    }

    /// Evict a project's pool explicitly.
    pub fn evict(&self, project_id: &str) {
        self.pools.lock().unwrap().remove(project_id);
    }

    /// The set of memory ids in a project's pool, empty if not warmed or expired.
    pub fn memory_ids(&self, project_id: &str) -> HashSet<String> {
        let pools = self.pools.lock().unwrap();
        match pools.get(project_id) {
            Some(entry) if self.is_fresh(entry) => entry.memory_ids.clone(),
            _ => HashSet::new(),
        }
    }

    pub fn stats(&self, project_id: &str) -> Option<PoolStats> {
        let pools = self.pools.lock().unwrap();
        pools.get(project_id).filter(|e| self.is_fresh(e)).map(|e| e.stats.clone())
    }

    /// Subset of `candidates` whose parent memory is in the pool.
    pub fn filter(&self, candidates: &[FusedCandidate], project_id: &str) -> Vec<FusedCandidate> {
        let ids = self.memory_ids(project_id);
        candidates.iter().filter(|c| ids.contains(&c.memory_id)).cloned().collect()
    }

    /// Graduated degradation protocol: apply the pool filter only when the
    /// project is confident enough and the filtered set still has enough
    /// high-scoring candidates; otherwise fall back to the unfiltered set.
    pub fn apply_graduated_filter(
        &self,
        candidates: Vec<FusedCandidate>,
        project_id: Option<&str>,
        project_confidence: f64,
        top_k: usize,
        theta_proj: f64,
        theta_score: f64,
    ) -> Vec<FusedCandidate> {
        let Some(project_id) = project_id else { return candidates };
        if project_confidence < theta_proj {
            return candidates;
        }

        let filtered = self.filter(&candidates, project_id);
        let enough_candidates = filtered.len() >= top_k;
        let top_k_strong = filtered
            .iter()
            .take(top_k)
            .map(|c| c.composite_score)
            .fold(f64::INFINITY, f64::min);

        if enough_candidates && top_k_strong >= theta_score {
            filtered
        } else {
            tracing::info!(project_id, "pool_insufficient");
            candidates
        }
    }
}

impl Default for ProjectPool {
    fn default() -> Self {
        Self::new(ProjectConfig::default())
    }
}

pub const DEFAULT_PROJECT_SCORE_THRESHOLD: f64 = DEFAULT_SCORE_THRESHOLD;

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(memory_id: &str, score: f64) -> FusedCandidate {
        FusedCandidate { candidate_id: format!("{memory_id}-chunk-0"), memory_id: memory_id.to_string(), composite_score: score }
    }

    #[test]
    fn memory_ids_empty_before_warm() {
        let pool = ProjectPool::default();
        assert!(pool.memory_ids("proj-1").is_empty());
    }

    #[test]
    fn filter_keeps_only_pooled_memories() {
        let pool = ProjectPool::default();
        pool.pools.lock().unwrap().insert(
            "proj-1".to_string(),
            PoolEntry {
                memory_ids: ["mem-1".to_string()].into_iter().collect(),
                loaded_at: Instant::now(),
                stats: PoolStats { pool_loaded_at: Utc::now(), memories_loaded: 1, cache_entries_added: 1 },
            },
        );

        let candidates = vec![candidate("mem-1", 0.9), candidate("mem-2", 0.8)];
        let filtered = pool.filter(&candidates, "proj-1");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].memory_id, "mem-1");
    }

    #[test]
    fn graduated_filter_falls_back_when_confidence_low() {
        let pool = ProjectPool::default();
        let candidates = vec![candidate("mem-1", 0.9)];
        let result = pool.apply_graduated_filter(candidates.clone(), Some("proj-1"), 0.5, 1, 0.75, 0.3);
        assert_eq!(result.len(), candidates.len());
    }

    #[test]
    fn graduated_filter_falls_back_when_filtered_set_too_weak() {
        let pool = ProjectPool::default();
        pool.pools.lock().unwrap().insert(
            "proj-1".to_string(),
            PoolEntry {
                memory_ids: ["mem-1".to_string()].into_iter().collect(),
                loaded_at: Instant::now(),
                stats: PoolStats { pool_loaded_at: Utc::now(), memories_loaded: 1, cache_entries_added: 1 },
            },
        );
        let candidates = vec![candidate("mem-1", 0.1), candidate("mem-2", 0.9)];
        let result = pool.apply_graduated_filter(candidates.clone(), Some("proj-1"), 0.9, 1, 0.75, 0.3);
        assert_eq!(result.len(), candidates.len());
    }
}
