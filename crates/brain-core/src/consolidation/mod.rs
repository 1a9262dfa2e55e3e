//! Consolidation / Forgetting (C11)
//!
//! Scheduled job (default daily, see C12): clusters near-duplicate memories
//! and merges them via an LLM summary, compresses old low-importance
//! memories, promotes memories up a tier on age or reference thresholds, and
//! forgets long-term memories that went both unimportant and unreferenced.
//! All mutations route through C6's [`Indexer`] so the durable store, C1, and
//! C2 never diverge.

use crate::chunker;
use crate::config::ConsolidationConfig;
use crate::embeddings::EmbeddingService;
use crate::error::ConsolidationError;
use crate::indexer::Indexer;
use crate::model::{Memory, MemoryTier};
use crate::ops::{self, OpContext};
use crate::router::{RouteRequest, Router, TaskType};
use crate::search::Reranker;
use crate::storage::Store;
use chrono::Utc;
use std::collections::HashMap;

const FORGET_IMPORTANCE_THRESHOLD: f64 = 0.1;
const FORGET_UNREFERENCED_DAYS: i64 = 180;
const PROMOTION_MIN_REFERENCES: u64 = 3;
const PROMOTION_IMPORTANCE_THRESHOLD: f64 = 0.6;

/// Exponential weighted-average smoothing rate for confidence updates.
pub const CONFIDENCE_DECAY_ALPHA: f64 = 0.1;
pub const CONFIDENCE_FLOOR: f64 = 0.1;
/// Geometric monthly decay applied to importance once a memory is past
/// `age_threshold_days`. Importance never increases on its own.
pub const IMPORTANCE_MONTHLY_DECAY: f64 = 0.05;

#[derive(Debug, Clone, Default)]
pub struct ConsolidationReport {
    pub clusters_merged: usize,
    pub memories_compressed: usize,
    pub memories_promoted: usize,
    pub memories_forgotten: usize,
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a < 1e-9 || norm_b < 1e-9 { 0.0 } else { dot / (norm_a * norm_b) }
}

/// Union-find over memory ids for clustering candidate merges.
struct UnionFind {
    parent: HashMap<String, String>,
}

impl UnionFind {
    fn new(ids: impl IntoIterator<Item = String>) -> Self {
        let parent = ids.into_iter().map(|id| (id.clone(), id)).collect();
        Self { parent }
    }

    fn find(&mut self, id: &str) -> String {
        let next = self.parent.get(id).cloned().unwrap_or_else(|| id.to_string());
        if next == id {
            return next;
        }
        let root = self.find(&next);
        self.parent.insert(id.to_string(), root.clone());
        root
    }

    fn union(&mut self, a: &str, b: &str) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent.insert(ra, rb);
        }
    }
}

pub struct Consolidation {
    config: ConsolidationConfig,
}

impl Consolidation {
    pub fn new(config: ConsolidationConfig) -> Self {
        Self { config }
    }

    /// Run every pass once, in order, and record completion. On startup the
    /// caller should check `last_run` against the stored history and trigger
    /// an immediate catch-up run if it is older than 24h.
    pub async fn run(
        &self,
        store: &Store,
        indexer: &Indexer<'_>,
        embedder: &EmbeddingService,
        router: &dyn Router,
        reranker: &Reranker,
        working_memory_retention_hours: i64,
    ) -> Result<ConsolidationReport, ConsolidationError> {
        let ctx = OpContext::new().backend("consolidation").inputs(format!("retention_hours={working_memory_retention_hours}"));
        ops::run_async("consolidation.run", ctx, || async {
            let mut report = ConsolidationReport::default();

            self.cluster_and_merge(store, indexer, embedder, router, reranker, &mut report).await?;
            self.compress_old_memories(store, indexer, &mut report)?;
            self.promote_tiers(store, indexer, working_memory_retention_hours, &mut report)?;
            self.forget_stale_long_term(store, indexer, reranker, &mut report)?;

            store
                .record_consolidation_run(
                    Utc::now(),
                    report.clusters_merged as u64,
                    report.memories_forgotten as u64,
                    report.memories_promoted as u64,
                )
                .map_err(|e| ConsolidationError::ClusteringFailed(e.to_string()))?;

            Ok(report)
        })
        .await
    }

    async fn cluster_and_merge(
        &self,
        store: &Store,
        indexer: &Indexer<'_>,
        embedder: &EmbeddingService,
        router: &dyn Router,
        reranker: &Reranker,
        report: &mut ConsolidationReport,
    ) -> Result<(), ConsolidationError> {
        let memories = store.all_memories().map_err(|e| ConsolidationError::ClusteringFailed(e.to_string()))?;
        let mut embeddings: HashMap<String, Vec<f32>> = HashMap::new();
        for memory in &memories {
            let text = if memory.summary.is_empty() { &memory.content } else { &memory.summary };
            if let Ok(embedding) = embedder.embed(text) {
                embeddings.insert(memory.id.clone(), embedding.vector);
            }
        }

        let mut uf = UnionFind::new(memories.iter().map(|m| m.id.clone()));
        for i in 0..memories.len() {
            for j in (i + 1)..memories.len() {
                let a = &memories[i];
                let b = &memories[j];
                if a.schema_type != b.schema_type {
                    continue;
                }
                let (Some(ea), Some(eb)) = (embeddings.get(&a.id), embeddings.get(&b.id)) else { continue };
                if cosine(ea, eb) >= self.config.similarity_threshold {
                    uf.union(&a.id, &b.id);
                }
            }
        }

        let mut clusters: HashMap<String, Vec<&Memory>> = HashMap::new();
        for memory in &memories {
            let root = uf.find(&memory.id);
            clusters.entry(root).or_default().push(memory);
        }

        for members in clusters.values() {
            if members.len() < self.config.min_cluster_size {
                continue;
            }
            self.merge_cluster(members, store, indexer, router, reranker).await?;
            report.clusters_merged += 1;
        }

        Ok(())
    }

    async fn merge_cluster(
        &self,
        members: &[&Memory],
        store: &Store,
        indexer: &Indexer<'_>,
        router: &dyn Router,
        reranker: &Reranker,
    ) -> Result<(), ConsolidationError> {
        let cluster_id = members.iter().map(|m| m.id.as_str()).collect::<Vec<_>>().join(",");
        let joined_content = members.iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join("\n---\n");

        let prompt = format!("merge these related memories into one summary:\n{joined_content}");
        let summary = router
            .route(RouteRequest::new(TaskType::MergeSummary, prompt))
            .await
            .map_err(|e| ConsolidationError::MergeFailed { cluster_id: cluster_id.clone(), reason: e.to_string() })?;

        let mut tags: Vec<String> = members.iter().flat_map(|m| m.tags.clone()).collect();
        tags.sort();
        tags.dedup();
        let mut refs: Vec<String> = members.iter().flat_map(|m| m.refs.clone()).collect();
        refs.sort();
        refs.dedup();
        let importance = members.iter().map(|m| m.importance).fold(0.0, f64::max);

        let mut merged = Memory::new(summary.clone(), members[0].schema_type);
        merged.summary = summary;
        merged.tags = tags;
        merged.refs = refs;
        merged.importance = importance;
        merged.project_id = members[0].project_id.clone();

        let metadata = std::collections::HashMap::new();
        let chunks = chunker::chunk_document(&merged.id, &merged.content, &metadata, chunker::DEFAULT_MAX_TOKENS);
        indexer
            .index_memory(&merged, &chunks)
            .map_err(|e| ConsolidationError::MergeFailed { cluster_id: cluster_id.clone(), reason: e.to_string() })?;

        for member in members {
            let mut superseded = (*member).clone();
            superseded.superseded_by = Some(merged.id.clone());
            store
                .upsert_memory(&superseded)
                .map_err(|e| ConsolidationError::MergeFailed { cluster_id: cluster_id.clone(), reason: e.to_string() })?;
            indexer
                .delete_memory(&member.id)
                .map_err(|e| ConsolidationError::MergeFailed { cluster_id: cluster_id.clone(), reason: e.to_string() })?;
            reranker.invalidate_candidate(&member.id);
        }

        Ok(())
    }

    fn compress_old_memories(
        &self,
        store: &Store,
        indexer: &Indexer<'_>,
        report: &mut ConsolidationReport,
    ) -> Result<(), ConsolidationError> {
        let memories = store.all_memories().map_err(|e| ConsolidationError::ClusteringFailed(e.to_string()))?;
        let now = Utc::now();
        for mut memory in memories {
            if memory.compressed || memory.superseded_by.is_some() {
                continue;
            }
            let age_days = (now - memory.created_at).num_days();
            if age_days > self.config.age_threshold_days && memory.importance < self.config.importance_threshold {
                if memory.summary.is_empty() {
                    memory.summary = extractive_summary(&memory.content, 64);
                }
                memory.content = memory.summary.clone();
                memory.compressed = true;
                indexer
                    .update_memory_fields(&memory)
                    .map_err(|e| ConsolidationError::ClusteringFailed(e.to_string()))?;
                report.memories_compressed += 1;
            }
        }
        Ok(())
    }

    fn promote_tiers(
        &self,
        store: &Store,
        indexer: &Indexer<'_>,
        working_memory_retention_hours: i64,
        report: &mut ConsolidationReport,
    ) -> Result<(), ConsolidationError> {
        let now = Utc::now();

        let working = store
            .list_memories_by_tier(MemoryTier::Working)
            .map_err(|e| ConsolidationError::ClusteringFailed(e.to_string()))?;
        for mut memory in working {
            let age_hours = (now - memory.created_at).num_hours();
            if age_hours > working_memory_retention_hours {
                memory.memory_type = MemoryTier::ShortTerm;
                indexer
                    .update_memory_fields(&memory)
                    .map_err(|e| ConsolidationError::ClusteringFailed(e.to_string()))?;
                report.memories_promoted += 1;
            }
        }

        let short_term = store
            .list_memories_by_tier(MemoryTier::ShortTerm)
            .map_err(|e| ConsolidationError::ClusteringFailed(e.to_string()))?;
        for mut memory in short_term {
            if memory.reference_count >= PROMOTION_MIN_REFERENCES || memory.importance >= PROMOTION_IMPORTANCE_THRESHOLD {
                memory.memory_type = MemoryTier::LongTerm;
                indexer
                    .update_memory_fields(&memory)
                    .map_err(|e| ConsolidationError::ClusteringFailed(e.to_string()))?;
                report.memories_promoted += 1;
            }
        }

        Ok(())
    }

    fn forget_stale_long_term(
        &self,
        store: &Store,
        indexer: &Indexer<'_>,
        reranker: &Reranker,
        report: &mut ConsolidationReport,
    ) -> Result<(), ConsolidationError> {
        let now = Utc::now();
        let long_term = store
            .list_memories_by_tier(MemoryTier::LongTerm)
            .map_err(|e| ConsolidationError::ClusteringFailed(e.to_string()))?;

        for memory in long_term {
            let unreferenced_days = (now - memory.last_referenced_at).num_days();
            if memory.importance < FORGET_IMPORTANCE_THRESHOLD && unreferenced_days >= FORGET_UNREFERENCED_DAYS {
                indexer
                    .delete_memory(&memory.id)
                    .map_err(|e| ConsolidationError::ClusteringFailed(e.to_string()))?;
                reranker.invalidate_candidate(&memory.id);
                report.memories_forgotten += 1;
            }
        }

        Ok(())
    }
}

fn extractive_summary(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        text.to_string()
    } else {
        format!("{}...", words[..max_words].join(" "))
    }
}

/// Update `confidence` after a reference outcome via exponential
/// weighted-average smoothing, floored at [`CONFIDENCE_FLOOR`].
pub fn decay_confidence(confidence: f64, outcome_used: bool) -> f64 {
    let outcome = if outcome_used { 1.0 } else { 0.0 };
    (confidence + CONFIDENCE_DECAY_ALPHA * (outcome - confidence)).max(CONFIDENCE_FLOOR)
}

/// Decay `importance` geometrically at [`IMPORTANCE_MONTHLY_DECAY`] per month
/// once `age_days` exceeds `age_threshold_days`. Never increases.
pub fn decay_importance(importance: f64, age_days: i64, age_threshold_days: i64) -> f64 {
    if age_days <= age_threshold_days {
        return importance;
    }
    let months_over = ((age_days - age_threshold_days) as f64 / 30.0).max(0.0);
    importance * (1.0 - IMPORTANCE_MONTHLY_DECAY).powf(months_over)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_decays_toward_outcome() {
        let decayed = decay_confidence(0.5, true);
        assert!(decayed > 0.5);
        let decayed = decay_confidence(0.5, false);
        assert!(decayed < 0.5);
    }

    #[test]
    fn confidence_never_drops_below_floor() {
        let mut confidence = 0.2;
        for _ in 0..50 {
            confidence = decay_confidence(confidence, false);
        }
        assert!(confidence >= CONFIDENCE_FLOOR);
    }

    #[test]
    fn importance_unchanged_before_threshold() {
        assert_eq!(decay_importance(0.8, 10, 30), 0.8);
    }

    #[test]
    fn importance_decays_geometrically_past_threshold() {
        let decayed = decay_importance(0.8, 30 + 30, 30);
        assert!(decayed < 0.8);
        assert!(decayed > 0.0);
    }

    #[test]
    fn union_find_merges_transitively() {
        let mut uf = UnionFind::new(["a".to_string(), "b".to_string(), "c".to_string()]);
        uf.union("a", "b");
        uf.union("b", "c");
        assert_eq!(uf.find("a"), uf.find("c"));
    }
}
