//! Hybrid Search Fusion (C8)
//!
//! Combines BM25 (C2) and dense vector (C1) candidate lists into one ranked
//! set via a weighted composite score, then collapses chunk-level hits down
//! to their parent memory, keeping the chunk with the highest score.

use crate::config::WeightsConfig;
use crate::model::clamp01;
use std::collections::HashMap;

/// Recency half-life-ish decay constant (days), per §4.8.
pub const DEFAULT_RECENCY_TAU_DAYS: f64 = 30.0;

/// Fixed bonus applied per matching attribute filter, capped (§4.8).
const METADATA_BONUS_PER_MATCH: f64 = 0.05;
const METADATA_BONUS_CAP: f64 = 0.2;

/// Fixed per-domain trust weight for a single reference (§4.8/§9).
fn domain_trust(reference: &str) -> f64 {
    if reference.contains("github.com") {
        0.9
    } else if reference.contains("stackoverflow.com") {
        0.8
    } else if reference.starts_with('/') || reference.starts_with("internal://") || reference.contains("/docs/") {
        0.95
    } else {
        0.4
    }
}

/// `refs_reliability`: bounded sum over a memory's reference domains' trust
/// weights (§9 Open Question resolution).
pub fn refs_reliability(refs: &[String]) -> f64 {
    refs.iter().map(|r| domain_trust(r)).sum::<f64>().min(1.0)
}

/// Per-candidate fields pulled from the durable store, needed to compute the
/// non-lexical/non-vector score components.
#[derive(Debug, Clone)]
pub struct CandidateMeta {
    pub memory_id: String,
    pub importance: f64,
    pub age_days: f64,
    pub refs_reliability: f64,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FusedCandidate {
    pub candidate_id: String,
    pub memory_id: String,
    pub composite_score: f64,
}

pub(crate) fn min_max_normalize(scores: &HashMap<String, f32>) -> HashMap<String, f64> {
    if scores.is_empty() {
        return HashMap::new();
    }
    let min = scores.values().cloned().fold(f32::INFINITY, f32::min) as f64;
    let max = scores.values().cloned().fold(f32::NEG_INFINITY, f32::max) as f64;
    let spread = max - min;
    scores
        .iter()
        .map(|(k, &v)| {
            let norm = if spread > 1e-9 { (v as f64 - min) / spread } else { 1.0 };
            (k.clone(), norm)
        })
        .collect()
}

fn metadata_bonus(tags: &[String], attribute_filters: &[String]) -> f64 {
    if attribute_filters.is_empty() {
        return 0.0;
    }
    let matches = attribute_filters.iter().filter(|f| tags.iter().any(|t| t == *f)).count();
    (matches as f64 * METADATA_BONUS_PER_MATCH).min(METADATA_BONUS_CAP)
}

/// The six weighted score components behind a composite score, in the order
/// `[memory_strength, recency, refs_reliability, bm25_norm, vector_sim,
/// metadata_bonus]`, for §4.12's feature export.
pub fn component_breakdown(
    meta: &CandidateMeta,
    bm25_norm: f64,
    vector_norm: f64,
    attribute_filters: &[String],
) -> [f64; 6] {
    [
        clamp01(meta.importance),
        (-meta.age_days.max(0.0) / DEFAULT_RECENCY_TAU_DAYS).exp(),
        clamp01(meta.refs_reliability),
        bm25_norm,
        vector_norm,
        metadata_bonus(&meta.tags, attribute_filters),
    ]
}

/// Fuse BM25 and vector candidate lists into a ranked, deduplicated-by-memory
/// list of at most `candidate_count` entries.
///
/// `lookup` resolves a candidate (chunk) id to the metadata needed for the
/// non-lexical score components; candidates with no lookup hit are dropped
/// (the chunk was deleted after the index returned it).
pub fn fuse(
    bm25_hits: &[(String, f32)],
    vector_hits: &[(String, f32)],
    lookup: impl Fn(&str) -> Option<CandidateMeta>,
    weights: &WeightsConfig,
    attribute_filters: &[String],
    candidate_count: usize,
) -> Vec<FusedCandidate> {
    if bm25_hits.is_empty() && vector_hits.is_empty() {
        return vec![];
    }

    let bm25_map: HashMap<String, f32> = bm25_hits.iter().cloned().collect();
    let vector_map: HashMap<String, f32> = vector_hits.iter().cloned().collect();
    let bm25_norm = min_max_normalize(&bm25_map);
    let vector_norm = min_max_normalize(&vector_map);

    let mut candidate_ids: Vec<String> = bm25_map.keys().chain(vector_map.keys()).cloned().collect();
    candidate_ids.sort();
    candidate_ids.dedup();

    let mut per_chunk: Vec<(String, String, f64)> = Vec::with_capacity(candidate_ids.len());
    for id in candidate_ids {
        let Some(meta) = lookup(&id) else { continue };

        let memory_strength = clamp01(meta.importance);
        let recency = (-meta.age_days.max(0.0) / DEFAULT_RECENCY_TAU_DAYS).exp();
        let refs = clamp01(meta.refs_reliability);
        let bm25_score = bm25_norm.get(&id).copied().unwrap_or(0.0);
        let vector_score = vector_norm.get(&id).copied().unwrap_or(0.0);
        let bonus = metadata_bonus(&meta.tags, attribute_filters);

        let composite = weights.memory_strength * memory_strength
            + weights.recency * recency
            + weights.refs_reliability * refs
            + weights.bm25 * bm25_score
            + weights.vector * vector_score
            + weights.metadata * bonus;

        per_chunk.push((id, meta.memory_id, composite));
    }

    // Collapse to one candidate per memory: keep the max-scoring chunk.
    let mut best_per_memory: HashMap<String, (String, f64)> = HashMap::new();
    for (chunk_id, memory_id, score) in per_chunk {
        best_per_memory
            .entry(memory_id)
            .and_modify(|(existing_id, existing_score)| {
                if score > *existing_score {
                    *existing_id = chunk_id.clone();
                    *existing_score = score;
                }
            })
            .or_insert((chunk_id, score));
    }

    let mut fused: Vec<FusedCandidate> = best_per_memory
        .into_iter()
        .map(|(memory_id, (candidate_id, composite_score))| FusedCandidate {
            candidate_id,
            memory_id,
            composite_score,
        })
        .collect();

    fused.sort_by(|a, b| {
        b.composite_score
            .partial_cmp(&a.composite_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.memory_id.cmp(&b.memory_id))
    });
    fused.truncate(candidate_count);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(memory_id: &str) -> CandidateMeta {
        CandidateMeta {
            memory_id: memory_id.to_string(),
            importance: 0.5,
            age_days: 1.0,
            refs_reliability: 0.0,
            tags: vec![],
        }
    }

    #[test]
    fn empty_bm25_and_vector_yields_empty_result() {
        let result = fuse(&[], &[], |_| None, &WeightsConfig::default(), &[], 10);
        assert!(result.is_empty());
    }

    #[test]
    fn empty_bm25_proceeds_with_vector_only() {
        let vector_hits = vec![("mem-1-chunk-0".to_string(), 0.9)];
        let result = fuse(&[], &vector_hits, |_| Some(meta("mem-1")), &WeightsConfig::default(), &[], 10);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].memory_id, "mem-1");
    }

    #[test]
    fn chunks_collapse_to_max_scoring_per_memory() {
        let bm25 = vec![("mem-1-chunk-0".to_string(), 0.1), ("mem-1-chunk-1".to_string(), 0.9)];
        let result = fuse(&bm25, &[], |_| Some(meta("mem-1")), &WeightsConfig::default(), &[], 10);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].candidate_id, "mem-1-chunk-1");
    }

    #[test]
    fn truncates_to_candidate_count() {
        let bm25: Vec<(String, f32)> = (0..5).map(|i| (format!("mem-{i}-chunk-0"), i as f32)).collect();
        let result = fuse(
            &bm25,
            &[],
            |id| Some(meta(id.split("-chunk-").next().unwrap())),
            &WeightsConfig::default(),
            &[],
            2,
        );
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn metadata_bonus_boosts_matching_tags() {
        let mut tagged = meta("mem-1");
        tagged.tags = vec!["rust".to_string()];
        let bm25 = vec![("mem-1-chunk-0".to_string(), 0.5)];
        let with_filter = fuse(&bm25, &[], |_| Some(tagged.clone()), &WeightsConfig::default(), &["rust".to_string()], 10);
        let without_filter = fuse(&bm25, &[], |_| Some(tagged.clone()), &WeightsConfig::default(), &[], 10);
        assert!(with_filter[0].composite_score > without_filter[0].composite_score);
    }

    #[test]
    fn missing_lookup_drops_candidate() {
        let bm25 = vec![("ghost-chunk-0".to_string(), 0.9)];
        let result = fuse(&bm25, &[], |_| None, &WeightsConfig::default(), &[], 10);
        assert!(result.is_empty());
    }

    #[test]
    fn refs_reliability_sums_known_domains_and_clamps() {
        let refs = vec!["https://github.com/foo/bar".to_string(), "https://stackoverflow.com/q/1".to_string()];
        assert_eq!(refs_reliability(&refs), 1.0);
    }

    #[test]
    fn refs_reliability_defaults_unknown_domains_low() {
        let refs = vec!["https://example.com/post".to_string()];
        assert_eq!(refs_reliability(&refs), 0.4);
    }

    #[test]
    fn refs_reliability_of_no_refs_is_zero() {
        assert_eq!(refs_reliability(&[]), 0.0);
    }
}
