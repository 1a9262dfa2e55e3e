//! Scheduler & Regression Harness (C12)
//!
//! Drives C11 on a cron-like schedule with a misfire grace window, and runs
//! a replay/regression harness over a fixture of canonical queries to catch
//! retrieval-quality regressions before they reach users.

use crate::error::ConsolidationError;
use crate::model::SchemaType;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

/// Default allowed precision drop before the regression gate trips.
pub const DEFAULT_REGRESSION_DELTA: f64 = 0.02;
/// Default absolute precision floor the regression gate enforces.
pub const DEFAULT_REGRESSION_FLOOR: f64 = 0.80;

/// Drives C11 on `config.schedule`. The underlying `cron` crate parses
/// 6-field (seconds-first) expressions; a 5-field standard cron string is
/// widened by prefixing a `0` seconds field.
pub struct ConsolidationTrigger {
    schedule: Schedule,
    misfire_grace: chrono::Duration,
}

impl ConsolidationTrigger {
    pub fn new(cron_expr: &str, misfire_grace: chrono::Duration) -> Result<Self, ConsolidationError> {
        let widened = widen_to_six_fields(cron_expr);
        let schedule = Schedule::from_str(&widened)
            .map_err(|e| ConsolidationError::ClusteringFailed(format!("invalid cron expression: {e}")))?;
        Ok(Self { schedule, misfire_grace })
    }

    /// True if a run is due: either a scheduled fire time has passed since
    /// `last_run` (within the misfire grace window), or no run has ever
    /// completed.
    pub fn is_due(&self, last_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let Some(last_run) = last_run else { return true };
        match self.schedule.after(&last_run).next() {
            Some(next_fire) => now >= next_fire && now - next_fire <= self.misfire_grace,
            None => false,
        }
    }

    /// True if the caller missed the grace window entirely and should log a
    /// skipped run rather than attempt a stale catch-up.
    pub fn missed_grace_window(&self, last_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let Some(last_run) = last_run else { return false };
        match self.schedule.after(&last_run).next() {
            Some(next_fire) => now > next_fire + self.misfire_grace,
            None => false,
        }
    }
}

fn widen_to_six_fields(expr: &str) -> String {
    let fields = expr.split_whitespace().count();
    if fields <= 5 { format!("0 {expr}") } else { expr.to_string() }
}

/// One canonical replay fixture entry: a query plus the ids judged relevant.
#[derive(Debug, Clone)]
pub struct ReplayCase {
    pub query: String,
    pub expected_relevant_ids: Vec<String>,
    pub project_id: Option<String>,
    pub schema_filter: Option<SchemaType>,
}

/// The ranked ids and rerank scores produced for a single replay query.
#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    pub query: String,
    pub ranked_ids: Vec<String>,
    pub llm_calls: u64,
    pub cache_hits: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ReplayReport {
    pub macro_precision_at_k: f64,
    pub macro_ndcg_at_k: f64,
    pub total_llm_calls: u64,
    pub total_cache_hits: u64,
    pub zero_hit_queries: Vec<String>,
}

fn precision_at_k(ranked_ids: &[String], relevant: &[String], k: usize) -> f64 {
    if k == 0 {
        return 0.0;
    }
    let top_k = &ranked_ids[..ranked_ids.len().min(k)];
    let hits = top_k.iter().filter(|id| relevant.contains(id)).count();
    hits as f64 / k as f64
}

fn dcg_at_k(ranked_ids: &[String], relevant: &[String], k: usize) -> f64 {
    ranked_ids
        .iter()
        .take(k)
        .enumerate()
        .map(|(i, id)| {
            let rel = if relevant.contains(id) { 1.0 } else { 0.0 };
            rel / ((i as f64 + 2.0).log2())
        })
        .sum()
}

fn ndcg_at_k(ranked_ids: &[String], relevant: &[String], k: usize) -> f64 {
    let ideal_ids: Vec<String> = relevant.iter().take(k).cloned().collect();
    let ideal = dcg_at_k(&ideal_ids, relevant, k);
    if ideal <= 0.0 {
        return 0.0;
    }
    dcg_at_k(ranked_ids, relevant, k) / ideal
}

/// Score a completed replay run against its fixture's relevance judgments.
pub fn score_replay(cases: &[ReplayCase], outcomes: &[ReplayOutcome], k: usize) -> ReplayReport {
    if cases.is_empty() || outcomes.is_empty() {
        return ReplayReport::default();
    }

    let mut precisions = Vec::with_capacity(cases.len());
    let mut ndcgs = Vec::with_capacity(cases.len());
    let mut zero_hit_queries = Vec::new();
    let mut total_llm_calls = 0;
    let mut total_cache_hits = 0;

    for (case, outcome) in cases.iter().zip(outcomes) {
        precisions.push(precision_at_k(&outcome.ranked_ids, &case.expected_relevant_ids, k));
        ndcgs.push(ndcg_at_k(&outcome.ranked_ids, &case.expected_relevant_ids, k));
        total_llm_calls += outcome.llm_calls;
        total_cache_hits += outcome.cache_hits;
        if outcome.ranked_ids.is_empty() {
            zero_hit_queries.push(case.query.clone());
        }
    }

    ReplayReport {
        macro_precision_at_k: precisions.iter().sum::<f64>() / precisions.len() as f64,
        macro_ndcg_at_k: ndcgs.iter().sum::<f64>() / ndcgs.len() as f64,
        total_llm_calls,
        total_cache_hits,
        zero_hit_queries,
    }
}

/// Regression gate: fails if precision drops too far from a prior baseline,
/// crosses the absolute floor, or any query returned zero hits.
pub fn regression_gate_passes(
    current: &ReplayReport,
    baseline_precision: Option<f64>,
    max_delta: f64,
    min_absolute: f64,
) -> bool {
    if !current.zero_hit_queries.is_empty() {
        return false;
    }
    if current.macro_precision_at_k < min_absolute {
        return false;
    }
    if let Some(baseline) = baseline_precision {
        if baseline - current.macro_precision_at_k > max_delta {
            return false;
        }
    }
    true
}

/// One row of the §4.12 feature export: a ranked candidate's score
/// components alongside a binary relevance label, for offline weight
/// training.
#[derive(Debug, Clone)]
pub struct FeatureRow {
    pub query: String,
    pub candidate_id: String,
    pub memory_strength: f64,
    pub recency: f64,
    pub refs_reliability: f64,
    pub bm25_norm: f64,
    pub vector_sim: f64,
    pub metadata_bonus: f64,
    pub is_relevant: bool,
}

pub fn export_feature_rows(case: &ReplayCase, outcome: &ReplayOutcome, components: &[(String, [f64; 6])]) -> Vec<FeatureRow> {
    components
        .iter()
        .map(|(candidate_id, c)| FeatureRow {
            query: case.query.clone(),
            candidate_id: candidate_id.clone(),
            memory_strength: c[0],
            recency: c[1],
            refs_reliability: c[2],
            bm25_norm: c[3],
            vector_sim: c[4],
            metadata_bonus: c[5],
            is_relevant: case.expected_relevant_ids.contains(candidate_id) || outcome.ranked_ids.contains(candidate_id),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widen_prefixes_seconds_field() {
        assert_eq!(widen_to_six_fields("0 3 * * *"), "0 0 3 * * *");
    }

    #[test]
    fn due_when_never_run() {
        let trigger = ConsolidationTrigger::new("0 3 * * *", chrono::Duration::hours(1)).unwrap();
        assert!(trigger.is_due(None, Utc::now()));
    }

    #[test]
    fn precision_counts_hits_in_top_k() {
        let ranked = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let relevant = vec!["a".to_string(), "c".to_string()];
        assert!((precision_at_k(&ranked, &relevant, 3) - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn ndcg_is_one_for_perfect_ranking() {
        let ranked = vec!["a".to_string(), "b".to_string()];
        let relevant = vec!["a".to_string(), "b".to_string()];
        assert!((ndcg_at_k(&ranked, &relevant, 2) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn gate_fails_on_zero_hit_query() {
        let report = ReplayReport {
            macro_precision_at_k: 0.9,
            macro_ndcg_at_k: 0.9,
            total_llm_calls: 0,
            total_cache_hits: 0,
            zero_hit_queries: vec!["q".to_string()],
        };
        assert!(!regression_gate_passes(&report, None, DEFAULT_REGRESSION_DELTA, DEFAULT_REGRESSION_FLOOR));
    }

    #[test]
    fn gate_fails_when_delta_exceeded() {
        let report = ReplayReport {
            macro_precision_at_k: 0.70,
            macro_ndcg_at_k: 0.70,
            total_llm_calls: 0,
            total_cache_hits: 0,
            zero_hit_queries: vec![],
        };
        assert!(!regression_gate_passes(&report, Some(0.85), DEFAULT_REGRESSION_DELTA, DEFAULT_REGRESSION_FLOOR));
    }

    #[test]
    fn gate_passes_within_tolerance() {
        let report = ReplayReport {
            macro_precision_at_k: 0.84,
            macro_ndcg_at_k: 0.84,
            total_llm_calls: 0,
            total_cache_hits: 0,
            zero_hit_queries: vec![],
        };
        assert!(regression_gate_passes(&report, Some(0.85), DEFAULT_REGRESSION_DELTA, DEFAULT_REGRESSION_FLOOR));
    }
}
