//! Cross-Encoder Reranker (C9)
//!
//! Reorders C8's fused candidates via LLM-scored pairwise `(query,
//! candidate)` relevance, under a bounded concurrency budget and a
//! three-tier cache (exact query, keyword-signature, embedding-semantic).
//!
//! Falls back to the candidate's composite score (computed by C8) whenever
//! the LLM call fails, times out, or the per-query deadline/queue-wait
//! budget is exhausted, so a degraded backend never blocks ranking.

use crate::config::RerankerConfig;
use crate::router::{Router, RouteRequest, TaskType};
use crate::storage::LexicalIndex;
use lru::LruCache;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

pub const DEFAULT_RETRIEVAL_COUNT: usize = 50;
pub const DEFAULT_RERANK_COUNT: usize = 10;

/// Which cache tier (if any) produced a candidate's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    L1,
    L2,
    L3,
    Miss,
}

/// A candidate handed to the reranker, carrying C8's composite score as the
/// heuristic fallback.
#[derive(Debug, Clone)]
pub struct RerankCandidate {
    pub candidate_id: String,
    pub text: String,
    pub composite_score: f64,
}

/// A scored candidate, in output order.
#[derive(Debug, Clone)]
pub struct RerankedItem {
    pub candidate_id: String,
    pub score: f32,
    pub composite_score: f64,
    pub tier: CacheTier,
}

#[derive(Debug, Default)]
pub struct RerankerMetrics {
    pub l1_hits: AtomicU64,
    pub l2_hits: AtomicU64,
    pub l3_hits: AtomicU64,
    pub misses: AtomicU64,
    pub llm_calls: AtomicU64,
    pub failures: AtomicU64,
}

#[derive(Debug, Clone)]
struct TimedScore {
    score: f32,
    ts: Instant,
}

#[derive(Debug, Clone)]
struct L3Entry {
    query_embedding: Vec<f32>,
    score: f32,
}

struct Caches {
    l1: LruCache<u64, TimedScore>,
    l2: LruCache<u64, TimedScore>,
    l3: HashMap<String, L3Entry>,
    l1_keys_by_candidate: HashMap<String, Vec<u64>>,
    l2_keys_by_candidate: HashMap<String, Vec<u64>>,
}

fn hash_key(a: &str, b: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    a.hash(&mut hasher);
    b.hash(&mut hasher);
    hasher.finish()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a < 1e-9 || norm_b < 1e-9 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "of", "to", "in", "on", "for", "and", "or",
    "with", "this", "that", "it", "as", "at", "by", "be",
];

/// Lowercase-tokenize, drop stopwords, keep the 3 globally rarest tokens by
/// `lexical`'s corpus-wide inverse document frequency (ties broken by length
/// then alphabetically), then sort alphabetically and join with `|`. Stable
/// and order-invariant across paraphrases that share the same salient terms.
pub fn keyword_signature(query: &str, lexical: &LexicalIndex) -> String {
    let mut tokens: Vec<String> = query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty() && !STOPWORDS.contains(t))
        .map(|s| s.to_string())
        .collect();
    tokens.sort_by(|a, b| {
        lexical
            .idf(b)
            .partial_cmp(&lexical.idf(a))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.len().cmp(&a.len()))
            .then_with(|| a.cmp(b))
    });
    tokens.dedup();
    tokens.truncate(3);
    tokens.sort();
    tokens.join("|")
}

/// Cross-encoder reranker with L1/L2/L3 caching and bounded LLM concurrency.
pub struct Reranker {
    config: RerankerConfig,
    caches: Mutex<Caches>,
    semaphore: Arc<Semaphore>,
    pub metrics: RerankerMetrics,
}

impl Reranker {
    pub fn new(config: RerankerConfig) -> Self {
        let l1_size = NonZeroUsize::new(config.cache_l1_size.max(1)).unwrap();
        let l2_size = NonZeroUsize::new(config.cache_l2_size.max(1)).unwrap();
        let workers = config.parallel_workers.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(workers)),
            caches: Mutex::new(Caches {
                l1: LruCache::new(l1_size),
                l2: LruCache::new(l2_size),
                l3: HashMap::new(),
                l1_keys_by_candidate: HashMap::new(),
                l2_keys_by_candidate: HashMap::new(),
            }),
            config,
            metrics: RerankerMetrics::default(),
        }
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.config.cache_ttl_seconds)
    }

    /// Evict every L1/L2/L3 entry keyed by `candidate_id`. Called by C11 when
    /// a merge collapses this candidate into another memory, so a stale
    /// score never outlives the memory it scored.
    pub fn invalidate_candidate(&self, candidate_id: &str) {
        let mut caches = self.caches.lock().unwrap();
        caches.l3.remove(candidate_id);
        if let Some(keys) = caches.l1_keys_by_candidate.remove(candidate_id) {
            for key in keys {
                caches.l1.pop(&key);
            }
        }
        if let Some(keys) = caches.l2_keys_by_candidate.remove(candidate_id) {
            for key in keys {
                caches.l2.pop(&key);
            }
        }
    }

    /// Seed L3 with a prior score for `candidate_id` without a query ever
    /// having run, used by C10 to warm the pool ahead of the first query.
    pub fn seed_l3(&self, candidate_id: &str, embedding: &[f32], score: f32) -> bool {
        let mut caches = self.caches.lock().unwrap();
        let replace = caches.l3.get(candidate_id).map(|e| score >= e.score).unwrap_or(true);
        if replace {
            caches.l3.insert(candidate_id.to_string(), L3Entry { query_embedding: embedding.to_vec(), score });
        }
        replace
    }

    fn lookup(&self, query: &str, kw_sig: &str, query_embedding: &[f32], candidate_id: &str) -> Option<(f32, CacheTier)> {
        let mut caches = self.caches.lock().unwrap();
        let ttl = self.ttl();

        let l1_key = hash_key(query, candidate_id);
        if let Some(entry) = caches.l1.get(&l1_key) {
            if entry.ts.elapsed() < ttl {
                return Some((entry.score, CacheTier::L1));
            }
        }

        let l2_key = hash_key(kw_sig, candidate_id);
        if let Some(entry) = caches.l2.get(&l2_key).cloned() {
            if entry.ts.elapsed() < ttl {
                caches.l1.put(l1_key, entry.clone());
                caches
                    .l1_keys_by_candidate
                    .entry(candidate_id.to_string())
                    .or_default()
                    .push(l1_key);
                return Some((entry.score, CacheTier::L2));
            }
        }

        if let Some(entry) = caches.l3.get(candidate_id).cloned() {
            let similarity = cosine_similarity(query_embedding, &entry.query_embedding);
            if similarity >= self.config.semantic_threshold {
                let timed = TimedScore { score: entry.score, ts: Instant::now() };
                caches.l1.put(l1_key, timed.clone());
                caches.l2.put(l2_key, timed);
                caches.l1_keys_by_candidate.entry(candidate_id.to_string()).or_default().push(l1_key);
                caches.l2_keys_by_candidate.entry(candidate_id.to_string()).or_default().push(l2_key);
                return Some((entry.score, CacheTier::L3));
            }
        }

        None
    }

    fn write_all_tiers(&self, query: &str, kw_sig: &str, query_embedding: &[f32], candidate_id: &str, score: f32) {
        let mut caches = self.caches.lock().unwrap();
        let now = Instant::now();
        let l1_key = hash_key(query, candidate_id);
        let l2_key = hash_key(kw_sig, candidate_id);
        caches.l1.put(l1_key, TimedScore { score, ts: now });
        caches.l2.put(l2_key, TimedScore { score, ts: now });
        caches.l1_keys_by_candidate.entry(candidate_id.to_string()).or_default().push(l1_key);
        caches.l2_keys_by_candidate.entry(candidate_id.to_string()).or_default().push(l2_key);

        let replace = caches.l3.get(candidate_id).map(|e| score >= e.score).unwrap_or(true);
        if replace {
            caches.l3.insert(candidate_id.to_string(), L3Entry { query_embedding: query_embedding.to_vec(), score });
        }
    }

    fn parse_score(raw: &str) -> Option<f32> {
        raw.trim().parse::<f32>().ok().filter(|v| (0.0..=1.0).contains(v))
    }

    /// Score and reorder `candidates` against `query`, returning at most
    /// `top_k` items. `deadline` bounds the whole call; candidates whose
    /// turn comes after the deadline (or whose queue wait exceeds
    /// `queue_wait_max_ms`) are scored via the heuristic fallback instead of
    /// an LLM call.
    /// `kw_sig` is the caller-computed [`keyword_signature`] for `query`; it
    /// takes a `&LexicalIndex` that callers typically hold behind a lock they
    /// don't want to keep across this function's `.await` points, so it's
    /// computed up front and passed in as a plain string.
    pub async fn rerank(
        self: &Arc<Self>,
        query: &str,
        query_embedding: &[f32],
        candidates: Vec<RerankCandidate>,
        router: Arc<dyn Router>,
        kw_sig: &str,
        deadline: Option<Duration>,
        top_k: usize,
    ) -> Vec<RerankedItem> {
        let start = Instant::now();
        let kw_sig = kw_sig.to_string();
        let take = self.config.max_candidates.min(candidates.len());

        let mut handles = Vec::with_capacity(take);
        for candidate in candidates.into_iter().take(take) {
            let this = Arc::clone(self);
            let router = Arc::clone(&router);
            let query = query.to_string();
            let kw_sig = kw_sig.clone();
            let query_embedding = query_embedding.to_vec();

            handles.push(tokio::spawn(async move {
                this.score_one(query, kw_sig, query_embedding, candidate, router, deadline, start).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(item) = handle.await {
                results.push(item);
            }
        }

        results.sort_by(|a: &RerankedItem, b: &RerankedItem| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.composite_score.partial_cmp(&a.composite_score).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.candidate_id.cmp(&b.candidate_id))
        });
        results.truncate(top_k);
        results
    }

    async fn score_one(
        &self,
        query: String,
        kw_sig: String,
        query_embedding: Vec<f32>,
        candidate: RerankCandidate,
        router: Arc<dyn Router>,
        deadline: Option<Duration>,
        start: Instant,
    ) -> RerankedItem {
        if let Some((score, tier)) = self.lookup(&query, &kw_sig, &query_embedding, &candidate.candidate_id) {
            match tier {
                CacheTier::L1 => self.metrics.l1_hits.fetch_add(1, Ordering::Relaxed),
                CacheTier::L2 => self.metrics.l2_hits.fetch_add(1, Ordering::Relaxed),
                CacheTier::L3 => self.metrics.l3_hits.fetch_add(1, Ordering::Relaxed),
                CacheTier::Miss => 0,
            };
            return RerankedItem { candidate_id: candidate.candidate_id, score, composite_score: candidate.composite_score, tier };
        }
        self.metrics.misses.fetch_add(1, Ordering::Relaxed);

        let remaining = deadline.map(|d| d.checked_sub(start.elapsed()));
        if let Some(Some(remaining)) = remaining {
            if remaining.is_zero() {
                return self.heuristic_fallback(candidate);
            }
        } else if deadline.is_some() {
            // checked_sub underflowed: deadline already passed.
            return self.heuristic_fallback(candidate);
        }

        let queue_wait_budget = Duration::from_millis(self.config.queue_wait_max_ms);
        let permit = tokio::select! {
            permit = self.semaphore.clone().acquire_owned() => permit.ok(),
            _ = tokio::time::sleep(queue_wait_budget) => None,
        };
        let Some(_permit) = permit else {
            return self.heuristic_fallback(candidate);
        };

        self.metrics.llm_calls.fetch_add(1, Ordering::Relaxed);
        let prompt = format!("query: {query} candidate: {}", candidate.text);
        let mut request = RouteRequest::new(TaskType::RerankScore, prompt);
        if let Some(Some(remaining)) = remaining {
            request = request.with_deadline(remaining);
        }

        match router.route(request).await {
            Ok(raw) => match Self::parse_score(&raw) {
                Some(score) => {
                    self.write_all_tiers(&query, &kw_sig, &query_embedding, &candidate.candidate_id, score);
                    RerankedItem { candidate_id: candidate.candidate_id, score, composite_score: candidate.composite_score, tier: CacheTier::Miss }
                }
                None => {
                    self.metrics.failures.fetch_add(1, Ordering::Relaxed);
                    self.heuristic_fallback(candidate)
                }
            },
            Err(_) => {
                self.metrics.failures.fetch_add(1, Ordering::Relaxed);
                self.heuristic_fallback(candidate)
            }
        }
    }

    fn heuristic_fallback(&self, candidate: RerankCandidate) -> RerankedItem {
        RerankedItem {
            score: candidate.composite_score as f32,
            candidate_id: candidate.candidate_id,
            composite_score: candidate.composite_score,
            tier: CacheTier::Miss,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RouterError;

    struct StubRouter {
        score: f32,
    }

    #[async_trait::async_trait]
    impl Router for StubRouter {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, RouterError> {
            Ok(vec![0.0; 4])
        }

        async fn route(&self, _request: RouteRequest) -> Result<String, RouterError> {
            Ok(self.score.to_string())
        }
    }

    fn candidate(id: &str, composite: f64) -> RerankCandidate {
        RerankCandidate { candidate_id: id.to_string(), text: format!("text for {id}"), composite_score: composite }
    }

    fn lexical_with(docs: &[(&str, &str)]) -> LexicalIndex {
        let mut index = LexicalIndex::new();
        for (id, text) in docs {
            index.add_document(id, text).unwrap();
        }
        index
    }

    #[test]
    fn keyword_signature_is_order_invariant() {
        let lexical = lexical_with(&[("a", "rust error handling patterns")]);
        let a = keyword_signature("rust error handling patterns", &lexical);
        let b = keyword_signature("patterns handling error rust", &lexical);
        assert_eq!(a, b);
    }

    #[test]
    fn keyword_signature_drops_stopwords() {
        let lexical = LexicalIndex::new();
        let sig = keyword_signature("the rust is for handling errors", &lexical);
        assert!(!sig.contains("the"));
    }

    #[test]
    fn keyword_signature_prefers_globally_rarer_terms() {
        // "rust" appears in every document (low idf); "thiserror" appears in none
        // of the indexed corpus besides the query itself (high idf).
        let lexical = lexical_with(&[("a", "rust"), ("b", "rust"), ("c", "rust")]);
        let sig = keyword_signature("rust thiserror", &lexical);
        assert_eq!(sig, "rust|thiserror");
    }

    #[tokio::test]
    async fn rerank_scores_candidates_via_router_and_sorts_desc() {
        let reranker = Arc::new(Reranker::new(RerankerConfig::default()));
        let router: Arc<dyn Router> = Arc::new(StubRouter { score: 0.9 });
        let kw_sig = keyword_signature("query", &LexicalIndex::new());
        let candidates = vec![candidate("a", 0.1), candidate("b", 0.2)];

        let results = reranker.rerank("query", &[0.1, 0.2], candidates, router, &kw_sig, None, 10).await;
        assert_eq!(results.len(), 2);
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn repeated_query_hits_l1_cache() {
        let reranker = Arc::new(Reranker::new(RerankerConfig::default()));
        let router: Arc<dyn Router> = Arc::new(StubRouter { score: 0.7 });
        let kw_sig = keyword_signature("query", &LexicalIndex::new());

        let _ = reranker
            .clone()
            .rerank("query", &[0.1, 0.2], vec![candidate("a", 0.1)], router.clone(), &kw_sig, None, 10)
            .await;
        let second = reranker.rerank("query", &[0.1, 0.2], vec![candidate("a", 0.1)], router, &kw_sig, None, 10).await;
        assert_eq!(second[0].tier, CacheTier::L1);
    }

    #[tokio::test]
    async fn invalidate_candidate_clears_cached_score() {
        let reranker = Arc::new(Reranker::new(RerankerConfig::default()));
        let router: Arc<dyn Router> = Arc::new(StubRouter { score: 0.7 });
        let kw_sig = keyword_signature("query", &LexicalIndex::new());
        let _ = reranker.clone().rerank("query", &[0.1], vec![candidate("a", 0.1)], router.clone(), &kw_sig, None, 10).await;

        reranker.invalidate_candidate("a");
        let after = reranker.rerank("query", &[0.1], vec![candidate("a", 0.1)], router, &kw_sig, None, 10).await;
        assert_ne!(after[0].tier, CacheTier::L1);
    }

    #[tokio::test]
    async fn expired_deadline_falls_back_to_heuristic() {
        let reranker = Arc::new(Reranker::new(RerankerConfig::default()));
        let router: Arc<dyn Router> = Arc::new(StubRouter { score: 0.9 });
        let kw_sig = keyword_signature("query", &LexicalIndex::new());
        let results = reranker
            .rerank("query", &[0.1], vec![candidate("a", 0.42)], router, &kw_sig, Some(Duration::from_secs(0)), 10)
            .await;
        assert_eq!(results[0].score as f64, 0.42);
    }
}
