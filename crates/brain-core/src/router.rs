//! Embedding & LLM Router (C3)
//!
//! Classifies each task by type and dispatches to a local or high-capacity
//! backend. Per the design notes' "duck-typed anything with .route" row, the
//! routing capability is a trait so C9's reranker and C11's merge step are
//! generic over it and testable against a deterministic stub, without this
//! crate making any real LLM vendor connection (out of scope, §1).

use crate::error::RouterError;
use std::time::Duration;

/// Task classes recognized by the router (§4.3).
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    ShortSummary,
    LongSummary,
    Classification,
    RerankScore,
    MergeSummary,
}

impl TaskType {
    /// Whether this task class is always routed to the local backend.
    pub fn is_local_only(&self) -> bool {
        matches!(
            self,
            TaskType::ShortSummary | TaskType::Classification | TaskType::RerankScore
        )
    }
}

/// Parameters for a `route` call.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub task_type: TaskType,
    pub prompt: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub deadline: Option<Duration>,
}

impl RouteRequest {
    pub fn new(task_type: TaskType, prompt: impl Into<String>) -> Self {
        Self {
            task_type,
            prompt: prompt.into(),
            max_tokens: 256,
            temperature: 0.2,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Capability implemented by both the local and external backends (§9:
/// "Define an interface `Router { embed, route }`"). C9's reranker and C11's
/// merge step are generic over `Arc<dyn Router>`.
#[async_trait::async_trait]
pub trait Router: Send + Sync {
    /// Embed text into a dense vector, cacheable by text hash by the caller.
    fn embed(&self, text: &str) -> Result<Vec<f32>, RouterError>;

    /// Route a task, honoring `request.deadline` if set.
    async fn route(&self, request: RouteRequest) -> Result<String, RouterError>;

    /// Policy decision: does this task type get a chance at the high-capacity
    /// backend, or does it always stay local (§4.3)?
    fn prefers_local(&self, request: &RouteRequest) -> bool {
        request.task_type.is_local_only()
    }
}

/// The one concrete backend this crate ships. `embed` uses the local
/// embedding model; `route` uses small deterministic heuristics standing in
/// for "the local backend" (extractive summarization for `*_summary`, a
/// lexical-overlap score for `rerank_score`, a keyword-vote classifier for
/// `classification`). No network or external LLM vendor call is made — that
/// connection is out of scope per §1; this implements the routing *policy*
/// end to end.
pub struct LocalRouter {
    embedder: crate::embeddings::EmbeddingService,
}

impl Default for LocalRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalRouter {
    pub fn new() -> Self {
        Self {
            embedder: crate::embeddings::EmbeddingService::new(),
        }
    }

    fn extractive_summary(prompt: &str, max_tokens: usize) -> String {
        let words: Vec<&str> = prompt.split_whitespace().collect();
        if words.len() <= max_tokens {
            prompt.trim().to_string()
        } else {
            format!("{}...", words[..max_tokens].join(" "))
        }
    }

    fn lexical_overlap_score(prompt: &str) -> f32 {
        // The fixed rerank_score prompt template embeds "query:" and
        // "candidate:" sections; approximate relevance via token overlap.
        let lower = prompt.to_lowercase();
        let (query_part, candidate_part) = match lower.split_once("candidate:") {
            Some((q, c)) => (q, c),
            None => return 0.5,
        };
        let query_tokens: std::collections::HashSet<&str> =
            query_part.split_whitespace().collect();
        let candidate_tokens: std::collections::HashSet<&str> =
            candidate_part.split_whitespace().collect();
        if query_tokens.is_empty() {
            return 0.5;
        }
        let overlap = query_tokens.intersection(&candidate_tokens).count();
        (overlap as f32 / query_tokens.len() as f32).clamp(0.0, 1.0)
    }

    fn keyword_vote_classification(prompt: &str) -> String {
        let lower = prompt.to_lowercase();
        const CATEGORIES: &[(&str, &[&str])] = &[
            ("incident", &["error", "crash", "outage", "failed", "exception"]),
            ("snippet", &["fn ", "function", "```", "code"]),
            ("decision", &["decided", "we will", "chose", "going with"]),
            ("pattern", &["pattern", "approach", "idiom"]),
            ("runbook", &["steps", "run book", "procedure", "checklist"]),
        ];
        CATEGORIES
            .iter()
            .max_by_key(|(_, kws)| kws.iter().filter(|kw| lower.contains(*kw)).count())
            .filter(|(_, kws)| kws.iter().any(|kw| lower.contains(kw)))
            .map(|(name, _)| name.to_string())
            .unwrap_or_else(|| "conversation".to_string())
    }
}

#[async_trait::async_trait]
impl Router for LocalRouter {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RouterError> {
        self.embedder
            .embed(text)
            .map(|e| e.vector)
            .map_err(|e| RouterError::ModelUnavailable(e.to_string()))
    }

    async fn route(&self, request: RouteRequest) -> Result<String, RouterError> {
        if request.prompt.trim().is_empty() {
            return Err(RouterError::InvalidInput("prompt is empty".to_string()));
        }

        let work = async {
            match request.task_type {
                TaskType::ShortSummary | TaskType::LongSummary | TaskType::MergeSummary => {
                    Ok(Self::extractive_summary(&request.prompt, request.max_tokens))
                }
                TaskType::RerankScore => {
                    Ok(Self::lexical_overlap_score(&request.prompt).to_string())
                }
                TaskType::Classification => Ok(Self::keyword_vote_classification(&request.prompt)),
            }
        };

        match request.deadline {
            Some(deadline) => tokio::time::timeout(deadline, work)
                .await
                .map_err(|_| RouterError::BackendTimeout(deadline))?,
            None => work.await,
        }
    }
}
