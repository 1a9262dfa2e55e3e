//! Query Attribute Model (C7)
//!
//! Single operation: `extract(query) -> {topic?, doc_type?, project?,
//! severity?, confidence}`. Stage 1 is a deterministic heuristic dictionary
//! match with no I/O; Stage 2 is an optional LLM fallback through C3, used
//! only when Stage 1 found fewer than two attributes.

use crate::model::SchemaType;
use crate::router::{RouteRequest, Router, TaskType};
use std::sync::atomic::{AtomicU64, Ordering};

/// Estimated per-session budget for Stage-2 LLM fallback calls. One unit is
/// spent per call; once `spent >= limit`, Stage 2 stops firing and Stage 1's
/// heuristic result stands alone regardless of how few attributes it found.
#[derive(Debug)]
pub struct CostBudget {
    limit: u64,
    spent: AtomicU64,
}

impl CostBudget {
    pub fn new(limit: u64) -> Self {
        Self { limit, spent: AtomicU64::new(0) }
    }

    fn has_capacity(&self) -> bool {
        self.spent.load(Ordering::Relaxed) < self.limit
    }

    fn spend(&self, units: u64) {
        self.spent.fetch_add(units, Ordering::Relaxed);
    }
}

/// Attributes extracted from a query, plus the model's overall confidence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryAttributes {
    pub topic: Option<String>,
    pub doc_type: Option<String>,
    pub project: Option<String>,
    pub severity: Option<String>,
    pub confidence: f64,
}

impl QueryAttributes {
    fn attribute_count(&self) -> usize {
        [&self.topic, &self.doc_type, &self.project, &self.severity]
            .iter()
            .filter(|a| a.is_some())
            .count()
    }
}

const TOPIC_DICTIONARY: &[(&str, &[&str])] = &[
    ("rust", &["rust", "cargo", "crate", "tokio"]),
    ("database", &["sql", "database", "postgres", "sqlite"]),
    ("networking", &["tcp", "http", "socket", "dns"]),
    ("frontend", &["react", "css", "html", "browser"]),
    ("security", &["auth", "token", "vulnerability", "cve"]),
];

const SEVERITY_DICTIONARY: &[(&str, &[&str])] = &[
    ("critical", &["critical", "sev1", "sev-1", "outage", "down"]),
    ("high", &["high", "sev2", "sev-2", "urgent"]),
    ("low", &["low", "minor", "cosmetic"]),
];

const DOC_TYPE_DICTIONARY: &[(SchemaType, &[&str])] = &[
    (SchemaType::Incident, &["incident", "postmortem", "outage"]),
    (SchemaType::Snippet, &["snippet", "code sample", "example code"]),
    (SchemaType::Decision, &["decision", "rfc", "design doc"]),
    (SchemaType::Pattern, &["pattern", "idiom", "convention"]),
    (SchemaType::Runbook, &["runbook", "playbook", "procedure"]),
];

fn dictionary_match(lower_query: &str, dictionary: &[(&str, &[&str])]) -> Option<(String, f64)> {
    dictionary
        .iter()
        .filter_map(|(label, keywords)| {
            let hits = keywords.iter().filter(|kw| lower_query.contains(*kw)).count();
            (hits > 0).then(|| (label.to_string(), (hits as f64 / keywords.len() as f64).min(1.0)))
        })
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
}

fn doc_type_match(lower_query: &str) -> Option<(String, f64)> {
    DOC_TYPE_DICTIONARY
        .iter()
        .filter_map(|(schema, keywords)| {
            let hits = keywords.iter().filter(|kw| lower_query.contains(*kw)).count();
            (hits > 0).then(|| (schema.as_str().to_string(), (hits as f64 / keywords.len() as f64).min(1.0)))
        })
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
}

fn project_match(lower_query: &str, known_projects: &[String]) -> Option<(String, f64)> {
    known_projects
        .iter()
        .find(|p| lower_query.contains(&p.to_lowercase()))
        .map(|p| (p.clone(), 1.0))
}

/// Stage 1: deterministic heuristic extraction, no I/O, never fails.
pub fn extract_heuristic(query: &str, known_projects: &[String]) -> QueryAttributes {
    let lower = query.to_lowercase();
    let topic = dictionary_match(&lower, TOPIC_DICTIONARY);
    let doc_type = doc_type_match(&lower);
    let project = project_match(&lower, known_projects);
    let severity = dictionary_match(&lower, SEVERITY_DICTIONARY);

    let confidences: Vec<f64> = [&topic, &doc_type, &project, &severity]
        .iter()
        .filter_map(|a| a.as_ref().map(|(_, c)| *c))
        .collect();
    let confidence = confidences.iter().cloned().fold(f64::INFINITY, f64::min);
    let confidence = if confidence.is_finite() { confidence } else { 0.0 };

    QueryAttributes {
        topic: topic.map(|(v, _)| v),
        doc_type: doc_type.map(|(v, _)| v),
        project: project.map(|(v, _)| v),
        severity: severity.map(|(v, _)| v),
        confidence,
    }
}

/// Full extraction: Stage 1, then Stage 2 (LLM fallback) when fewer than two
/// attributes were found, fallback is enabled, and `cost_budget` still has
/// capacity. Heuristic hits always take precedence on conflict; a Stage 2
/// timeout or parse error is swallowed and Stage 1's result stands.
pub async fn extract(
    query: &str,
    known_projects: &[String],
    router: &dyn Router,
    llm_fallback_enabled: bool,
    cost_budget: &CostBudget,
) -> QueryAttributes {
    let heuristic = extract_heuristic(query, known_projects);
    if heuristic.attribute_count() >= 2 || !llm_fallback_enabled || !cost_budget.has_capacity() {
        return heuristic;
    }

    let prompt = format!(
        "extract topic, doc_type, project, severity from: {query}\nformat: topic=?|doc_type=?|project=?|severity=?"
    );
    let request = RouteRequest::new(TaskType::Classification, prompt);
    let Ok(raw) = router.route(request).await else {
        return heuristic;
    };
    cost_budget.spend(1);

    merge_llm_fields(heuristic, &raw)
}

fn parse_field<'a>(raw: &'a str, key: &str) -> Option<&'a str> {
    raw.split('|').find_map(|part| {
        let (k, v) = part.split_once('=')?;
        (k.trim() == key && !v.trim().is_empty()).then(|| v.trim())
    })
}

fn merge_llm_fields(mut heuristic: QueryAttributes, raw: &str) -> QueryAttributes {
    if heuristic.topic.is_none() {
        heuristic.topic = parse_field(raw, "topic").map(str::to_string);
    }
    if heuristic.doc_type.is_none() {
        heuristic.doc_type = parse_field(raw, "doc_type").map(str::to_string);
    }
    if heuristic.project.is_none() {
        heuristic.project = parse_field(raw, "project").map(str::to_string);
    }
    if heuristic.severity.is_none() {
        heuristic.severity = parse_field(raw, "severity").map(str::to_string);
    }
    heuristic
}
