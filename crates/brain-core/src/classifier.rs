//! Schema Classifier (C5)
//!
//! Given `(user_text, assistant_text, metadata)`, assigns a [`SchemaType`]
//! and a confidence, falling back to [`SchemaType::Conversation`] when
//! confidence drops below 0.5. Routes through C3 with a fixed prompt
//! template for the category label; confidence is derived locally from
//! keyword-vote strength against the same category dictionary the router's
//! local backend uses, since the router's `route` call returns a bare label
//! with no confidence channel.

use crate::model::SchemaType;
use crate::router::{RouteRequest, Router, TaskType};
use std::collections::HashMap;

const MIN_CONFIDENCE: f64 = 0.5;

const CATEGORIES: &[(SchemaType, &[&str])] = &[
    (SchemaType::Incident, &["error", "crash", "outage", "failed", "exception"]),
    (SchemaType::Snippet, &["fn ", "function", "```", "code"]),
    (SchemaType::Decision, &["decided", "we will", "chose", "going with"]),
    (SchemaType::Pattern, &["pattern", "approach", "idiom"]),
    (SchemaType::Runbook, &["steps", "run book", "procedure", "checklist"]),
];

fn build_prompt(user_text: &str, assistant_text: &str, metadata: &HashMap<String, String>) -> String {
    let tags = metadata.get("tags").map(String::as_str).unwrap_or("");
    format!("user: {user_text}\nassistant: {assistant_text}\ntags: {tags}")
}

fn keyword_confidence(user_text: &str, assistant_text: &str) -> (SchemaType, f64) {
    let lower = format!("{} {}", user_text, assistant_text).to_lowercase();
    let mut best = (SchemaType::Conversation, 0.0_f64);
    for (schema, keywords) in CATEGORIES {
        let hits = keywords.iter().filter(|kw| lower.contains(*kw)).count();
        if hits == 0 {
            continue;
        }
        let confidence = (hits as f64 / keywords.len() as f64).min(1.0);
        if confidence > best.1 {
            best = (*schema, confidence);
        }
    }
    best
}

/// Classify a conversational turn into a [`SchemaType`] with a confidence.
/// Stage 1 (local keyword vote) always succeeds; the router call is used to
/// corroborate the label and is swallowed on failure.
pub async fn classify(
    user_text: &str,
    assistant_text: &str,
    metadata: &HashMap<String, String>,
    router: &dyn Router,
) -> (SchemaType, f64) {
    let (heuristic_schema, confidence) = keyword_confidence(user_text, assistant_text);

    let prompt = build_prompt(user_text, assistant_text, metadata);
    let request = RouteRequest::new(TaskType::Classification, prompt);
    let routed_schema = router
        .route(request)
        .await
        .ok()
        .and_then(|label| SchemaType::parse_name(&label));

    let schema = routed_schema.unwrap_or(heuristic_schema);

    if confidence < MIN_CONFIDENCE {
        (SchemaType::Conversation, confidence)
    } else {
        (schema, confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RouterError;

    struct StubRouter;

    #[async_trait::async_trait]
    impl Router for StubRouter {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, RouterError> {
            Ok(vec![0.0; 4])
        }

        async fn route(&self, request: RouteRequest) -> Result<String, RouterError> {
            if request.task_type == TaskType::Classification {
                Ok("incident".to_string())
            } else {
                Err(RouterError::InvalidInput("wrong task type".to_string()))
            }
        }
    }

    #[tokio::test]
    async fn strong_keyword_signal_classifies_as_incident() {
        let router = StubRouter;
        let (schema, confidence) = classify(
            "the service crashed with an exception",
            "I see the outage, it failed during deploy",
            &HashMap::new(),
            &router,
        )
        .await;
        assert_eq!(schema, SchemaType::Incident);
        assert!(confidence >= MIN_CONFIDENCE);
    }

    #[tokio::test]
    async fn weak_signal_falls_back_to_conversation() {
        let router = StubRouter;
        let (schema, confidence) = classify("how's it going", "pretty good, thanks", &HashMap::new(), &router).await;
        assert_eq!(schema, SchemaType::Conversation);
        assert!(confidence < MIN_CONFIDENCE);
    }
}
