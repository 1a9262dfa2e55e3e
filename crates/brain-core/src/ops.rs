//! Operation Runner
//!
//! Implements the decorator-based error wrapping pattern described in the
//! design notes (§9): a single place that logs structured entry/exit context
//! around an operation and records the outcome, instead of scattering
//! `tracing` calls and ad-hoc logging through every component.
//!
//! Components call [`run`]/[`run_async`] at their public boundary rather than
//! instrumenting individual call sites.

use std::time::Instant;

/// Structured context describing an operation for logging purposes.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    pub backend: Option<&'static str>,
    pub inputs_summary: Option<String>,
}

impl OpContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(mut self, backend: &'static str) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn inputs(mut self, summary: impl Into<String>) -> Self {
        self.inputs_summary = Some(summary.into());
        self
    }
}

/// Run a synchronous operation, logging entry/exit with structured fields.
pub fn run<T, E>(operation: &str, ctx: OpContext, f: impl FnOnce() -> Result<T, E>) -> Result<T, E>
where
    E: std::fmt::Display,
{
    let start = Instant::now();
    tracing::debug!(
        operation,
        backend = ctx.backend.unwrap_or("none"),
        inputs = ctx.inputs_summary.as_deref().unwrap_or(""),
        "operation started"
    );
    let outcome = f();
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    match &outcome {
        Ok(_) => {
            tracing::debug!(operation, latency_ms, "operation completed");
        }
        Err(e) => {
            tracing::warn!(
                operation,
                backend = ctx.backend.unwrap_or("none"),
                inputs = ctx.inputs_summary.as_deref().unwrap_or(""),
                latency_ms,
                error = %e,
                "operation failed"
            );
        }
    }
    outcome
}

/// Async counterpart of [`run`].
pub async fn run_async<T, E, Fut>(
    operation: &str,
    ctx: OpContext,
    f: impl FnOnce() -> Fut,
) -> Result<T, E>
where
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let start = Instant::now();
    tracing::debug!(
        operation,
        backend = ctx.backend.unwrap_or("none"),
        inputs = ctx.inputs_summary.as_deref().unwrap_or(""),
        "operation started"
    );
    let outcome = f().await;
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    match &outcome {
        Ok(_) => {
            tracing::debug!(operation, latency_ms, "operation completed");
        }
        Err(e) => {
            tracing::warn!(
                operation,
                backend = ctx.backend.unwrap_or("none"),
                inputs = ctx.inputs_summary.as_deref().unwrap_or(""),
                latency_ms,
                error = %e,
                "operation failed"
            );
        }
    }
    outcome
}
