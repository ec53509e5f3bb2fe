//! Structured observability hooks for pipeline lifecycle events.
//!
//! This module provides:
//! - A call-scoped tracing span via [`call_span`]
//! - Emission functions for pipeline builds, cache hits, loop iterations,
//!   judge verdicts, loop termination and degraded searches
//!
//! Events are emitted at `info!` level; failures at `warn!`.

use tracing::{info, warn};

/// Span that scopes every event of one `Pipeline::call`.
///
/// The loop runs inside it via `Instrument`, so the span survives awaits on
/// a multi-threaded runtime.
///
/// ```ignore
/// run_loop().instrument(call_span("9f1c…", "3b1d0c2a9e71")).await
/// ```
pub fn call_span(call_id: &str, config_key: &str) -> tracing::Span {
    tracing::info_span!("critique.call", call_id = %call_id, config = %config_key)
}

/// Emit event: a new pipeline was assembled and cached.
pub fn emit_pipeline_built(config_key: &str, config: &dyn std::fmt::Display) {
    info!(event = "pipeline.built", config_key = %config_key, config = %config);
}

/// Emit event: a pipeline request was served from the cache.
pub fn emit_cache_hit(config_key: &str) {
    info!(event = "pipeline.cache_hit", config_key = %config_key);
}

/// Emit event: the cache grew past its soft size limit.
pub fn emit_cache_large(entries: usize, soft_limit: usize) {
    warn!(event = "pipeline.cache_large", entries = entries, soft_limit = soft_limit);
}

/// Emit event: a refinement iteration began.
pub fn emit_iteration_started(iteration: usize, max_iterations: usize) {
    info!(
        event = "loop.iteration_started",
        iteration = iteration,
        max_iterations = max_iterations,
    );
}

/// Emit event: the judge returned a verdict.
pub fn emit_verdict(iteration: usize, passed: bool, score: Option<f64>, threshold: Option<f64>) {
    info!(
        event = "loop.verdict",
        iteration = iteration,
        passed = passed,
        score = ?score,
        threshold = ?threshold,
    );
}

/// Emit event: the loop terminated.
pub fn emit_loop_finished(
    iterations: usize,
    termination: &str,
    last_score: Option<f64>,
    duration_ms: u64,
) {
    info!(
        event = "loop.finished",
        iterations = iterations,
        termination = %termination,
        last_score = ?last_score,
        duration_ms = duration_ms,
    );
}

/// Emit event: a call was aborted by an error (warning level).
pub fn emit_call_failed(stage: &str, error: &dyn std::fmt::Display) {
    warn!(event = "loop.call_failed", stage = %stage, error = %error);
}

/// Emit event: a search failed and was treated as zero results (warning level).
pub fn emit_search_degraded(query: &str, error: &dyn std::fmt::Display) {
    warn!(event = "search.degraded", query = %query, error = %error);
}
