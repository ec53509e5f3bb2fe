//! Global atomic counters for pipeline observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when a batch run or chat session ends).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters: no allocations, no locking.
pub struct Metrics {
    pipelines_built: AtomicU64,
    cache_hits: AtomicU64,
    loop_iterations: AtomicU64,
    judge_passes: AtomicU64,
    search_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            pipelines_built: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            loop_iterations: AtomicU64::new(0),
            judge_passes: AtomicU64::new(0),
            search_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_pipelines_built(&self) {
        self.pipelines_built.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "pipelines_built", "counter incremented");
    }

    pub fn inc_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cache_hits", "counter incremented");
    }

    pub fn inc_loop_iterations(&self) {
        self.loop_iterations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "loop_iterations", "counter incremented");
    }

    pub fn inc_judge_passes(&self) {
        self.judge_passes.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "judge_passes", "counter incremented");
    }

    pub fn inc_search_failures(&self) {
        self.search_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "search_failures", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            pipelines_built = self.pipelines_built(),
            cache_hits = self.cache_hits(),
            loop_iterations = self.loop_iterations(),
            judge_passes = self.judge_passes(),
            search_failures = self.search_failures(),
        );
    }

    pub fn pipelines_built(&self) -> u64 {
        self.pipelines_built.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn loop_iterations(&self) -> u64 {
        self.loop_iterations.load(Ordering::Relaxed)
    }

    pub fn judge_passes(&self) -> u64 {
        self.judge_passes.load(Ordering::Relaxed)
    }

    pub fn search_failures(&self) -> u64 {
        self.search_failures.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.pipelines_built.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.loop_iterations.store(0, Ordering::Relaxed);
        self.judge_passes.store(0, Ordering::Relaxed);
        self.search_failures.store(0, Ordering::Relaxed);
    }
}
