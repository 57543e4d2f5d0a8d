//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Provider calls (generate, poll, upload)
//! - Polling loops and pipeline stages
//! - Artifact and upload caches

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Provider Calls
// =============================================================================

/// Provider calls total by operation and outcome.
pub static PROVIDER_CALLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("genloom_provider_calls_total", "Total provider HTTP calls"),
        &["provider", "operation", "outcome"], // outcome: "success", "failure"
    )
    .unwrap()
});

/// Provider call latency in seconds.
pub static PROVIDER_CALL_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "genloom_provider_call_duration_seconds",
            "Duration of provider HTTP calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["provider", "operation"],
    )
    .unwrap()
});

// =============================================================================
// Polling
// =============================================================================

/// Poll ticks by observed result.
pub static POLL_TICKS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("genloom_poll_ticks_total", "Total status polls"),
        &["result"], // "running", "succeeded", "failed", "transient_error", "permanent_error"
    )
    .unwrap()
});

/// Polling loops currently running.
pub static ACTIVE_LOOPS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("genloom_active_poll_loops", "Polling loops currently running").unwrap()
});

// =============================================================================
// Pipeline Stages
// =============================================================================

/// Stages started by stage name.
pub static STAGES_STARTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("genloom_stages_started_total", "Total pipeline stages started"),
        &["stage"],
    )
    .unwrap()
});

/// Stages finished by stage name and result.
pub static STAGES_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("genloom_stages_finished_total", "Total pipeline stages finished"),
        &["stage", "result"], // "completed", "failed"
    )
    .unwrap()
});

/// Wall-clock time from submission to terminal state.
pub static STAGE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("genloom_stage_duration_seconds", "Duration of pipeline stages")
            .buckets(vec![10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 3600.0]),
        &["stage", "result"],
    )
    .unwrap()
});

/// Stages picked up again after a restart.
pub static STAGES_RESUMED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "genloom_stages_resumed_total",
        "Total in-progress stages resumed after restart",
    )
    .unwrap()
});

// =============================================================================
// Caches
// =============================================================================

/// Artifact cache gate results.
pub static ARTIFACT_CACHE: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("genloom_artifact_cache_total", "Artifact cache gate results"),
        &["result"], // "local", "hit", "downloaded", "fallback"
    )
    .unwrap()
});

/// Upload record cache lookups.
pub static UPLOAD_CACHE: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("genloom_upload_cache_total", "Upload record cache lookups"),
        &["result"], // "hit", "miss"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(PROVIDER_CALLS.clone()),
        Box::new(PROVIDER_CALL_DURATION.clone()),
        Box::new(POLL_TICKS.clone()),
        Box::new(ACTIVE_LOOPS.clone()),
        Box::new(STAGES_STARTED.clone()),
        Box::new(STAGES_FINISHED.clone()),
        Box::new(STAGE_DURATION.clone()),
        Box::new(STAGES_RESUMED.clone()),
        Box::new(ARTIFACT_CACHE.clone()),
        Box::new(UPLOAD_CACHE.clone()),
    ]
}
