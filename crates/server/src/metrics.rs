//! Prometheus metrics for the HTTP server.
//!
//! HTTP request metrics live here; orchestration metrics come from
//! `genloom_core::metrics` and are registered into the same registry.
//! A few gauges are sampled from application state at scrape time.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use regex_lite::Regex;

use genloom_core::UsageFilter;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "genloom_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("genloom_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "genloom_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Sampled at scrape time
// =============================================================================

/// Entities with a stage currently owned by this process.
pub static ACTIVE_ENTITIES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "genloom_active_entities",
        "Entities with a stage running in this process",
    )
    .unwrap()
});

/// Rows in the usage log.
pub static USAGE_EVENTS_STORED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("genloom_usage_events_stored", "Usage events in storage").unwrap()
});

fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();
    registry.register(Box::new(ACTIVE_ENTITIES.clone())).unwrap();
    registry
        .register(Box::new(USAGE_EVENTS_STORED.clone()))
        .unwrap();

    for metric in genloom_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Refresh the sampled gauges from application state.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let active = state.orchestrator().active_entities().await;
    ACTIVE_ENTITIES.set(active.len() as i64);

    if let Ok(count) = state.usage_store().count(&UsageFilter::new()) {
        USAGE_EVENTS_STORED.set(count);
    }
}

static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/entities/[^/]+").expect("entity pattern is valid"));

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .expect("uuid pattern is valid")
});

static NUMERIC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/\d+(/|$)").expect("numeric pattern is valid"));

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = ENTITY_RE.replace_all(path, "/entities/{id}");
    let result = UUID_RE.replace_all(&result, "{id}");
    let result = NUMERIC_RE.replace_all(&result, "/{id}$1");
    result.to_string()
}
