//! Prometheus metrics for the HTTP server.
//!
//! HTTP metrics live here; conversion metrics come from
//! `flux_media_core::metrics` and are registered into the same registry.

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Metrics
// =============================================================================

/// HTTP request duration histogram.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "flux_media_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total counter.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("flux_media_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "flux_media_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Library Metrics (collected dynamically)
// =============================================================================

/// Registered attachments.
pub static ATTACHMENTS_REGISTERED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "flux_media_attachments_registered",
        "Number of attachments known to the media library",
    )
    .unwrap()
});

/// Processor availability per media type (1 = available).
pub static PROCESSOR_AVAILABLE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "flux_media_processor_available",
            "Whether a processor is available for the media type",
        ),
        &["media_type"],
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Library
    registry
        .register(Box::new(ATTACHMENTS_REGISTERED.clone()))
        .unwrap();
    registry
        .register(Box::new(PROCESSOR_AVAILABLE.clone()))
        .unwrap();

    // Core metrics (converters, tracker, bulk runs)
    for metric in flux_media_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Refresh gauges that are read from application state rather than updated
/// in place.
pub async fn collect_dynamic_metrics(state: &AppState) {
    let snapshot = state.pipeline().capabilities().snapshot().await;
    PROCESSOR_AVAILABLE
        .with_label_values(&["image"])
        .set(snapshot.image.available as i64);
    PROCESSOR_AVAILABLE
        .with_label_values(&["video"])
        .set(snapshot.video.available as i64);

    if let Ok(attachments) = state.pipeline().library().list(None) {
        ATTACHMENTS_REGISTERED.set(attachments.len() as i64);
    }
}

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let numeric_regex = regex_lite::Regex::new(r"/\d+(/|$)").unwrap();
    numeric_regex.replace_all(path, "/{id}$1").to_string()
}
