//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Converter services (encodes per format, durations, bytes saved)
//! - Capability probing
//! - Bulk conversion runs

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Converter Metrics
// =============================================================================

/// Encodes total by format and result.
pub static CONVERSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("flux_media_conversions_total", "Total format conversions"),
        &["format", "result"], // result: "success", "failed"
    )
    .unwrap()
});

/// Encode duration in seconds.
pub static CONVERSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "flux_media_conversion_duration_seconds",
            "Duration of single format conversions",
        )
        .buckets(vec![
            0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0, 3600.0,
        ]),
        &["format"],
    )
    .unwrap()
});

/// Bytes saved by successful conversions.
pub static BYTES_SAVED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "flux_media_bytes_saved_total",
        "Total bytes saved by converted files",
    )
    .unwrap()
});

/// Capability probes total by media type.
pub static CAPABILITY_PROBES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "flux_media_capability_probes_total",
            "Total processor capability probes",
        ),
        &["media_type"],
    )
    .unwrap()
});

// =============================================================================
// Pipeline Metrics
// =============================================================================

/// Attachments processed by the pipeline, by result.
pub static ATTACHMENTS_PROCESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "flux_media_attachments_processed_total",
            "Total attachments processed",
        ),
        &["result"], // "success", "failed"
    )
    .unwrap()
});

/// Bulk conversion jobs currently running.
pub static BULK_JOBS_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "flux_media_bulk_jobs_running",
        "Bulk conversion jobs currently running",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Converter
        Box::new(CONVERSIONS_TOTAL.clone()),
        Box::new(CONVERSION_DURATION.clone()),
        Box::new(BYTES_SAVED.clone()),
        Box::new(CAPABILITY_PROBES.clone()),
        // Pipeline
        Box::new(ATTACHMENTS_PROCESSED.clone()),
        Box::new(BULK_JOBS_RUNNING.clone()),
    ]
}
