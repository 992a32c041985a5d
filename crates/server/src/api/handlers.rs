use axum::{extract::State, http::header, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;

use flux_media_core::{
    BulkStatus, Format, MediaConverter, ProcessorInfo, SanitizedConfig, Statistics, StatsFilter,
};

use super::response::{ApiResponse, ApiResult};
use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> ApiResult<SanitizedConfig> {
    Ok(ApiResponse::ok(state.sanitized_config()))
}

/// Processor and format support for one media type.
#[derive(Debug, Serialize)]
pub struct MediaStatus {
    pub processor: ProcessorInfo,
    pub supported_formats: Vec<Format>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub image: MediaStatus,
    pub video: MediaStatus,
    pub statistics: Statistics,
    pub bulk: BulkStatus,
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> ApiResult<StatusResponse> {
    let pipeline = state.pipeline();
    let image = pipeline.image_converter();
    let video = pipeline.video_converter();

    Ok(ApiResponse::ok(StatusResponse {
        version: VERSION.to_string(),
        image: MediaStatus {
            processor: image.processor_info().await,
            supported_formats: image.supported_formats().await,
        },
        video: MediaStatus {
            processor: video.processor_info().await,
            supported_formats: video.supported_formats().await,
        },
        statistics: pipeline.tracker().statistics(&StatsFilter::new()),
        bulk: pipeline.bulk_status().await,
    }))
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state).await;
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
