use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flux_media_core::{
    BulkStatus, ConversionRecord, ConversionReport, ConversionStatus, Format, Statistics,
    StatsFilter,
};

use super::response::{ApiError, ApiResponse, ApiResult};
use crate::state::AppState;

/// Maximum allowed limit for recent conversions
const MAX_RECENT_LIMIT: usize = 100;

/// Default limit for recent conversions
const DEFAULT_RECENT_LIMIT: usize = 20;

/// Default number of attachments per bulk run
const DEFAULT_BATCH_SIZE: usize = 50;

/// Query parameters for the statistics endpoint
#[derive(Debug, Deserialize)]
pub struct StatsQueryParams {
    pub format: Option<Format>,
    pub status: Option<ConversionStatus>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StatsQueryParams>,
) -> ApiResult<Statistics> {
    let mut filter = StatsFilter::new();
    if let Some(format) = params.format {
        filter = filter.with_format(format);
    }
    if let Some(status) = params.status {
        filter = filter.with_status(status);
    }
    if params.date_from.is_some() || params.date_to.is_some() {
        filter = filter.with_date_range(params.date_from, params.date_to);
    }

    Ok(ApiResponse::ok(state.pipeline().tracker().statistics(&filter)))
}

#[derive(Debug, Deserialize)]
pub struct RecentQueryParams {
    /// Number of records (default 20, max 100)
    pub limit: Option<usize>,
}

pub async fn get_recent(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecentQueryParams>,
) -> ApiResult<Vec<ConversionRecord>> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_RECENT_LIMIT)
        .clamp(1, MAX_RECENT_LIMIT);
    Ok(ApiResponse::ok(
        state.pipeline().tracker().recent_conversions(limit),
    ))
}

/// Request body for converting a single attachment
#[derive(Debug, Deserialize)]
pub struct StartConversionRequest {
    pub attachment_id: Option<i64>,
    /// Source file, relative paths resolve against the uploads directory.
    pub path: Option<PathBuf>,
    /// Formats to produce. Defaults to every enabled format.
    pub formats: Option<Vec<Format>>,
}

pub async fn start_conversion(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartConversionRequest>,
) -> ApiResult<ConversionReport> {
    let pipeline = state.pipeline();
    let formats = request.formats.as_deref();

    let report = match (request.attachment_id, request.path) {
        (Some(id), _) => pipeline.convert_attachment(id, formats).await?,
        (None, Some(path)) => {
            let path = resolve_upload(&pipeline.config().uploads_dir, &path)?;
            pipeline.convert_path(&path, formats).await?
        }
        (None, None) => {
            return Err(ApiError::bad_request(
                "Either attachment_id or path is required",
            ))
        }
    };

    let message = if report.result.success {
        format!(
            "Converted attachment {} to {} format(s)",
            report.attachment_id,
            report.result.converted_formats.len()
        )
    } else {
        format!("Conversion of attachment {} failed", report.attachment_id)
    };
    Ok(ApiResponse::with_message(report, message))
}

/// Resolves a requested source against the uploads directory.
///
/// The file must exist and, once symlinks and `..` are resolved, lie inside
/// `uploads_dir`. The returned path is rooted at `uploads_dir` as configured,
/// matching the paths the directory scan registers.
fn resolve_upload(uploads_dir: &Path, requested: &Path) -> Result<PathBuf, ApiError> {
    let path = uploads_dir.join(requested);
    if !path.is_file() {
        return Err(ApiError::not_found(format!(
            "File not found: {}",
            requested.display()
        )));
    }

    let root = uploads_dir
        .canonicalize()
        .map_err(|e| ApiError::internal(format!("Uploads directory unavailable: {}", e)))?;
    let canonical = path
        .canonicalize()
        .map_err(|e| ApiError::internal(format!("Cannot resolve {}: {}", path.display(), e)))?;

    match canonical.strip_prefix(&root) {
        Ok(relative) => Ok(uploads_dir.join(relative)),
        Err(_) => {
            tracing::warn!(path = %requested.display(), "Rejected source outside uploads directory");
            Err(ApiError::bad_request(format!(
                "Path is outside the uploads directory: {}",
                requested.display()
            )))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BulkConversionRequest {
    pub batch_size: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct BulkConversionResponse {
    pub queued: u32,
    pub batch_size: usize,
}

/// Start a background bulk run over the uploads directory.
pub async fn start_bulk(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BulkConversionRequest>,
) -> ApiResult<BulkConversionResponse> {
    let batch_size = request.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
    if batch_size == 0 {
        return Err(ApiError::bad_request("batch_size must be at least 1"));
    }

    let queued = state.pipeline().start_bulk(batch_size).await?;
    Ok(ApiResponse::with_message(
        BulkConversionResponse { queued, batch_size },
        format!("Queued {} attachment(s) for conversion", queued),
    ))
}

pub async fn get_bulk_status(State(state): State<Arc<AppState>>) -> ApiResult<BulkStatus> {
    Ok(ApiResponse::ok(state.pipeline().bulk_status().await))
}

#[derive(Debug, Serialize)]
pub struct CancelBulkResponse {
    pub cancelled: bool,
}

pub async fn cancel_bulk(State(state): State<Arc<AppState>>) -> ApiResult<CancelBulkResponse> {
    if !state.pipeline().cancel_bulk() {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "No bulk conversion is running",
        ));
    }
    Ok(ApiResponse::with_message(
        CancelBulkResponse { cancelled: true },
        "Bulk conversion cancellation requested",
    ))
}
