use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use flux_media_core::{config::MAX_RETENTION_DAYS, TempCleanup};

use super::response::{ApiError, ApiResponse, ApiResult};
use crate::state::AppState;

pub async fn cleanup_temp_files(State(state): State<Arc<AppState>>) -> ApiResult<TempCleanup> {
    let cleanup = state.pipeline().cleanup_temp_files().await?;
    Ok(ApiResponse::with_message(
        cleanup.clone(),
        format!(
            "Removed {} temp file(s), {} bytes freed",
            cleanup.deleted, cleanup.bytes_freed
        ),
    ))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OldRecordsRequest {
    /// Defaults to the configured retention period.
    pub retention_days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct OldRecordsResponse {
    pub deleted: usize,
}

pub async fn cleanup_old_records(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OldRecordsRequest>,
) -> ApiResult<OldRecordsResponse> {
    if let Some(days) = request.retention_days {
        if days == 0 || days > MAX_RETENTION_DAYS {
            return Err(ApiError::bad_request(format!(
                "retention_days must be between 1 and {}",
                MAX_RETENTION_DAYS
            )));
        }
    }
    let deleted = state
        .pipeline()
        .cleanup_old_records(request.retention_days)
        .await;
    Ok(ApiResponse::with_message(
        OldRecordsResponse { deleted },
        format!("Deleted {} old conversion record(s)", deleted),
    ))
}
