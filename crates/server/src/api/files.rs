use axum::extract::{Path, State};
use serde::Serialize;
use std::sync::Arc;

use flux_media_core::Format;

use super::response::{ApiError, ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct DeleteFileResponse {
    pub attachment_id: i64,
    pub format: Format,
    pub path: String,
}

/// Delete the converted file of one attachment in one format.
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path((attachment_id, format)): Path<(i64, String)>,
) -> ApiResult<DeleteFileResponse> {
    let format: Format = format.parse().map_err(ApiError::bad_request)?;
    let path = state.pipeline().delete_file(attachment_id, format).await?;

    Ok(ApiResponse::with_message(
        DeleteFileResponse {
            attachment_id,
            format,
            path: path.to_string_lossy().to_string(),
        },
        format!("Deleted {} file of attachment {}", format, attachment_id),
    ))
}
