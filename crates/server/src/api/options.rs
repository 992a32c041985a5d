use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use flux_media_core::FluxOptions;

use super::response::{ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UpdateOptionsResponse {
    pub options: FluxOptions,
    /// Top-level fields that differ from the previous options.
    pub changed: Vec<String>,
}

pub async fn get_options(State(state): State<Arc<AppState>>) -> ApiResult<FluxOptions> {
    Ok(ApiResponse::ok(state.pipeline().options().await))
}

/// Replace the runtime options. Invalid options leave the current ones in place.
pub async fn update_options(
    State(state): State<Arc<AppState>>,
    Json(options): Json<FluxOptions>,
) -> ApiResult<UpdateOptionsResponse> {
    let changed = state.pipeline().update_options(options).await?;
    let message = if changed.is_empty() {
        "Options unchanged".to_string()
    } else {
        format!("Updated {}", changed.join(", "))
    };

    Ok(ApiResponse::with_message(
        UpdateOptionsResponse {
            options: state.pipeline().options().await,
            changed,
        },
        message,
    ))
}
