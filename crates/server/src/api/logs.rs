use axum::extract::{Query, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use flux_media_core::{ActivityLevel, ActivityRecord, AuditFilter};

use super::response::{ApiError, ApiResponse, ApiResult};
use crate::state::AppState;

/// Maximum allowed limit for log queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for log queries
const DEFAULT_LIMIT: i64 = 100;

/// Query parameters for the activity log endpoint
#[derive(Debug, Deserialize)]
pub struct LogQueryParams {
    /// Filter by event type (e.g. `conversion_failed`)
    pub event_type: Option<String>,
    /// Filter by level
    pub level: Option<ActivityLevel>,
    /// Filter by attachment ID
    pub attachment_id: Option<i64>,
    /// Filter events after this timestamp (ISO 8601)
    pub from: Option<DateTime<Utc>>,
    /// Filter events before this timestamp (ISO 8601)
    pub to: Option<DateTime<Utc>>,
    /// Maximum number of events to return (default 100, max 1000)
    pub limit: Option<i64>,
    /// Pagination offset (default 0)
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LogQueryResponse {
    pub events: Vec<ActivityRecord>,
    /// Total number of matching events
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Query the activity log
pub async fn query_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LogQueryParams>,
) -> ApiResult<LogQueryResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    // Shared between query and count
    let mut base_filter = AuditFilter::new();
    if let Some(ref event_type) = params.event_type {
        base_filter = base_filter.with_event_type(event_type);
    }
    if let Some(level) = params.level {
        base_filter = base_filter.with_level(level);
    }
    if let Some(attachment_id) = params.attachment_id {
        base_filter = base_filter.with_attachment(attachment_id);
    }
    if params.from.is_some() || params.to.is_some() {
        base_filter = base_filter.with_time_range(params.from, params.to);
    }

    let query_filter = base_filter.clone().with_limit(limit).with_offset(offset);

    let events = state
        .audit_store()
        .query(&query_filter)
        .map_err(|e| ApiError::internal(format!("Failed to query activity log: {}", e)))?;
    let total = state
        .audit_store()
        .count(&base_filter)
        .map_err(|e| ApiError::internal(format!("Failed to count activity log: {}", e)))?;

    Ok(ApiResponse::ok(LogQueryResponse {
        events,
        total,
        limit,
        offset,
    }))
}
