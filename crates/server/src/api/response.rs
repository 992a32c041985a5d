//! JSON envelope shared by every API endpoint except `/health`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use flux_media_core::{LibraryError, PipelineError};

/// `{success, data, message, timestamp}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: None,
            timestamp: Utc::now(),
        })
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
            timestamp: Utc::now(),
        })
    }
}

/// Handler result carrying the envelope on both sides.
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// An error rendered as an envelope with `success = false`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            message: Some(self.message),
            timestamp: Utc::now(),
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        let status = match &e {
            PipelineError::AttachmentNotFound(_) | PipelineError::NotConverted { .. } => {
                StatusCode::NOT_FOUND
            }
            PipelineError::NoFormats { .. }
            | PipelineError::InvalidOptions(_)
            | PipelineError::Library(LibraryError::UnsupportedMedia(_)) => StatusCode::BAD_REQUEST,
            PipelineError::BulkInProgress => StatusCode::CONFLICT,
            PipelineError::Library(_) | PipelineError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flux_media_core::Format;

    #[test]
    fn test_pipeline_error_status_codes() {
        let cases = [
            (PipelineError::AttachmentNotFound(1), StatusCode::NOT_FOUND),
            (
                PipelineError::NotConverted {
                    attachment_id: 1,
                    format: Format::Webp,
                },
                StatusCode::NOT_FOUND,
            ),
            (PipelineError::BulkInProgress, StatusCode::CONFLICT),
            (
                PipelineError::InvalidOptions("bad".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                PipelineError::Library(LibraryError::UnsupportedMedia("a.txt".to_string())),
                StatusCode::BAD_REQUEST,
            ),
            (
                PipelineError::Library(LibraryError::Database("locked".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(ApiError::from(error).status, expected);
        }
    }

    #[test]
    fn test_error_envelope_shape() {
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            message: Some("nope".to_string()),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["success"], false);
        assert!(json["data"].is_null());
        assert_eq!(json["message"], "nope");
        assert!(json["timestamp"].is_string());
    }
}
