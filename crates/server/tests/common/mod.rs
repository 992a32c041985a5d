//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process router
//! backed by mock processors, enabling end-to-end testing of the API without
//! ImageMagick or FFmpeg installed.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use flux_media_core::config::{DatabaseConfig, MediaConfig};
use flux_media_core::processor::{ImageProcessor, VideoProcessor};
use flux_media_core::{
    create_audit_system, AuditStore, CapabilityCache, Config, ConversionPipeline,
    ConversionTracker, FluxOptions, PipelineConfig, SqliteAuditStore, SqliteConversionStore,
    SqliteMediaLibrary,
    testing::{MockImageProcessor, MockVideoProcessor},
};

/// Re-export fixtures for test convenience
pub use flux_media_core::testing::fixtures;

/// Test fixture backed by mock processors.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_convert() {
///     let fixture = TestFixture::new().await;
///     let source = fixture.upload("photo.jpg", 1000);
///
///     let response = fixture.post("/api/v1/conversions/start", json!({
///         "path": "photo.jpg"
///     })).await;
///
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Pipeline behind the router
    pub pipeline: Arc<ConversionPipeline>,
    /// Mock image processor - configure failures and output sizes
    pub images: Arc<MockImageProcessor>,
    /// Mock video processor, absent when the fixture has no video backend
    pub videos: Option<Arc<MockVideoProcessor>>,
    /// Activity log store, for asserting on written events
    pub audit_store: Arc<dyn AuditStore>,
    /// Temporary directory for the database, uploads and temp files
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

impl TestFixture {
    /// Create a new test fixture with image and video mocks.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        let uploads_dir = temp_dir.path().join("uploads");
        std::fs::create_dir_all(&uploads_dir).expect("Failed to create uploads dir");

        let mut config = Config {
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            media: MediaConfig {
                uploads_dir: uploads_dir.clone(),
            },
            ..Default::default()
        };
        config.converter.temp_dir = temp_dir.path().join("tmp");

        let images = Arc::new(MockImageProcessor::full());
        let videos = if test_config.without_video {
            None
        } else {
            Some(Arc::new(MockVideoProcessor::full()))
        };

        let audit_store: Arc<dyn AuditStore> = Arc::new(
            SqliteAuditStore::new(&db_path).expect("Failed to create audit store"),
        );
        let (audit_handle, audit_writer) = create_audit_system(Arc::clone(&audit_store), 100);
        tokio::spawn(audit_writer.run());

        let capabilities = CapabilityCache::fixed(
            Some(Arc::clone(&images) as Arc<dyn ImageProcessor>),
            videos
                .as_ref()
                .map(|v| Arc::clone(v) as Arc<dyn VideoProcessor>),
        );

        let pipeline = ConversionPipeline::new(
            PipelineConfig {
                max_parallel_conversions: 2,
                temp_file_max_age: Duration::from_secs(3600),
                ..PipelineConfig::from_config(&config)
            },
            Arc::new(capabilities),
            ConversionTracker::new(Arc::new(
                SqliteConversionStore::new(&db_path).expect("Failed to create conversion store"),
            )),
            Arc::new(SqliteMediaLibrary::new(&db_path).expect("Failed to create media library")),
            FluxOptions::from_config(&config),
        )
        .with_audit(audit_handle);
        let pipeline = Arc::new(pipeline);

        let state = Arc::new(flux_media_server::state::AppState::new(
            config,
            Arc::clone(&pipeline),
            Arc::clone(&audit_store),
        ));
        let router = flux_media_server::api::create_router(state);

        Self {
            router,
            pipeline,
            images,
            videos,
            audit_store,
            temp_dir,
        }
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.temp_dir.path().join("uploads")
    }

    pub fn temp_files_dir(&self) -> PathBuf {
        self.temp_dir.path().join("tmp")
    }

    /// Write a source file of `size` bytes under the uploads directory.
    pub fn upload(&self, relative: impl AsRef<Path>, size: usize) -> PathBuf {
        fixtures::write_file(&self.uploads_dir().join(relative), size)
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Poll the bulk status endpoint until no run is active.
    pub async fn wait_for_bulk(&self) -> Value {
        for _ in 0..200 {
            let response = self.get("/api/v1/conversions/bulk").await;
            if response.body["data"]["running"] == false {
                return response.body["data"].clone();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("Bulk conversion did not finish");
    }

    /// Give the audit writer time to flush queued events.
    pub async fn flush_audit(&self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).to_string();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }
}

/// Configuration for test fixture.
#[derive(Debug, Clone, Default)]
pub struct TestConfig {
    /// Run without a video processor
    pub without_video: bool,
}

impl TestConfig {
    pub fn image_only() -> Self {
        Self {
            without_video: true,
        }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
