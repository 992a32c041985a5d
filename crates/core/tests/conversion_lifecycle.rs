//! Conversion lifecycle integration tests.
//!
//! These tests drive the pipeline over one on-disk database shared by the
//! library, tracker and activity log, with mock processors:
//! - Mixed image and video bulk runs
//! - Outcome records and statistics per format
//! - Activity events written by the audit writer
//! - Clearing and retention

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use flux_media_core::{
    create_audit_system, ActivityLevel, AuditFilter, AuditStore, CapabilityCache,
    ConversionPipeline, ConversionStatus, ConversionTracker, FluxOptions, Format, MediaType,
    PipelineConfig, SqliteAuditStore, SqliteConversionStore, SqliteMediaLibrary, StatsFilter,
    processor::{ImageProcessor, VideoProcessor},
    testing::{fixtures::write_file, MockImageProcessor, MockVideoProcessor},
};

/// Test helper wiring a pipeline to mocks and a file-backed database.
struct TestHarness {
    pipeline: Arc<ConversionPipeline>,
    images: Arc<MockImageProcessor>,
    videos: Arc<MockVideoProcessor>,
    audit_store: Arc<dyn AuditStore>,
    temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_parallelism(2)
    }

    fn with_parallelism(max_parallel_conversions: usize) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("flux.db");

        let images = Arc::new(MockImageProcessor::full());
        let videos = Arc::new(MockVideoProcessor::full());

        let audit_store: Arc<dyn AuditStore> = Arc::new(
            SqliteAuditStore::new(&db_path).expect("Failed to create audit store"),
        );
        let (audit_handle, audit_writer) = create_audit_system(Arc::clone(&audit_store), 100);
        tokio::spawn(audit_writer.run());

        let pipeline = ConversionPipeline::new(
            PipelineConfig {
                uploads_dir: temp_dir.path().join("uploads"),
                temp_dir: temp_dir.path().join("tmp"),
                max_parallel_conversions,
                temp_file_max_age: Duration::from_secs(3600),
            },
            Arc::new(CapabilityCache::fixed(
                Some(Arc::clone(&images) as Arc<dyn ImageProcessor>),
                Some(Arc::clone(&videos) as Arc<dyn VideoProcessor>),
            )),
            ConversionTracker::new(Arc::new(
                SqliteConversionStore::new(&db_path).expect("Failed to create conversion store"),
            )),
            Arc::new(SqliteMediaLibrary::new(&db_path).expect("Failed to create media library")),
            FluxOptions::default(),
        )
        .with_audit(audit_handle);

        Self {
            pipeline: Arc::new(pipeline),
            images,
            videos,
            audit_store,
            temp_dir,
        }
    }

    fn upload(&self, relative: &str, size: usize) -> PathBuf {
        write_file(&self.temp_dir.path().join("uploads").join(relative), size)
    }

    fn uploads(&self) -> PathBuf {
        self.temp_dir.path().join("uploads")
    }

    async fn events(&self, event_type: &str) -> Vec<flux_media_core::ActivityRecord> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.audit_store
            .query(&AuditFilter::new().with_event_type(event_type))
            .expect("Failed to query activity log")
    }
}

fn exists(dir: &Path, name: &str) -> bool {
    dir.join(name).exists()
}

#[tokio::test]
async fn test_bulk_run_over_mixed_media() {
    let harness = TestHarness::new();
    harness.upload("photos/a.jpg", 1000);
    harness.upload("photos/b.png", 1000);
    harness.upload("clips/c.mp4", 4000);

    let summary = harness.pipeline.run_bulk(10).await.unwrap();
    assert_eq!(summary.queued, 3);
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.converted, 3);
    assert_eq!(summary.failed, 0);
    assert!(!summary.cancelled);

    let uploads = harness.uploads();
    assert!(exists(&uploads, "photos/a.webp"));
    assert!(exists(&uploads, "photos/b.avif"));
    assert!(exists(&uploads, "clips/c.webm"));
    assert!(exists(&uploads, "clips/c.av1.mp4"));

    let tracker = harness.pipeline.tracker();
    let stats = tracker.statistics(&StatsFilter::new());
    assert_eq!(stats.total_conversions, 6);
    assert_eq!(stats.success_rate, 100.0);
    assert_eq!(stats.conversions_by_format.get(&Format::Av1), Some(&1));
    assert_eq!(stats.conversions_by_format.get(&Format::Webp), Some(&2));
    assert!(stats.total_space_saved > 0);

    assert_eq!(harness.videos.recorded_encodes().await.len(), 2);
    assert_eq!(harness.images.recorded_encodes().await.len(), 4);
}

#[tokio::test]
async fn test_second_bulk_run_skips_converted_attachments() {
    let harness = TestHarness::new();
    harness.upload("a.jpg", 1000);
    harness.upload("b.jpg", 1000);

    let first = harness.pipeline.run_bulk(10).await.unwrap();
    assert_eq!(first.converted, 2);

    // Outputs of the first run are not picked up as new sources.
    harness.upload("c.jpg", 1000);
    let second = harness.pipeline.run_bulk(10).await.unwrap();
    assert_eq!(second.queued, 1);
    assert_eq!(second.skipped, 2);
    assert_eq!(second.converted, 1);

    let attachments = harness
        .pipeline
        .library()
        .list(Some(MediaType::Image))
        .unwrap();
    assert_eq!(attachments.len(), 3);
}

#[tokio::test]
async fn test_failed_formats_are_recorded_and_logged() {
    let harness = TestHarness::new();
    harness.videos.fail_format(Format::Av1, "svt-av1 missing").await;
    harness.videos.fail_format(Format::Webm, "libvpx missing").await;
    let clip = harness.upload("clip.mov", 4000);

    let report = harness.pipeline.convert_path(&clip, None).await.unwrap();
    assert!(!report.result.success);
    assert!(report.result.converted_formats.is_empty());
    assert_eq!(report.result.errors.len(), 2);

    let failed = harness
        .pipeline
        .tracker()
        .statistics(&StatsFilter::new().with_status(ConversionStatus::Failed));
    assert_eq!(failed.total_conversions, 2);

    let recent = harness.pipeline.tracker().recent_conversions(10);
    assert!(recent
        .iter()
        .all(|r| r.status == ConversionStatus::Failed && r.error_message.is_some()));

    let events = harness.events("conversion_failed").await;
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.level == ActivityLevel::Error));
    assert!(events.iter().all(|e| e.attachment_id == Some(report.attachment_id)));
}

#[tokio::test]
async fn test_bulk_events_are_written() {
    let harness = TestHarness::new();
    harness.upload("a.jpg", 1000);
    harness.images.fail_format(Format::Webp, "encoder crashed").await;
    harness.images.fail_format(Format::Avif, "encoder crashed").await;

    let summary = harness.pipeline.run_bulk(10).await.unwrap();
    assert_eq!(summary.failed, 1);

    assert_eq!(harness.events("bulk_conversion_queued").await.len(), 1);
    let finished = harness.events("bulk_conversion_finished").await;
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].level, ActivityLevel::Warning);
}

#[tokio::test]
async fn test_clear_all_then_reconvert() {
    let harness = TestHarness::new();
    let source = harness.upload("a.jpg", 1000);
    harness.pipeline.run_bulk(10).await.unwrap();

    let cleared = harness.pipeline.clear_all().await;
    assert_eq!(cleared.files_deleted, 2);
    assert_eq!(cleared.records_deleted, 2);
    assert!(source.exists());
    assert!(!exists(&harness.uploads(), "a.webp"));

    // With no records left the attachment is pending again.
    let summary = harness.pipeline.run_bulk(10).await.unwrap();
    assert_eq!(summary.converted, 1);
    assert!(exists(&harness.uploads(), "a.webp"));

    let purged = harness.events("records_purged").await;
    assert_eq!(purged.len(), 1);
    assert_eq!(purged[0].level, ActivityLevel::Warning);
}

#[tokio::test]
async fn test_serial_bulk_run() {
    let harness = TestHarness::with_parallelism(1);
    for i in 0..5 {
        harness.upload(&format!("img{}.jpg", i), 500);
    }

    let summary = harness.pipeline.run_bulk(3).await.unwrap();
    assert_eq!(summary.queued, 3);
    assert_eq!(summary.converted, 3);

    let status = harness.pipeline.bulk_status().await;
    assert!(!status.running);
    assert_eq!(status.last, Some(summary));
}
