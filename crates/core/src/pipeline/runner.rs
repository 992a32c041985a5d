use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;

use super::{BulkStatus, BulkSummary, ConversionReport, PipelineConfig, PipelineError};
use crate::audit::{ActivityEvent, AuditHandle};
use crate::config::FluxOptions;
use crate::converter::{
    size_reduction, CapabilityCache, ConversionSettings, Format, ImageConverter, MediaConverter,
    MediaType, VideoConverter,
};
use crate::library::{scan_directory, Attachment, MediaLibrary};
use crate::metrics;
use crate::tracker::ConversionTracker;

/// Drives conversions of library attachments and records their outcomes.
pub struct ConversionPipeline {
    pub(super) config: PipelineConfig,
    pub(super) capabilities: Arc<CapabilityCache>,
    image: ImageConverter,
    video: VideoConverter,
    pub(super) tracker: ConversionTracker,
    library: Arc<dyn MediaLibrary>,
    options: RwLock<FluxOptions>,
    pub(super) audit: Option<AuditHandle>,
    bulk_running: AtomicBool,
    bulk_cancel: AtomicBool,
    last_bulk: RwLock<Option<BulkSummary>>,
}

/// Clears the running flag when a bulk run ends, however it ends.
struct BulkGuard {
    pipeline: Arc<ConversionPipeline>,
}

impl Drop for BulkGuard {
    fn drop(&mut self) {
        self.pipeline.bulk_running.store(false, Ordering::SeqCst);
        self.pipeline.bulk_cancel.store(false, Ordering::SeqCst);
        metrics::BULK_JOBS_RUNNING.dec();
    }
}

impl ConversionPipeline {
    pub fn new(
        config: PipelineConfig,
        capabilities: Arc<CapabilityCache>,
        tracker: ConversionTracker,
        library: Arc<dyn MediaLibrary>,
        options: FluxOptions,
    ) -> Self {
        Self {
            image: ImageConverter::new(Arc::clone(&capabilities), options.image.clone()),
            video: VideoConverter::new(Arc::clone(&capabilities), options.video.clone()),
            config,
            capabilities,
            tracker,
            library,
            options: RwLock::new(options),
            audit: None,
            bulk_running: AtomicBool::new(false),
            bulk_cancel: AtomicBool::new(false),
            last_bulk: RwLock::new(None),
        }
    }

    /// Sets the audit handle for activity events.
    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &Arc<CapabilityCache> {
        &self.capabilities
    }

    pub fn tracker(&self) -> &ConversionTracker {
        &self.tracker
    }

    pub fn library(&self) -> &Arc<dyn MediaLibrary> {
        &self.library
    }

    pub fn image_converter(&self) -> &ImageConverter {
        &self.image
    }

    pub fn video_converter(&self) -> &VideoConverter {
        &self.video
    }

    pub fn converter_for(&self, media_type: MediaType) -> &dyn MediaConverter {
        match media_type {
            MediaType::Image => &self.image,
            MediaType::Video => &self.video,
        }
    }

    pub(super) async fn emit(&self, event: ActivityEvent) {
        if let Some(ref audit) = self.audit {
            audit.emit(event).await;
        }
    }

    pub async fn options(&self) -> FluxOptions {
        self.options.read().await.clone()
    }

    /// Validates and installs new options.
    ///
    /// Converter defaults follow the new options and the capability cache is
    /// invalidated so the next conversion re-probes the host. Returns the
    /// names of the fields that changed.
    pub async fn update_options(&self, new: FluxOptions) -> Result<Vec<String>, PipelineError> {
        new.validate()
            .map_err(|e| PipelineError::InvalidOptions(e.to_string()))?;

        let changed = {
            let mut current = self.options.write().await;
            let changed = new.changed_fields(&current);
            *current = new.clone();
            changed
        };

        self.image.set_defaults(new.image).await;
        self.video.set_defaults(new.video).await;
        self.capabilities.invalidate().await;

        tracing::info!(changed = ?changed, "Options updated");
        self.emit(ActivityEvent::OptionsUpdated {
            changed: changed.clone(),
        })
        .await;
        Ok(changed)
    }

    /// Registers `path` in the library and converts it.
    pub async fn convert_path(
        &self,
        path: &Path,
        formats: Option<&[Format]>,
    ) -> Result<ConversionReport, PipelineError> {
        let attachment = self.library.register(path)?;
        self.convert(&attachment, formats).await
    }

    /// Converts one attachment into `formats`, or every enabled format for
    /// its media type when `None`.
    pub async fn convert_attachment(
        &self,
        attachment_id: i64,
        formats: Option<&[Format]>,
    ) -> Result<ConversionReport, PipelineError> {
        let attachment = self.library.get(attachment_id)?;
        self.convert(&attachment, formats).await
    }

    async fn convert(
        &self,
        attachment: &Attachment,
        formats: Option<&[Format]>,
    ) -> Result<ConversionReport, PipelineError> {
        let options = self.options().await;
        let destinations: BTreeMap<Format, PathBuf> = attachment
            .media_type
            .target_formats()
            .iter()
            .copied()
            .filter(|f| match formats {
                Some(requested) => requested.contains(f),
                None => options.is_enabled(*f),
            })
            .map(|f| (f, f.destination_for(&attachment.path)))
            .collect();

        if destinations.is_empty() {
            return Err(PipelineError::NoFormats {
                attachment_id: attachment.id,
                media_type: attachment.media_type,
            });
        }

        let settings = ConversionSettings {
            options: Default::default(),
            policy: options.policy,
        };

        let start = Instant::now();
        let result = self
            .converter_for(attachment.media_type)
            .process_media(&attachment.path, &destinations, &settings)
            .await;
        let processing_time = start.elapsed().as_secs();

        for format in destinations.keys() {
            match result.converted_files.get(format) {
                Some(converted) => {
                    let reduction = size_reduction(&attachment.path, converted);
                    self.tracker.record_success(
                        attachment.id,
                        &attachment.path,
                        converted,
                        *format,
                        reduction,
                        processing_time,
                    );
                    self.emit(ActivityEvent::ConversionCompleted {
                        attachment_id: attachment.id,
                        format: *format,
                        converted_path: converted.to_string_lossy().to_string(),
                        size_reduction: reduction,
                        processing_time,
                    })
                    .await;
                }
                None => {
                    let prefix = format!("{}: ", format);
                    let error = result
                        .errors
                        .iter()
                        .find_map(|e| e.strip_prefix(&prefix))
                        .unwrap_or("conversion failed")
                        .to_string();
                    self.tracker
                        .record_failure(attachment.id, &attachment.path, *format, &error);
                    self.emit(ActivityEvent::ConversionFailed {
                        attachment_id: attachment.id,
                        format: *format,
                        error,
                    })
                    .await;
                }
            }
        }

        metrics::ATTACHMENTS_PROCESSED
            .with_label_values(&[if result.success { "success" } else { "failed" }])
            .inc();

        Ok(ConversionReport {
            attachment_id: attachment.id,
            media_type: attachment.media_type,
            source: attachment.path.clone(),
            processing_time,
            result,
        })
    }

    /// Scans the uploads directory and returns attachments with no successful
    /// conversion yet, at most `batch_size` of them, plus the number skipped.
    ///
    /// The walk and the per-file lookups run on the blocking pool.
    pub async fn pending_attachments(
        self: &Arc<Self>,
        batch_size: usize,
    ) -> Result<(Vec<Attachment>, u32), PipelineError> {
        let pipeline = Arc::clone(self);
        tokio::task::spawn_blocking(move || pipeline.scan_pending(batch_size))
            .await
            .map_err(|e| PipelineError::Io(std::io::Error::other(e)))?
    }

    fn scan_pending(&self, batch_size: usize) -> Result<(Vec<Attachment>, u32), PipelineError> {
        let all = scan_directory(self.library.as_ref(), &self.config.uploads_dir)?;
        let (pending, done): (Vec<_>, Vec<_>) = all
            .into_iter()
            .partition(|a| !self.tracker.has_success(a.id));
        let pending = pending.into_iter().take(batch_size).collect();
        Ok((pending, done.len() as u32))
    }

    fn begin_bulk(self: &Arc<Self>) -> Result<BulkGuard, PipelineError> {
        if self
            .bulk_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PipelineError::BulkInProgress);
        }
        self.bulk_cancel.store(false, Ordering::SeqCst);
        metrics::BULK_JOBS_RUNNING.inc();
        Ok(BulkGuard {
            pipeline: Arc::clone(self),
        })
    }

    /// Converts up to `batch_size` pending attachments and waits for them.
    pub async fn run_bulk(
        self: &Arc<Self>,
        batch_size: usize,
    ) -> Result<BulkSummary, PipelineError> {
        let guard = self.begin_bulk()?;
        let (pending, skipped) = self.pending_attachments(batch_size).await?;
        let summary = self.execute_bulk(pending, skipped).await;
        drop(guard);
        Ok(summary)
    }

    /// Starts a bulk run in the background. Returns the number of queued
    /// attachments.
    pub async fn start_bulk(self: &Arc<Self>, batch_size: usize) -> Result<u32, PipelineError> {
        let guard = self.begin_bulk()?;
        let (pending, skipped) = self.pending_attachments(batch_size).await?;
        let queued = pending.len() as u32;

        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            pipeline.execute_bulk(pending, skipped).await;
            drop(guard);
        });
        Ok(queued)
    }

    async fn execute_bulk(
        self: &Arc<Self>,
        pending: Vec<Attachment>,
        skipped: u32,
    ) -> BulkSummary {
        let batch_size = pending.len() as u32;
        let mut summary = BulkSummary {
            queued: batch_size,
            skipped,
            ..Default::default()
        };
        *self.last_bulk.write().await = Some(summary.clone());

        self.emit(ActivityEvent::BulkConversionQueued {
            attachments: batch_size,
            batch_size,
        })
        .await;
        tracing::info!(queued = batch_size, skipped, "Bulk conversion started");

        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_conversions));
        let mut tasks = JoinSet::new();

        for attachment in pending {
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            if self.bulk_cancel.load(Ordering::SeqCst) {
                summary.cancelled = true;
                break;
            }
            let pipeline = Arc::clone(self);
            tasks.spawn(async move {
                let _permit = permit;
                let id = attachment.id;
                (id, pipeline.convert(&attachment, None).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            summary.processed += 1;
            match joined {
                Ok((_, Ok(report))) if report.result.success => summary.converted += 1,
                Ok((id, Ok(_))) => {
                    tracing::debug!(attachment_id = id, "Bulk item had no successful format");
                    summary.failed += 1;
                }
                Ok((id, Err(e))) => {
                    tracing::warn!(attachment_id = id, error = %e, "Bulk item failed");
                    summary.failed += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Bulk task panicked");
                    summary.failed += 1;
                }
            }
            *self.last_bulk.write().await = Some(summary.clone());
        }

        summary.cancelled |= self.bulk_cancel.load(Ordering::SeqCst);
        *self.last_bulk.write().await = Some(summary.clone());

        tracing::info!(
            processed = summary.processed,
            converted = summary.converted,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "Bulk conversion finished"
        );
        self.emit(ActivityEvent::BulkConversionFinished {
            processed: summary.processed,
            converted: summary.converted,
            failed: summary.failed,
            skipped: summary.skipped,
            cancelled: summary.cancelled,
        })
        .await;
        summary
    }

    /// Asks a running bulk job to stop scheduling new attachments.
    ///
    /// Returns false when no bulk job is running. In-flight conversions run
    /// to completion.
    pub fn cancel_bulk(&self) -> bool {
        if !self.bulk_running.load(Ordering::SeqCst) {
            return false;
        }
        self.bulk_cancel.store(true, Ordering::SeqCst);
        tracing::info!("Bulk conversion cancellation requested");
        true
    }

    pub async fn bulk_status(&self) -> BulkStatus {
        BulkStatus {
            running: self.bulk_running.load(Ordering::SeqCst),
            cancel_requested: self.bulk_cancel.load(Ordering::SeqCst),
            last: self.last_bulk.read().await.clone(),
        }
    }
}
