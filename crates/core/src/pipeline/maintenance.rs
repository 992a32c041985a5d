//! Deletion and cleanup operations.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::SystemTime;

use super::{ClearSummary, ConversionPipeline, PipelineError, TempCleanup};
use crate::audit::ActivityEvent;
use crate::converter::Format;
use crate::processor::TEMP_FILE_PREFIX;

impl ConversionPipeline {
    /// Deletes the converted file of one attachment in one format.
    ///
    /// The conversion record stays; only the file goes.
    pub async fn delete_file(
        &self,
        attachment_id: i64,
        format: Format,
    ) -> Result<PathBuf, PipelineError> {
        let record = self
            .tracker
            .latest_success(attachment_id, format)
            .ok_or(PipelineError::NotConverted {
                attachment_id,
                format,
            })?;
        let path = PathBuf::from(&record.converted_path);

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PipelineError::NotConverted {
                    attachment_id,
                    format,
                })
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(attachment_id, %format, path = %path.display(), "Deleted converted file");
        self.emit(ActivityEvent::FileDeleted {
            attachment_id,
            format,
            path: path.to_string_lossy().to_string(),
        })
        .await;
        Ok(path)
    }

    /// Deletes every converted file and purges all conversion records.
    pub async fn clear_all(&self) -> ClearSummary {
        let mut files_deleted = 0;
        for record in self.tracker.successful_conversions() {
            if record.converted_path.is_empty() {
                continue;
            }
            match tokio::fs::remove_file(&record.converted_path).await {
                Ok(()) => files_deleted += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(
                    path = %record.converted_path,
                    error = %e,
                    "Failed to delete converted file"
                ),
            }
        }
        let records_deleted = self.tracker.purge_all() as u64;

        tracing::warn!(files_deleted, records_deleted, "Cleared all conversions");
        self.emit(ActivityEvent::RecordsPurged {
            records: records_deleted,
            files_deleted,
        })
        .await;
        ClearSummary {
            files_deleted,
            records_deleted,
        }
    }

    /// Retention cleanup. `None` uses the configured retention period.
    pub async fn cleanup_old_records(&self, retention_days: Option<u32>) -> usize {
        let retention_days = match retention_days {
            Some(days) => days,
            None => self.options().await.retention_days,
        };
        let deleted = self.tracker.cleanup_old_records(retention_days);
        self.emit(ActivityEvent::RecordsCleaned {
            retention_days,
            deleted: deleted as u64,
        })
        .await;
        deleted
    }

    /// Removes staged encodes older than the configured maximum age.
    ///
    /// Only files carrying the staging prefix are touched. A missing temp
    /// directory counts as clean.
    pub async fn cleanup_temp_files(&self) -> Result<TempCleanup, PipelineError> {
        let mut cleanup = TempCleanup::default();
        let mut entries = match tokio::fs::read_dir(&self.config.temp_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(cleanup),
            Err(e) => return Err(e.into()),
        };

        let now = SystemTime::now();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_name().to_string_lossy().starts_with(TEMP_FILE_PREFIX) {
                continue;
            }
            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age < self.config.temp_file_max_age {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    cleanup.deleted += 1;
                    cleanup.bytes_freed += metadata.len();
                }
                Err(e) => tracing::warn!(
                    path = %entry.path().display(),
                    error = %e,
                    "Failed to remove temp file"
                ),
            }
        }

        tracing::info!(
            deleted = cleanup.deleted,
            bytes_freed = cleanup.bytes_freed,
            "Cleaned up temp files"
        );
        self.emit(ActivityEvent::TempFilesCleaned {
            deleted: cleanup.deleted,
            bytes_freed: cleanup.bytes_freed,
        })
        .await;
        Ok(cleanup)
    }
}
