use chrono::{Duration, Utc};
use std::path::Path;
use std::sync::Arc;

use super::{ConversionRecord, ConversionStatus, ConversionStore, Statistics, StatsFilter};
use crate::converter::Format;
use crate::metrics;

/// Best-effort recorder of conversion outcomes.
///
/// Storage errors are logged and reported as `false`, zero or empty values so
/// a broken database never stops a conversion.
#[derive(Clone)]
pub struct ConversionTracker {
    store: Arc<dyn ConversionStore>,
}

impl ConversionTracker {
    pub fn new(store: Arc<dyn ConversionStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ConversionStore> {
        &self.store
    }

    /// Records a successful conversion. `processing_time` is in seconds.
    pub fn record_success(
        &self,
        attachment_id: i64,
        original: &Path,
        converted: &Path,
        format: Format,
        size_reduction: f64,
        processing_time: u64,
    ) -> bool {
        let bytes_saved = match (std::fs::metadata(original), std::fs::metadata(converted)) {
            (Ok(o), Ok(c)) => o.len() as i64 - c.len() as i64,
            _ => 0,
        };

        let record = ConversionRecord {
            id: 0,
            attachment_id,
            original_path: original.to_string_lossy().to_string(),
            converted_path: converted.to_string_lossy().to_string(),
            format,
            status: ConversionStatus::Success,
            size_reduction,
            processing_time: processing_time as i64,
            error_message: None,
            bytes_saved,
            created_at: Utc::now(),
        };

        let stored = self.insert(&record);
        if stored && bytes_saved > 0 {
            metrics::BYTES_SAVED.inc_by(bytes_saved as u64);
        }
        stored
    }

    pub fn record_failure(
        &self,
        attachment_id: i64,
        original: &Path,
        format: Format,
        error_message: &str,
    ) -> bool {
        let record = ConversionRecord {
            id: 0,
            attachment_id,
            original_path: original.to_string_lossy().to_string(),
            converted_path: String::new(),
            format,
            status: ConversionStatus::Failed,
            size_reduction: 0.0,
            processing_time: 0,
            error_message: Some(error_message.to_string()),
            bytes_saved: 0,
            created_at: Utc::now(),
        };
        self.insert(&record)
    }

    fn insert(&self, record: &ConversionRecord) -> bool {
        match self.store.insert(record) {
            Ok(id) => {
                tracing::debug!(
                    id,
                    attachment_id = record.attachment_id,
                    format = %record.format,
                    status = %record.status,
                    "Recorded conversion"
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    attachment_id = record.attachment_id,
                    format = %record.format,
                    error = %e,
                    "Failed to record conversion"
                );
                false
            }
        }
    }

    /// Aggregates over matching records, all zero on error.
    pub fn statistics(&self, filter: &StatsFilter) -> Statistics {
        self.store.statistics(filter).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to compute statistics");
            Statistics::default()
        })
    }

    /// Most recent records, newest first.
    pub fn recent_conversions(&self, limit: usize) -> Vec<ConversionRecord> {
        self.query(&StatsFilter::new(), limit as i64)
    }

    /// Deletes records older than `retention_days`. Returns the number removed.
    pub fn cleanup_old_records(&self, retention_days: u32) -> usize {
        // a cutoff before the representable range means nothing is that old
        let Some(cutoff) = Utc::now().checked_sub_signed(Duration::days(retention_days as i64))
        else {
            return 0;
        };
        match self.store.delete_before(cutoff) {
            Ok(deleted) => {
                tracing::info!(deleted, retention_days, "Cleaned up old conversion records");
                deleted
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to clean up conversion records");
                0
            }
        }
    }

    /// Deletes every record.
    pub fn purge_all(&self) -> usize {
        match self.store.delete_all() {
            Ok(deleted) => {
                tracing::info!(deleted, "Purged all conversion records");
                deleted
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to purge conversion records");
                0
            }
        }
    }

    /// Newest successful record of an attachment in a format.
    pub fn latest_success(&self, attachment_id: i64, format: Format) -> Option<ConversionRecord> {
        let filter = StatsFilter::new()
            .with_attachment(attachment_id)
            .with_format(format)
            .with_status(ConversionStatus::Success);
        self.query(&filter, 1).into_iter().next()
    }

    /// Whether any format of an attachment has converted.
    pub fn has_success(&self, attachment_id: i64) -> bool {
        let filter = StatsFilter::new()
            .with_attachment(attachment_id)
            .with_status(ConversionStatus::Success);
        self.store.count(&filter).map(|n| n > 0).unwrap_or_else(|e| {
            tracing::error!(attachment_id, error = %e, "Failed to look up conversions");
            false
        })
    }

    /// Every successful record.
    pub fn successful_conversions(&self) -> Vec<ConversionRecord> {
        self.query(
            &StatsFilter::new().with_status(ConversionStatus::Success),
            i64::MAX,
        )
    }

    fn query(&self, filter: &StatsFilter, limit: i64) -> Vec<ConversionRecord> {
        self.store.query(filter, limit).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to query conversions");
            Vec::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::write_file;
    use crate::tracker::{SqliteConversionStore, TrackerError};
    use chrono::DateTime;

    fn tracker() -> ConversionTracker {
        ConversionTracker::new(Arc::new(SqliteConversionStore::in_memory().unwrap()))
    }

    fn backdated(attachment_id: i64, created_at: DateTime<Utc>) -> ConversionRecord {
        ConversionRecord {
            id: 0,
            attachment_id,
            original_path: "/uploads/a.jpg".to_string(),
            converted_path: "/uploads/a.webp".to_string(),
            format: Format::Webp,
            status: ConversionStatus::Success,
            size_reduction: 50.0,
            processing_time: 1,
            error_message: None,
            bytes_saved: 10,
            created_at,
        }
    }

    struct BrokenStore;

    impl ConversionStore for BrokenStore {
        fn insert(&self, _: &ConversionRecord) -> Result<i64, TrackerError> {
            Err(TrackerError::Database("disk I/O error".to_string()))
        }
        fn query(&self, _: &StatsFilter, _: i64) -> Result<Vec<ConversionRecord>, TrackerError> {
            Err(TrackerError::Database("disk I/O error".to_string()))
        }
        fn count(&self, _: &StatsFilter) -> Result<i64, TrackerError> {
            Err(TrackerError::Database("disk I/O error".to_string()))
        }
        fn statistics(&self, _: &StatsFilter) -> Result<Statistics, TrackerError> {
            Err(TrackerError::Database("disk I/O error".to_string()))
        }
        fn delete_before(&self, _: DateTime<Utc>) -> Result<usize, TrackerError> {
            Err(TrackerError::Database("disk I/O error".to_string()))
        }
        fn delete_all(&self) -> Result<usize, TrackerError> {
            Err(TrackerError::Database("disk I/O error".to_string()))
        }
    }

    #[test]
    fn test_record_success_measures_bytes_saved() {
        let dir = tempfile::tempdir().unwrap();
        let original = write_file(&dir.path().join("a.jpg"), 1000);
        let converted = write_file(&dir.path().join("a.webp"), 300);

        let tracker = tracker();
        assert!(tracker.record_success(7, &original, &converted, Format::Webp, 70.0, 3));

        let stats = tracker.statistics(&StatsFilter::new());
        assert_eq!(stats.total_conversions, 1);
        assert_eq!(stats.total_space_saved, 700);
        assert!((stats.average_size_reduction - 70.0).abs() < 1e-9);

        let record = tracker.latest_success(7, Format::Webp).unwrap();
        assert_eq!(record.converted_path, converted.to_string_lossy());
        assert_eq!(record.processing_time, 3);
        assert!(tracker.has_success(7));
        assert!(tracker.latest_success(7, Format::Avif).is_none());
    }

    #[test]
    fn test_record_failure() {
        let tracker = tracker();
        assert!(tracker.record_failure(3, Path::new("/uploads/b.png"), Format::Avif, "boom"));

        let recent = tracker.recent_conversions(10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].status, ConversionStatus::Failed);
        assert_eq!(recent[0].converted_path, "");
        assert_eq!(recent[0].error_message.as_deref(), Some("boom"));
        assert!(!tracker.has_success(3));
        assert_eq!(tracker.statistics(&StatsFilter::new()).success_rate, 0.0);
    }

    #[test]
    fn test_retention_boundary() {
        let tracker = tracker();
        let now = Utc::now();
        let days = 30;
        tracker
            .store()
            .insert(&backdated(1, now - Duration::days(days + 1)))
            .unwrap();
        tracker
            .store()
            .insert(&backdated(2, now - Duration::days(days - 1)))
            .unwrap();

        assert_eq!(tracker.cleanup_old_records(days as u32), 1);
        let remaining = tracker.recent_conversions(10);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].attachment_id, 2);

        assert_eq!(tracker.cleanup_old_records(days as u32), 0);
    }

    #[test]
    fn test_cleanup_with_huge_retention_keeps_everything() {
        let tracker = tracker();
        tracker
            .store()
            .insert(&backdated(1, Utc::now() - Duration::days(3650)))
            .unwrap();

        assert_eq!(tracker.cleanup_old_records(u32::MAX), 0);
        assert_eq!(tracker.recent_conversions(10).len(), 1);
    }

    #[test]
    fn test_purge_all() {
        let tracker = tracker();
        tracker.record_failure(1, Path::new("/a.jpg"), Format::Webp, "x");
        tracker.record_failure(2, Path::new("/b.jpg"), Format::Webp, "x");
        assert_eq!(tracker.purge_all(), 2);
        assert!(tracker.recent_conversions(10).is_empty());
    }

    #[test]
    fn test_storage_failures_are_contained() {
        let tracker = ConversionTracker::new(Arc::new(BrokenStore));
        assert!(!tracker.record_failure(1, Path::new("/a.jpg"), Format::Webp, "x"));
        assert!(!tracker.record_success(
            1,
            Path::new("/a.jpg"),
            Path::new("/a.webp"),
            Format::Webp,
            10.0,
            1
        ));
        assert_eq!(tracker.statistics(&StatsFilter::new()), Statistics::default());
        assert!(tracker.recent_conversions(5).is_empty());
        assert_eq!(tracker.cleanup_old_records(30), 0);
        assert_eq!(tracker.purge_all(), 0);
        assert!(!tracker.has_success(1));
    }
}
