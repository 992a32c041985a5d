use std::sync::Arc;

use tokio::sync::mpsc;

use super::{ActivityEnvelope, ActivityRecord, AuditHandle, AuditStore};

/// Background task that receives activity events and writes them to storage
pub struct AuditWriter {
    rx: mpsc::Receiver<ActivityEnvelope>,
    store: Arc<dyn AuditStore>,
}

impl AuditWriter {
    pub fn new(rx: mpsc::Receiver<ActivityEnvelope>, store: Arc<dyn AuditStore>) -> Self {
        Self { rx, store }
    }

    /// Run the writer, consuming events until every handle is dropped
    pub async fn run(mut self) {
        tracing::info!("Activity writer started");

        while let Some(envelope) = self.rx.recv().await {
            let record = ActivityRecord {
                id: 0,
                timestamp: envelope.timestamp,
                event_type: envelope.event.event_type().to_string(),
                level: envelope.event.level(),
                attachment_id: envelope.event.attachment_id(),
                data: envelope.event,
            };

            if let Err(e) = self.store.insert(&record) {
                tracing::error!("Failed to write activity event: {}", e);
            }
        }

        tracing::info!("Activity writer shutting down");
    }
}

/// Create the activity log plumbing.
///
/// Spawn the returned writer with `tokio::spawn(writer.run())` and clone the
/// handle into every component that emits events.
pub fn create_audit_system(
    store: Arc<dyn AuditStore>,
    buffer_size: usize,
) -> (AuditHandle, AuditWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    let handle = AuditHandle::new(tx);
    let writer = AuditWriter::new(rx, store);
    (handle, writer)
}
