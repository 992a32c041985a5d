use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::ActivityEvent;

/// Envelope wrapping an activity event with metadata
#[derive(Debug, Clone)]
pub struct ActivityEnvelope {
    pub timestamp: DateTime<Utc>,
    pub event: ActivityEvent,
}

/// Handle for emitting activity events
///
/// This is cheaply cloneable and can be shared across tasks.
/// Events are sent through an async channel to be written by the AuditWriter.
#[derive(Clone)]
pub struct AuditHandle {
    tx: mpsc::Sender<ActivityEnvelope>,
}

impl AuditHandle {
    pub fn new(tx: mpsc::Sender<ActivityEnvelope>) -> Self {
        Self { tx }
    }

    /// Emit an event. A closed channel is logged, never returned.
    pub async fn emit(&self, event: ActivityEvent) {
        let envelope = ActivityEnvelope {
            timestamp: Utc::now(),
            event,
        };
        if let Err(e) = self.tx.send(envelope).await {
            tracing::error!("Failed to emit activity event: {}", e);
        }
    }
}
