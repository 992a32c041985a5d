use std::sync::Arc;

use flux_media_core::{AuditStore, Config, ConversionPipeline, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    pipeline: Arc<ConversionPipeline>,
    audit_store: Arc<dyn AuditStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        pipeline: Arc<ConversionPipeline>,
        audit_store: Arc<dyn AuditStore>,
    ) -> Self {
        Self {
            config,
            pipeline,
            audit_store,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn pipeline(&self) -> &Arc<ConversionPipeline> {
        &self.pipeline
    }

    pub fn audit_store(&self) -> &dyn AuditStore {
        self.audit_store.as_ref()
    }
}
