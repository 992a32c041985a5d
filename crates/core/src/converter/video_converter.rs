//! Video converter service.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::capabilities::CapabilityCache;
use super::error::ConversionError;
use super::traits::MediaConverter;
use super::types::{
    ConversionOptions, Format, MediaType, ProcessorInfo, VideoDefaults, VideoMetadata,
};
use crate::processor::VideoProcessor;

/// Converts videos to AV1 and WebM through FFmpeg.
pub struct VideoConverter {
    capabilities: Arc<CapabilityCache>,
    defaults: RwLock<VideoDefaults>,
}

impl VideoConverter {
    pub fn new(capabilities: Arc<CapabilityCache>, defaults: VideoDefaults) -> Self {
        Self {
            capabilities,
            defaults: RwLock::new(defaults),
        }
    }

    pub fn with_processor(
        processor: Option<Arc<dyn VideoProcessor>>,
        defaults: VideoDefaults,
    ) -> Self {
        Self::new(Arc::new(CapabilityCache::fixed(None, processor)), defaults)
    }

    pub async fn defaults(&self) -> VideoDefaults {
        self.defaults.read().await.clone()
    }

    pub async fn set_defaults(&self, defaults: VideoDefaults) {
        *self.defaults.write().await = defaults;
    }

    pub async fn convert_to_av1(
        &self,
        source: &Path,
        destination: &Path,
        options: &ConversionOptions,
    ) -> bool {
        self.convert(Format::Av1, source, destination, options).await
    }

    pub async fn convert_to_webm(
        &self,
        source: &Path,
        destination: &Path,
        options: &ConversionOptions,
    ) -> bool {
        self.convert(Format::Webm, source, destination, options).await
    }

    /// Technical metadata of `source`, `None` without FFmpeg or on probe failure.
    pub async fn metadata(&self, source: &Path) -> Option<VideoMetadata> {
        let processor = self.capabilities.video_processor().await?;
        processor.metadata(source).await
    }
}

#[async_trait]
impl MediaConverter for VideoConverter {
    fn media_type(&self) -> MediaType {
        MediaType::Video
    }

    async fn processor_info(&self) -> ProcessorInfo {
        self.capabilities
            .video_processor()
            .await
            .map(|p| p.info().clone())
            .unwrap_or_default()
    }

    async fn try_convert(
        &self,
        format: Format,
        source: &Path,
        destination: &Path,
        options: &ConversionOptions,
    ) -> Result<(), ConversionError> {
        let defaults = self.defaults.read().await.clone();
        let Some(format_defaults) = defaults.for_format(format) else {
            return Err(ConversionError::UnsupportedFormat { format });
        };

        let processor = self.capabilities.video_processor().await.ok_or(
            ConversionError::NoProcessorAvailable {
                media_type: MediaType::Video,
            },
        )?;
        if !processor.info().supports(format) {
            return Err(ConversionError::UnsupportedFormat { format });
        }
        if !source.exists() {
            return Err(ConversionError::SourceNotFound {
                path: source.to_path_buf(),
            });
        }

        let params = options.resolve_video(format_defaults);
        match format {
            Format::Av1 => processor.convert_to_av1(source, destination, &params).await,
            Format::Webm => processor.convert_to_webm(source, destination, &params).await,
            other => Err(ConversionError::UnsupportedFormat { format: other }),
        }
    }
}
