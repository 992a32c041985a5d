//! Image converter service.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::capabilities::CapabilityCache;
use super::error::ConversionError;
use super::traits::MediaConverter;
use super::types::{ConversionOptions, Format, ImageDefaults, MediaType, ProcessorInfo};
use crate::processor::ImageProcessor;

/// Converts images to WebP and AVIF through the selected image backend.
pub struct ImageConverter {
    capabilities: Arc<CapabilityCache>,
    defaults: RwLock<ImageDefaults>,
}

impl ImageConverter {
    pub fn new(capabilities: Arc<CapabilityCache>, defaults: ImageDefaults) -> Self {
        Self {
            capabilities,
            defaults: RwLock::new(defaults),
        }
    }

    /// Converter over a fixed processor, `None` for "no backend".
    pub fn with_processor(
        processor: Option<Arc<dyn ImageProcessor>>,
        defaults: ImageDefaults,
    ) -> Self {
        Self::new(Arc::new(CapabilityCache::fixed(processor, None)), defaults)
    }

    pub async fn defaults(&self) -> ImageDefaults {
        self.defaults.read().await.clone()
    }

    /// Replaces the per-format defaults used by later conversions.
    pub async fn set_defaults(&self, defaults: ImageDefaults) {
        *self.defaults.write().await = defaults;
    }

    pub async fn convert_to_webp(
        &self,
        source: &Path,
        destination: &Path,
        options: &ConversionOptions,
    ) -> bool {
        self.convert(Format::Webp, source, destination, options).await
    }

    pub async fn convert_to_avif(
        &self,
        source: &Path,
        destination: &Path,
        options: &ConversionOptions,
    ) -> bool {
        self.convert(Format::Avif, source, destination, options).await
    }
}

#[async_trait]
impl MediaConverter for ImageConverter {
    fn media_type(&self) -> MediaType {
        MediaType::Image
    }

    async fn processor_info(&self) -> ProcessorInfo {
        self.capabilities
            .image_processor()
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

        let processor = self.capabilities.image_processor().await.ok_or(
            ConversionError::NoProcessorAvailable {
                media_type: MediaType::Image,
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

        let params = options.resolve_image(format_defaults);
        match format {
            Format::Webp => processor.convert_to_webp(source, destination, &params).await,
            Format::Avif => processor.convert_to_avif(source, destination, &params).await,
            other => Err(ConversionError::UnsupportedFormat { format: other }),
        }
    }
}
