//! Mock format processors for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::converter::{
    ConversionError, Format, ImageEncodeParams, ProcessorInfo, ProcessorKind, VideoEncodeParams,
    VideoMetadata,
};
use crate::processor::{ImageProcessor, VideoProcessor};

/// A conversion seen by a mock processor.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEncode {
    pub format: Format,
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Quality for images, CRF for video.
    pub quality: u8,
}

/// State shared by both mock processors.
#[derive(Debug)]
struct MockState {
    encodes: Arc<RwLock<Vec<RecordedEncode>>>,
    failures: Arc<RwLock<HashMap<Format, String>>>,
    output_size: Arc<RwLock<usize>>,
}

impl MockState {
    fn new() -> Self {
        Self {
            encodes: Arc::new(RwLock::new(Vec::new())),
            failures: Arc::new(RwLock::new(HashMap::new())),
            output_size: Arc::new(RwLock::new(64)),
        }
    }

    async fn encode(
        &self,
        info: &ProcessorInfo,
        format: Format,
        source: &Path,
        destination: &Path,
        quality: u8,
    ) -> Result<(), ConversionError> {
        self.encodes.write().await.push(RecordedEncode {
            format,
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            quality,
        });

        if !info.supports(format) {
            return Err(ConversionError::UnsupportedFormat { format });
        }
        if !source.exists() {
            return Err(ConversionError::SourceNotFound {
                path: source.to_path_buf(),
            });
        }
        if let Some(reason) = self.failures.read().await.get(&format) {
            return Err(ConversionError::conversion_failed(reason.clone(), None));
        }

        let size = *self.output_size.read().await;
        tokio::fs::write(destination, vec![0u8; size])
            .await
            .map_err(|e| ConversionError::conversion_failed(e.to_string(), None))
    }
}

/// Mock implementation of [`ImageProcessor`].
///
/// Successful encodes write a zero-filled file of a configurable size to the
/// destination.
#[derive(Debug)]
pub struct MockImageProcessor {
    info: ProcessorInfo,
    state: MockState,
}

impl MockImageProcessor {
    pub fn new(info: ProcessorInfo) -> Self {
        Self {
            info,
            state: MockState::new(),
        }
    }

    /// A native-like backend supporting both image formats.
    pub fn full() -> Self {
        Self::new(super::fixtures::processor_info(
            ProcessorKind::Native,
            &[Format::Webp, Format::Avif],
        ))
    }

    /// Make every encode of `format` fail with `reason`.
    pub async fn fail_format(&self, format: Format, reason: &str) {
        self.state
            .failures
            .write()
            .await
            .insert(format, reason.to_string());
    }

    /// Set the size in bytes of written outputs.
    pub async fn set_output_size(&self, size: usize) {
        *self.state.output_size.write().await = size;
    }

    pub async fn recorded_encodes(&self) -> Vec<RecordedEncode> {
        self.state.encodes.read().await.clone()
    }
}

#[async_trait]
impl ImageProcessor for MockImageProcessor {
    fn info(&self) -> &ProcessorInfo {
        &self.info
    }

    async fn convert_to_webp(
        &self,
        source: &Path,
        destination: &Path,
        params: &ImageEncodeParams,
    ) -> Result<(), ConversionError> {
        self.state
            .encode(&self.info, Format::Webp, source, destination, params.quality)
            .await
    }

    async fn convert_to_avif(
        &self,
        source: &Path,
        destination: &Path,
        params: &ImageEncodeParams,
    ) -> Result<(), ConversionError> {
        self.state
            .encode(&self.info, Format::Avif, source, destination, params.quality)
            .await
    }
}

/// Mock implementation of [`VideoProcessor`].
#[derive(Debug)]
pub struct MockVideoProcessor {
    info: ProcessorInfo,
    state: MockState,
    metadata: Arc<RwLock<HashMap<PathBuf, VideoMetadata>>>,
}

impl MockVideoProcessor {
    pub fn new(info: ProcessorInfo) -> Self {
        Self {
            info,
            state: MockState::new(),
            metadata: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// An ffmpeg-like backend supporting both video formats.
    pub fn full() -> Self {
        Self::new(super::fixtures::processor_info(
            ProcessorKind::Ffmpeg,
            &[Format::Av1, Format::Webm],
        ))
    }

    pub async fn fail_format(&self, format: Format, reason: &str) {
        self.state
            .failures
            .write()
            .await
            .insert(format, reason.to_string());
    }

    pub async fn set_output_size(&self, size: usize) {
        *self.state.output_size.write().await = size;
    }

    /// Set the metadata returned for a path.
    pub async fn set_metadata(&self, path: impl AsRef<Path>, metadata: VideoMetadata) {
        self.metadata
            .write()
            .await
            .insert(path.as_ref().to_path_buf(), metadata);
    }

    pub async fn recorded_encodes(&self) -> Vec<RecordedEncode> {
        self.state.encodes.read().await.clone()
    }
}

#[async_trait]
impl VideoProcessor for MockVideoProcessor {
    fn info(&self) -> &ProcessorInfo {
        &self.info
    }

    async fn convert_to_av1(
        &self,
        source: &Path,
        destination: &Path,
        params: &VideoEncodeParams,
    ) -> Result<(), ConversionError> {
        self.state
            .encode(&self.info, Format::Av1, source, destination, params.crf)
            .await
    }

    async fn convert_to_webm(
        &self,
        source: &Path,
        destination: &Path,
        params: &VideoEncodeParams,
    ) -> Result<(), ConversionError> {
        self.state
            .encode(&self.info, Format::Webm, source, destination, params.crf)
            .await
    }

    async fn metadata(&self, source: &Path) -> Option<VideoMetadata> {
        self.metadata.read().await.get(source).cloned()
    }
}
