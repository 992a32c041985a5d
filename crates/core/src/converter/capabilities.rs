//! Processor capability detection and caching.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::config::{ConverterConfig, ImageBackend};
use super::types::{MediaType, ProcessorInfo};
use crate::command::CommandRunner;
use crate::metrics;
use crate::processor::{
    FfmpegProcessor, ImageProcessor, MagickProcessor, NativeProcessor, VideoProcessor,
};

/// Selects the processing backend for each media type.
#[async_trait]
pub trait ProcessorProbe: Send + Sync {
    /// The preferred usable image backend, if any.
    async fn probe_image(&self) -> Option<Arc<dyn ImageProcessor>>;

    /// The video backend, if usable.
    async fn probe_video(&self) -> Option<Arc<dyn VideoProcessor>>;
}

/// Probes the host's installed tools.
pub struct SystemProbe {
    config: ConverterConfig,
    runner: Arc<dyn CommandRunner>,
}

impl SystemProbe {
    pub fn new(config: ConverterConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }
}

#[async_trait]
impl ProcessorProbe for SystemProbe {
    async fn probe_image(&self) -> Option<Arc<dyn ImageProcessor>> {
        for backend in &self.config.image_backends {
            match backend {
                ImageBackend::ImageMagick => {
                    let info = MagickProcessor::probe(&self.config, self.runner.as_ref()).await;
                    // partial ImageMagick support loses to the next backend
                    if info.webp && info.avif {
                        tracing::info!(version = %info.version, "Using ImageMagick image backend");
                        return Some(Arc::new(MagickProcessor::new(
                            info,
                            &self.config,
                            self.runner.clone(),
                        )));
                    }
                    tracing::debug!(
                        webp = info.webp,
                        avif = info.avif,
                        "ImageMagick lacks WebP or AVIF support"
                    );
                }
                ImageBackend::Native => {
                    tracing::info!("Using native image backend");
                    return Some(Arc::new(NativeProcessor::new(&self.config)));
                }
            }
        }
        tracing::warn!("No image backend available");
        None
    }

    async fn probe_video(&self) -> Option<Arc<dyn VideoProcessor>> {
        let processor = FfmpegProcessor::detect(&self.config, self.runner.clone()).await;
        if processor.info().available {
            Some(Arc::new(processor))
        } else {
            tracing::warn!(path = %self.config.ffmpeg_path.display(), "FFmpeg not available");
            None
        }
    }
}

/// Fixed processors, never re-probed.
pub struct StaticProbe {
    image: Option<Arc<dyn ImageProcessor>>,
    video: Option<Arc<dyn VideoProcessor>>,
}

impl StaticProbe {
    pub fn new(
        image: Option<Arc<dyn ImageProcessor>>,
        video: Option<Arc<dyn VideoProcessor>>,
    ) -> Self {
        Self { image, video }
    }
}

#[async_trait]
impl ProcessorProbe for StaticProbe {
    async fn probe_image(&self) -> Option<Arc<dyn ImageProcessor>> {
        self.image.clone()
    }

    async fn probe_video(&self) -> Option<Arc<dyn VideoProcessor>> {
        self.video.clone()
    }
}

struct Cached<T: ?Sized> {
    processor: Option<Arc<T>>,
    probed_at: Instant,
}

/// Processor info for both media types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySnapshot {
    pub image: ProcessorInfo,
    pub video: ProcessorInfo,
}

/// Process-wide cache of probe results.
///
/// Entries expire after the TTL and can be dropped early with
/// [`CapabilityCache::invalidate`]. Concurrent callers on an expired entry
/// probe once; the write lock is held across the probe.
pub struct CapabilityCache {
    probe: Arc<dyn ProcessorProbe>,
    ttl: Duration,
    image: RwLock<Option<Cached<dyn ImageProcessor>>>,
    video: RwLock<Option<Cached<dyn VideoProcessor>>>,
}

impl CapabilityCache {
    pub fn new(probe: Arc<dyn ProcessorProbe>, ttl: Duration) -> Self {
        Self {
            probe,
            ttl,
            image: RwLock::new(None),
            video: RwLock::new(None),
        }
    }

    /// Cache probing the host with the configured tools.
    pub fn from_config(config: &ConverterConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self::new(
            Arc::new(SystemProbe::new(config.clone(), runner)),
            Duration::from_secs(config.capability_ttl_secs),
        )
    }

    /// Cache over fixed processors.
    pub fn fixed(
        image: Option<Arc<dyn ImageProcessor>>,
        video: Option<Arc<dyn VideoProcessor>>,
    ) -> Self {
        Self::new(
            Arc::new(StaticProbe::new(image, video)),
            Duration::from_secs(u64::MAX / 4),
        )
    }

    fn is_fresh(&self, probed_at: Instant) -> bool {
        probed_at.elapsed() < self.ttl
    }

    pub async fn image_processor(&self) -> Option<Arc<dyn ImageProcessor>> {
        if let Some(cached) = self.image.read().await.as_ref() {
            if self.is_fresh(cached.probed_at) {
                return cached.processor.clone();
            }
        }

        let mut slot = self.image.write().await;
        if let Some(cached) = slot.as_ref() {
            if self.is_fresh(cached.probed_at) {
                return cached.processor.clone();
            }
        }

        metrics::CAPABILITY_PROBES
            .with_label_values(&[MediaType::Image.as_str()])
            .inc();
        let processor = self.probe.probe_image().await;
        *slot = Some(Cached {
            processor: processor.clone(),
            probed_at: Instant::now(),
        });
        processor
    }

    pub async fn video_processor(&self) -> Option<Arc<dyn VideoProcessor>> {
        if let Some(cached) = self.video.read().await.as_ref() {
            if self.is_fresh(cached.probed_at) {
                return cached.processor.clone();
            }
        }

        let mut slot = self.video.write().await;
        if let Some(cached) = slot.as_ref() {
            if self.is_fresh(cached.probed_at) {
                return cached.processor.clone();
            }
        }

        metrics::CAPABILITY_PROBES
            .with_label_values(&[MediaType::Video.as_str()])
            .inc();
        let processor = self.probe.probe_video().await;
        *slot = Some(Cached {
            processor: processor.clone(),
            probed_at: Instant::now(),
        });
        processor
    }

    /// Drops cached results so the next lookup probes again.
    pub async fn invalidate(&self) {
        *self.image.write().await = None;
        *self.video.write().await = None;
        tracing::debug!("Capability cache invalidated");
    }

    pub async fn snapshot(&self) -> CapabilitySnapshot {
        let image = self
            .image_processor()
            .await
            .map(|p| p.info().clone())
            .unwrap_or_default();
        let video = self
            .video_processor()
            .await
            .map(|p| p.info().clone())
            .unwrap_or_default();
        CapabilitySnapshot { image, video }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandOutput;
    use crate::converter::{Format, ProcessorKind};
    use crate::testing::{MockCommandRunner, MockImageProcessor};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProbe {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProcessorProbe for CountingProbe {
        async fn probe_image(&self) -> Option<Arc<dyn ImageProcessor>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some(Arc::new(MockImageProcessor::full()))
        }

        async fn probe_video(&self) -> Option<Arc<dyn VideoProcessor>> {
            None
        }
    }

    fn ok(stdout: &str) -> CommandOutput {
        CommandOutput {
            exit_code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    #[tokio::test]
    async fn test_magick_with_full_support_wins() {
        let runner = Arc::new(MockCommandRunner::new());
        runner.push_output(ok("Version: ImageMagick 7.1.1-21 Q16"));
        runner.push_output(ok(" WEBP* WEBP rw+ WebP\n AVIF HEIC rw+ AV1 Image\n"));

        let probe = SystemProbe::new(ConverterConfig::default(), runner);
        let processor = probe.probe_image().await.unwrap();
        assert_eq!(processor.info().kind, ProcessorKind::ImageMagick);
    }

    #[tokio::test]
    async fn test_magick_without_avif_falls_back_to_native() {
        let runner = Arc::new(MockCommandRunner::new());
        runner.push_output(ok("Version: ImageMagick 6.9.11-60 Q16"));
        runner.push_output(ok(" WEBP* WEBP rw+ WebP\n PNG* PNG rw- PNG\n"));

        let probe = SystemProbe::new(ConverterConfig::default(), runner);
        let processor = probe.probe_image().await.unwrap();
        assert_eq!(processor.info().kind, ProcessorKind::Native);
        assert!(processor.supports_avif());
    }

    #[tokio::test]
    async fn test_no_backends_configured() {
        let runner = Arc::new(MockCommandRunner::new());
        let config = ConverterConfig::default().with_image_backends(vec![]);
        let probe = SystemProbe::new(config, runner.clone());
        assert!(probe.probe_image().await.is_none());
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_magick_only_and_missing() {
        let runner = Arc::new(MockCommandRunner::new());
        let config =
            ConverterConfig::default().with_image_backends(vec![ImageBackend::ImageMagick]);
        let probe = SystemProbe::new(config, runner);
        assert!(probe.probe_image().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_is_not_an_error() {
        let runner = Arc::new(MockCommandRunner::new());
        let cache = CapabilityCache::from_config(&ConverterConfig::default(), runner);
        assert!(cache.video_processor().await.is_none());
        let snapshot = cache.snapshot().await;
        assert!(!snapshot.video.available);
        assert_eq!(snapshot.video.kind, ProcessorKind::None);
    }

    #[tokio::test]
    async fn test_cache_probes_once_within_ttl() {
        let probe = Arc::new(CountingProbe {
            calls: AtomicUsize::new(0),
        });
        let cache = CapabilityCache::new(probe.clone(), Duration::from_secs(60));

        cache.image_processor().await;
        cache.image_processor().await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);

        cache.invalidate().await;
        let processor = cache.image_processor().await.unwrap();
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
        assert!(processor.info().supports(Format::Webp));
    }

    #[tokio::test]
    async fn test_cache_expires_after_ttl() {
        let probe = Arc::new(CountingProbe {
            calls: AtomicUsize::new(0),
        });
        let cache = CapabilityCache::new(probe.clone(), Duration::ZERO);
        cache.image_processor().await;
        cache.image_processor().await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    }
}
