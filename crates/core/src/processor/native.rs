//! In-process image encoders.

use async_trait::async_trait;
use image::DynamicImage;
use std::path::{Path, PathBuf};

use super::{ImageProcessor, StagedOutput};
use crate::converter::{
    ConversionError, ConverterConfig, Format, ImageEncodeParams, ProcessorInfo, ProcessorKind,
};

const NATIVE_VERSION: &str = "image-0.25+libwebp+ravif-0.11";

/// Image processor built on the `image`, `webp` and `ravif` crates.
///
/// Always available. Encoding is CPU bound and runs on the blocking pool.
pub struct NativeProcessor {
    info: ProcessorInfo,
    temp_dir: PathBuf,
}

impl NativeProcessor {
    pub fn new(config: &ConverterConfig) -> Self {
        Self {
            info: Self::probe(),
            temp_dir: config.temp_dir.clone(),
        }
    }

    pub fn probe() -> ProcessorInfo {
        ProcessorInfo {
            available: true,
            kind: ProcessorKind::Native,
            version: NATIVE_VERSION.to_string(),
            webp: true,
            avif: true,
            av1: false,
            webm: false,
        }
    }

    async fn convert(
        &self,
        format: Format,
        source: &Path,
        destination: &Path,
        params: &ImageEncodeParams,
    ) -> Result<(), ConversionError> {
        if !source.exists() {
            return Err(ConversionError::SourceNotFound {
                path: source.to_path_buf(),
            });
        }

        let staged = StagedOutput::create(&self.temp_dir, format).await?;
        let source_path = source.to_path_buf();
        let output_path = staged.path().to_path_buf();
        let params = *params;

        tokio::task::spawn_blocking(move || -> Result<(), ConversionError> {
            let img = image::open(&source_path).map_err(|e| {
                ConversionError::conversion_failed(format!("cannot decode source: {}", e), None)
            })?;
            let data = match format {
                Format::Webp => encode_webp(&img, &params)?,
                Format::Avif => encode_avif(&img, &params)?,
                other => return Err(ConversionError::UnsupportedFormat { format: other }),
            };
            std::fs::write(&output_path, data).map_err(|e| {
                ConversionError::conversion_failed(format!("cannot write output: {}", e), None)
            })
        })
        .await
        .map_err(|e| {
            ConversionError::conversion_failed(format!("encoder task failed: {}", e), None)
        })??;

        staged.commit(destination).await?;
        Ok(())
    }
}

pub(crate) fn encode_webp(
    img: &DynamicImage,
    params: &ImageEncodeParams,
) -> Result<Vec<u8>, ConversionError> {
    let rgba = img.to_rgba8();
    let encoder = webp::Encoder::from_rgba(&rgba, rgba.width(), rgba.height());
    let data = encoder
        .encode_simple(params.lossless, params.quality as f32)
        .map_err(|e| ConversionError::conversion_failed(format!("webp encode: {:?}", e), None))?;
    Ok(data.to_vec())
}

pub(crate) fn encode_avif(
    img: &DynamicImage,
    params: &ImageEncodeParams,
) -> Result<Vec<u8>, ConversionError> {
    let quality = if params.lossless { 100.0 } else { params.quality as f32 };
    let encoder = ravif::Encoder::new()
        .with_quality(quality)
        .with_alpha_quality(quality)
        .with_speed(params.speed.clamp(1, 10));

    let (width, height) = (img.width() as usize, img.height() as usize);
    let encoded = (if img.color().has_alpha() {
        let rgba: Vec<rgb::RGBA8> = img
            .to_rgba8()
            .as_raw()
            .chunks_exact(4)
            .map(|c| rgb::RGBA8::new(c[0], c[1], c[2], c[3]))
            .collect();
        encoder.encode_rgba(ravif::Img::new(rgba.as_slice(), width, height))
    } else {
        let rgb_data: Vec<rgb::RGB8> = img
            .to_rgb8()
            .as_raw()
            .chunks_exact(3)
            .map(|c| rgb::RGB8::new(c[0], c[1], c[2]))
            .collect();
        encoder.encode_rgb(ravif::Img::new(rgb_data.as_slice(), width, height))
    })
    .map_err(|e| ConversionError::conversion_failed(format!("avif encode: {}", e), None))?;

    Ok(encoded.avif_file)
}

#[async_trait]
impl ImageProcessor for NativeProcessor {
    fn info(&self) -> &ProcessorInfo {
        &self.info
    }

    async fn convert_to_webp(
        &self,
        source: &Path,
        destination: &Path,
        params: &ImageEncodeParams,
    ) -> Result<(), ConversionError> {
        self.convert(Format::Webp, source, destination, params).await
    }

    async fn convert_to_avif(
        &self,
        source: &Path,
        destination: &Path,
        params: &ImageEncodeParams,
    ) -> Result<(), ConversionError> {
        self.convert(Format::Avif, source, destination, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use proptest::prelude::*;

    fn noisy_image(seed: u32, size: u32) -> DynamicImage {
        let mut state = seed.wrapping_mul(2654435761).wrapping_add(1);
        let img = RgbImage::from_fn(size, size, |x, y| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let n = (state & 0x3f) as u8;
            Rgb([
                (x * 4) as u8 ^ n,
                (y * 4) as u8 ^ n,
                ((x + y) * 2) as u8 ^ n,
            ])
        });
        DynamicImage::ImageRgb8(img)
    }

    fn params(quality: u8) -> ImageEncodeParams {
        ImageEncodeParams {
            quality,
            lossless: false,
            speed: 10,
        }
    }

    #[test]
    fn test_native_is_always_available() {
        let info = NativeProcessor::probe();
        assert!(info.available);
        assert_eq!(info.kind, ProcessorKind::Native);
        assert_eq!(info.supported_formats(), vec![Format::Webp, Format::Avif]);
    }

    #[tokio::test]
    async fn test_convert_png_to_webp_and_avif() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("photo.png");
        noisy_image(7, 32).save(&source).unwrap();

        let config = ConverterConfig::default().with_temp_dir(dir.path().join("tmp"));
        let processor = NativeProcessor::new(&config);

        let webp_dest = Format::Webp.destination_for(&source);
        processor
            .convert_to_webp(&source, &webp_dest, &params(80))
            .await
            .unwrap();
        let bytes = std::fs::read(&webp_dest).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WEBP");

        let avif_dest = Format::Avif.destination_for(&source);
        processor
            .convert_to_avif(&source, &avif_dest, &params(60))
            .await
            .unwrap();
        let bytes = std::fs::read(&avif_dest).unwrap();
        assert_eq!(&bytes[4..8], b"ftyp");
    }

    #[tokio::test]
    async fn test_undecodable_source_fails_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("broken.jpg");
        std::fs::write(&source, b"not a jpeg").unwrap();
        let temp_dir = dir.path().join("tmp");

        let config = ConverterConfig::default().with_temp_dir(temp_dir.clone());
        let processor = NativeProcessor::new(&config);
        let dest = dir.path().join("broken.webp");

        let err = processor
            .convert_to_webp(&source, &dest, &params(80))
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::ConversionFailed { .. }));
        assert!(!dest.exists());
        assert_eq!(std::fs::read_dir(&temp_dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConverterConfig::default().with_temp_dir(dir.path().to_path_buf());
        let processor = NativeProcessor::new(&config);
        let err = processor
            .convert_to_avif(
                &dir.path().join("nope.png"),
                &dir.path().join("nope.avif"),
                &params(60),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::SourceNotFound { .. }));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn webp_size_grows_with_quality(seed in any::<u32>(), low in 5u8..60) {
            let img = noisy_image(seed, 48);
            let small = encode_webp(&img, &params(low)).unwrap();
            let large = encode_webp(&img, &params(low + 35)).unwrap();
            prop_assert!(large.len() >= small.len());
        }
    }
}
