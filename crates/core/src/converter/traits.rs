//! Trait definitions for the converter module.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::error::ConversionError;
use super::types::{
    ConversionOptions, ConversionResult, ConversionSettings, Format, MediaType, ProcessorInfo,
};
use crate::metrics;

/// A converter service for one media type.
///
/// Implementors provide processor lookup and the single-format
/// [`MediaConverter::try_convert`]; everything else is derived. The derived
/// operations never fail: errors become `false` returns or
/// [`ConversionResult::errors`] entries plus a log line.
#[async_trait]
pub trait MediaConverter: Send + Sync {
    fn media_type(&self) -> MediaType;

    /// Info of the selected processor, the unavailable sentinel when none.
    async fn processor_info(&self) -> ProcessorInfo;

    /// Converts `source` into `format` at `destination`.
    async fn try_convert(
        &self,
        format: Format,
        source: &Path,
        destination: &Path,
        options: &ConversionOptions,
    ) -> Result<(), ConversionError>;

    async fn is_available(&self) -> bool {
        self.processor_info().await.available
    }

    /// Target formats of this media type the current processor can encode.
    async fn supported_formats(&self) -> Vec<Format> {
        let info = self.processor_info().await;
        self.media_type()
            .target_formats()
            .iter()
            .copied()
            .filter(|f| info.supports(*f))
            .collect()
    }

    async fn is_format_supported(&self, format: Format) -> bool {
        format.media_type() == self.media_type() && self.processor_info().await.supports(format)
    }

    /// Whether `path` looks like a source of this media type.
    fn is_supported_media(&self, path: &Path) -> bool {
        MediaType::from_path(path) == Some(self.media_type())
    }

    /// Single-format conversion reporting only success.
    async fn convert(
        &self,
        format: Format,
        source: &Path,
        destination: &Path,
        options: &ConversionOptions,
    ) -> bool {
        run_tracked(self, format, source, destination, options)
            .await
            .is_ok()
    }

    /// Converts one source into every requested format.
    ///
    /// Formats are attempted independently; one failing does not stop the
    /// rest. `success` follows `settings.policy`.
    async fn process_media(
        &self,
        source: &Path,
        destinations: &BTreeMap<Format, PathBuf>,
        settings: &ConversionSettings,
    ) -> ConversionResult {
        let mut result = ConversionResult::default();

        if destinations.is_empty() {
            result.errors.push("No target formats requested".to_string());
            return result;
        }

        for (format, destination) in destinations {
            match run_tracked(self, *format, source, destination, &settings.options).await {
                Ok(()) => result.add_converted(*format, destination.clone()),
                Err(e) => result.add_error(*format, e),
            }
        }

        let requested: BTreeSet<Format> = destinations.keys().copied().collect();
        result.finalize(&requested, settings.policy);
        tracing::info!(
            source = %source.display(),
            success = result.success,
            converted = ?result.converted_formats,
            errors = result.errors.len(),
            "Processed media"
        );
        result
    }
}

/// Runs one conversion with logging and metrics.
async fn run_tracked<C: MediaConverter + ?Sized>(
    converter: &C,
    format: Format,
    source: &Path,
    destination: &Path,
    options: &ConversionOptions,
) -> Result<(), ConversionError> {
    let start = Instant::now();
    let outcome = converter
        .try_convert(format, source, destination, options)
        .await;
    let elapsed = start.elapsed().as_secs_f64();

    match &outcome {
        Ok(()) => {
            metrics::CONVERSIONS_TOTAL
                .with_label_values(&[format.as_str(), "success"])
                .inc();
            metrics::CONVERSION_DURATION
                .with_label_values(&[format.as_str()])
                .observe(elapsed);
            tracing::info!(
                source = %source.display(),
                destination = %destination.display(),
                %format,
                elapsed_secs = elapsed,
                "Conversion succeeded"
            );
        }
        Err(e) => {
            metrics::CONVERSIONS_TOTAL
                .with_label_values(&[format.as_str(), "failed"])
                .inc();
            tracing::warn!(
                source = %source.display(),
                %format,
                kind = e.kind(),
                error = %e,
                "Conversion failed"
            );
        }
    }
    outcome
}

/// Percentage size reduction from `original` to `converted`.
///
/// `0.0` when either file is missing or the original is empty. Negative when
/// the converted file is larger.
pub fn size_reduction(original: &Path, converted: &Path) -> f64 {
    let (Ok(orig), Ok(conv)) = (std::fs::metadata(original), std::fs::metadata(converted)) else {
        return 0.0;
    };
    let orig = orig.len();
    if orig == 0 {
        return 0.0;
    }
    (orig as f64 - conv.len() as f64) / orig as f64 * 100.0
}
