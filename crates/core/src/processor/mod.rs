//! Format processor adapters.
//!
//! Each adapter wraps one backend and exposes the same capability surface:
//! report what it can encode, encode a single source into a single target
//! format, and (for video) read technical metadata. Backend failures are
//! logged here and returned as [`ConversionError`] values.

mod ffmpeg;
mod magick;
mod native;
mod output;

pub use ffmpeg::{Av1Encoder, FfmpegProcessor};
pub use magick::MagickProcessor;
pub use native::NativeProcessor;
pub use output::{StagedOutput, TEMP_FILE_PREFIX};

use async_trait::async_trait;
use std::path::Path;

use crate::command::CommandError;
use crate::converter::{
    ConversionError, Format, ImageEncodeParams, ProcessorInfo, VideoEncodeParams, VideoMetadata,
};

/// An image backend.
#[async_trait]
pub trait ImageProcessor: Send + Sync {
    fn info(&self) -> &ProcessorInfo;

    async fn convert_to_webp(
        &self,
        source: &Path,
        destination: &Path,
        params: &ImageEncodeParams,
    ) -> Result<(), ConversionError>;

    async fn convert_to_avif(
        &self,
        source: &Path,
        destination: &Path,
        params: &ImageEncodeParams,
    ) -> Result<(), ConversionError>;

    fn supports_webp(&self) -> bool {
        self.info().supports(Format::Webp)
    }

    fn supports_avif(&self) -> bool {
        self.info().supports(Format::Avif)
    }
}

/// A video backend.
#[async_trait]
pub trait VideoProcessor: Send + Sync {
    fn info(&self) -> &ProcessorInfo;

    async fn convert_to_av1(
        &self,
        source: &Path,
        destination: &Path,
        params: &VideoEncodeParams,
    ) -> Result<(), ConversionError>;

    async fn convert_to_webm(
        &self,
        source: &Path,
        destination: &Path,
        params: &VideoEncodeParams,
    ) -> Result<(), ConversionError>;

    /// Reads technical metadata, `None` when the file cannot be probed.
    async fn metadata(&self, source: &Path) -> Option<VideoMetadata>;

    fn supports_av1(&self) -> bool {
        self.info().supports(Format::Av1)
    }

    fn supports_webm(&self) -> bool {
        self.info().supports(Format::Webm)
    }
}

/// Maps a command failure onto the conversion taxonomy.
pub(crate) fn command_failure(tool: &str, err: CommandError) -> ConversionError {
    match err {
        CommandError::Timeout { timeout_secs } => ConversionError::Timeout { timeout_secs },
        CommandError::NotFound { program } => ConversionError::conversion_failed(
            format!("{} not found at {}", tool, program.display()),
            None,
        ),
        CommandError::Io(e) => {
            ConversionError::conversion_failed(format!("{} could not run: {}", tool, e), None)
        }
    }
}

/// Keeps the tail of a tool's stderr for error reports.
pub(crate) fn stderr_tail(stderr: &str) -> Option<String> {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return None;
    }
    let start = lines.len().saturating_sub(10);
    Some(lines[start..].join("\n"))
}
