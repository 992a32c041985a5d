//! Testing utilities and mock implementations.
//!
//! Mocks stand in for the external tools and encoders so converter services,
//! the pipeline and the HTTP layer can be exercised without ImageMagick or
//! FFmpeg installed.
//!
//! # Example
//!
//! ```rust,ignore
//! use flux_media_core::testing::{MockImageProcessor, MockVideoProcessor};
//!
//! let images = MockImageProcessor::full();
//! images.fail_format(Format::Avif, "encoder crashed").await;
//!
//! let converter = ImageConverter::with_processor(Arc::new(images), ImageDefaults::default());
//! ```

mod mock_command_runner;
mod mock_processor;

pub use mock_command_runner::{MockCommandRunner, RecordedCommand};
pub use mock_processor::{MockImageProcessor, MockVideoProcessor, RecordedEncode};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};

    use crate::converter::{Format, ProcessorInfo, ProcessorKind};

    /// Build a processor info supporting exactly `formats`.
    pub fn processor_info(kind: ProcessorKind, formats: &[Format]) -> ProcessorInfo {
        ProcessorInfo {
            available: true,
            kind,
            version: "test".to_string(),
            webp: formats.contains(&Format::Webp),
            avif: formats.contains(&Format::Avif),
            av1: formats.contains(&Format::Av1),
            webm: formats.contains(&Format::Webm),
        }
    }

    /// Write a zero-filled file of `size` bytes, creating parent directories.
    pub fn write_file(path: &Path, size: usize) -> PathBuf {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = std::fs::write(path, vec![0u8; size]);
        path.to_path_buf()
    }
}
