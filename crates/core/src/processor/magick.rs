//! ImageMagick command line backend.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::{command_failure, stderr_tail, ImageProcessor, StagedOutput};
use crate::command::CommandRunner;
use crate::converter::{
    ConversionError, ConverterConfig, Format, ImageEncodeParams, ProcessorInfo, ProcessorKind,
};

/// Image processor driving the `magick` binary.
pub struct MagickProcessor {
    info: ProcessorInfo,
    magick_path: PathBuf,
    temp_dir: PathBuf,
    timeout: Duration,
    runner: Arc<dyn CommandRunner>,
}

impl MagickProcessor {
    pub fn new(
        info: ProcessorInfo,
        config: &ConverterConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            info,
            magick_path: config.magick_path.clone(),
            temp_dir: config.temp_dir.clone(),
            timeout: Duration::from_secs(config.image_timeout_secs),
            runner,
        }
    }

    /// Queries the installed ImageMagick for its version and writable formats.
    ///
    /// A missing binary is reported as an unavailable processor.
    pub async fn probe(config: &ConverterConfig, runner: &dyn CommandRunner) -> ProcessorInfo {
        let limit = Duration::from_secs(config.probe_timeout_secs);

        let version = match runner
            .run(&config.magick_path, &["-version".to_string()], limit)
            .await
        {
            Ok(o) if o.success() => Self::parse_version(&o.stdout),
            Ok(o) => {
                tracing::debug!(exit_code = ?o.exit_code, "magick -version failed");
                return ProcessorInfo::unavailable();
            }
            Err(e) => {
                tracing::debug!(error = %e, "ImageMagick not available");
                return ProcessorInfo::unavailable();
            }
        };

        let formats = match runner
            .run(
                &config.magick_path,
                &["-list".to_string(), "format".to_string()],
                limit,
            )
            .await
        {
            Ok(o) if o.success() => Self::parse_writable_formats(&o.stdout),
            _ => HashSet::new(),
        };

        let webp = formats.contains("WEBP");
        let avif = formats.contains("AVIF");

        ProcessorInfo {
            available: webp || avif,
            kind: ProcessorKind::ImageMagick,
            version,
            webp,
            avif,
            av1: false,
            webm: false,
        }
    }

    /// Extracts `7.1.1-21` from `Version: ImageMagick 7.1.1-21 Q16-HDRI ...`.
    fn parse_version(output: &str) -> String {
        output
            .lines()
            .find(|l| l.starts_with("Version:"))
            .and_then(|l| l.split_whitespace().nth(2))
            .unwrap_or("unknown")
            .to_string()
    }

    /// Parses `magick -list format` into the set of formats with write support.
    fn parse_writable_formats(output: &str) -> HashSet<String> {
        output
            .lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let name = parts.next()?.trim_end_matches('*');
                let _module = parts.next()?;
                let mode = parts.next()?;
                let is_mode = mode.len() == 3
                    && mode.chars().all(|c| matches!(c, 'r' | 'w' | '+' | '-'));
                if is_mode && mode.contains('w') {
                    Some(name.to_ascii_uppercase())
                } else {
                    None
                }
            })
            .collect()
    }

    fn build_args(
        source: &Path,
        output: &Path,
        format: Format,
        params: &ImageEncodeParams,
    ) -> Vec<String> {
        let mut args = vec![source.to_string_lossy().to_string(), "-strip".to_string()];

        match format {
            Format::Webp => {
                args.extend([
                    "-quality".to_string(),
                    params.quality.to_string(),
                    "-define".to_string(),
                    "webp:method=6".to_string(),
                ]);
                if params.lossless {
                    args.extend(["-define".to_string(), "webp:lossless=true".to_string()]);
                }
            }
            Format::Avif => {
                let quality = if params.lossless { 100 } else { params.quality };
                args.extend([
                    "-quality".to_string(),
                    quality.to_string(),
                    "-define".to_string(),
                    format!("heic:speed={}", params.speed),
                ]);
                if params.lossless {
                    args.extend(["-define".to_string(), "heic:chroma=444".to_string()]);
                }
            }
            Format::Av1 | Format::Webm => {}
        }

        args.push(format!(
            "{}:{}",
            format.as_str().to_ascii_uppercase(),
            output.to_string_lossy()
        ));
        args
    }

    async fn convert(
        &self,
        format: Format,
        source: &Path,
        destination: &Path,
        params: &ImageEncodeParams,
    ) -> Result<(), ConversionError> {
        if !self.info.supports(format) {
            return Err(ConversionError::UnsupportedFormat { format });
        }
        if !source.exists() {
            return Err(ConversionError::SourceNotFound {
                path: source.to_path_buf(),
            });
        }

        let staged = StagedOutput::create(&self.temp_dir, format).await?;
        let args = Self::build_args(source, staged.path(), format, params);

        let output = self
            .runner
            .run(&self.magick_path, &args, self.timeout)
            .await
            .map_err(|e| command_failure("magick", e))?;

        if !output.success() {
            tracing::warn!(
                source = %source.display(),
                %format,
                exit_code = ?output.exit_code,
                "ImageMagick encode failed"
            );
            return Err(ConversionError::conversion_failed(
                format!("magick exited with code: {:?}", output.exit_code),
                stderr_tail(&output.stderr),
            ));
        }

        staged.commit(destination).await?;
        Ok(())
    }
}

#[async_trait]
impl ImageProcessor for MagickProcessor {
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
    use crate::command::CommandOutput;
    use crate::testing::MockCommandRunner;

    const FORMAT_LIST: &str = "   Format  Module    Mode  Description
-------------------------------------------------------------------------------
      AVIF  HEIC      rw+   AV1 Image File Format (1.17.6)
      JPEG* JPEG      rw-   Joint Photographic Experts Group JFIF format
       PDF  PDF       rw+   Portable Document Format
       SVG  SVG       r--   Scalable Vector Graphics
      WEBP* WEBP      rw+   WebP Image Format (libwebp 1.3.2 [020F])
";

    fn ok(stdout: &str) -> CommandOutput {
        CommandOutput {
            exit_code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    #[test]
    fn test_parse_writable_formats() {
        let formats = MagickProcessor::parse_writable_formats(FORMAT_LIST);
        assert!(formats.contains("WEBP"));
        assert!(formats.contains("AVIF"));
        assert!(formats.contains("JPEG"));
        assert!(!formats.contains("SVG"));
        assert!(!formats.contains("FORMAT"));
    }

    #[test]
    fn test_parse_version() {
        let out = "Version: ImageMagick 7.1.1-21 Q16-HDRI x86_64 21817 https://imagemagick.org\nCopyright: ...";
        assert_eq!(MagickProcessor::parse_version(out), "7.1.1-21");
        assert_eq!(MagickProcessor::parse_version(""), "unknown");
    }

    #[test]
    fn test_build_webp_args() {
        let params = ImageEncodeParams {
            quality: 82,
            lossless: true,
            speed: 6,
        };
        let args = MagickProcessor::build_args(
            Path::new("/in.jpg"),
            Path::new("/tmp/out.webp"),
            Format::Webp,
            &params,
        );
        assert_eq!(args[0], "/in.jpg");
        assert!(args.contains(&"82".to_string()));
        assert!(args.contains(&"webp:lossless=true".to_string()));
        assert_eq!(args.last().unwrap(), "WEBP:/tmp/out.webp");
    }

    #[test]
    fn test_build_avif_args() {
        let params = ImageEncodeParams {
            quality: 60,
            lossless: false,
            speed: 8,
        };
        let args = MagickProcessor::build_args(
            Path::new("/in.png"),
            Path::new("/tmp/out.avif"),
            Format::Avif,
            &params,
        );
        assert!(args.contains(&"60".to_string()));
        assert!(args.contains(&"heic:speed=8".to_string()));
        assert!(!args.contains(&"heic:chroma=444".to_string()));
        assert_eq!(args.last().unwrap(), "AVIF:/tmp/out.avif");
    }

    #[tokio::test]
    async fn test_probe_with_full_support() {
        let runner = MockCommandRunner::new();
        runner.push_output(ok("Version: ImageMagick 7.1.1-21 Q16"));
        runner.push_output(ok(FORMAT_LIST));

        let info = MagickProcessor::probe(&ConverterConfig::default(), &runner).await;
        assert!(info.available);
        assert_eq!(info.kind, ProcessorKind::ImageMagick);
        assert_eq!(info.version, "7.1.1-21");
        assert!(info.webp && info.avif);
        assert!(!info.av1 && !info.webm);
    }

    #[tokio::test]
    async fn test_probe_missing_binary() {
        let runner = MockCommandRunner::new();
        let info = MagickProcessor::probe(&ConverterConfig::default(), &runner).await;
        assert!(!info.available);
        assert_eq!(info.kind, ProcessorKind::None);
    }

    #[tokio::test]
    async fn test_failed_encode_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.jpg");
        std::fs::write(&source, b"jpeg").unwrap();
        let dest = dir.path().join("in.webp");

        let runner = Arc::new(MockCommandRunner::new());
        runner.push_output(CommandOutput {
            exit_code: Some(1),
            stdout: String::new(),
            stderr: "magick: no decode delegate".to_string(),
        });

        let config = ConverterConfig::default().with_temp_dir(dir.path().join("tmp"));
        let info = ProcessorInfo {
            available: true,
            kind: ProcessorKind::ImageMagick,
            version: "7".to_string(),
            webp: true,
            avif: true,
            av1: false,
            webm: false,
        };
        let processor = MagickProcessor::new(info, &config, runner.clone());
        let params = ImageEncodeParams {
            quality: 80,
            lossless: false,
            speed: 6,
        };

        let err = processor
            .convert_to_webp(&source, &dest, &params)
            .await
            .unwrap_err();
        match err {
            ConversionError::ConversionFailed { stderr, .. } => {
                assert_eq!(stderr.as_deref(), Some("magick: no decode delegate"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!dest.exists());
        assert_eq!(runner.calls().len(), 1);
    }
}
