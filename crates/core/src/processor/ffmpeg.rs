//! FFmpeg video backend.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::{command_failure, stderr_tail, StagedOutput, VideoProcessor};
use crate::command::CommandRunner;
use crate::converter::{
    ConversionError, ConverterConfig, Format, ProcessorInfo, ProcessorKind, VideoEncodeParams,
    VideoMetadata,
};

/// AV1 encoders in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Av1Encoder {
    SvtAv1,
    Aom,
    Rav1e,
}

impl Av1Encoder {
    pub const PREFERENCE: [Av1Encoder; 3] = [Self::SvtAv1, Self::Aom, Self::Rav1e];

    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            Self::SvtAv1 => "libsvtav1",
            Self::Aom => "libaom-av1",
            Self::Rav1e => "librav1e",
        }
    }
}

/// Video processor driving `ffmpeg` and `ffprobe`.
pub struct FfmpegProcessor {
    info: ProcessorInfo,
    av1_encoder: Option<Av1Encoder>,
    vp9_encoder: Option<String>,
    config: ConverterConfig,
    runner: Arc<dyn CommandRunner>,
}

impl FfmpegProcessor {
    /// Probes ffmpeg and selects encoders.
    ///
    /// Always returns a processor; a missing ffmpeg yields one whose info
    /// reports it unavailable.
    pub async fn detect(config: &ConverterConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let limit = Duration::from_secs(config.probe_timeout_secs);

        let version = match runner
            .run(&config.ffmpeg_path, &["-version".to_string()], limit)
            .await
        {
            Ok(o) if o.success() => Some(Self::parse_version(&o.stdout)),
            Ok(o) => {
                tracing::debug!(exit_code = ?o.exit_code, "ffmpeg -version failed");
                None
            }
            Err(e) => {
                tracing::debug!(error = %e, "FFmpeg not available");
                None
            }
        };

        let Some(version) = version else {
            return Self::unavailable(config, runner);
        };

        let encoders = match runner
            .run(
                &config.ffmpeg_path,
                &["-hide_banner".to_string(), "-encoders".to_string()],
                limit,
            )
            .await
        {
            Ok(o) if o.success() => Self::parse_encoders(&o.stdout),
            _ => Vec::new(),
        };

        let av1_encoder = Av1Encoder::PREFERENCE
            .into_iter()
            .find(|enc| encoders.iter().any(|name| name == enc.ffmpeg_name()));

        let vp9_encoder = if encoders.iter().any(|name| name == "libvpx-vp9") {
            Some("libvpx-vp9".to_string())
        } else {
            encoders.iter().find(|name| name.contains("vp9")).cloned()
        };

        tracing::debug!(
            version = %version,
            av1 = ?av1_encoder.map(|e| e.ffmpeg_name()),
            vp9 = ?vp9_encoder,
            "Detected ffmpeg encoders"
        );

        let info = ProcessorInfo {
            available: true,
            kind: ProcessorKind::Ffmpeg,
            version,
            webp: false,
            avif: false,
            av1: av1_encoder.is_some(),
            webm: vp9_encoder.is_some(),
        };

        Self {
            info,
            av1_encoder,
            vp9_encoder,
            config: config.clone(),
            runner,
        }
    }

    fn unavailable(config: &ConverterConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            info: ProcessorInfo::unavailable(),
            av1_encoder: None,
            vp9_encoder: None,
            config: config.clone(),
            runner,
        }
    }

    pub fn av1_encoder(&self) -> Option<Av1Encoder> {
        self.av1_encoder
    }

    /// Extracts `6.1.1` from `ffmpeg version 6.1.1 Copyright ...`.
    fn parse_version(output: &str) -> String {
        output
            .lines()
            .next()
            .and_then(|l| l.strip_prefix("ffmpeg version "))
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string()
    }

    /// Parses encoder names from `ffmpeg -encoders`.
    ///
    /// Encoder lines look like ` V....D libsvtav1   SVT-AV1 (codec av1)`.
    fn parse_encoders(output: &str) -> Vec<String> {
        output
            .lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let flags = parts.next()?;
                let name = parts.next()?;
                let is_flags = flags.len() == 6
                    && flags.starts_with(['V', 'A', 'S'])
                    && flags.chars().skip(1).all(|c| c.is_ascii_uppercase() || c == '.');
                (is_flags && name != "=").then(|| name.to_string())
            })
            .collect()
    }

    fn base_args(&self, source: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
            "-i".to_string(),
            source.to_string_lossy().to_string(),
        ]
    }

    fn push_threads(args: &mut Vec<String>, params: &VideoEncodeParams) {
        if params.threads > 0 {
            args.extend(["-threads".to_string(), params.threads.to_string()]);
        }
    }

    fn build_av1_args(
        &self,
        encoder: Av1Encoder,
        source: &Path,
        output: &Path,
        params: &VideoEncodeParams,
    ) -> Vec<String> {
        let mut args = self.base_args(source);
        args.extend(["-c:v".to_string(), encoder.ffmpeg_name().to_string()]);

        match encoder {
            Av1Encoder::SvtAv1 => {
                args.extend([
                    "-crf".to_string(),
                    params.crf.to_string(),
                    "-preset".to_string(),
                    params.preset.svt_av1_preset().to_string(),
                ]);
            }
            Av1Encoder::Aom => {
                args.extend([
                    "-crf".to_string(),
                    params.crf.to_string(),
                    "-b:v".to_string(),
                    "0".to_string(),
                    "-cpu-used".to_string(),
                    params.cpu_used.to_string(),
                    "-row-mt".to_string(),
                    "1".to_string(),
                ]);
            }
            Av1Encoder::Rav1e => {
                // rav1e takes a quantizer on a 0-255 scale
                let qp = (params.crf as u32 * 4).min(255);
                args.extend([
                    "-qp".to_string(),
                    qp.to_string(),
                    "-speed".to_string(),
                    params.preset.rav1e_speed().to_string(),
                ]);
            }
        }

        args.extend([
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            "128k".to_string(),
        ]);
        Self::push_threads(&mut args, params);
        args.extend(["-movflags".to_string(), "+faststart".to_string()]);
        args.extend(self.config.extra_ffmpeg_args.iter().cloned());
        args.extend([
            "-f".to_string(),
            "mp4".to_string(),
            output.to_string_lossy().to_string(),
        ]);
        args
    }

    fn build_webm_args(
        &self,
        encoder: &str,
        source: &Path,
        output: &Path,
        params: &VideoEncodeParams,
    ) -> Vec<String> {
        let mut args = self.base_args(source);
        args.extend(["-c:v".to_string(), encoder.to_string()]);

        if encoder == "libvpx-vp9" {
            args.extend([
                "-crf".to_string(),
                params.crf.to_string(),
                "-b:v".to_string(),
                "0".to_string(),
                "-deadline".to_string(),
                params.preset.vpx_deadline().to_string(),
                "-cpu-used".to_string(),
                params.cpu_used.to_string(),
                "-row-mt".to_string(),
                "1".to_string(),
            ]);
        }

        args.extend([
            "-c:a".to_string(),
            "libopus".to_string(),
            "-b:a".to_string(),
            "128k".to_string(),
        ]);
        Self::push_threads(&mut args, params);
        args.extend(self.config.extra_ffmpeg_args.iter().cloned());
        args.extend([
            "-f".to_string(),
            "webm".to_string(),
            output.to_string_lossy().to_string(),
        ]);
        args
    }

    async fn encode(
        &self,
        format: Format,
        source: &Path,
        destination: &Path,
        build: impl FnOnce(&Path) -> Vec<String>,
    ) -> Result<(), ConversionError> {
        if !source.exists() {
            return Err(ConversionError::SourceNotFound {
                path: source.to_path_buf(),
            });
        }

        let staged = StagedOutput::create(&self.config.temp_dir, format).await?;
        let args = build(staged.path());

        tracing::debug!(
            source = %source.display(),
            %format,
            args = ?args,
            "Running ffmpeg"
        );

        let output = self
            .runner
            .run(
                &self.config.ffmpeg_path,
                &args,
                Duration::from_secs(self.config.video_timeout_secs),
            )
            .await
            .map_err(|e| command_failure("ffmpeg", e))?;

        if !output.success() {
            tracing::warn!(
                source = %source.display(),
                %format,
                exit_code = ?output.exit_code,
                "ffmpeg encode failed"
            );
            return Err(ConversionError::conversion_failed(
                format!("ffmpeg exited with code: {:?}", output.exit_code),
                stderr_tail(&output.stderr),
            ));
        }

        staged.commit(destination).await?;
        Ok(())
    }

    /// Parses ffprobe JSON output into metadata, zero-filling missing fields.
    fn parse_probe_output(output: &str) -> Option<VideoMetadata> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            #[serde(default)]
            format: Option<ProbeFormat>,
            #[serde(default)]
            streams: Vec<ProbeStream>,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            duration: Option<String>,
            size: Option<String>,
            bit_rate: Option<String>,
        }

        #[derive(Deserialize)]
        struct ProbeStream {
            codec_type: Option<String>,
            codec_name: Option<String>,
            width: Option<u32>,
            height: Option<u32>,
        }

        let probe: ProbeOutput = match serde_json::from_str(output) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to parse ffprobe output");
                return None;
            }
        };

        let video_stream = probe
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"));

        let format = probe.format.as_ref();
        let parse_u64 = |v: Option<&String>| v.and_then(|s| s.parse::<u64>().ok()).unwrap_or(0);

        Some(VideoMetadata {
            duration_seconds: format
                .and_then(|f| f.duration.as_ref())
                .and_then(|d| d.parse::<f64>().ok())
                .unwrap_or(0.0),
            bitrate_bps: parse_u64(format.and_then(|f| f.bit_rate.as_ref())),
            size_bytes: parse_u64(format.and_then(|f| f.size.as_ref())),
            width: video_stream.and_then(|s| s.width).unwrap_or(0),
            height: video_stream.and_then(|s| s.height).unwrap_or(0),
            codec_name: video_stream
                .and_then(|s| s.codec_name.clone())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

#[async_trait]
impl VideoProcessor for FfmpegProcessor {
    fn info(&self) -> &ProcessorInfo {
        &self.info
    }

    async fn convert_to_av1(
        &self,
        source: &Path,
        destination: &Path,
        params: &VideoEncodeParams,
    ) -> Result<(), ConversionError> {
        let encoder = match (self.info.available, self.av1_encoder) {
            (true, Some(encoder)) => encoder,
            _ => return Err(ConversionError::UnsupportedFormat { format: Format::Av1 }),
        };
        self.encode(Format::Av1, source, destination, |out| {
            self.build_av1_args(encoder, source, out, params)
        })
        .await
    }

    async fn convert_to_webm(
        &self,
        source: &Path,
        destination: &Path,
        params: &VideoEncodeParams,
    ) -> Result<(), ConversionError> {
        let encoder = match (self.info.available, self.vp9_encoder.as_deref()) {
            (true, Some(encoder)) => encoder,
            _ => return Err(ConversionError::UnsupportedFormat { format: Format::Webm }),
        };
        self.encode(Format::Webm, source, destination, |out| {
            self.build_webm_args(encoder, source, out, params)
        })
        .await
    }

    async fn metadata(&self, source: &Path) -> Option<VideoMetadata> {
        if !source.exists() {
            return None;
        }

        let args: Vec<String> = [
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ]
        .iter()
        .map(|s| s.to_string())
        .chain(std::iter::once(source.to_string_lossy().to_string()))
        .collect();

        let output = self
            .runner
            .run(
                &self.config.ffprobe_path,
                &args,
                Duration::from_secs(self.config.probe_timeout_secs),
            )
            .await;

        match output {
            Ok(o) if o.success() => Self::parse_probe_output(&o.stdout),
            Ok(o) => {
                tracing::debug!(
                    source = %source.display(),
                    exit_code = ?o.exit_code,
                    "ffprobe failed"
                );
                None
            }
            Err(e) => {
                tracing::debug!(source = %source.display(), error = %e, "ffprobe could not run");
                None
            }
        }
    }
}
