//! Configuration for the converter module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Image backends in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageBackend {
    /// ImageMagick `magick` binary
    #[serde(rename = "imagemagick")]
    ImageMagick,
    /// In-process encoders
    Native,
}

/// Configuration for processor detection and external tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Path to ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Path to ffprobe binary.
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,

    /// Path to ImageMagick binary.
    #[serde(default = "default_magick_path")]
    pub magick_path: PathBuf,

    /// Image backends, most preferred first.
    #[serde(default = "default_image_backends")]
    pub image_backends: Vec<ImageBackend>,

    /// Directory for in-progress encodes.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Maximum parallel conversions in bulk runs.
    #[serde(default = "default_max_parallel")]
    pub max_parallel_conversions: usize,

    /// Timeout for a single video encode in seconds.
    #[serde(default = "default_video_timeout")]
    pub video_timeout_secs: u64,

    /// Timeout for a single image tool invocation in seconds.
    #[serde(default = "default_image_timeout")]
    pub image_timeout_secs: u64,

    /// Timeout for capability probes in seconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// How long probe results stay valid in seconds.
    #[serde(default = "default_capability_ttl")]
    pub capability_ttl_secs: u64,

    /// Temp files older than this are removed by cleanup, in seconds.
    #[serde(default = "default_temp_max_age")]
    pub temp_file_max_age_secs: u64,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[serde(default = "default_log_level")]
    pub ffmpeg_log_level: String,

    /// Additional global ffmpeg arguments.
    #[serde(default)]
    pub extra_ffmpeg_args: Vec<String>,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_magick_path() -> PathBuf {
    PathBuf::from("magick")
}

fn default_image_backends() -> Vec<ImageBackend> {
    vec![ImageBackend::ImageMagick, ImageBackend::Native]
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("flux-media")
}

fn default_max_parallel() -> usize {
    2
}

fn default_video_timeout() -> u64 {
    3600 // 1 hour
}

fn default_image_timeout() -> u64 {
    300
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_capability_ttl() -> u64 {
    300
}

fn default_temp_max_age() -> u64 {
    86400
}

fn default_log_level() -> String {
    "error".to_string()
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            magick_path: default_magick_path(),
            image_backends: default_image_backends(),
            temp_dir: default_temp_dir(),
            max_parallel_conversions: default_max_parallel(),
            video_timeout_secs: default_video_timeout(),
            image_timeout_secs: default_image_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            capability_ttl_secs: default_capability_ttl(),
            temp_file_max_age_secs: default_temp_max_age(),
            ffmpeg_log_level: default_log_level(),
            extra_ffmpeg_args: Vec::new(),
        }
    }
}

impl ConverterConfig {
    /// Creates a new config with custom ffmpeg/ffprobe paths.
    pub fn with_paths(ffmpeg_path: PathBuf, ffprobe_path: PathBuf) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
            ..Default::default()
        }
    }

    /// Sets the temp directory.
    pub fn with_temp_dir(mut self, temp_dir: PathBuf) -> Self {
        self.temp_dir = temp_dir;
        self
    }

    /// Sets the image backend preference list.
    pub fn with_image_backends(mut self, backends: Vec<ImageBackend>) -> Self {
        self.image_backends = backends;
        self
    }

    /// Sets the maximum parallel conversions.
    pub fn with_max_parallel(mut self, max: usize) -> Self {
        self.max_parallel_conversions = max;
        self
    }

    /// Sets the video timeout in seconds.
    pub fn with_video_timeout(mut self, timeout_secs: u64) -> Self {
        self.video_timeout_secs = timeout_secs;
        self
    }
}
