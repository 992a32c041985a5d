//! Types for the converter module.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Kind of media handled by a converter service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    /// Source file extensions accepted for this media type. Never includes a
    /// target format.
    pub fn source_extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Image => &["jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff"],
            Self::Video => &["mp4", "m4v", "mov", "avi", "mkv", "wmv", "mpeg", "mpg", "flv"],
        }
    }

    /// Detects the media type of a source path from its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        if is_conversion_output(path) {
            return None;
        }
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        [Self::Image, Self::Video]
            .into_iter()
            .find(|media_type| media_type.source_extensions().contains(&ext.as_str()))
    }

    /// Target formats produced for this media type.
    pub fn target_formats(&self) -> &'static [Format] {
        match self {
            Self::Image => &[Format::Webp, Format::Avif],
            Self::Video => &[Format::Av1, Format::Webm],
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target encoding format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    /// WebP image
    Webp,
    /// AVIF image
    Avif,
    /// AV1 video in an MP4 container
    Av1,
    /// VP9 video in a WebM container
    Webm,
}

impl Format {
    pub const ALL: [Format; 4] = [Self::Webp, Self::Avif, Self::Av1, Self::Webm];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webp => "webp",
            Self::Avif => "avif",
            Self::Av1 => "av1",
            Self::Webm => "webm",
        }
    }

    /// Returns the media type this format belongs to.
    pub fn media_type(&self) -> MediaType {
        match self {
            Self::Webp | Self::Avif => MediaType::Image,
            Self::Av1 | Self::Webm => MediaType::Video,
        }
    }

    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Webp => "webp",
            Self::Avif => "avif",
            Self::Av1 => "mp4",
            Self::Webm => "webm",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Webp => "image/webp",
            Self::Avif => "image/avif",
            Self::Av1 => "video/mp4",
            Self::Webm => "video/webm",
        }
    }

    /// Returns the output path for a source converted to this format.
    ///
    /// Outputs sit next to the source. AV1 shares the `mp4` extension with
    /// common sources, so it carries an `.av1` infix.
    pub fn destination_for(&self, source: &Path) -> PathBuf {
        match self {
            Self::Av1 => {
                let stem = source
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default();
                source.with_file_name(format!("{}.av1.{}", stem, self.extension()))
            }
            _ => source.with_extension(self.extension()),
        }
    }
}

/// Whether a path is one of the files this system writes.
pub fn is_conversion_output(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    [".webp", ".avif", ".webm", ".av1.mp4"]
        .iter()
        .any(|ext| name.ends_with(ext))
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "webp" => Ok(Self::Webp),
            "avif" => Ok(Self::Avif),
            "av1" => Ok(Self::Av1),
            "webm" => Ok(Self::Webm),
            other => Err(format!("unknown format: {}", other)),
        }
    }
}

/// Backend family behind a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorKind {
    /// ImageMagick command line tools
    #[serde(rename = "imagemagick")]
    ImageMagick,
    /// In-process encoders (image, webp and ravif crates)
    Native,
    /// FFmpeg command line tools
    Ffmpeg,
    /// No usable backend
    None,
}

impl ProcessorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImageMagick => "imagemagick",
            Self::Native => "native",
            Self::Ffmpeg => "ffmpeg",
            Self::None => "none",
        }
    }
}

impl fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability snapshot of a processing backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorInfo {
    pub available: bool,
    pub kind: ProcessorKind,
    pub version: String,
    pub webp: bool,
    pub avif: bool,
    pub av1: bool,
    pub webm: bool,
}

impl ProcessorInfo {
    /// Sentinel for "no backend selected".
    pub fn unavailable() -> Self {
        Self {
            available: false,
            kind: ProcessorKind::None,
            version: String::new(),
            webp: false,
            avif: false,
            av1: false,
            webm: false,
        }
    }

    /// Whether the backend can encode the given format.
    pub fn supports(&self, format: Format) -> bool {
        self.available
            && match format {
                Format::Webp => self.webp,
                Format::Avif => self.avif,
                Format::Av1 => self.av1,
                Format::Webm => self.webm,
            }
    }

    /// Formats this backend can encode.
    pub fn supported_formats(&self) -> Vec<Format> {
        Format::ALL
            .into_iter()
            .filter(|f| self.supports(*f))
            .collect()
    }
}

impl Default for ProcessorInfo {
    fn default() -> Self {
        Self::unavailable()
    }
}

/// Encoder speed/efficiency preset for video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoPreset {
    Ultrafast,
    Superfast,
    Veryfast,
    Faster,
    Fast,
    Medium,
    Slow,
    Slower,
    Veryslow,
}

impl VideoPreset {
    /// SVT-AV1 numeric preset (0 = slowest, 13 = fastest).
    pub fn svt_av1_preset(&self) -> u8 {
        match self {
            Self::Ultrafast => 12,
            Self::Superfast => 11,
            Self::Veryfast => 10,
            Self::Faster => 9,
            Self::Fast => 8,
            Self::Medium => 6,
            Self::Slow => 4,
            Self::Slower => 3,
            Self::Veryslow => 2,
        }
    }

    /// libvpx `-deadline` value.
    pub fn vpx_deadline(&self) -> &'static str {
        match self {
            Self::Ultrafast | Self::Superfast | Self::Veryfast | Self::Faster => "realtime",
            Self::Fast | Self::Medium | Self::Slow => "good",
            Self::Slower | Self::Veryslow => "best",
        }
    }

    /// rav1e `-speed` value (0 = slowest, 10 = fastest).
    pub fn rav1e_speed(&self) -> u8 {
        match self {
            Self::Ultrafast => 10,
            Self::Superfast => 9,
            Self::Veryfast => 8,
            Self::Faster => 7,
            Self::Fast => 6,
            Self::Medium => 5,
            Self::Slow => 4,
            Self::Slower => 3,
            Self::Veryslow => 2,
        }
    }
}

/// Per-job overrides. Unset fields fall back to the per-format defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionOptions {
    /// Image quality (0-100).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lossless: Option<bool>,
    /// AVIF encoder speed (0-10).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<u8>,
    /// Constant rate factor for video.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crf: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<VideoPreset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_used: Option<u8>,
    /// Encoder threads, 0 lets the encoder decide.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<u32>,
}

impl ConversionOptions {
    /// Merges these overrides over image defaults.
    pub fn resolve_image(&self, defaults: &ImageEncodeParams) -> ImageEncodeParams {
        ImageEncodeParams {
            quality: self.quality.unwrap_or(defaults.quality).min(100),
            lossless: self.lossless.unwrap_or(defaults.lossless),
            speed: self.speed.unwrap_or(defaults.speed).min(10),
        }
    }

    /// Merges these overrides over video defaults.
    pub fn resolve_video(&self, defaults: &VideoEncodeParams) -> VideoEncodeParams {
        VideoEncodeParams {
            crf: self.crf.unwrap_or(defaults.crf),
            preset: self.preset.unwrap_or(defaults.preset),
            cpu_used: self.cpu_used.unwrap_or(defaults.cpu_used),
            threads: self.threads.unwrap_or(defaults.threads),
        }
    }
}

/// Fully resolved image encode parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEncodeParams {
    pub quality: u8,
    #[serde(default)]
    pub lossless: bool,
    #[serde(default = "default_avif_speed")]
    pub speed: u8,
}

fn default_avif_speed() -> u8 {
    6
}

/// Fully resolved video encode parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoEncodeParams {
    pub crf: u8,
    #[serde(default = "default_preset")]
    pub preset: VideoPreset,
    #[serde(default = "default_cpu_used")]
    pub cpu_used: u8,
    #[serde(default)]
    pub threads: u32,
}

fn default_preset() -> VideoPreset {
    VideoPreset::Medium
}

fn default_cpu_used() -> u8 {
    4
}

/// Image encode defaults per target format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDefaults {
    #[serde(default = "default_webp_params")]
    pub webp: ImageEncodeParams,
    #[serde(default = "default_avif_params")]
    pub avif: ImageEncodeParams,
}

fn default_webp_params() -> ImageEncodeParams {
    ImageEncodeParams {
        quality: 85,
        lossless: false,
        speed: default_avif_speed(),
    }
}

fn default_avif_params() -> ImageEncodeParams {
    ImageEncodeParams {
        quality: 70,
        lossless: false,
        speed: default_avif_speed(),
    }
}

impl Default for ImageDefaults {
    fn default() -> Self {
        Self {
            webp: default_webp_params(),
            avif: default_avif_params(),
        }
    }
}

impl ImageDefaults {
    pub fn for_format(&self, format: Format) -> Option<&ImageEncodeParams> {
        match format {
            Format::Webp => Some(&self.webp),
            Format::Avif => Some(&self.avif),
            _ => None,
        }
    }
}

/// Video encode defaults per target format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDefaults {
    #[serde(default = "default_av1_params")]
    pub av1: VideoEncodeParams,
    #[serde(default = "default_webm_params")]
    pub webm: VideoEncodeParams,
}

fn default_av1_params() -> VideoEncodeParams {
    VideoEncodeParams {
        crf: 30,
        preset: VideoPreset::Medium,
        cpu_used: 4,
        threads: 0,
    }
}

fn default_webm_params() -> VideoEncodeParams {
    VideoEncodeParams {
        crf: 31,
        preset: VideoPreset::Medium,
        cpu_used: 2,
        threads: 0,
    }
}

impl Default for VideoDefaults {
    fn default() -> Self {
        Self {
            av1: default_av1_params(),
            webm: default_webm_params(),
        }
    }
}

impl VideoDefaults {
    pub fn for_format(&self, format: Format) -> Option<&VideoEncodeParams> {
        match format {
            Format::Av1 => Some(&self.av1),
            Format::Webm => Some(&self.webm),
            _ => None,
        }
    }
}

/// How a multi-format request decides overall success.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessPolicy {
    /// Succeed when at least one requested format converted.
    #[default]
    Any,
    /// Succeed only when every requested format converted.
    All,
}

/// Settings passed into every multi-format conversion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionSettings {
    #[serde(default)]
    pub options: ConversionOptions,
    #[serde(default)]
    pub policy: SuccessPolicy,
}

/// Outcome of one source to many formats job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub success: bool,
    pub converted_formats: BTreeSet<Format>,
    pub converted_files: BTreeMap<Format, PathBuf>,
    pub errors: Vec<String>,
}

impl ConversionResult {
    /// Records a converted format.
    pub fn add_converted(&mut self, format: Format, path: PathBuf) {
        self.converted_formats.insert(format);
        self.converted_files.insert(format, path);
    }

    /// Records a failed format.
    pub fn add_error(&mut self, format: Format, reason: impl fmt::Display) {
        self.errors.push(format!("{}: {}", format, reason));
    }

    /// Computes `success` for the requested set under a policy.
    pub fn finalize(&mut self, requested: &BTreeSet<Format>, policy: SuccessPolicy) {
        self.success = match policy {
            SuccessPolicy::Any => !self.converted_formats.is_empty(),
            SuccessPolicy::All => {
                !self.converted_formats.is_empty() && &self.converted_formats == requested
            }
        };
    }
}

/// Technical metadata of a video file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub duration_seconds: f64,
    pub bitrate_bps: u64,
    pub size_bytes: u64,
    pub width: u32,
    pub height: u32,
    pub codec_name: String,
}

impl Default for VideoMetadata {
    fn default() -> Self {
        Self {
            duration_seconds: 0.0,
            bitrate_bps: 0,
            size_bytes: 0,
            width: 0,
            height: 0,
            codec_name: "unknown".to_string(),
        }
    }
}
