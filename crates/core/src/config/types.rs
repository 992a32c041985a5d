use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::converter::{
    ConverterConfig, Format, ImageBackend, ImageDefaults, SuccessPolicy, VideoDefaults,
};

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub image: ImageDefaults,
    #[serde(default)]
    pub video: VideoDefaults,
    #[serde(default)]
    pub conversion: ConversionConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("flux-media.db")
}

/// Where uploaded media lives
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaConfig {
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            uploads_dir: default_uploads_dir(),
        }
    }
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("uploads")
}

/// Which formats to produce and how to judge multi-format jobs
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConversionConfig {
    #[serde(default = "default_enabled_formats")]
    pub enabled_formats: Vec<Format>,
    #[serde(default)]
    pub policy: SuccessPolicy,
    /// Convert new uploads found by bulk scans without an explicit request.
    #[serde(default = "default_auto_convert")]
    pub auto_convert: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            enabled_formats: default_enabled_formats(),
            policy: SuccessPolicy::default(),
            auto_convert: default_auto_convert(),
        }
    }
}

fn default_enabled_formats() -> Vec<Format> {
    Format::ALL.to_vec()
}

fn default_auto_convert() -> bool {
    true
}

/// Conversion record retention
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackerConfig {
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
        }
    }
}

fn default_retention_days() -> u32 {
    30
}

/// Config for API responses
///
/// Tool paths are reduced to their file names so host layout is not exposed.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database_configured: bool,
    pub converter: SanitizedConverterConfig,
    pub conversion: ConversionConfig,
    pub tracker: TrackerConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConverterConfig {
    pub ffmpeg: String,
    pub magick: String,
    pub image_backends: Vec<String>,
    pub max_parallel_conversions: usize,
    pub video_timeout_secs: u64,
    pub capability_ttl_secs: u64,
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database_configured: !config.database.path.as_os_str().is_empty(),
            converter: SanitizedConverterConfig {
                ffmpeg: file_name(&config.converter.ffmpeg_path),
                magick: file_name(&config.converter.magick_path),
                image_backends: config
                    .converter
                    .image_backends
                    .iter()
                    .map(|b| match b {
                        ImageBackend::ImageMagick => "imagemagick".to_string(),
                        ImageBackend::Native => "native".to_string(),
                    })
                    .collect(),
                max_parallel_conversions: config.converter.max_parallel_conversions,
                video_timeout_secs: config.converter.video_timeout_secs,
                capability_ttl_secs: config.converter.capability_ttl_secs,
            },
            conversion: config.conversion.clone(),
            tracker: config.tracker.clone(),
        }
    }
}
