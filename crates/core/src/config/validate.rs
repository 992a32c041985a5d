use super::{types::Config, ConfigError};
use crate::converter::{Format, ImageDefaults, ImageEncodeParams, VideoDefaults, VideoEncodeParams};

/// Highest CRF accepted by the AV1 and VP9 encoders.
const MAX_CRF: u8 = 63;

/// Longest accepted retention period, about a century.
pub const MAX_RETENTION_DAYS: u32 = 36_500;

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Encode parameters are in range
/// - At least one format and one image backend are enabled
/// - Converter limits are positive
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    let converter = &config.converter;
    if converter.image_backends.is_empty() {
        return Err(ConfigError::ValidationError(
            "converter.image_backends cannot be empty".to_string(),
        ));
    }
    if converter.max_parallel_conversions == 0 {
        return Err(ConfigError::ValidationError(
            "converter.max_parallel_conversions must be at least 1".to_string(),
        ));
    }
    for (name, secs) in [
        ("converter.video_timeout_secs", converter.video_timeout_secs),
        ("converter.image_timeout_secs", converter.image_timeout_secs),
        ("converter.probe_timeout_secs", converter.probe_timeout_secs),
    ] {
        if secs == 0 {
            return Err(ConfigError::ValidationError(format!(
                "{} must be greater than 0",
                name
            )));
        }
    }

    validate_enabled_formats("conversion.enabled_formats", &config.conversion.enabled_formats)?;
    validate_image_defaults("image", &config.image)?;
    validate_video_defaults("video", &config.video)?;
    validate_retention("tracker.retention_days", config.tracker.retention_days)
}

pub(crate) fn validate_enabled_formats(field: &str, formats: &[Format]) -> Result<(), ConfigError> {
    if formats.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "{} must enable at least one format",
            field
        )));
    }
    Ok(())
}

pub(crate) fn validate_image_defaults(
    field: &str,
    defaults: &ImageDefaults,
) -> Result<(), ConfigError> {
    validate_image_params(&format!("{}.webp", field), &defaults.webp)?;
    validate_image_params(&format!("{}.avif", field), &defaults.avif)
}

fn validate_image_params(field: &str, params: &ImageEncodeParams) -> Result<(), ConfigError> {
    if params.quality > 100 {
        return Err(ConfigError::ValidationError(format!(
            "{}.quality must be between 0 and 100",
            field
        )));
    }
    if params.speed > 10 {
        return Err(ConfigError::ValidationError(format!(
            "{}.speed must be between 0 and 10",
            field
        )));
    }
    Ok(())
}

pub(crate) fn validate_video_defaults(
    field: &str,
    defaults: &VideoDefaults,
) -> Result<(), ConfigError> {
    validate_video_params(&format!("{}.av1", field), &defaults.av1)?;
    validate_video_params(&format!("{}.webm", field), &defaults.webm)
}

fn validate_video_params(field: &str, params: &VideoEncodeParams) -> Result<(), ConfigError> {
    if params.crf > MAX_CRF {
        return Err(ConfigError::ValidationError(format!(
            "{}.crf must be between 0 and {}",
            field, MAX_CRF
        )));
    }
    if params.cpu_used > 8 {
        return Err(ConfigError::ValidationError(format!(
            "{}.cpu_used must be between 0 and 8",
            field
        )));
    }
    Ok(())
}

pub(crate) fn validate_retention(field: &str, days: u32) -> Result<(), ConfigError> {
    if days == 0 || days > MAX_RETENTION_DAYS {
        return Err(ConfigError::ValidationError(format!(
            "{} must be between 1 and {}",
            field, MAX_RETENTION_DAYS
        )));
    }
    Ok(())
}
