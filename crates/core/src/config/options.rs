use serde::{Deserialize, Serialize};

use super::{validate, Config, ConfigError};
use crate::converter::{Format, ImageDefaults, SuccessPolicy, VideoDefaults};

/// Runtime conversion options, editable through the API.
///
/// Seeded from the config file at startup and kept in memory for the life of
/// the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluxOptions {
    pub enabled_formats: Vec<Format>,
    #[serde(default)]
    pub policy: SuccessPolicy,
    #[serde(default)]
    pub auto_convert: bool,
    pub image: ImageDefaults,
    pub video: VideoDefaults,
    pub retention_days: u32,
}

impl FluxOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled_formats: config.conversion.enabled_formats.clone(),
            policy: config.conversion.policy,
            auto_convert: config.conversion.auto_convert,
            image: config.image.clone(),
            video: config.video.clone(),
            retention_days: config.tracker.retention_days,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate::validate_enabled_formats("enabled_formats", &self.enabled_formats)?;
        validate::validate_image_defaults("image", &self.image)?;
        validate::validate_video_defaults("video", &self.video)?;
        validate::validate_retention("retention_days", self.retention_days)
    }

    /// Whether a format is switched on.
    pub fn is_enabled(&self, format: Format) -> bool {
        self.enabled_formats.contains(&format)
    }

    /// Names of the top-level fields that differ from `other`.
    pub fn changed_fields(&self, other: &FluxOptions) -> Vec<String> {
        let mut changed = Vec::new();
        if self.enabled_formats != other.enabled_formats {
            changed.push("enabled_formats".to_string());
        }
        if self.policy != other.policy {
            changed.push("policy".to_string());
        }
        if self.auto_convert != other.auto_convert {
            changed.push("auto_convert".to_string());
        }
        if self.image != other.image {
            changed.push("image".to_string());
        }
        if self.video != other.video {
            changed.push("video".to_string());
        }
        if self.retention_days != other.retention_days {
            changed.push("retention_days".to_string());
        }
        changed
    }
}

impl Default for FluxOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_from_config() {
        let mut config = Config::default();
        config.conversion.enabled_formats = vec![Format::Avif];
        config.tracker.retention_days = 7;

        let options = FluxOptions::from_config(&config);
        assert!(options.is_enabled(Format::Avif));
        assert!(!options.is_enabled(Format::Webp));
        assert_eq!(options.retention_days, 7);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut options = FluxOptions::default();
        options.image.webp.quality = 101;
        assert!(matches!(
            options.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut options = FluxOptions::default();
        options.video.av1.crf = 64;
        assert!(options.validate().is_err());

        let mut options = FluxOptions::default();
        options.enabled_formats.clear();
        assert!(options.validate().is_err());

        let mut options = FluxOptions::default();
        options.retention_days = 0;
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_changed_fields() {
        let before = FluxOptions::default();
        let mut after = before.clone();
        assert!(after.changed_fields(&before).is_empty());

        after.image.avif.quality = 40;
        after.policy = SuccessPolicy::All;
        assert_eq!(after.changed_fields(&before), vec!["policy", "image"]);
    }

    #[test]
    fn test_deserialize_from_json() {
        let json = serde_json::to_string(&FluxOptions::default()).unwrap();
        let options: FluxOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(options, FluxOptions::default());
    }
}
