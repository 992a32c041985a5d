//! Converter services for images and videos.
//!
//! Each service owns the policy for one media type: it looks up the
//! processor selected by the [`CapabilityCache`], merges per-job options over
//! the per-format defaults and turns backend failures into structured
//! results. Services never fail outward; every error ends up as a `false`
//! return or an entry in [`ConversionResult::errors`].
//!
//! # Example
//!
//! ```ignore
//! use flux_media_core::converter::{
//!     CapabilityCache, ConversionSettings, ConverterConfig, ImageConverter, ImageDefaults,
//!     MediaConverter,
//! };
//!
//! let cache = Arc::new(CapabilityCache::from_config(&config, Arc::new(SystemCommandRunner::new())));
//! let images = ImageConverter::new(cache, ImageDefaults::default());
//!
//! let destinations = [Format::Webp, Format::Avif]
//!     .into_iter()
//!     .map(|f| (f, f.destination_for(&source)))
//!     .collect();
//! let result = images
//!     .process_media(&source, &destinations, &ConversionSettings::default())
//!     .await;
//! println!("converted: {:?}, errors: {:?}", result.converted_formats, result.errors);
//! ```

mod capabilities;
mod config;
mod error;
mod image_converter;
mod traits;
mod types;
mod video_converter;

pub use capabilities::{
    CapabilityCache, CapabilitySnapshot, ProcessorProbe, StaticProbe, SystemProbe,
};
pub use config::{ConverterConfig, ImageBackend};
pub use error::ConversionError;
pub use image_converter::ImageConverter;
pub use traits::{size_reduction, MediaConverter};
pub use types::{
    is_conversion_output, ConversionOptions, ConversionResult, ConversionSettings, Format,
    ImageDefaults, ImageEncodeParams, MediaType, ProcessorInfo, ProcessorKind, SuccessPolicy,
    VideoDefaults, VideoEncodeParams, VideoMetadata, VideoPreset,
};
pub use video_converter::VideoConverter;
