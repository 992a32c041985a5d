pub mod audit;
pub mod command;
pub mod config;
pub mod converter;
mod db;
pub mod library;
pub mod metrics;
pub mod pipeline;
pub mod processor;
pub mod testing;
pub mod tracker;

pub use audit::{
    create_audit_system, ActivityEvent, ActivityLevel, ActivityRecord, AuditError, AuditFilter,
    AuditHandle, AuditStore, AuditWriter, SqliteAuditStore,
};
pub use command::{CommandError, CommandOutput, CommandRunner, SystemCommandRunner};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, FluxOptions,
    SanitizedConfig,
};
pub use converter::{
    CapabilityCache, CapabilitySnapshot, ConversionError, ConversionOptions, ConversionResult,
    ConversionSettings, Format, ImageConverter, MediaConverter, MediaType, ProcessorInfo,
    ProcessorKind, SuccessPolicy, VideoConverter,
};
pub use library::{Attachment, LibraryError, MediaLibrary, SqliteMediaLibrary};
pub use pipeline::{
    BulkStatus, BulkSummary, ClearSummary, ConversionPipeline, ConversionReport, PipelineConfig,
    PipelineError, TempCleanup,
};
pub use tracker::{
    ConversionRecord, ConversionStatus, ConversionStore, ConversionTracker, SqliteConversionStore,
    Statistics, StatsFilter, TrackerError,
};
