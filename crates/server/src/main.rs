use std::io::{BufRead, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flux_media_core::{
    create_audit_system, load_config, validate_config, ActivityEvent, AuditHandle, AuditStore,
    CapabilityCache, CommandRunner, Config, ConversionPipeline, ConversionStore,
    ConversionTracker, FluxOptions, Format, MediaLibrary, PipelineConfig, SqliteAuditStore,
    SqliteConversionStore, SqliteMediaLibrary, StatsFilter, SystemCommandRunner,
};

use flux_media_server::api::create_router;
use flux_media_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for audit event channel
const AUDIT_BUFFER_SIZE: usize = 1000;

/// Environment variable naming the config file
const CONFIG_ENV: &str = "FLUX_MEDIA_CONFIG";

/// Environment variable switching logs to JSON lines
const LOG_JSON_ENV: &str = "FLUX_MEDIA_LOG_JSON";

#[derive(Parser)]
#[command(name = "flux-media", version, about = "Media conversion service")]
struct Cli {
    /// Path to the config file (default: $FLUX_MEDIA_CONFIG, then config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve,
    /// Scan the uploads directory and convert every pending attachment
    ConvertAll {
        /// Maximum number of attachments to convert
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Delete every converted file and purge the conversion records
    ClearAll {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Print conversion statistics
    Stats {
        /// Restrict to one target format
        #[arg(long)]
        format: Option<Format>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    let config_path = cli
        .config
        .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;
    info!("Database path: {:?}", config.database.path);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::ConvertAll { batch_size } => convert_all(config, batch_size).await,
        Commands::ClearAll { yes } => clear_all(config, yes).await,
        Commands::Stats { format } => stats(config, format),
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var_os(LOG_JSON_ENV).is_some() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Stores, audit writer and pipeline wired from one config.
struct Services {
    pipeline: Arc<ConversionPipeline>,
    audit_store: Arc<dyn AuditStore>,
    audit_handle: AuditHandle,
    writer_handle: JoinHandle<()>,
}

impl Services {
    fn open(config: &Config) -> Result<Self> {
        let db_path = &config.database.path;

        let audit_store: Arc<dyn AuditStore> = Arc::new(
            SqliteAuditStore::new(db_path).context("Failed to create activity log store")?,
        );
        let conversion_store: Arc<dyn ConversionStore> = Arc::new(
            SqliteConversionStore::new(db_path).context("Failed to create conversion store")?,
        );
        let library: Arc<dyn MediaLibrary> = Arc::new(
            SqliteMediaLibrary::new(db_path).context("Failed to create media library")?,
        );
        info!("Stores initialized");

        let (audit_handle, audit_writer) =
            create_audit_system(Arc::clone(&audit_store), AUDIT_BUFFER_SIZE);
        let writer_handle = tokio::spawn(audit_writer.run());

        let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner::new());
        let capabilities = Arc::new(CapabilityCache::from_config(&config.converter, runner));

        let pipeline = ConversionPipeline::new(
            PipelineConfig::from_config(config),
            capabilities,
            ConversionTracker::new(conversion_store),
            library,
            FluxOptions::from_config(config),
        )
        .with_audit(audit_handle.clone());

        Ok(Self {
            pipeline: Arc::new(pipeline),
            audit_store,
            audit_handle,
            writer_handle,
        })
    }

    /// Close the audit channel and wait for pending events to be written.
    ///
    /// Every pipeline clone must be gone for the channel to close.
    async fn shutdown(self) {
        let Self {
            pipeline,
            audit_store,
            audit_handle,
            writer_handle,
        } = self;
        drop(pipeline);
        drop(audit_store);
        drop(audit_handle);

        let _ = writer_handle.await;
        info!("Audit writer stopped");
    }
}

fn config_hash(config: &Config) -> String {
    let config_json = serde_json::to_string(config).unwrap_or_default();
    let hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    hash[..16].to_string()
}

async fn serve(config: Config) -> Result<()> {
    let services = Services::open(&config)?;

    let snapshot = services.pipeline.capabilities().snapshot().await;
    info!(
        image = %snapshot.image.kind,
        video = %snapshot.video.kind,
        "Processors selected"
    );

    services
        .audit_handle
        .emit(ActivityEvent::ServiceStarted {
            version: VERSION.to_string(),
            config_hash: config_hash(&config),
            image_processor: snapshot.image.kind.to_string(),
            video_processor: snapshot.video.kind.to_string(),
        })
        .await;
    info!("Emitted ServiceStarted activity event");

    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::clone(&services.pipeline),
        Arc::clone(&services.audit_store),
    ));
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    if services.pipeline.cancel_bulk() {
        info!("Cancelled running bulk conversion");
    }
    services
        .audit_handle
        .emit(ActivityEvent::ServiceStopped {
            reason: "graceful_shutdown".to_string(),
        })
        .await;

    services.shutdown().await;
    Ok(())
}

async fn convert_all(config: Config, batch_size: Option<usize>) -> Result<()> {
    let services = Services::open(&config)?;
    info!(uploads_dir = ?config.media.uploads_dir, "Converting pending attachments");

    let summary = services
        .pipeline
        .run_bulk(batch_size.unwrap_or(usize::MAX))
        .await
        .context("Bulk conversion failed")?;
    print_json(&summary)?;

    services.shutdown().await;
    Ok(())
}

async fn clear_all(config: Config, yes: bool) -> Result<()> {
    if !yes && !confirm("Delete every converted file and all conversion records?")? {
        bail!("Aborted");
    }

    let services = Services::open(&config)?;
    let summary = services.pipeline.clear_all().await;
    print_json(&summary)?;

    services.shutdown().await;
    Ok(())
}

fn stats(config: Config, format: Option<Format>) -> Result<()> {
    let store = SqliteConversionStore::new(&config.database.path)
        .context("Failed to open conversion store")?;
    let tracker = ConversionTracker::new(Arc::new(store));

    let mut filter = StatsFilter::new();
    if let Some(format) = format {
        filter = filter.with_format(format);
    }
    print_json(&tracker.statistics(&filter))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", out);
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
