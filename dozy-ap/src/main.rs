//! Dozy Audio Player (dozy-ap) - Main entry point
//!
//! Starts the ambient-sound engine and serves its HTTP/SSE control API.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dozy_ap::api::{self, AppContext};
use dozy_ap::audio::output::AudioOutput;
use dozy_ap::audio::AssetLoader;
use dozy_ap::config::{Config, ConfigOverrides};
use dozy_ap::{EventBus, MixerEngine, SafeVolumeService};
use dozy_common::{MemorySettingsStore, SettingsStore, TomlSettingsStore};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for dozy-ap
#[derive(Parser, Debug)]
#[command(name = "dozy-ap")]
#[command(about = "Ambient sound player with hearing-safety limits")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "DOZY_AP_PORT")]
    port: Option<u16>,

    /// TOML bootstrap configuration file
    #[arg(short, long, env = "DOZY_CONFIG")]
    config: Option<PathBuf>,

    /// Folder containing sound assets
    #[arg(short, long)]
    asset_root: Option<PathBuf>,

    /// Settings file (safety ceiling, lifetime listening total)
    #[arg(long)]
    settings_path: Option<PathBuf>,

    /// Render without an audio device
    #[arg(long)]
    null_output: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Do not start the audio engine at launch
    #[arg(long)]
    no_autostart: bool,

    /// Print available output devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.list_devices {
        for device in AudioOutput::list_devices().context("Failed to list audio devices")? {
            println!("{}", device);
        }
        return Ok(());
    }

    let config_path = args
        .config
        .clone()
        .or_else(|| dozy_common::config::find_config_file().ok());
    let config = Config::load(
        config_path.as_deref(),
        ConfigOverrides {
            port: args.port,
            asset_root: args.asset_root.clone(),
            settings_path: args.settings_path.clone(),
            null_output: args.null_output,
            log_level: args.log_level.clone(),
        },
    )
    .context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "dozy_ap={level},dozy_common={level},tower_http=info",
                    level = config.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting Dozy Audio Player v{} ({}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("DOZY_GIT_HASH"),
        env!("DOZY_BUILD_TIMESTAMP"),
        env!("DOZY_BUILD_PROFILE")
    );
    match &config_path {
        Some(path) => info!("Config file: {}", path.display()),
        None => info!("No config file, using built-in defaults"),
    }
    info!("Asset root: {}", config.asset_root.display());

    let store: Arc<dyn SettingsStore> = match TomlSettingsStore::open(&config.settings_path) {
        Ok(store) => {
            info!("Settings file: {}", store.path().display());
            Arc::new(store)
        }
        Err(e) => {
            warn!(
                "Cannot open settings file {}: {}; settings will not persist",
                config.settings_path.display(),
                e
            );
            Arc::new(MemorySettingsStore::new())
        }
    };

    let events = EventBus::default();
    let safety = Arc::new(SafeVolumeService::new(
        config.safety.clone(),
        store,
        events.clone(),
    ));
    let loader = Arc::new(
        AssetLoader::new(&config.asset_root, config.engine.sample_rate)
            .with_extensions(config.extensions.clone()),
    );
    let engine = Arc::new(MixerEngine::new(
        config.engine.clone(),
        loader,
        safety,
        events,
    ));

    if !args.no_autostart {
        // Keep serving without audio; POST /engine/start can retry
        if let Err(e) = engine.start().await {
            error!("Audio engine did not start: {}", e);
        }
    }

    let app = api::create_router(AppContext {
        engine: Arc::clone(&engine),
        port: config.port,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    engine.stop().await.context("Failed to stop audio engine")?;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
