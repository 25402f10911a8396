//! Voxjuke player service - Main entry point
//!
//! Loads configuration, wires the media resolver, decoder, voice relay and
//! per-guild sessions together, and serves the HTTP control API until Ctrl-C
//! or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voxjuke_common::config::ConfigResolver;
use voxjuke_player::api::{self, AppState};
use voxjuke_player::audio::FfmpegTranscoder;
use voxjuke_player::config::Config;
use voxjuke_player::media::{MediaResolver, YouTubeApiResolver, YtDlpResolver};
use voxjuke_player::session::{SessionRegistry, SessionServices};
use voxjuke_player::voice::RelayGateway;
use voxjuke_player::EventBus;

/// Command-line arguments for voxjuke
#[derive(Parser, Debug)]
#[command(name = "voxjuke")]
#[command(about = "Per-guild streaming audio player for chat voice channels")]
#[command(version)]
struct Args {
    /// Config file path (overrides VOXJUKE_CONFIG and the platform default)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address for the HTTP control API
    #[arg(short, long, env = "VOXJUKE_BIND")]
    bind: Option<String>,

    /// Address of the voice relay sidecar
    #[arg(short, long, env = "VOXJUKE_RELAY")]
    relay: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is resolved first so its log_level can seed the filter
    let config_resolver = ConfigResolver::new(args.config);
    let toml = config_resolver.resolve().context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting voxjuke player v{}", env!("CARGO_PKG_VERSION"));
    match config_resolver.config_path() {
        Some(path) => info!("Config file: {}", path.display()),
        None => info!("No config file, using compiled defaults"),
    }
    let config = Config::from_toml(toml, args.bind, args.relay)
        .context("Invalid configuration")?;
    info!("Voice relay: {}", config.relay_addr);

    let ytdlp = YtDlpResolver::new(config.ytdlp_path.clone());
    let resolver: Arc<dyn MediaResolver> = match config.youtube_api_key.clone() {
        Some(key) => {
            info!("Resolving media through the YouTube Data API");
            Arc::new(
                YouTubeApiResolver::new(key, ytdlp)
                    .context("Failed to initialize YouTube API client")?,
            )
        }
        None => {
            info!("Resolving media through {}", config.ytdlp_path);
            Arc::new(ytdlp)
        }
    };

    let registry = Arc::new(SessionRegistry::new(SessionServices {
        resolver,
        transcoder: Arc::new(FfmpegTranscoder::new(config.ffmpeg_path.clone())),
        gateway: Arc::new(RelayGateway::new(config.relay_addr.clone())),
        events: EventBus::new(),
        default_volume: config.default_volume,
    }));

    let app = api::create_router(AppState {
        registry: Arc::clone(&registry),
    });

    info!("Starting HTTP server on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Stopping all sessions");
    registry.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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
