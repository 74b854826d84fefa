use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use voxlink::{create_router, AppState, Config, SessionController, WsConnector};

const DEFAULT_CONFIG: &str = "config/voxlink";

#[derive(Parser, Debug)]
#[command(name = "voxlink", version, about = "Live speech-translation recording service")]
struct Cli {
    /// Configuration file (TOML; extension optional)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the HTTP bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the HTTP port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_optional(DEFAULT_CONFIG)?,
    };
    if let Some(bind) = cli.bind {
        cfg.service.http.bind = bind;
    }
    if let Some(port) = cli.port {
        cfg.service.http.port = port;
    }

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Recordings directory: {}", cfg.audio.recordings_path);
    info!(
        "Capture: {}Hz, {} channels, {}ms chunks, {} input source(s)",
        cfg.audio.sample_rate,
        cfg.audio.channels,
        cfg.audio.chunk_duration_ms,
        cfg.audio.input_sources.len()
    );
    info!("Server candidates: {}", cfg.server.endpoints.join(", "));

    let controller = Arc::new(SessionController::new(
        cfg.session_config(),
        cfg.input_probes(),
        Arc::new(WsConnector),
    ));
    let app = create_router(AppState::new(controller.clone()));

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP control API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    // Flush a session that was still running
    if controller.stop().await.is_ok() {
        info!("Active session stopped on shutdown");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
