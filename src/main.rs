//! Server binary: configuration, logging, replay, accept loop.

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use listfold::config::{Config, LogFormat};
use listfold::{server, spawn_engine, spawn_hub, system_clock, EventLog};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_format);

    let log_path = config.event_log_path();
    tracing::info!(path = %log_path.display(), "initializing event log");
    let log = EventLog::open(&log_path)
        .with_context(|| format!("failed to open event log at {}", log_path.display()))?;

    // Replay is strict: a log that fails to decode refuses to start the
    // process, because silently skipping records would corrupt state.
    let engine = spawn_engine(log, system_clock()).context("failed to replay event log")?;
    let hub = spawn_hub();

    let listener = TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?;
    let ws_path = server::websocket_path(config.shared_secret.as_deref());

    tracing::info!(
        host = %config.host,
        port = config.port,
        endpoint = %format!("ws://{}:{}{}", config.host, config.port, ws_path),
        data_dir = %config.data_dir.display(),
        "starting server"
    );

    server::run(listener, engine, hub, ws_path).await;
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
    }
}
