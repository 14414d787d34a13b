//! Antibrute Server
//!
//! Brute-force protection decision service. Judges authentication attempts
//! against per-login, per-password and per-IP rate limits plus IP
//! black/white lists, and exposes the engine over QUIC.

mod cert;
mod config;
mod handler;
mod quic_server;
mod ratelimit;

use anyhow::{Context, Result};
use antibrute_core::{transport::fingerprint, AuthEngine, Sweeper};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::cert::CertStore;
use crate::config::{Args, Config};
use crate::quic_server::QuicServer;
use crate::ratelimit::ConnectionLimiter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize rustls CryptoProvider with ring backend (required for rustls 0.23+)
    let _ = rustls::crypto::ring::default_provider().install_default();

    let args = Args::parse();
    let config = Config::load(&args)?;

    setup_logging(&config.log_level)?;

    info!("Starting Antibrute Server v{}", env!("CARGO_PKG_VERSION"));
    let limits = config.limits();
    info!(
        login = limits.login,
        password = limits.password,
        ip = limits.ip,
        active_timeout_secs = limits.active_timeout.as_secs(),
        bucket_kind = %limits.bucket_kind,
        "Rate limits"
    );

    let engine = Arc::new(AuthEngine::new(limits).context("Invalid limits")?);

    let store = match &config.data_dir {
        Some(dir) => CertStore::with_dir(dir),
        None => CertStore::new(),
    }
    .context("Failed to open certificate store")?;
    let (cert, key) = store
        .load_or_generate()
        .context("Failed to load server certificate")?;
    info!("Certificate fingerprint: {}", fingerprint(&cert));

    let limiter = ConnectionLimiter::new(config.connections_per_minute);
    let server = QuicServer::new(config.bind, cert, key, Arc::clone(&engine), limiter)?;

    let shutdown = CancellationToken::new();
    let sweeper = Sweeper::spawn(Arc::clone(&engine), config.sweep_interval(), shutdown.clone());

    let server_shutdown = shutdown.clone();
    let mut server_handle = tokio::spawn(async move {
        if let Err(e) = server.run(server_shutdown).await {
            error!("Server error: {}", e);
        }
    });

    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("Failed to setup SIGTERM handler")?;

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
        }
        result = &mut server_handle => {
            result.context("Server task failed")?;
        }
    }

    shutdown.cancel();
    let _ = sweeper.await;
    if !server_handle.is_finished() {
        let _ = server_handle.await;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Setup logging with tracing
fn setup_logging(level: &str) -> Result<()> {
    let log_level = level
        .parse::<Level>()
        .with_context(|| format!("Invalid log level: {}", level))?;

    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}
