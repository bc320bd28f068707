//! CLI entry point for the attachment archiver.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use archiver_core::cli::Args;
use archiver_core::{
    Config, Deduplicator, DownloadPipeline, DuplicateCache, GatewayClient, HttpClient, health,
    open_hash_store,
};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_args(&args).context("invalid configuration")?;
    debug!(?config, "configuration loaded");
    info!(
        channels = config.channel_ids.len(),
        save_path = %config.save_path.display(),
        dedup = config.enable_dedup,
        "Attachment archiver starting"
    );

    tokio::fs::create_dir_all(&config.save_path)
        .await
        .with_context(|| format!("cannot create save path {}", config.save_path.display()))?;

    let dedup = if config.enable_dedup {
        let store = open_hash_store(config.database_url.as_deref()).await;
        Some(Deduplicator::new(
            DuplicateCache::new(config.cache_size),
            store,
        ))
    } else {
        info!("duplicate detection disabled");
        None
    };

    let pipeline = Arc::new(DownloadPipeline::new(
        HttpClient::new(),
        config.classifier(),
        config.save_path.clone(),
        dedup,
    ));

    let gateway = GatewayClient::new(config.gateway_config(), pipeline.clone());

    let shutdown = CancellationToken::new();
    let health_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.health_port));
    let listener = TcpListener::bind(health_addr)
        .await
        .with_context(|| format!("cannot bind status endpoint on {health_addr}"))?;
    let health_task = tokio::spawn(health::serve(listener, gateway.status(), shutdown.clone()));

    tokio::select! {
        result = gateway.connect() => result.context("gateway connection failed")?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C before connecting, shutting down...");
            gateway.cleanup().await;
            shutdown.cancel();
            return Ok(());
        }
    }
    info!("gateway socket open");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C, shutting down...");

    gateway.cleanup().await;
    shutdown.cancel();
    match health_task.await {
        Ok(Err(e)) => warn!(error = %e, "status endpoint failed"),
        Err(e) => warn!(error = %e, "status endpoint task panicked"),
        Ok(Ok(())) => {}
    }

    let stats = pipeline.stats();
    info!(
        saved = stats.saved(),
        duplicates = stats.duplicates(),
        already_present = stats.already_present(),
        rejected = stats.rejected(),
        failed = stats.failed(),
        total = stats.total(),
        "Archiver stopped"
    );

    Ok(())
}
