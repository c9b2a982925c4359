//! Retrieval gateway service.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                  RETRIEVAL GATEWAY                    │
//!                     │                                                       │
//!   get_relevant_     │  ┌─────────────┐    ┌──────────────┐                  │
//!   context(query)  ──┼─▶│   manager   │───▶│   executor   │─── fan-out ──┐   │
//!                     │  └─────────────┘    │ strategy +   │              │   │
//!                     │                     │ semaphore    │              ▼   │
//!                     │                     └──────────────┘     ┌────────────┐
//!                     │                            │             │ circuit    │
//!                     │                            │             │ breakers   │
//!                     │                            ▼             └─────┬──────┘
//!                     │                     ┌──────────────┐           │      │
//!                     │                     │  registry +  │◀──────────┘      │
//!                     │                     │  cache       │── adapters ──────┼──▶ backends
//!                     │                     └──────────────┘                  │
//!                     │                                                       │
//!   /health/*       ──┼─▶ admin routes (axum) → manager health, resets        │
//!                     │                                                       │
//!                     │  config (toml + hot reload) · observability · lifecycle │
//!                     └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use retrieval_gateway::config::watcher::ConfigWatcher;
use retrieval_gateway::config::{load_config, GatewayConfig};
use retrieval_gateway::lifecycle::{next_signal, Gateway, Shutdown, SignalEvent};
use retrieval_gateway::observability::{logging, metrics};
use retrieval_gateway::HttpServer;

#[derive(Parser)]
#[command(name = "retrieval-gateway")]
#[command(about = "Fault-tolerant retrieval gateway", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload adapter definitions when the config file changes.
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!("retrieval-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let gateway = std::sync::Arc::new(Gateway::build(config.clone()));
    gateway.log_summary();

    if config.startup.preload_adapters {
        gateway.preload().await;
    }

    // Keep the watcher alive for the lifetime of the process.
    let _watcher = match (&args.config, args.watch) {
        (Some(path), true) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let watcher = watcher.run()?;
            let gateway = gateway.clone();
            tokio::spawn(async move {
                while let Some(new_config) = updates.recv().await {
                    gateway.apply_reload(new_config).await;
                }
            });
            Some(watcher)
        }
        _ => None,
    };

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.signalled();

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(gateway.app_state(), &config.listener);
    let server_task = tokio::spawn(server.run(listener, server_shutdown));

    loop {
        match next_signal().await? {
            SignalEvent::Reload => match &args.config {
                Some(path) => match load_config(path) {
                    Ok(new_config) => {
                        gateway.apply_reload(new_config).await;
                    }
                    Err(e) => tracing::error!("Failed to reload config: {}. Keeping current configuration.", e),
                },
                None => tracing::warn!("SIGHUP received but no config file was given"),
            },
            SignalEvent::Shutdown => {
                tracing::info!("Shutdown signal received");
                shutdown.trigger();
                break;
            }
        }
    }

    server_task.await??;
    gateway.shutdown().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
