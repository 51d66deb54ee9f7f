//! Overlay Node Daemon
//!
//! Runs one overlay node: loads the configuration, registers the built-in
//! local services and routes queries until told to stop.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults ($XDG_CONFIG_HOME/overlay/node.toml if present)
//! overlayd
//!
//! # Custom config file and fixed identity
//! overlayd --config /etc/overlay/node.toml --identity 02a1...
//!
//! # Verbose logging with per-candidate failure traces
//! overlayd --log-level debug --log-route-trace
//!
//! # RUST_LOG wins over --log-level
//! RUST_LOG=overlay_core=trace overlayd
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: close every link, then exit

mod services;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};

use overlay_core::config::{default_config_path, load_config_from_path};
use overlay_core::{ConfigSource, Identity, Node, NodeEvent, RouteContext};

/// Overlay node daemon
#[derive(Parser, Debug)]
#[command(name = "overlayd")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "OVERLAY_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Node identity (hex public key); overrides the config file
    #[arg(short = 'i', long, value_name = "HEX")]
    identity: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "OVERLAY_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log which routers were tried when a query fails
    #[arg(long)]
    log_route_trace: bool,
}

/// Initialize logging with the specified level
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("overlay_daemon={level},overlay_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(())
}

/// Log link and connection events until the queue closes
async fn log_events(node: Arc<Node>, ctx: RouteContext) {
    let mut events = node.events().stream();
    loop {
        tokio::select! {
            () = ctx.done() => break,
            event = events.next() => {
                match event {
                    Some(Ok(NodeEvent::ConnAdded { conn })) => {
                        info!(conn_id = conn.id(), nonce = %conn.nonce(), query = %conn.query().query(), "connection open");
                    }
                    Some(Ok(NodeEvent::ConnRemoved { conn })) => {
                        info!(
                            conn_id = conn.id(),
                            nonce = %conn.nonce(),
                            bytes_in = conn.bytes_in(),
                            bytes_out = conn.bytes_out(),
                            "connection closed"
                        );
                    }
                    Some(Ok(NodeEvent::LinkAdded { link })) => {
                        info!(link_id = link.id(), remote = %link.remote_identity(), "link up");
                    }
                    Some(Ok(NodeEvent::LinkRemoved { link, reason })) => {
                        info!(link_id = link.id(), remote = %link.remote_identity(), reason = ?reason, "link down");
                    }
                    Some(Err(e)) => warn!(error = %e, "event logger fell behind"),
                    None => break,
                }
            }
        }
    }
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;
        tokio::select! {
            res = signal::ctrl_c() => {
                res.context("Failed to install Ctrl+C handler")?;
                info!("Received SIGINT, initiating shutdown");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, initiating shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.context("Failed to install Ctrl+C handler")?;
        info!("Received Ctrl+C, initiating shutdown");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("Overlay daemon starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(config_path.as_deref())
        .await
        .with_context(|| format!("Failed to load configuration from {config_path:?}"))?;

    if let Some(hex) = &args.identity {
        let identity: Identity = hex.parse().context("Invalid --identity")?;
        config.node.identity = Some(identity);
        config.source = ConfigSource::Cli;
    }
    if args.log_route_trace {
        config.routing.log_route_trace = true;
        config.source = ConfigSource::Cli;
    }
    info!(source = %config.source, path = ?config.config_file_path, "configuration loaded");

    let node = Arc::new(Node::new(config).context("Failed to create node")?);
    services::register(&node).context("Failed to register built-in services")?;
    info!(identity = %node.identity(), services = ?node.services().routes(), "node ready");

    let ctx = RouteContext::new();
    let logger = tokio::spawn(log_events(node.clone(), ctx.child()));

    let runner = {
        let node = node.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move { node.run(&ctx).await })
    };

    if let Err(e) = shutdown_signal().await {
        error!(error = %e, "Signal handling failed, shutting down");
    }
    ctx.cancel();

    let result = runner.await.context("Node task panicked")?;
    if let Err(e) = logger.await {
        warn!(error = %e, "event logger task failed");
    }

    match result {
        Ok(()) => {
            info!("Overlay daemon stopped cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Daemon stopped with error");
            Err(e.into())
        }
    }
}
