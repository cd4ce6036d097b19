use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use gemini_gateway::{Gateway, GatewayConfig};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Serve a Gemini capsule over HTTP.
#[derive(Debug, Parser)]
#[command(name = "gemini-gateway", version)]
struct Args {
    /// Configuration file.
    #[arg(short, long, default_value = "gateway.toml", env = "GEMINI_GATEWAY_CONFIG")]
    config: PathBuf,

    /// Listen address; overrides `bind` from the file.
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let config = GatewayConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let mut settings = config.validate().context("validating configuration")?;
    if let Some(bind) = args.bind {
        settings.bind = bind;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let gateway = Arc::new(Gateway::new(&settings).with_cancel(shutdown_rx.clone()));

    let listener = TcpListener::bind(settings.bind)
        .await
        .with_context(|| format!("binding {}", settings.bind))?;
    info!(addr = %settings.bind, root = %settings.root, "gateway listening");

    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for Ctrl-C: {err}");
            // keep the sender alive so the server keeps running
            std::future::pending::<()>().await;
        }
        info!("shutting down");
        let _ = shutdown_tx.send(true);
    });

    let mut shutdown = shutdown_rx;
    gemini_gateway::serve(listener, gateway, async move {
        let _ = shutdown.wait_for(|stop| *stop).await;
    })
    .await
    .context("serving HTTP")?;
    Ok(())
}
