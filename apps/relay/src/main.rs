use anyhow::Context;
use clap::Parser;
use relay_common::RelayConfigPatch;
use relay_core::RelayState;
use relay_router::{CHAT_EDGE_PATH, CHAT_SERVER_PATH, chat_router};
use tracing::{info, warn};

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("relay failed: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let mut patch = RelayConfigPatch::default();
    patch.overlay(Cli::parse().into_patch());
    let config = patch.into_config()?;
    if config.anthropic_api_key.is_none() {
        warn!("anthropic api key not configured; chat requests will fail with 500");
    }

    let state = RelayState::from_config(&config).context("build upstream client")?;
    let app = chat_router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(
        addr = %addr,
        server = CHAT_SERVER_PATH,
        edge = CHAT_EDGE_PATH,
        upstream = %config.anthropic_base_url,
        "listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("relay=info,relay_core=info,relay_router=info")
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
