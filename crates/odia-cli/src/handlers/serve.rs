//! Serve command handler.
//!
//! Runs the widget proxy until Ctrl+C.

use anyhow::{Context, Result};
use odia_proxy::{AppState, serve};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::commands::ServeArgs;

pub async fn execute(args: ServeArgs) -> Result<()> {
    let config = args.into_config();
    config.validate().context("Invalid proxy configuration")?;

    if config.chat_api_key.is_none() {
        warn!("No chat API key configured; the upstream will likely reject requests");
    }
    if !config.synthesis_available() {
        warn!("No TTS upstream configured; widgets will run text-only");
    }

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    let state = AppState::new(config).context("Failed to build HTTP client")?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl+C received, shutting down");
                shutdown.cancel();
            }
            Err(e) => warn!(error = %e, "Cannot listen for Ctrl+C"),
        }
    });

    serve(listener, state, cancel).await.context("Proxy server failed")
}
