// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Gradewise API
//!
//! Serves the greeting frontend and drives `InteractWithMe` runs on
//! gradewise-core.

use anyhow::{Context, Result};
use gradewise_api::{ApiConfig, AppState, server};
use gradewise_client::OrchestrationClient;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gradewise_api=info".parse()?)
                .add_directive("gradewise_client=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!("Starting Gradewise API");

    let config = ApiConfig::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        port = config.port,
        substrate_addr = %config.client.substrate_addr,
        await_timeout_ms = config.await_timeout.as_millis() as u64,
        "Configuration loaded"
    );

    let client = OrchestrationClient::new(&config.client)?;

    // An unreachable substrate at startup is fatal.
    client.connect().await.with_context(|| {
        format!(
            "unable to reach gradewise-core at {}",
            config.client.substrate_addr
        )
    })?;

    let state = AppState::new(client, config.await_timeout);
    let shutdown = CancellationToken::new();

    let server_shutdown = shutdown.clone();
    let bind_addr = config.bind_addr();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::serve(bind_addr, state, server_shutdown).await {
            error!("HTTP server error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    shutdown.cancel();

    let _ = server_handle.await;
    info!("Shutdown complete");

    Ok(())
}
