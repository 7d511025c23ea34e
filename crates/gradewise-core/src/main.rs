// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Gradewise Core - Durable Execution Substrate
//!
//! Serves the run / task-queue / step-history API over HTTP and sweeps
//! lapsed leases and overdue runs in the background.

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use gradewise_core::config::Config;
use gradewise_core::persistence::{InMemoryPersistence, Persistence, SqlitePersistence};
use gradewise_core::sweeper::spawn_sweeper;
use gradewise_core::{Engine, server};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gradewise_core=info".parse()?),
        )
        .init();

    info!("Starting Gradewise Core");

    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        bind_addr = %config.bind_addr,
        lease_duration_ms = config.lease_duration_ms,
        sweep_interval_ms = config.sweep_interval_ms,
        "Configuration loaded"
    );

    let persistence: Arc<dyn Persistence> = match &config.database_url {
        Some(url) => {
            info!("Connecting to database...");
            let sqlite = SqlitePersistence::connect(url).await?;
            info!("Database ready, migrations applied");
            Arc::new(sqlite)
        }
        None => {
            info!("GRADEWISE_DATABASE_URL not set, runs are kept in memory");
            Arc::new(InMemoryPersistence::new())
        }
    };

    let engine = Arc::new(Engine::new(persistence).with_lease_duration(config.lease_duration()));
    let shutdown = CancellationToken::new();

    let sweeper = spawn_sweeper(engine.clone(), config.sweep_interval(), shutdown.clone());

    let server_shutdown = shutdown.clone();
    let server_engine = engine.clone();
    let bind_addr = config.bind_addr;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::serve(bind_addr, server_engine, server_shutdown).await {
            error!("HTTP server error: {}", e);
        }
    });

    info!("Gradewise Core initialized successfully");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    shutdown.cancel();

    let _ = server_handle.await;
    let _ = sweeper.await;
    info!("Shutdown complete");

    Ok(())
}
