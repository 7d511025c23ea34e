// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Gradewise Worker
//!
//! Polls the `gradewise-backend` task queue on gradewise-core and executes
//! `InteractWithMe` runs until interrupted.

use std::sync::Arc;

use anyhow::{Context, Result};
use gradewise_sdk::HttpBackend;
use gradewise_workflows::{TASK_QUEUE, WorkerConfig, build_worker};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gradewise_sdk=info".parse()?)
                .add_directive("gradewise_workflows=info".parse()?),
        )
        .init();

    info!("Starting Gradewise Worker");

    let config = WorkerConfig::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        substrate_addr = %config.sdk.substrate_addr,
        worker_id = %config.sdk.worker_id,
        task_queue = TASK_QUEUE,
        local_greeting = %config.local_greeting,
        "Configuration loaded"
    );

    let backend = HttpBackend::new(&config.sdk)?;
    let worker = build_worker(Arc::new(backend), &config);

    // An unreachable substrate at startup is fatal.
    let health = worker
        .check_connection()
        .await
        .with_context(|| format!("unable to reach gradewise-core at {}", config.sdk.substrate_addr))?;
    info!(version = %health.version, "Connected to gradewise-core");

    let shutdown = CancellationToken::new();
    let worker_shutdown = shutdown.clone();
    let worker_handle = tokio::spawn(async move { worker.run(worker_shutdown).await });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down, waiting for in-flight runs...");
    shutdown.cancel();

    worker_handle.await??;
    info!("Shutdown complete");
    Ok(())
}
