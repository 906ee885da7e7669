// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `toild` — the Toil control-plane server.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use toil_core::SystemClock;
use toil_server::http::{build_router, App};
use toil_server::{
    Config, EventBus, InteractionService, Orchestrator, PermissionService, SyncService,
    TaskLogService, TaskService, WorkerRegistry,
};
use toil_storage::{LocalStore, StoragePort, Stores};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn main() -> Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build runtime")?;
    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    std::fs::create_dir_all(&config.storage_dir)
        .with_context(|| format!("creating {}", config.storage_dir.display()))?;

    // Log to stderr and to a daily file under the storage dir.
    let file_appender =
        tracing_appender::rolling::daily(config.storage_dir.join("logs"), "toild.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    let filter = tracing_subscriber::EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    tracing::info!(
        env = %config.env,
        addr = %config.bind_addr(),
        storage = %config.storage_dir.display(),
        "toild starting"
    );

    let clock = SystemClock;
    let port: Arc<dyn StoragePort> = Arc::new(LocalStore::new(&config.storage_dir));
    let stores = Stores::new(port);
    let bus = EventBus::new();
    let registry = Arc::new(WorkerRegistry::new(clock.clone()));
    let tasks = Arc::new(TaskService::new(stores.clone(), bus.clone(), clock.clone()));
    let interactions =
        Arc::new(InteractionService::new(stores.clone(), bus.clone(), clock.clone()));

    let cancel = CancellationToken::new();
    let orchestrator = Orchestrator::new(
        stores.clone(),
        bus.clone(),
        Arc::clone(&registry),
        Arc::clone(&tasks),
    );
    let orchestrator_handle = orchestrator.spawn(cancel.clone());

    let app = Arc::new(App {
        api_key: config.api_key.clone(),
        stores: stores.clone(),
        bus: bus.clone(),
        registry,
        tasks,
        interactions,
        permissions: PermissionService::new(stores.clone(), bus.clone(), clock.clone()),
        sync: SyncService::new(stores.clone()),
        task_logs: TaskLogService::new(stores, bus, clock),
    });
    let router = build_router(app);

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("binding {}", config.bind_addr()))?;
    tracing::info!(addr = %config.bind_addr(), "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    cancel.cancel();
    let _ = orchestrator_handle.await;
    tracing::info!("toild stopped");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    let mut terminate = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
    {
        Ok(signal) => signal,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGTERM handler");
            let _ = ctrl_c.await;
            return;
        }
    };
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate.recv() => {}
    }
    tracing::info!("shutdown signal received");
}
