// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `toil-agent` — agent-manager worker.
//!
//! `run` is the long-running worker role; `sentinel` supervises a `run`
//! child and hot-swaps it on binary change.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use toil_agent::client::ApiClient;
use toil_agent::model::ProcessTurnRunner;
use toil_agent::{CommandLoop, Supervisor, WorkerConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "toil-agent", about = "Toil agent-manager worker")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the worker: attach to the control plane and execute tasks
    Run,
    /// Supervise a `run` child, restarting it on crash or binary change
    Sentinel,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build runtime")?;
    match cli.command {
        Command::Run => runtime.block_on(run_worker()),
        Command::Sentinel => runtime.block_on(run_sentinel()),
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("LOG_LEVEL")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run_worker() -> Result<()> {
    let config = WorkerConfig::from_env().context("invalid configuration")?;
    tracing::info!(
        worker = %config.worker_id,
        server = %config.server_url,
        project = %config.project_name,
        max_concurrent = config.max_concurrent,
        "worker starting"
    );

    let client = Arc::new(ApiClient::new(&config));
    let model = Arc::new(ProcessTurnRunner::new(config.agent_cmd.clone()));
    let command_loop = CommandLoop::new(&config, Arc::clone(&client) as _, model);

    let cancel = CancellationToken::new();
    let heartbeat = command_loop.spawn_heartbeat(cancel.clone());
    let pump = command_loop.spawn_interaction_pump(Arc::clone(&client), cancel.clone());

    // SIGUSR1 from the sentinel: stop accepting scripts, finish the
    // in-flight ones, then shut down so the new binary can take over.
    let drain = {
        let command_loop = Arc::clone(&command_loop);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut restart =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::user_defined1())
                {
                    Ok(signal) => signal,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to install SIGUSR1 handler");
                        return;
                    }
                };
            if restart.recv().await.is_some() {
                tracing::info!("graceful restart requested, draining scripts");
                command_loop.scripts.drain(None).await;
                cancel.cancel();
            }
        })
    };

    let shutdown = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let ctrl_c = tokio::signal::ctrl_c();
            let mut terminate =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(signal) => signal,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to install SIGTERM handler");
                        let _ = ctrl_c.await;
                        cancel.cancel();
                        return;
                    }
                };
            tokio::select! {
                _ = ctrl_c => {}
                _ = terminate.recv() => {}
            }
            tracing::info!("shutdown signal received");
            cancel.cancel();
        })
    };

    command_loop.run(&client, &cancel).await;
    command_loop.shutdown().await;

    heartbeat.abort();
    pump.abort();
    drain.abort();
    shutdown.abort();
    tracing::info!("worker stopped");
    Ok(())
}

async fn run_sentinel() -> Result<()> {
    let supervisor = Supervisor::for_current_exe().context("sentinel startup failed")?;
    supervisor.run().await.context("sentinel failed")?;
    Ok(())
}
