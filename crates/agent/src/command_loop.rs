// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker command loop: stream attachment, command demultiplexing, and
//! bounded-concurrency session launch.

use crate::client::ApiClient;
use crate::config::WorkerConfig;
use crate::control::ControlPlane;
use crate::gitops::{translate_slug, GitOps};
use crate::model::TurnRunner;
use crate::permissions::PermissionCache;
use crate::scripts::{execute_script, ScriptTracker};
use crate::session::SessionDriver;
use crate::sync;
use crate::waiter::InteractionWaiter;
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use toil_core::{task::meta, InteractionStatus, TaskId};
use toil_wire::{
    AgentCommand, ReportGitPullMainResultRequest, ReportScriptExecutionResultRequest,
    ReportWorktreeDeleteResultRequest, ReportWorktreeListRequest,
};

/// Pause between stream reconnect attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);
/// Heartbeat period.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(30);

pub struct CommandLoop {
    worker_id: String,
    work_dir: PathBuf,
    agents_dir: PathBuf,
    scripts_dir: PathBuf,
    control: Arc<dyn ControlPlane>,
    model: Arc<dyn TurnRunner>,
    waiter: Arc<InteractionWaiter>,
    cache: Arc<PermissionCache>,
    pub scripts: Arc<ScriptTracker>,
    gitops: Arc<GitOps>,
    active: Mutex<HashMap<TaskId, CancellationToken>>,
    semaphore: Arc<Semaphore>,
    drivers: TaskTracker,
    reattach: Notify,
}

impl CommandLoop {
    pub fn new(
        config: &WorkerConfig,
        control: Arc<dyn ControlPlane>,
        model: Arc<dyn TurnRunner>,
    ) -> Arc<Self> {
        Arc::new(Self {
            worker_id: config.worker_id.clone(),
            work_dir: config.work_dir.clone(),
            agents_dir: config.agents_dir(),
            scripts_dir: config.scripts_dir(),
            control,
            model,
            waiter: Arc::new(InteractionWaiter::new()),
            cache: Arc::new(PermissionCache::new(config.project_name.clone())),
            scripts: ScriptTracker::new(),
            gitops: Arc::new(GitOps::new(config.work_dir.clone())),
            active: Mutex::new(HashMap::new()),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent as usize)),
            drivers: TaskTracker::new(),
            reattach: Notify::new(),
        })
    }

    pub fn waiter(&self) -> Arc<InteractionWaiter> {
        Arc::clone(&self.waiter)
    }

    pub fn active_count(&self) -> u32 {
        self.active.lock().len() as u32
    }

    /// Attach to the server, demultiplex commands, reconnect with a 5 s
    /// pause on any disconnect. Returns when `cancel` fires.
    pub async fn run(self: &Arc<Self>, client: &ApiClient, cancel: &CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }
            // Local definition files must be current before serving offers.
            self.sync_all().await;

            let mut stream = match client.connect_stream().await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(error = %e, "stream connect failed");
                    if !self.pause(cancel).await {
                        break;
                    }
                    continue;
                }
            };
            tracing::info!(worker = %self.worker_id, "attached to control plane");

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = self.reattach.notified() => {
                        tracing::info!("re-attach requested, reopening stream");
                        break;
                    }
                    message = stream.next() => {
                        match message {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<AgentCommand>(&text) {
                                    Ok(command) => self.handle_command(command).await,
                                    Err(e) => {
                                        tracing::warn!(error = %e, "undecodable command frame");
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                tracing::info!("stream closed by server");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "stream error");
                                break;
                            }
                        }
                    }
                }
            }
            if !self.pause(cancel).await {
                break;
            }
        }
    }

    /// Cancellable reconnect pause; false when cancelled.
    async fn pause(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(RECONNECT_DELAY) => true,
        }
    }

    /// Emit heartbeats until cancelled. A rejected heartbeat means the
    /// server no longer knows this worker; force a re-attach.
    pub fn spawn_heartbeat(self: &Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEARTBEAT_PERIOD);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match this.control.heartbeat(this.active_count()).await {
                    Ok(response) if !response.ok => {
                        tracing::warn!("heartbeat rejected, forcing re-attach");
                        this.reattach.notify_one();
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "heartbeat failed"),
                }
            }
        })
    }

    /// Consume the interaction subscription and feed terminal states to
    /// the waiter. Reconnects with the usual pause.
    pub fn spawn_interaction_pump(
        self: &Arc<Self>,
        client: Arc<ApiClient>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let mut stream = match client.connect_interactions().await {
                    Ok(stream) => stream,
                    Err(e) => {
                        tracing::warn!(error = %e, "interaction stream connect failed");
                        if !this.pause(&cancel).await {
                            break;
                        }
                        continue;
                    }
                };
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        message = stream.next() => {
                            match message {
                                Some(Ok(Message::Text(text))) => {
                                    let Ok(interaction) =
                                        serde_json::from_str::<toil_core::Interaction>(&text)
                                    else {
                                        continue;
                                    };
                                    if interaction.status != InteractionStatus::Pending {
                                        this.waiter.deliver(interaction);
                                    }
                                }
                                Some(Ok(Message::Close(_))) | None => break,
                                Some(Ok(_)) => {}
                                Some(Err(e)) => {
                                    tracing::warn!(error = %e, "interaction stream error");
                                    break;
                                }
                            }
                        }
                    }
                }
                if !this.pause(&cancel).await {
                    break;
                }
            }
        })
    }

    async fn sync_all(&self) {
        if let Err(e) = sync::sync_agents(self.control.as_ref(), &self.agents_dir).await {
            tracing::warn!(error = %e, "agent sync failed");
        }
        if let Err(e) = sync::sync_permissions(self.control.as_ref(), &self.cache).await {
            tracing::warn!(error = %e, "permission sync failed");
        }
        if let Err(e) = sync::sync_scripts(self.control.as_ref(), &self.scripts_dir).await {
            tracing::warn!(error = %e, "script sync failed");
        }
    }

    pub async fn handle_command(self: &Arc<Self>, command: AgentCommand) {
        match command {
            AgentCommand::TaskAvailable { task_id, title, .. } => {
                // An offer for a task we already run is an authoritative
                // re-assignment: cancel the old session, then race for the
                // claim again.
                if let Some(prior) = self.active.lock().get(&task_id) {
                    tracing::info!(task = %task_id, "re-offered active task, cancelling prior run");
                    prior.cancel();
                }
                let claim = match self.control.claim_task(task_id).await {
                    Ok(claim) => claim,
                    Err(e) => {
                        tracing::warn!(task = %task_id, error = %e, "claim failed");
                        return;
                    }
                };
                if !claim.success {
                    tracing::debug!(task = %task_id, "another worker won the claim");
                    return;
                }
                tracing::info!(task = %task_id, title = %title, "claim won");
                self.launch_driver(task_id, claim.instructions, claim.metadata).await;
            }
            AgentCommand::AssignTask { task_id, title, metadata, .. } => {
                if let Some(prior) = self.active.lock().get(&task_id) {
                    prior.cancel();
                }
                tracing::info!(task = %task_id, title = %title, "direct assignment");
                self.launch_driver(task_id, None, metadata).await;
            }
            AgentCommand::CancelTask { task_id, reason } => {
                let token = self.active.lock().get(&task_id).cloned();
                match token {
                    Some(token) => {
                        tracing::info!(task = %task_id, reason = %reason, "cancelling task");
                        token.cancel();
                    }
                    None => {
                        tracing::debug!(task = %task_id, "cancel for unknown task ignored");
                    }
                }
            }
            AgentCommand::ListWorktrees => {
                let worktrees = match self.gitops.list_worktrees().await {
                    Ok(worktrees) => worktrees,
                    Err(e) => {
                        tracing::warn!(error = %e, "worktree list failed");
                        Vec::new()
                    }
                };
                let request = ReportWorktreeListRequest {
                    worker_id: self.worker_id.clone(),
                    worktrees,
                };
                if let Err(e) = self.control.report_worktree_list(request).await {
                    tracing::warn!(error = %e, "worktree list report failed");
                }
            }
            AgentCommand::DeleteWorktree { worktree_name } => {
                let result = self.gitops.delete_worktree(&worktree_name).await;
                let request = ReportWorktreeDeleteResultRequest {
                    worker_id: self.worker_id.clone(),
                    worktree_name,
                    success: result.is_ok(),
                    error: result.err().map(|e| e.to_string()),
                };
                if let Err(e) = self.control.report_worktree_delete(request).await {
                    tracing::warn!(error = %e, "worktree delete report failed");
                }
            }
            AgentCommand::GitPullMain => {
                let result = self.gitops.pull_main().await;
                let request = match result {
                    Ok(output) => ReportGitPullMainResultRequest {
                        worker_id: self.worker_id.clone(),
                        success: true,
                        output,
                        error: None,
                    },
                    Err(e) => ReportGitPullMainResultRequest {
                        worker_id: self.worker_id.clone(),
                        success: false,
                        output: String::new(),
                        error: Some(e.to_string()),
                    },
                };
                if let Err(e) = self.control.report_git_pull_main(request).await {
                    tracing::warn!(error = %e, "git pull report failed");
                }
            }
            AgentCommand::ExecuteScript { execution_id, script_name, args } => {
                self.execute_script_command(execution_id, script_name, args).await;
            }
            AgentCommand::SyncAgents => {
                if let Err(e) = sync::sync_agents(self.control.as_ref(), &self.agents_dir).await {
                    tracing::warn!(error = %e, "agent sync failed");
                }
            }
            AgentCommand::SyncPermissions => {
                if let Err(e) =
                    sync::sync_permissions(self.control.as_ref(), &self.cache).await
                {
                    tracing::warn!(error = %e, "permission sync failed");
                }
            }
            AgentCommand::SyncScripts => {
                if let Err(e) = sync::sync_scripts(self.control.as_ref(), &self.scripts_dir).await
                {
                    tracing::warn!(error = %e, "script sync failed");
                }
            }
        }
    }

    async fn execute_script_command(
        self: &Arc<Self>,
        execution_id: String,
        script_name: String,
        args: Vec<String>,
    ) {
        // The slot must be reserved before the handler yields; a drain
        // starting now already counts this execution.
        let slot = match self.scripts.begin() {
            Ok(slot) => slot,
            Err(e) => {
                tracing::warn!(execution = %execution_id, error = %e, "script rejected");
                let report = ReportScriptExecutionResultRequest {
                    execution_id,
                    exit_code: -1,
                    error: Some(e.to_string()),
                };
                if let Err(e) = self.control.report_script_result(report).await {
                    tracing::warn!(error = %e, "script rejection report failed");
                }
                return;
            }
        };

        let path = self.scripts_dir.join(&script_name);
        let control = Arc::clone(&self.control);
        self.drivers.spawn(async move {
            let _slot = slot;
            if let Err(e) = execute_script(path, args, execution_id.clone(), control).await {
                tracing::warn!(execution = %execution_id, error = %e, "script failed");
            }
        });
    }

    /// Reserve a concurrency slot and run a session driver for the task.
    async fn launch_driver(
        self: &Arc<Self>,
        task_id: TaskId,
        instructions: Option<String>,
        metadata: HashMap<String, String>,
    ) {
        let cancel = CancellationToken::new();
        self.active.lock().insert(task_id, cancel.clone());

        let this = Arc::clone(self);
        self.drivers.spawn(async move {
            // Slot acquisition may wait behind other sessions; cancellation
            // during the wait abandons the launch.
            let permit = tokio::select! {
                _ = cancel.cancelled() => None,
                permit = Arc::clone(&this.semaphore).acquire_owned() => permit.ok(),
            };
            let Some(_permit) = permit else {
                this.active.lock().remove(&task_id);
                return;
            };

            let worktree = this.prepare_worktree(task_id, &metadata).await;
            let driver = SessionDriver {
                task_id,
                worker_id: this.worker_id.clone(),
                instructions,
                metadata,
                worktree,
                work_dir: this.work_dir.clone(),
                control: Arc::clone(&this.control),
                model: Arc::clone(&this.model),
                waiter: Arc::clone(&this.waiter),
                cache: Arc::clone(&this.cache),
                cancel: cancel.clone(),
            };
            driver.run().await;
            this.active.lock().remove(&task_id);
        });
    }

    /// Create the task's worktree when requested. Failure degrades to
    /// running in the main checkout.
    async fn prepare_worktree(
        &self,
        task_id: TaskId,
        metadata: &HashMap<String, String>,
    ) -> Option<PathBuf> {
        if metadata.get(meta::USE_WORKTREE).map(String::as_str) != Some("true") {
            return None;
        }
        let title = metadata.get(meta::TASK_TITLE).map(String::as_str).unwrap_or("task");
        let slug = translate_slug(self.model.as_ref(), title).await;
        let name = format!("{}-{}", task_id.short(8).to_lowercase(), slug);
        match self.gitops.ensure_worktree(&name).await {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(task = %task_id, error = %e, "worktree setup failed, using work dir");
                None
            }
        }
    }

    /// Cancel every active session and wait for all spawned work to drain.
    pub async fn shutdown(&self) {
        let tokens: Vec<CancellationToken> = self.active.lock().values().cloned().collect();
        for token in tokens {
            token.cancel();
        }
        self.drivers.close();
        self.drivers.wait().await;
    }
}

#[cfg(test)]
#[path = "command_loop_tests.rs"]
mod tests;
