// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The control-plane port: every unary call a session driver or the
//! command loop makes against the server.
//!
//! Kept as a trait so drivers run against a fake in tests; the production
//! implementation is [`crate::client::ApiClient`].

use async_trait::async_trait;
use std::collections::HashMap;
use toil_core::{Error, Interaction, StatusId, TaskId};
use toil_wire::{
    ClaimTaskResponse, CreateInteractionRequest, HeartbeatResponse,
    ReportAgentStatusRequest, ReportGitPullMainResultRequest,
    ReportScriptExecutionResultRequest, ReportScriptOutputChunkRequest, ReportTaskLogRequest,
    ReportTaskResultRequest, ReportWorktreeDeleteResultRequest, ReportWorktreeListRequest,
    SyncAgentsResponse, SyncPermissionsRequest, SyncPermissionsResponse, SyncScriptsResponse,
};

#[async_trait]
pub trait ControlPlane: Send + Sync + 'static {
    async fn heartbeat(&self, active_count: u32) -> Result<HeartbeatResponse, Error>;

    async fn claim_task(&self, task_id: TaskId) -> Result<ClaimTaskResponse, Error>;

    async fn report_task_result(&self, request: ReportTaskResultRequest) -> Result<(), Error>;

    async fn report_agent_status(&self, request: ReportAgentStatusRequest) -> Result<(), Error>;

    async fn report_task_log(&self, request: ReportTaskLogRequest) -> Result<(), Error>;

    async fn create_interaction(
        &self,
        request: CreateInteractionRequest,
    ) -> Result<Interaction, Error>;

    async fn update_task_metadata(
        &self,
        task_id: TaskId,
        metadata: HashMap<String, String>,
    ) -> Result<(), Error>;

    async fn update_task_description(
        &self,
        task_id: TaskId,
        description: String,
    ) -> Result<(), Error>;

    /// Non-forced status move. The server enforces the transition graph.
    async fn update_task_status(&self, task_id: TaskId, status_id: StatusId)
        -> Result<(), Error>;

    async fn sync_agents(&self) -> Result<SyncAgentsResponse, Error>;

    async fn sync_permissions(
        &self,
        request: SyncPermissionsRequest,
    ) -> Result<SyncPermissionsResponse, Error>;

    async fn sync_scripts(&self) -> Result<SyncScriptsResponse, Error>;

    async fn report_script_output(
        &self,
        request: ReportScriptOutputChunkRequest,
    ) -> Result<(), Error>;

    async fn report_script_result(
        &self,
        request: ReportScriptExecutionResultRequest,
    ) -> Result<(), Error>;

    async fn report_worktree_list(&self, request: ReportWorktreeListRequest)
        -> Result<(), Error>;

    async fn report_worktree_delete(
        &self,
        request: ReportWorktreeDeleteResultRequest,
    ) -> Result<(), Error>;

    async fn report_git_pull_main(
        &self,
        request: ReportGitPullMainResultRequest,
    ) -> Result<(), Error>;
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    //! Recording fake for driver and loop tests.

    use super::*;
    use parking_lot::Mutex;
    use toil_core::InteractionStatus;

    /// In-memory [`ControlPlane`] that records every call and hands out
    /// canned claim/interaction responses.
    #[derive(Default)]
    pub struct FakeControlPlane {
        pub state: Mutex<FakeState>,
    }

    #[derive(Default)]
    pub struct FakeState {
        pub heartbeats: Vec<u32>,
        pub claims: Vec<TaskId>,
        pub claim_responses: Vec<ClaimTaskResponse>,
        pub results: Vec<ReportTaskResultRequest>,
        pub agent_statuses: Vec<ReportAgentStatusRequest>,
        pub task_logs: Vec<ReportTaskLogRequest>,
        pub interactions: Vec<Interaction>,
        pub metadata_updates: Vec<(TaskId, HashMap<String, String>)>,
        pub description_updates: Vec<(TaskId, String)>,
        pub status_updates: Vec<(TaskId, StatusId)>,
        pub status_update_error: Option<toil_core::Code>,
        pub permission_syncs: Vec<SyncPermissionsRequest>,
        pub permission_response: Option<SyncPermissionsResponse>,
        pub agent_files: Vec<toil_wire::AgentFile>,
        pub script_files: Vec<toil_wire::ScriptFile>,
        pub script_chunks: Vec<ReportScriptOutputChunkRequest>,
        pub script_results: Vec<ReportScriptExecutionResultRequest>,
        pub worktree_lists: Vec<ReportWorktreeListRequest>,
        pub worktree_deletes: Vec<ReportWorktreeDeleteResultRequest>,
        pub git_pulls: Vec<ReportGitPullMainResultRequest>,
    }

    impl FakeControlPlane {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue the response the next `claim_task` call returns.
        pub fn push_claim_response(&self, response: ClaimTaskResponse) {
            self.state.lock().claim_responses.push(response);
        }
    }

    #[async_trait]
    impl ControlPlane for FakeControlPlane {
        async fn heartbeat(&self, active_count: u32) -> Result<HeartbeatResponse, Error> {
            self.state.lock().heartbeats.push(active_count);
            Ok(HeartbeatResponse { ok: true })
        }

        async fn claim_task(&self, task_id: TaskId) -> Result<ClaimTaskResponse, Error> {
            let mut state = self.state.lock();
            state.claims.push(task_id);
            if state.claim_responses.is_empty() {
                Ok(ClaimTaskResponse::lost())
            } else {
                Ok(state.claim_responses.remove(0))
            }
        }

        async fn report_task_result(
            &self,
            request: ReportTaskResultRequest,
        ) -> Result<(), Error> {
            self.state.lock().results.push(request);
            Ok(())
        }

        async fn report_agent_status(
            &self,
            request: ReportAgentStatusRequest,
        ) -> Result<(), Error> {
            self.state.lock().agent_statuses.push(request);
            Ok(())
        }

        async fn report_task_log(&self, request: ReportTaskLogRequest) -> Result<(), Error> {
            self.state.lock().task_logs.push(request);
            Ok(())
        }

        async fn create_interaction(
            &self,
            request: CreateInteractionRequest,
        ) -> Result<Interaction, Error> {
            let interaction = Interaction::new(
                request.task_id,
                request.agent_id,
                request.kind,
                request.title,
                1,
            )
            .with_description(request.description)
            .with_options(request.options);
            self.state.lock().interactions.push(interaction.clone());
            Ok(interaction)
        }

        async fn update_task_metadata(
            &self,
            task_id: TaskId,
            metadata: HashMap<String, String>,
        ) -> Result<(), Error> {
            self.state.lock().metadata_updates.push((task_id, metadata));
            Ok(())
        }

        async fn update_task_description(
            &self,
            task_id: TaskId,
            description: String,
        ) -> Result<(), Error> {
            self.state.lock().description_updates.push((task_id, description));
            Ok(())
        }

        async fn update_task_status(
            &self,
            task_id: TaskId,
            status_id: StatusId,
        ) -> Result<(), Error> {
            let mut state = self.state.lock();
            if let Some(code) = state.status_update_error {
                return Err(Error::new(code, "scripted status update failure"));
            }
            state.status_updates.push((task_id, status_id));
            Ok(())
        }

        async fn sync_agents(&self) -> Result<SyncAgentsResponse, Error> {
            Ok(SyncAgentsResponse { agents: self.state.lock().agent_files.clone() })
        }

        async fn sync_permissions(
            &self,
            request: SyncPermissionsRequest,
        ) -> Result<SyncPermissionsResponse, Error> {
            let mut state = self.state.lock();
            state.permission_syncs.push(request.clone());
            Ok(state.permission_response.clone().unwrap_or(SyncPermissionsResponse {
                allow: request.local_allow,
                ask: Vec::new(),
                deny: Vec::new(),
            }))
        }

        async fn sync_scripts(&self) -> Result<SyncScriptsResponse, Error> {
            Ok(SyncScriptsResponse { scripts: self.state.lock().script_files.clone() })
        }

        async fn report_script_output(
            &self,
            request: ReportScriptOutputChunkRequest,
        ) -> Result<(), Error> {
            self.state.lock().script_chunks.push(request);
            Ok(())
        }

        async fn report_script_result(
            &self,
            request: ReportScriptExecutionResultRequest,
        ) -> Result<(), Error> {
            self.state.lock().script_results.push(request);
            Ok(())
        }

        async fn report_worktree_list(
            &self,
            request: ReportWorktreeListRequest,
        ) -> Result<(), Error> {
            self.state.lock().worktree_lists.push(request);
            Ok(())
        }

        async fn report_worktree_delete(
            &self,
            request: ReportWorktreeDeleteResultRequest,
        ) -> Result<(), Error> {
            self.state.lock().worktree_deletes.push(request);
            Ok(())
        }

        async fn report_git_pull_main(
            &self,
            request: ReportGitPullMainResultRequest,
        ) -> Result<(), Error> {
            self.state.lock().git_pulls.push(request);
            Ok(())
        }
    }

    /// A responded interaction for waiter tests.
    pub fn responded(mut interaction: Interaction, response: &str) -> Interaction {
        interaction.status = InteractionStatus::Responded;
        interaction.response = Some(response.to_string());
        interaction.responded_at_ms = Some(2);
        interaction
    }

    /// An expired interaction for waiter tests.
    pub fn expired(mut interaction: Interaction) -> Interaction {
        interaction.status = InteractionStatus::Expired;
        interaction.responded_at_ms = Some(2);
        interaction
    }
}
