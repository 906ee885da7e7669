// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP/WebSocket client for the control plane.
//!
//! Unary calls are JSON POSTs with the bearer key; the command stream and
//! the interaction subscription are WebSocket upgrades of the same
//! endpoints the server exposes.

use crate::config::WorkerConfig;
use crate::control::ControlPlane;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use toil_core::{Error, Interaction, StatusId, TaskId};
use toil_wire::{routes, ErrorBody};
use toil_wire::{
    Ack, ClaimTaskRequest, ClaimTaskResponse, CreateInteractionRequest,
    CreateInteractionResponse, HeartbeatRequest, HeartbeatResponse, ReportAgentStatusRequest,
    ReportGitPullMainResultRequest, ReportScriptExecutionResultRequest,
    ReportScriptOutputChunkRequest, ReportTaskLogRequest, ReportTaskResultRequest,
    ReportWorktreeDeleteResultRequest, ReportWorktreeListRequest, SyncAgentsRequest,
    SyncAgentsResponse, SyncPermissionsRequest, SyncPermissionsResponse, SyncScriptsRequest,
    SyncScriptsResponse, UpdateTaskDescriptionRequest, UpdateTaskMetadataRequest,
    UpdateTaskStatusRequest,
};

pub type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    ws_base: String,
    api_key: String,
    worker_id: String,
    max_concurrent: u32,
    project_name: String,
}

impl ApiClient {
    pub fn new(config: &WorkerConfig) -> Self {
        let base_url = config.server_url.trim_end_matches('/').to_string();
        let ws_base = if let Some(rest) = base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            format!("ws://{}", base_url)
        };
        Self {
            http: reqwest::Client::new(),
            base_url,
            ws_base,
            api_key: config.api_key.clone(),
            worker_id: config.worker_id.clone(),
            max_concurrent: config.max_concurrent,
            project_name: config.project_name.clone(),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    async fn post<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        path: &str,
        request: &Req,
    ) -> Result<Resp, Error> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::unavailable(format!("request to {} failed", path)).with_cause(e))?;

        let status = response.status();
        if status.is_success() {
            return response.json::<Resp>().await.map_err(|e| {
                Error::internal(format!("invalid response from {}", path)).with_cause(e)
            });
        }
        // Prefer the server's structured error over a bare status code.
        match response.json::<ErrorBody>().await {
            Ok(body) => Err(Error::new(body.code, body.message)),
            Err(_) => Err(Error::unknown(format!("{} returned {}", path, status))),
        }
    }

    /// Open the agent command stream.
    pub async fn connect_stream(&self) -> Result<WsStream, Error> {
        let url = format!(
            "{}{}?worker_id={}&max_concurrent={}&project_name={}",
            self.ws_base, routes::AGENT_STREAM, self.worker_id, self.max_concurrent,
            self.project_name,
        );
        self.connect_ws(&url).await
    }

    /// Open the freshest-state interaction subscription for this worker.
    pub async fn connect_interactions(&self) -> Result<WsStream, Error> {
        let url = format!("{}{}", self.ws_base, routes::INTERACTIONS_STREAM);
        self.connect_ws(&url).await
    }

    async fn connect_ws(&self, url: &str) -> Result<WsStream, Error> {
        let mut request = url
            .into_client_request()
            .map_err(|e| Error::invalid_argument(format!("bad stream url: {}", e)))?;
        let bearer = format!("Bearer {}", self.api_key);
        let value = bearer
            .parse()
            .map_err(|_| Error::invalid_argument("api key is not header-safe"))?;
        request.headers_mut().insert(routes::AUTHORIZATION, value);

        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| Error::unavailable("stream connect failed").with_cause(e))?;
        Ok(stream)
    }
}

#[async_trait]
impl ControlPlane for ApiClient {
    async fn heartbeat(&self, active_count: u32) -> Result<HeartbeatResponse, Error> {
        self.post(
            routes::HEARTBEAT,
            &HeartbeatRequest { worker_id: self.worker_id.clone(), active_count },
        )
        .await
    }

    async fn claim_task(&self, task_id: TaskId) -> Result<ClaimTaskResponse, Error> {
        self.post(
            routes::CLAIM_TASK,
            &ClaimTaskRequest { task_id, worker_id: self.worker_id.clone() },
        )
        .await
    }

    async fn report_task_result(&self, request: ReportTaskResultRequest) -> Result<(), Error> {
        let _: Ack = self.post(routes::REPORT_TASK_RESULT, &request).await?;
        Ok(())
    }

    async fn report_agent_status(
        &self,
        request: ReportAgentStatusRequest,
    ) -> Result<(), Error> {
        let _: Ack = self.post(routes::REPORT_AGENT_STATUS, &request).await?;
        Ok(())
    }

    async fn report_task_log(&self, request: ReportTaskLogRequest) -> Result<(), Error> {
        let _: Ack = self.post(routes::REPORT_TASK_LOG, &request).await?;
        Ok(())
    }

    async fn create_interaction(
        &self,
        request: CreateInteractionRequest,
    ) -> Result<Interaction, Error> {
        let response: CreateInteractionResponse =
            self.post(routes::CREATE_INTERACTION, &request).await?;
        Ok(response.interaction)
    }

    async fn update_task_metadata(
        &self,
        task_id: TaskId,
        metadata: HashMap<String, String>,
    ) -> Result<(), Error> {
        let _: serde_json::Value = self
            .post(
                routes::UPDATE_TASK_METADATA,
                &UpdateTaskMetadataRequest { task_id, metadata },
            )
            .await?;
        Ok(())
    }

    async fn update_task_description(
        &self,
        task_id: TaskId,
        description: String,
    ) -> Result<(), Error> {
        let _: serde_json::Value = self
            .post(
                routes::UPDATE_TASK_DESCRIPTION,
                &UpdateTaskDescriptionRequest { task_id, description },
            )
            .await?;
        Ok(())
    }

    async fn update_task_status(
        &self,
        task_id: TaskId,
        status_id: StatusId,
    ) -> Result<(), Error> {
        let _: serde_json::Value = self
            .post(
                routes::UPDATE_TASK_STATUS,
                &UpdateTaskStatusRequest { task_id, status_id, force: false },
            )
            .await?;
        Ok(())
    }

    async fn sync_agents(&self) -> Result<SyncAgentsResponse, Error> {
        self.post(routes::SYNC_AGENTS, &SyncAgentsRequest { worker_id: self.worker_id.clone() })
            .await
    }

    async fn sync_permissions(
        &self,
        request: SyncPermissionsRequest,
    ) -> Result<SyncPermissionsResponse, Error> {
        self.post(routes::SYNC_PERMISSIONS, &request).await
    }

    async fn sync_scripts(&self) -> Result<SyncScriptsResponse, Error> {
        self.post(
            routes::SYNC_SCRIPTS,
            &SyncScriptsRequest { worker_id: self.worker_id.clone() },
        )
        .await
    }

    async fn report_script_output(
        &self,
        request: ReportScriptOutputChunkRequest,
    ) -> Result<(), Error> {
        let _: Ack = self.post(routes::REPORT_SCRIPT_OUTPUT, &request).await?;
        Ok(())
    }

    async fn report_script_result(
        &self,
        request: ReportScriptExecutionResultRequest,
    ) -> Result<(), Error> {
        let _: Ack = self.post(routes::REPORT_SCRIPT_RESULT, &request).await?;
        Ok(())
    }

    async fn report_worktree_list(
        &self,
        request: ReportWorktreeListRequest,
    ) -> Result<(), Error> {
        let _: Ack = self.post(routes::REPORT_WORKTREE_LIST, &request).await?;
        Ok(())
    }

    async fn report_worktree_delete(
        &self,
        request: ReportWorktreeDeleteResultRequest,
    ) -> Result<(), Error> {
        let _: Ack = self.post(routes::REPORT_WORKTREE_DELETE, &request).await?;
        Ok(())
    }

    async fn report_git_pull_main(
        &self,
        request: ReportGitPullMainResultRequest,
    ) -> Result<(), Error> {
        let _: Ack = self.post(routes::REPORT_GIT_PULL_MAIN, &request).await?;
        Ok(())
    }
}
