// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! toil-wire: the protocol between the control plane and agent managers.
//!
//! The server→worker direction is a WebSocket stream of [`AgentCommand`]
//! frames (JSON, tagged unions). The worker→server direction is unary
//! JSON-over-HTTP requests. Both sides share these DTOs and the route
//! constants in [`routes`].

mod command;
mod rpc;
pub mod routes;

pub use command::AgentCommand;
pub use rpc::{
    Ack, AgentFile, AgentStatus, ClaimTaskRequest, ClaimTaskResponse, CreateInteractionRequest,
    CreateInteractionResponse, CreateTaskRequest, ErrorBody, HeartbeatRequest, HeartbeatResponse,
    OutputStream, ReportAgentStatusRequest, ReportGitPullMainResultRequest,
    ReportScriptExecutionResultRequest, ReportScriptOutputChunkRequest, ReportTaskLogRequest,
    ReportTaskResultRequest, ReportWorktreeDeleteResultRequest, ReportWorktreeListRequest,
    RespondInteractionRequest, ScriptFile, SubscribeParams, SyncAgentsRequest,
    SyncAgentsResponse, SyncPermissionsRequest, SyncPermissionsResponse, SyncScriptsRequest,
    SyncScriptsResponse, TaskResultStatus, UpdateTaskDescriptionRequest,
    UpdateTaskMetadataRequest, UpdateTaskStatusRequest, WorktreeInfo,
};
