// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Route paths and header names shared by the server and client.

/// Bearer token header. Every request must carry `Bearer <api-key>`.
pub const AUTHORIZATION: &str = "authorization";

// Agent-manager surface
pub const AGENT_STREAM: &str = "/v1/agents/stream";
pub const HEARTBEAT: &str = "/v1/agents/heartbeat";
pub const CLAIM_TASK: &str = "/v1/agents/tasks/claim";
pub const REPORT_TASK_RESULT: &str = "/v1/agents/tasks/result";
pub const REPORT_AGENT_STATUS: &str = "/v1/agents/status";
pub const REPORT_TASK_LOG: &str = "/v1/agents/tasks/log";
pub const CREATE_INTERACTION: &str = "/v1/agents/interactions";
pub const SYNC_AGENTS: &str = "/v1/agents/sync/agents";
pub const SYNC_PERMISSIONS: &str = "/v1/agents/sync/permissions";
pub const SYNC_SCRIPTS: &str = "/v1/agents/sync/scripts";
pub const REPORT_SCRIPT_OUTPUT: &str = "/v1/agents/scripts/output";
pub const REPORT_SCRIPT_RESULT: &str = "/v1/agents/scripts/result";
pub const REPORT_WORKTREE_LIST: &str = "/v1/agents/worktrees/list";
pub const REPORT_WORKTREE_DELETE: &str = "/v1/agents/worktrees/delete";
pub const REPORT_GIT_PULL_MAIN: &str = "/v1/agents/git/pull-main";

// Task / interaction services
pub const CREATE_TASK: &str = "/v1/tasks";
pub const UPDATE_TASK_STATUS: &str = "/v1/tasks/status";
pub const UPDATE_TASK_METADATA: &str = "/v1/tasks/metadata";
pub const UPDATE_TASK_DESCRIPTION: &str = "/v1/tasks/description";
pub const RESPOND_INTERACTION: &str = "/v1/interactions/respond";

// Streaming subscriptions (WebSocket upgrades)
pub const EVENTS_STREAM: &str = "/v1/events/stream";
pub const INTERACTIONS_STREAM: &str = "/v1/interactions/stream";
