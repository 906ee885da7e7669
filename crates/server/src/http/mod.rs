// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP/WebSocket surface of the control plane.

mod auth;
mod error;
mod handlers;
mod streams;

pub use error::AppError;

use crate::bus::EventBus;
use crate::interactions::InteractionService;
use crate::permissions::PermissionService;
use crate::registry::WorkerRegistry;
use crate::sync::SyncService;
use crate::task_logs::TaskLogService;
use crate::tasks::TaskService;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use toil_core::Clock;
use toil_storage::Stores;
use toil_wire::routes;

/// Shared server state behind every handler.
pub struct App<C: Clock> {
    pub api_key: String,
    pub stores: Stores,
    pub bus: EventBus,
    pub registry: Arc<WorkerRegistry<C>>,
    pub tasks: Arc<TaskService<C>>,
    pub interactions: Arc<InteractionService<C>>,
    pub permissions: PermissionService<C>,
    pub sync: SyncService,
    pub task_logs: TaskLogService<C>,
}

pub type SharedApp<C> = Arc<App<C>>;

/// Assemble the full route table with bearer auth in front of everything.
pub fn build_router<C: Clock + 'static>(app: SharedApp<C>) -> Router {
    Router::new()
        // Agent-manager surface
        .route(routes::AGENT_STREAM, get(streams::agent_stream::<C>))
        .route(routes::HEARTBEAT, post(handlers::heartbeat::<C>))
        .route(routes::CLAIM_TASK, post(handlers::claim_task::<C>))
        .route(routes::REPORT_TASK_RESULT, post(handlers::report_task_result::<C>))
        .route(routes::REPORT_AGENT_STATUS, post(handlers::report_agent_status::<C>))
        .route(routes::REPORT_TASK_LOG, post(handlers::report_task_log::<C>))
        .route(routes::CREATE_INTERACTION, post(handlers::create_interaction::<C>))
        .route(routes::SYNC_AGENTS, post(handlers::sync_agents::<C>))
        .route(routes::SYNC_PERMISSIONS, post(handlers::sync_permissions::<C>))
        .route(routes::SYNC_SCRIPTS, post(handlers::sync_scripts::<C>))
        .route(routes::REPORT_SCRIPT_OUTPUT, post(handlers::report_script_output::<C>))
        .route(routes::REPORT_SCRIPT_RESULT, post(handlers::report_script_result::<C>))
        .route(routes::REPORT_WORKTREE_LIST, post(handlers::report_worktree_list::<C>))
        .route(routes::REPORT_WORKTREE_DELETE, post(handlers::report_worktree_delete::<C>))
        .route(routes::REPORT_GIT_PULL_MAIN, post(handlers::report_git_pull_main::<C>))
        // Task / interaction services
        .route(routes::CREATE_TASK, post(handlers::create_task::<C>))
        .route(routes::UPDATE_TASK_STATUS, post(handlers::update_task_status::<C>))
        .route(routes::UPDATE_TASK_METADATA, post(handlers::update_task_metadata::<C>))
        .route(routes::UPDATE_TASK_DESCRIPTION, post(handlers::update_task_description::<C>))
        .route(routes::RESPOND_INTERACTION, post(handlers::respond_interaction::<C>))
        // Subscriptions
        .route(routes::EVENTS_STREAM, get(streams::events_stream::<C>))
        .route(routes::INTERACTIONS_STREAM, get(streams::interactions_stream::<C>))
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&app),
            auth::require_bearer::<C>,
        ))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(app)
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
