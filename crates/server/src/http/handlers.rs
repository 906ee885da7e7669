// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unary JSON handlers.

use super::{AppError, SharedApp};
use axum::extract::State;
use axum::Json;
use toil_core::{Clock, Interaction, Task, WorkerId};
use toil_wire::{
    Ack, ClaimTaskRequest, ClaimTaskResponse, CreateInteractionRequest,
    CreateInteractionResponse, CreateTaskRequest, HeartbeatRequest, HeartbeatResponse,
    ReportAgentStatusRequest, ReportGitPullMainResultRequest,
    ReportScriptExecutionResultRequest, ReportScriptOutputChunkRequest, ReportTaskLogRequest,
    ReportTaskResultRequest, ReportWorktreeDeleteResultRequest, ReportWorktreeListRequest,
    RespondInteractionRequest, SyncAgentsRequest, SyncAgentsResponse, SyncPermissionsRequest,
    SyncPermissionsResponse, SyncScriptsRequest, SyncScriptsResponse,
    UpdateTaskDescriptionRequest, UpdateTaskMetadataRequest, UpdateTaskStatusRequest,
};

pub async fn heartbeat<C: Clock>(
    State(app): State<SharedApp<C>>,
    Json(request): Json<HeartbeatRequest>,
) -> Json<HeartbeatResponse> {
    let ok = app
        .registry
        .update_heartbeat(&WorkerId::new(&request.worker_id), request.active_count);
    Json(HeartbeatResponse { ok })
}

pub async fn claim_task<C: Clock>(
    State(app): State<SharedApp<C>>,
    Json(request): Json<ClaimTaskRequest>,
) -> Result<Json<ClaimTaskResponse>, AppError> {
    let response = app
        .tasks
        .claim_task(&request.task_id, &WorkerId::new(&request.worker_id))
        .await?;
    Ok(Json(response))
}

pub async fn report_task_result<C: Clock>(
    State(app): State<SharedApp<C>>,
    Json(request): Json<ReportTaskResultRequest>,
) -> Result<Json<Ack>, AppError> {
    app.tasks.report_task_result(&request).await?;
    // Nothing is waiting on this task's prompts any more.
    app.interactions.expire_pending_by_task(&request.task_id).await?;
    Ok(Json(Ack::yes()))
}

pub async fn report_agent_status<C: Clock>(
    State(app): State<SharedApp<C>>,
    Json(request): Json<ReportAgentStatusRequest>,
) -> Result<Json<Ack>, AppError> {
    app.tasks.report_agent_status(&request).await?;
    Ok(Json(Ack::yes()))
}

pub async fn report_task_log<C: Clock>(
    State(app): State<SharedApp<C>>,
    Json(request): Json<ReportTaskLogRequest>,
) -> Result<Json<Ack>, AppError> {
    app.task_logs.append(&request).await?;
    Ok(Json(Ack::yes()))
}

pub async fn create_interaction<C: Clock>(
    State(app): State<SharedApp<C>>,
    Json(request): Json<CreateInteractionRequest>,
) -> Result<Json<CreateInteractionResponse>, AppError> {
    let interaction = app.interactions.create(request).await?;
    Ok(Json(CreateInteractionResponse { interaction }))
}

pub async fn sync_agents<C: Clock>(
    State(app): State<SharedApp<C>>,
    Json(_request): Json<SyncAgentsRequest>,
) -> Result<Json<SyncAgentsResponse>, AppError> {
    Ok(Json(app.sync.agents().await?))
}

pub async fn sync_permissions<C: Clock>(
    State(app): State<SharedApp<C>>,
    Json(request): Json<SyncPermissionsRequest>,
) -> Result<Json<SyncPermissionsResponse>, AppError> {
    Ok(Json(app.permissions.sync(&request).await?))
}

pub async fn sync_scripts<C: Clock>(
    State(app): State<SharedApp<C>>,
    Json(_request): Json<SyncScriptsRequest>,
) -> Result<Json<SyncScriptsResponse>, AppError> {
    Ok(Json(app.sync.scripts().await?))
}

pub async fn report_script_output<C: Clock>(
    State(_app): State<SharedApp<C>>,
    Json(request): Json<ReportScriptOutputChunkRequest>,
) -> Json<Ack> {
    tracing::debug!(
        execution = %request.execution_id,
        stream = ?request.stream,
        seq = request.seq,
        bytes = request.chunk.len(),
        "script output chunk"
    );
    Json(Ack::yes())
}

pub async fn report_script_result<C: Clock>(
    State(_app): State<SharedApp<C>>,
    Json(request): Json<ReportScriptExecutionResultRequest>,
) -> Json<Ack> {
    tracing::info!(
        execution = %request.execution_id,
        exit_code = request.exit_code,
        error = request.error.as_deref().unwrap_or(""),
        "script execution finished"
    );
    Json(Ack::yes())
}

pub async fn report_worktree_list<C: Clock>(
    State(_app): State<SharedApp<C>>,
    Json(request): Json<ReportWorktreeListRequest>,
) -> Json<Ack> {
    tracing::info!(
        worker = %request.worker_id,
        count = request.worktrees.len(),
        "worktree list reported"
    );
    Json(Ack::yes())
}

pub async fn report_worktree_delete<C: Clock>(
    State(_app): State<SharedApp<C>>,
    Json(request): Json<ReportWorktreeDeleteResultRequest>,
) -> Json<Ack> {
    tracing::info!(
        worker = %request.worker_id,
        worktree = %request.worktree_name,
        success = request.success,
        "worktree delete reported"
    );
    Json(Ack::yes())
}

pub async fn report_git_pull_main<C: Clock>(
    State(_app): State<SharedApp<C>>,
    Json(request): Json<ReportGitPullMainResultRequest>,
) -> Json<Ack> {
    tracing::info!(worker = %request.worker_id, success = request.success, "git pull reported");
    Json(Ack::yes())
}

pub async fn create_task<C: Clock>(
    State(app): State<SharedApp<C>>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<Json<Task>, AppError> {
    Ok(Json(app.tasks.create_task(request).await?))
}

pub async fn update_task_status<C: Clock>(
    State(app): State<SharedApp<C>>,
    Json(request): Json<UpdateTaskStatusRequest>,
) -> Result<Json<Task>, AppError> {
    let task = app
        .tasks
        .update_task_status(&request.task_id, &request.status_id, request.force)
        .await?;
    Ok(Json(task))
}

pub async fn update_task_metadata<C: Clock>(
    State(app): State<SharedApp<C>>,
    Json(request): Json<UpdateTaskMetadataRequest>,
) -> Result<Json<Task>, AppError> {
    Ok(Json(app.tasks.update_task_metadata(&request.task_id, request.metadata).await?))
}

pub async fn update_task_description<C: Clock>(
    State(app): State<SharedApp<C>>,
    Json(request): Json<UpdateTaskDescriptionRequest>,
) -> Result<Json<Task>, AppError> {
    Ok(Json(
        app.tasks.update_task_description(&request.task_id, request.description).await?,
    ))
}

pub async fn respond_interaction<C: Clock>(
    State(app): State<SharedApp<C>>,
    Json(request): Json<RespondInteractionRequest>,
) -> Result<Json<Interaction>, AppError> {
    let interaction = app
        .interactions
        .respond(&request.interaction_id, request.response)
        .await?;
    Ok(Json(interaction))
}
