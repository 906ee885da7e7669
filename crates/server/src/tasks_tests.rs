// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::Arc as StdArc;
use toil_core::test_support::{demo_project, three_status_workflow};
use toil_core::{AgentDef, AgentDefId, FakeClock};
use toil_storage::{LocalStore, StoragePort};

struct Fixture {
    _dir: tempfile::TempDir,
    stores: Stores,
    bus: EventBus,
    clock: FakeClock,
    service: StdArc<TaskService<FakeClock>>,
    project: toil_core::Project,
    workflow: toil_core::Workflow,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let port: StdArc<dyn StoragePort> = StdArc::new(LocalStore::new(dir.path()));
    let stores = Stores::new(port);
    let bus = EventBus::new();
    let clock = FakeClock::new();

    let project = demo_project();
    let mut workflow = three_status_workflow();
    workflow.project_id = project.id;
    stores.projects.put(&project).await.unwrap();
    stores.workflows.put(&workflow).await.unwrap();

    let service =
        StdArc::new(TaskService::new(stores.clone(), bus.clone(), clock.clone()));
    Fixture { _dir: dir, stores, bus, clock, service, project, workflow }
}

fn create_request(f: &Fixture) -> CreateTaskRequest {
    CreateTaskRequest {
        project_id: f.project.id,
        workflow_id: f.workflow.id,
        title: "Build the login page".to_string(),
        description: "With validation".to_string(),
        status_id: None,
        metadata: HashMap::new(),
        use_worktree: false,
        permission_mode: Default::default(),
    }
}

#[tokio::test]
async fn create_task_defaults_to_initial_status() {
    let f = fixture().await;
    let task = f.service.create_task(create_request(&f)).await.unwrap();
    assert_eq!(task.status_id, StatusId::from("draft"));
    assert_eq!(task.assignment_status, AssignmentStatus::Unassigned);
}

#[tokio::test]
async fn create_task_rejects_unknown_status() {
    let f = fixture().await;
    let mut request = create_request(&f);
    request.status_id = Some(StatusId::from("nope"));
    let err = f.service.create_task(request).await.unwrap_err();
    assert_eq!(err.code(), toil_core::Code::InvalidArgument);
}

#[tokio::test]
async fn create_task_publishes_task_created() {
    let f = fixture().await;
    let (_id, mut rx) = f.bus.subscribe(8);
    let task = f.service.create_task(create_request(&f)).await.unwrap();

    let event = rx.recv().await.unwrap();
    assert_eq!(event.kind, EventKind::TaskCreated);
    assert_eq!(event.resource_id, task.id.to_string());
    assert_eq!(event.project_id(), Some(f.project.id.as_str()));
    assert_eq!(event.meta(meta_keys::WORKFLOW_ID), Some(f.workflow.id.as_str()));
}

#[tokio::test]
async fn allowed_transition_succeeds_and_publishes() {
    let f = fixture().await;
    let task = f.service.create_task(create_request(&f)).await.unwrap();
    let (_id, mut rx) = f.bus.subscribe(8);

    let updated = f
        .service
        .update_task_status(&task.id, &StatusId::from("review"), false)
        .await
        .unwrap();
    assert_eq!(updated.status_id, StatusId::from("review"));

    let event = rx.recv().await.unwrap();
    assert_eq!(event.kind, EventKind::TaskStatusChanged);
    assert_eq!(event.meta(meta_keys::NEW_STATUS_ID), Some("review"));
}

#[tokio::test]
async fn disallowed_transition_is_rejected() {
    let f = fixture().await;
    let task = f.service.create_task(create_request(&f)).await.unwrap();
    let err = f
        .service
        .update_task_status(&task.id, &StatusId::from("done"), false)
        .await
        .unwrap_err();
    assert_eq!(err.code(), toil_core::Code::FailedPrecondition);

    let unchanged = f.service.get_task(&task.id).await.unwrap();
    assert_eq!(unchanged.status_id, StatusId::from("draft"));
}

#[tokio::test]
async fn force_bypasses_graph_for_unassigned_tasks() {
    let f = fixture().await;
    let task = f.service.create_task(create_request(&f)).await.unwrap();
    let updated = f
        .service
        .update_task_status(&task.id, &StatusId::from("done"), true)
        .await
        .unwrap();
    assert_eq!(updated.status_id, StatusId::from("done"));
}

#[tokio::test]
async fn force_is_rejected_while_assigned() {
    let f = fixture().await;
    let task = f.service.create_task(create_request(&f)).await.unwrap();
    f.service.mark_pending(&task.id).await.unwrap();
    f.service.claim_task(&task.id, &WorkerId::new("m1")).await.unwrap();

    let err = f
        .service
        .update_task_status(&task.id, &StatusId::from("done"), true)
        .await
        .unwrap_err();
    assert_eq!(err.code(), toil_core::Code::FailedPrecondition);

    let unchanged = f.service.get_task(&task.id).await.unwrap();
    assert_eq!(unchanged.status_id, StatusId::from("draft"));
    assert_eq!(unchanged.assignment_status, AssignmentStatus::Assigned);
}

#[tokio::test]
async fn force_is_rejected_while_pending() {
    let f = fixture().await;
    let task = f.service.create_task(create_request(&f)).await.unwrap();
    f.service.mark_pending(&task.id).await.unwrap();

    let err = f
        .service
        .update_task_status(&task.id, &StatusId::from("done"), true)
        .await
        .unwrap_err();
    assert_eq!(err.code(), toil_core::Code::FailedPrecondition);
}

#[tokio::test]
async fn unknown_target_status_is_invalid_argument() {
    let f = fixture().await;
    let task = f.service.create_task(create_request(&f)).await.unwrap();
    let err = f
        .service
        .update_task_status(&task.id, &StatusId::from("missing"), true)
        .await
        .unwrap_err();
    assert_eq!(err.code(), toil_core::Code::InvalidArgument);
}

#[tokio::test]
async fn claim_requires_pending() {
    let f = fixture().await;
    let task = f.service.create_task(create_request(&f)).await.unwrap();
    let response = f.service.claim_task(&task.id, &WorkerId::new("m1")).await.unwrap();
    assert!(!response.success);
}

#[tokio::test]
async fn claim_enriches_metadata_and_returns_instructions() {
    let f = fixture().await;

    let agent = AgentDef {
        id: AgentDefId::new(),
        name: "builder".to_string(),
        content: "You build things.".to_string(),
        created_at_ms: 1,
        updated_at_ms: 1,
    };
    f.stores.agents.put(&agent).await.unwrap();
    let mut workflow = f.workflow.clone();
    workflow.statuses[0].agent_id = Some(agent.id);
    f.stores.workflows.put(&workflow).await.unwrap();

    let task = f.service.create_task(create_request(&f)).await.unwrap();
    f.service.mark_pending(&task.id).await.unwrap();
    let response = f.service.claim_task(&task.id, &WorkerId::new("m1")).await.unwrap();

    assert!(response.success);
    assert_eq!(response.instructions.as_deref(), Some("You build things."));
    assert_eq!(response.metadata.get(meta::TASK_TITLE).map(String::as_str), Some("Build the login page"));
    assert_eq!(response.metadata.get(meta::CURRENT_STATUS_NAME).map(String::as_str), Some("Draft"));
    assert_eq!(response.metadata.get(meta::PERMISSION_MODE).map(String::as_str), Some("default"));
    let transitions: Vec<toil_core::StatusTransition> =
        serde_json::from_str(response.metadata.get(meta::AVAILABLE_TRANSITIONS).unwrap()).unwrap();
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].id, StatusId::from("review"));

    let stored = f.service.get_task(&task.id).await.unwrap();
    assert_eq!(stored.assignment_status, AssignmentStatus::Assigned);
    assert_eq!(stored.assigned_worker_id, Some(WorkerId::new("m1")));
    assert!(stored.assignment_consistent());
}

#[tokio::test]
async fn claim_resolves_hook_content_from_skills() {
    let f = fixture().await;

    let skill = toil_core::SkillDef {
        id: toil_core::SkillDefId::new(),
        name: "lint".to_string(),
        content: "Run the linter and report findings.".to_string(),
        created_at_ms: 1,
        updated_at_ms: 1,
    };
    f.stores.skills.put(&skill).await.unwrap();

    let mut workflow = f.workflow.clone();
    workflow.statuses[0].hooks.push(toil_core::Hook {
        id: "hook-1".to_string(),
        skill_id: skill.id,
        trigger: toil_core::HookTrigger::AfterTaskExecution,
        order: 1,
        name: String::new(),
        content: String::new(),
    });
    f.stores.workflows.put(&workflow).await.unwrap();

    let task = f.service.create_task(create_request(&f)).await.unwrap();
    f.service.mark_pending(&task.id).await.unwrap();
    let response = f.service.claim_task(&task.id, &WorkerId::new("m1")).await.unwrap();

    let hooks: Vec<toil_core::Hook> =
        serde_json::from_str(response.metadata.get(meta::HOOKS).unwrap()).unwrap();
    assert_eq!(hooks.len(), 1);
    assert_eq!(hooks[0].name, "lint");
    assert_eq!(hooks[0].content, "Run the linter and report findings.");
}

#[tokio::test]
async fn concurrent_claims_have_exactly_one_winner() {
    let f = fixture().await;
    let task = f.service.create_task(create_request(&f)).await.unwrap();
    f.service.mark_pending(&task.id).await.unwrap();

    let service_a = StdArc::clone(&f.service);
    let service_b = StdArc::clone(&f.service);
    let task_id = task.id;
    let a = tokio::spawn(async move {
        service_a.claim_task(&task_id, &WorkerId::new("m1")).await.unwrap()
    });
    let b = tokio::spawn(async move {
        service_b.claim_task(&task_id, &WorkerId::new("m2")).await.unwrap()
    });

    let (ra, rb) = (a.await.unwrap(), b.await.unwrap());
    assert_eq!(
        [ra.success, rb.success].iter().filter(|s| **s).count(),
        1,
        "exactly one claim must win"
    );
}

#[tokio::test]
async fn second_claim_after_win_loses() {
    let f = fixture().await;
    let task = f.service.create_task(create_request(&f)).await.unwrap();
    f.service.mark_pending(&task.id).await.unwrap();

    let first = f.service.claim_task(&task.id, &WorkerId::new("m1")).await.unwrap();
    let second = f.service.claim_task(&task.id, &WorkerId::new("m2")).await.unwrap();
    assert!(first.success);
    assert!(!second.success);

    let stored = f.service.get_task(&task.id).await.unwrap();
    assert_eq!(stored.assigned_worker_id, Some(WorkerId::new("m1")));
}

#[tokio::test]
async fn report_result_releases_assignment_and_stamps_metadata() {
    let f = fixture().await;
    let task = f.service.create_task(create_request(&f)).await.unwrap();
    f.service.mark_pending(&task.id).await.unwrap();
    f.service.claim_task(&task.id, &WorkerId::new("m1")).await.unwrap();

    f.clock.advance(std::time::Duration::from_secs(60));
    let reported = f
        .service
        .report_task_result(&ReportTaskResultRequest {
            task_id: task.id,
            worker_id: "m1".to_string(),
            status: toil_wire::TaskResultStatus::Completed,
            summary: "shipped".to_string(),
            error: None,
        })
        .await
        .unwrap();

    assert_eq!(reported.assignment_status, AssignmentStatus::Unassigned);
    assert!(reported.assigned_worker_id.is_none());
    assert_eq!(reported.meta(meta::RESULT_STATUS), Some("completed"));
    assert_eq!(reported.meta(meta::RESULT_SUMMARY), Some("shipped"));
    assert_eq!(reported.meta(meta::RESULT_ERROR), None);
    assert!(reported.assignment_consistent());
}

#[tokio::test]
async fn report_result_with_error_stamps_result_error() {
    let f = fixture().await;
    let task = f.service.create_task(create_request(&f)).await.unwrap();
    f.service.mark_pending(&task.id).await.unwrap();
    f.service.claim_task(&task.id, &WorkerId::new("m1")).await.unwrap();

    let reported = f
        .service
        .report_task_result(&ReportTaskResultRequest {
            task_id: task.id,
            worker_id: "m1".to_string(),
            status: toil_wire::TaskResultStatus::Failed,
            summary: String::new(),
            error: Some("five consecutive model errors".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(reported.meta(meta::RESULT_STATUS), Some("failed"));
    assert_eq!(reported.meta(meta::RESULT_ERROR), Some("five consecutive model errors"));
}

#[tokio::test]
async fn mark_pending_skips_assigned_tasks() {
    let f = fixture().await;
    let task = f.service.create_task(create_request(&f)).await.unwrap();
    f.service.mark_pending(&task.id).await.unwrap();
    f.service.claim_task(&task.id, &WorkerId::new("m1")).await.unwrap();

    assert!(f.service.mark_pending(&task.id).await.unwrap().is_none());
    let stored = f.service.get_task(&task.id).await.unwrap();
    assert_eq!(stored.assignment_status, AssignmentStatus::Assigned);
}

#[tokio::test]
async fn report_agent_status_publishes_event() {
    let f = fixture().await;
    let task = f.service.create_task(create_request(&f)).await.unwrap();
    let (_id, mut rx) = f.bus.subscribe(8);

    f.service
        .report_agent_status(&ReportAgentStatusRequest {
            worker_id: "m1".to_string(),
            task_id: task.id,
            status: AgentStatus::Error,
            message: Some("model unavailable".to_string()),
        })
        .await
        .unwrap();

    let event = rx.recv().await.unwrap();
    assert_eq!(event.kind, EventKind::AgentStatusChanged);
    assert_eq!(event.meta("agent_status"), Some("error"));
    assert_eq!(event.meta(meta_keys::WORKER_ID), Some("m1"));
}

#[tokio::test]
async fn update_metadata_merges_entries() {
    let f = fixture().await;
    let task = f.service.create_task(create_request(&f)).await.unwrap();
    let updated = f
        .service
        .update_task_metadata(
            &task.id,
            HashMap::from([(meta::SESSION_ID.to_string(), "sess-42".to_string())]),
        )
        .await
        .unwrap();
    assert_eq!(updated.meta(meta::SESSION_ID), Some("sess-42"));
}

#[tokio::test]
async fn delete_task_publishes_event() {
    let f = fixture().await;
    let task = f.service.create_task(create_request(&f)).await.unwrap();
    let (_id, mut rx) = f.bus.subscribe(8);
    f.service.delete_task(&task.id).await.unwrap();

    let event = rx.recv().await.unwrap();
    assert_eq!(event.kind, EventKind::TaskDeleted);
    let err = f.service.get_task(&task.id).await.unwrap_err();
    assert_eq!(err.code(), toil_core::Code::NotFound);
}
