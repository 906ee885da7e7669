// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Happy-path lifecycle: offer → claim → directive → auto-advance, and the
//! forced-move guard.

use super::harness::{ControlPlaneFixture, WorkerFixture};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use toil_agent::control::ControlPlane;
use toil_core::{AssignmentStatus, StatusId, WorkerId};
use toil_wire::AgentCommand;

/// A task flows Draft → Review on a directive, then Review → Done by
/// auto-advancing the single outgoing transition, ending Unassigned.
#[tokio::test]
async fn happy_path_draft_review_done() {
    let fixture = ControlPlaneFixture::new().await;
    let cancel = CancellationToken::new();
    let orchestrator = fixture.spawn_orchestrator(cancel.clone());

    let mut registration = fixture.registry.register(WorkerId::new("m1"), 1, "demo");
    let worker = WorkerFixture::new(&fixture, "m1");

    // Turn 1 ends Draft with an explicit directive; turn 2 has none, and
    // Review's single outgoing edge auto-advances.
    worker.model.push_text("sess-1", "Implemented.\nNEXT_STATUS: review\n");
    worker.model.push_text("sess-1", "Verified, nothing further.");

    let task = fixture.create_task("Implement the login page").await;

    for round in 0..2 {
        let command = tokio::time::timeout(Duration::from_secs(5), registration.commands.recv())
            .await
            .unwrap_or_else(|_| panic!("no offer for round {}", round))
            .unwrap();
        let AgentCommand::TaskAvailable { task_id, .. } = command else {
            panic!("expected an offer");
        };
        assert_eq!(task_id, task.id);
        assert!(worker.claim_and_run(task_id).await, "claim must win");
    }

    let finished = fixture.tasks.get_task(&task.id).await.unwrap();
    assert_eq!(finished.status_id, StatusId::from("done"));
    assert_eq!(finished.assignment_status, AssignmentStatus::Unassigned);
    assert!(finished.assigned_worker_id.is_none());
    assert_eq!(finished.meta("result_status"), Some("completed"));

    // Done is terminal with no agent: no third offer.
    assert!(registration.commands.try_recv().is_err());

    cancel.cancel();
    orchestrator.await.unwrap();
}

/// A forced move while a worker holds the task is rejected and changes
/// nothing.
#[tokio::test]
async fn forced_move_is_guarded_while_assigned() {
    let fixture = ControlPlaneFixture::new().await;
    let task = fixture.create_task("Guarded task").await;
    fixture.tasks.mark_pending(&task.id).await.unwrap();
    let claim = fixture.tasks.claim_task(&task.id, &WorkerId::new("m1")).await.unwrap();
    assert!(claim.success);

    let err = fixture
        .tasks
        .update_task_status(&task.id, &StatusId::from("done"), true)
        .await
        .unwrap_err();
    assert_eq!(err.code(), toil_core::Code::FailedPrecondition);

    let unchanged = fixture.tasks.get_task(&task.id).await.unwrap();
    assert_eq!(unchanged.status_id, StatusId::from("draft"));
    assert_eq!(unchanged.assignment_status, AssignmentStatus::Assigned);
    assert_eq!(unchanged.assigned_worker_id, Some(WorkerId::new("m1")));
}

/// Interaction expiry on result report: a session that finishes while a
/// question is pending expires it.
#[tokio::test]
async fn pending_questions_expire_when_the_task_finishes() {
    let fixture = ControlPlaneFixture::new().await;
    let task = fixture.create_task("Ask then finish").await;
    fixture.tasks.mark_pending(&task.id).await.unwrap();

    let worker = WorkerFixture::new(&fixture, "m1");
    let claim = worker.control.claim_task(task.id).await.unwrap();
    assert!(claim.success);

    let question = fixture
        .interactions
        .create(toil_wire::CreateInteractionRequest {
            task_id: task.id,
            agent_id: "m1".to_string(),
            kind: toil_core::InteractionKind::Question,
            title: "Still needed?".to_string(),
            description: String::new(),
            options: Vec::new(),
        })
        .await
        .unwrap();

    worker.model.push_text("sess-1", "Done.\nNEXT_STATUS: review\n");
    worker.run_with(task.id, claim).await;

    let expired = fixture.interactions.get(&question.id).await.unwrap();
    assert_eq!(expired.status, toil_core::InteractionStatus::Expired);
}
