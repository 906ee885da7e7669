// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Claim exclusivity under racing workers.

use super::harness::{ControlPlaneFixture, WorkerFixture};
use tokio_util::sync::CancellationToken;
use toil_core::{AssignmentStatus, WorkerId};

/// Two workers race the same offer: exactly one session runs.
#[tokio::test]
async fn concurrent_claims_launch_exactly_one_session() {
    let fixture = ControlPlaneFixture::new().await;
    let cancel = CancellationToken::new();
    let orchestrator = fixture.spawn_orchestrator(cancel.clone());

    let mut reg_a = fixture.registry.register(WorkerId::new("m1"), 1, "demo");
    let mut reg_b = fixture.registry.register(WorkerId::new("m2"), 1, "demo");
    let worker_a = WorkerFixture::new(&fixture, "m1");
    let worker_b = WorkerFixture::new(&fixture, "m2");
    worker_a.model.push_text("sess-a", "Done.\nNEXT_STATUS: review\n");
    worker_b.model.push_text("sess-b", "Done.\nNEXT_STATUS: review\n");

    let task = fixture.create_task("Contended task").await;

    // Both workers see the same offer.
    let offer_a = reg_a.commands.recv().await.unwrap();
    let offer_b = reg_b.commands.recv().await.unwrap();
    assert_eq!(offer_a.task_id(), Some(task.id));
    assert_eq!(offer_b.task_id(), Some(task.id));

    let race_a = tokio::spawn(async move { worker_a.claim_and_run(task.id).await });
    let race_b = tokio::spawn(async move { worker_b.claim_and_run(task.id).await });
    let (won_a, won_b) = (race_a.await.unwrap(), race_b.await.unwrap());

    assert!(won_a ^ won_b, "exactly one worker must win (a={}, b={})", won_a, won_b);

    // The winner drove Draft → Review; the orchestrator re-offers it.
    let mut stored = fixture.tasks.get_task(&task.id).await.unwrap();
    for _ in 0..200 {
        if stored.assignment_status == AssignmentStatus::Pending {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        stored = fixture.tasks.get_task(&task.id).await.unwrap();
    }
    assert_eq!(stored.status_id, toil_core::StatusId::from("review"));
    assert_eq!(stored.assignment_status, AssignmentStatus::Pending);

    cancel.cancel();
    orchestrator.await.unwrap();
}

/// A claim that arrives after the winner keeps losing until the result is
/// reported and the task is re-offered.
#[tokio::test]
async fn late_claim_loses_until_reoffered() {
    let fixture = ControlPlaneFixture::new().await;
    let task = fixture.create_task("Sequenced task").await;
    fixture.tasks.mark_pending(&task.id).await.unwrap();

    let first = fixture.tasks.claim_task(&task.id, &WorkerId::new("m1")).await.unwrap();
    assert!(first.success);
    let second = fixture.tasks.claim_task(&task.id, &WorkerId::new("m2")).await.unwrap();
    assert!(!second.success);

    fixture
        .tasks
        .report_task_result(&toil_wire::ReportTaskResultRequest {
            task_id: task.id,
            worker_id: "m1".to_string(),
            status: toil_wire::TaskResultStatus::Completed,
            summary: String::new(),
            error: None,
        })
        .await
        .unwrap();
    fixture.tasks.mark_pending(&task.id).await.unwrap();

    let retry = fixture.tasks.claim_task(&task.id, &WorkerId::new("m2")).await.unwrap();
    assert!(retry.success);
}
