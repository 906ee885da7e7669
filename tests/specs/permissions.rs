// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Always-allow round trip: prompt, persist, sync, and the silent repeat.

use super::harness::{ControlPlaneFixture, WorkerFixture};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use toil_agent::control::ControlPlane;
use toil_agent::model::ToolUseRequest;

fn bash_status() -> ToolUseRequest {
    ToolUseRequest {
        tool: "Bash".to_string(),
        input: json!({"command": "git status"}),
        suggestions: Vec::new(),
    }
}

/// The user answers "Always Allow": the rule lands in the cache and the
/// server's stored set, and the identical request never prompts again.
#[tokio::test]
async fn always_allow_persists_and_short_circuits() {
    let fixture = ControlPlaneFixture::new().await;
    let cancel = CancellationToken::new();

    let worker = WorkerFixture::new(&fixture, "m1");
    let pump = fixture.spawn_interaction_pump(Arc::clone(&worker.waiter), cancel.clone());

    let task = fixture.create_task("Needs a shell").await;
    fixture.tasks.mark_pending(&task.id).await.unwrap();
    let claim = worker.control.claim_task(task.id).await.unwrap();
    assert!(claim.success);

    // Turn 1 requests Bash; turn 2 repeats it after the rule is cached.
    worker.model.push_tool_use(bash_status());
    worker.model.push_text("sess-1", "Ran git status.\nNEXT_STATUS: review\n");

    let responder = {
        let fixture_tasks = task.id;
        let interactions = Arc::clone(&fixture.interactions);
        tokio::spawn(async move {
            for _ in 0..400 {
                let pending = interactions
                    .list_for_task(&fixture_tasks)
                    .await
                    .unwrap()
                    .into_iter()
                    .find(|i| i.status == toil_core::InteractionStatus::Pending);
                if let Some(interaction) = pending {
                    assert_eq!(interaction.kind, toil_core::InteractionKind::PermissionRequest);
                    let labels: Vec<&str> =
                        interaction.options.iter().map(|o| o.label.as_str()).collect();
                    assert_eq!(labels, vec!["Allow", "Always Allow", "Deny"]);
                    interactions.respond(&interaction.id, "always_allow").await.unwrap();
                    return;
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
            panic!("no permission prompt appeared");
        })
    };

    worker.run_with(task.id, claim).await;
    responder.await.unwrap();

    // The cache holds the constructed rule and the server stored it.
    assert!(worker.cache.check("Bash", &json!({"command": "git status"})));
    let stored = fixture.permissions.get_for_project_name("demo").await.unwrap();
    assert_eq!(stored.allow, vec!["Bash(git status)".to_string()]);

    // Second session, identical request: allowed from the cache, no new
    // interaction.
    let before = fixture.interactions.list_for_task(&task.id).await.unwrap().len();
    fixture.tasks.mark_pending(&task.id).await.unwrap();
    let claim = worker.control.claim_task(task.id).await.unwrap();
    worker.model.push_tool_use(bash_status());
    worker.model.push_text("sess-2", "Ran it again.\nNEXT_STATUS: done\n");
    worker.run_with(task.id, claim).await;

    let after = fixture.interactions.list_for_task(&task.id).await.unwrap().len();
    assert_eq!(after, before, "cached rule must not prompt again");

    cancel.cancel();
    pump.await.unwrap();
}
