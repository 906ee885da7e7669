// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::Arc;
use toil_core::test_support::demo_project;
use toil_core::FakeClock;
use toil_storage::{LocalStore, StoragePort};

struct Fixture {
    _dir: tempfile::TempDir,
    bus: EventBus,
    service: PermissionService<FakeClock>,
    project: Project,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let port: Arc<dyn StoragePort> = Arc::new(LocalStore::new(dir.path()));
    let stores = Stores::new(port);
    let bus = EventBus::new();
    let project = demo_project();
    stores.projects.put(&project).await.unwrap();

    let service = PermissionService::new(stores, bus.clone(), FakeClock::new());
    Fixture { _dir: dir, bus, service, project }
}

fn sync_request(rules: &[&str]) -> SyncPermissionsRequest {
    SyncPermissionsRequest {
        project_name: "demo".to_string(),
        local_allow: rules.iter().map(|r| r.to_string()).collect(),
    }
}

#[tokio::test]
async fn first_sync_stores_local_rules() {
    let f = fixture().await;
    let response = f.service.sync(&sync_request(&["Bash(git status)"])).await.unwrap();
    assert_eq!(response.allow, vec!["Bash(git status)".to_string()]);

    let stored = f.service.get_for_project_name("demo").await.unwrap();
    assert_eq!(stored.allow, response.allow);
}

#[tokio::test]
async fn merge_keeps_server_rules_first_and_dedups() {
    let f = fixture().await;
    f.service.sync(&sync_request(&["Bash(git *)", "Read"])).await.unwrap();
    let response =
        f.service.sync(&sync_request(&["Read", "Bash(cargo check)"])).await.unwrap();

    assert_eq!(
        response.allow,
        vec![
            "Bash(git *)".to_string(),
            "Read".to_string(),
            "Bash(cargo check)".to_string(),
        ]
    );
}

#[tokio::test]
async fn sync_with_no_new_rules_publishes_nothing() {
    let f = fixture().await;
    f.service.sync(&sync_request(&["Bash(git *)"])).await.unwrap();

    let (_id, mut rx) = f.bus.subscribe(8);
    let response = f.service.sync(&sync_request(&["Bash(git *)"])).await.unwrap();
    assert_eq!(response.allow, vec!["Bash(git *)".to_string()]);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn merge_publishes_permission_changed() {
    let f = fixture().await;
    let (_id, mut rx) = f.bus.subscribe(8);
    f.service.sync(&sync_request(&["Bash(ls)"])).await.unwrap();

    let event = rx.recv().await.unwrap();
    assert_eq!(event.kind, EventKind::PermissionChanged);
    assert_eq!(event.project_id(), Some(f.project.id.as_str()));
}

#[tokio::test]
async fn unknown_project_is_not_found() {
    let f = fixture().await;
    let mut request = sync_request(&["Read"]);
    request.project_name = "ghost".to_string();
    let err = f.service.sync(&request).await.unwrap_err();
    assert_eq!(err.code(), toil_core::Code::NotFound);
}

#[tokio::test]
async fn ask_and_deny_lists_ride_along() {
    let f = fixture().await;
    // Seed a stored set with ask/deny entries.
    let set = PermissionSet {
        allow: vec!["Read".to_string()],
        ask: vec!["Bash(git push *)".to_string()],
        deny: vec!["Bash(rm -rf *)".to_string()],
        updated_at_ms: 1,
    };
    f.service.stores.permissions.put(&f.project.id, &set).await.unwrap();

    let response = f.service.sync(&sync_request(&[])).await.unwrap();
    assert_eq!(response.ask, set.ask);
    assert_eq!(response.deny, set.deny);
}
