// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn claim_response_lost_has_no_payload() {
    let response = ClaimTaskResponse::lost();
    assert!(!response.success);
    assert!(response.instructions.is_none());
    assert!(response.metadata.is_empty());
    let json = serde_json::to_string(&response).unwrap();
    assert_eq!(json, r#"{"success":false}"#);
}

#[test]
fn claim_request_roundtrips() {
    let request = ClaimTaskRequest { task_id: TaskId::new(), worker_id: "m1".to_string() };
    let json = serde_json::to_string(&request).unwrap();
    let parsed: ClaimTaskRequest = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, request);
}

#[test]
fn subscribe_params_default_concurrency() {
    let params: SubscribeParams = serde_json::from_str(r#"{"worker_id":"m1"}"#).unwrap();
    assert_eq!(params.max_concurrent, 1);
    assert_eq!(params.project_name, "");
}

#[yare::parameterized(
    completed = { TaskResultStatus::Completed, "completed" },
    failed    = { TaskResultStatus::Failed, "failed" },
    cancelled = { TaskResultStatus::Cancelled, "cancelled" },
)]
fn result_status_strings(status: TaskResultStatus, expected: &str) {
    assert_eq!(status.as_str(), expected);
    assert_eq!(serde_json::to_string(&status).unwrap(), format!("\"{}\"", expected));
}

#[test]
fn sync_permissions_request_defaults_local_allow() {
    let request: SyncPermissionsRequest =
        serde_json::from_str(r#"{"project_name":"demo"}"#).unwrap();
    assert!(request.local_allow.is_empty());
}

#[test]
fn error_body_roundtrips() {
    let body = ErrorBody {
        code: toil_core::Code::FailedPrecondition,
        message: "task is assigned".to_string(),
    };
    let json = serde_json::to_string(&body).unwrap();
    let parsed: ErrorBody = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, body);
}

#[test]
fn create_task_request_optional_fields_default() {
    let json = r#"{
        "project_id": "proj-01J8ZC2V9XQ4R7T2M5KD3FYH6W",
        "workflow_id": "wflw-01J8ZC2V9XQ4R7T2M5KD3FYH6W",
        "title": "Ship it"
    }"#;
    let request: CreateTaskRequest = serde_json::from_str(json).unwrap();
    assert!(request.status_id.is_none());
    assert!(request.metadata.is_empty());
    assert!(!request.use_worktree);
    assert_eq!(request.permission_mode, PermissionMode::Default);
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn heartbeat_roundtrips(worker_id in "[a-z0-9-]{1,16}", active in 0u32..64) {
            let request = HeartbeatRequest { worker_id, active_count: active };
            let json = serde_json::to_string(&request).unwrap();
            let parsed: HeartbeatRequest = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(parsed, request);
        }

        #[test]
        fn script_chunks_roundtrip(seq in 0u32..1000, chunk in ".{0,200}") {
            let request = ReportScriptOutputChunkRequest {
                execution_id: "exec-1".to_string(),
                stream: OutputStream::Stdout,
                seq,
                chunk,
            };
            let json = serde_json::to_string(&request).unwrap();
            let parsed: ReportScriptOutputChunkRequest = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(parsed, request);
        }
    }
}
