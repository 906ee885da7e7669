// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::fake::FakeTurnRunner;
use super::*;

struct AllowAll;

#[async_trait]
impl PermissionHandler for AllowAll {
    async fn resolve(&self, _request: ToolUseRequest) -> PermissionDecision {
        PermissionDecision::Allow
    }
}

#[tokio::test]
async fn fake_runner_replays_script_in_order() {
    let runner = FakeTurnRunner::new();
    runner.push_text("sess-1", "first");
    runner.push_text("sess-1", "second");

    let options = TurnOptions::default();
    let first = runner.run_turn("go", &options, std::sync::Arc::new(AllowAll)).await.unwrap();
    let second = runner.run_turn("more", &options, std::sync::Arc::new(AllowAll)).await.unwrap();
    assert_eq!(first.text, "first");
    assert_eq!(second.text, "second");

    let calls = runner.calls.lock();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].prompt, "go");
    assert_eq!(calls[1].prompt, "more");
}

#[tokio::test]
async fn fake_runner_exhausted_script_errors() {
    let runner = FakeTurnRunner::new();
    let result = runner
        .run_turn("go", &TurnOptions::default(), std::sync::Arc::new(AllowAll))
        .await;
    assert!(result.is_err());
}

#[test]
fn sub_agents_parse_from_metadata() {
    let metadata = HashMap::from([(
        toil_core::task::meta::SUB_AGENTS.to_string(),
        r#"[{"name":"reviewer","content":"Review the diff."}]"#.to_string(),
    )]);
    let agents = parse_sub_agents(&metadata);
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0].name, "reviewer");
}

#[test]
fn missing_or_malformed_sub_agents_yield_empty() {
    assert!(parse_sub_agents(&HashMap::new()).is_empty());
    let bad = HashMap::from([(
        toil_core::task::meta::SUB_AGENTS.to_string(),
        "not json".to_string(),
    )]);
    assert!(parse_sub_agents(&bad).is_empty());
}

#[test]
fn child_protocol_lines_parse() {
    let request: ChildLine = serde_json::from_str(
        r#"{"type":"permission_request","id":7,"tool":"Bash","input":{"command":"ls"},"suggestions":["Bash(ls)"]}"#,
    )
    .unwrap();
    assert!(matches!(request, ChildLine::PermissionRequest { id: 7, .. }));

    let result: ChildLine =
        serde_json::from_str(r#"{"type":"result","session_id":"sess-9","text":"done"}"#).unwrap();
    let ChildLine::Result { session_id, text } = result else {
        panic!("expected a result line");
    };
    assert_eq!(session_id.as_deref(), Some("sess-9"));
    assert_eq!(text, "done");
}
