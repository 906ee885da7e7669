// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::control::fake::{responded, FakeControlPlane};
use serde_json::json;
use toil_core::TaskId;
use toil_wire::SyncPermissionsResponse;

fn tool_use(tool: &str, input: serde_json::Value) -> ToolUseRequest {
    ToolUseRequest { tool: tool.to_string(), input, suggestions: Vec::new() }
}

#[yare::parameterized(
    bare_tool_any_input = { "Read", json!({"file_path": "/etc/hosts"}), "Read", true },
    tool_mismatch       = { "Write", json!({}), "Read", false },
    bash_command_glob   = { "Bash", json!({"command": "git status"}), "Bash(git *)", true },
    bash_command_miss   = { "Bash", json!({"command": "cargo test"}), "Bash(git *)", false },
    bash_missing_input  = { "Bash", json!({}), "Bash(git *)", false },
    file_path_pattern   = { "Write", json!({"file_path": "src/main.rs"}), "Write(src/*)", true },
    file_path_miss      = { "Write", json!({"file_path": "etc/passwd"}), "Write(src/*)", false },
    query_pattern       = { "WebSearch", json!({"query": "rust tokio"}), "WebSearch(rust *)", true },
)]
fn rule_matching(tool: &str, input: serde_json::Value, rule: &str, expected: bool) {
    let cache = PermissionCache::new("demo");
    cache.replace_all(vec![rule.to_string()]);
    assert_eq!(cache.check(tool, &input), expected);
}

#[test]
fn first_matching_field_wins() {
    let cache = PermissionCache::new("demo");
    cache.replace_all(vec!["Search(src/*)".to_string()]);
    // file_path is checked before pattern.
    let input = json!({"file_path": "src/lib.rs", "pattern": "elsewhere"});
    assert!(cache.check("Search", &input));
}

#[tokio::test]
async fn add_and_sync_replaces_cache_with_server_answer() {
    let cache = PermissionCache::new("demo");
    cache.replace_all(vec!["Read".to_string()]);

    let control = FakeControlPlane::new();
    control.state.lock().permission_response = Some(SyncPermissionsResponse {
        allow: vec!["Read".to_string(), "Bash(git status)".to_string(), "Glob".to_string()],
        ask: Vec::new(),
        deny: Vec::new(),
    });

    cache
        .add_and_sync(vec!["Bash(git status)".to_string()], &control)
        .await
        .unwrap();

    // The server's authoritative set replaced the local one.
    assert_eq!(
        cache.rules(),
        vec!["Read".to_string(), "Bash(git status)".to_string(), "Glob".to_string()]
    );
    let syncs = &control.state.lock().permission_syncs;
    assert_eq!(syncs.len(), 1);
    assert_eq!(syncs[0].local_allow, vec!["Bash(git status)".to_string()]);
}

fn session(
    mode: PermissionMode,
    cache: Arc<PermissionCache>,
    control: Arc<FakeControlPlane>,
    waiter: Arc<InteractionWaiter>,
) -> SessionPermissions {
    SessionPermissions {
        task_id: TaskId::new(),
        agent_id: "agent-m1".to_string(),
        mode,
        cache,
        control,
        waiter,
        cancel: CancellationToken::new(),
    }
}

fn default_session(control: Arc<FakeControlPlane>, waiter: Arc<InteractionWaiter>) -> SessionPermissions {
    session(PermissionMode::Default, Arc::new(PermissionCache::new("demo")), control, waiter)
}

#[tokio::test]
async fn bypass_mode_allows_everything() {
    let control = Arc::new(FakeControlPlane::new());
    let waiter = Arc::new(InteractionWaiter::new());
    let resolver = session(
        PermissionMode::Bypass,
        Arc::new(PermissionCache::new("demo")),
        Arc::clone(&control),
        waiter,
    );
    let decision = resolver.resolve(tool_use("Bash", json!({"command": "rm -rf /"}))).await;
    assert_eq!(decision, PermissionDecision::Allow);
    assert!(control.state.lock().interactions.is_empty());
}

#[yare::parameterized(
    read      = { "Read" },
    glob      = { "Glob" },
    grep      = { "Grep" },
    websearch = { "WebSearch" },
    webfetch  = { "WebFetch" },
)]
fn read_only_tools_are_auto_allowed(tool: &str) {
    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
    runtime.block_on(async {
        let control = Arc::new(FakeControlPlane::new());
        let waiter = Arc::new(InteractionWaiter::new());
        let resolver = default_session(Arc::clone(&control), waiter);
        let decision = resolver.resolve(tool_use(tool, json!({}))).await;
        assert_eq!(decision, PermissionDecision::Allow);
        assert!(control.state.lock().interactions.is_empty());
    });
}

#[tokio::test]
async fn accept_edits_allows_edit_tools_only() {
    let control = Arc::new(FakeControlPlane::new());
    let waiter = Arc::new(InteractionWaiter::new());
    let resolver = session(
        PermissionMode::AcceptEdits,
        Arc::new(PermissionCache::new("demo")),
        Arc::clone(&control),
        Arc::clone(&waiter),
    );
    let decision = resolver.resolve(tool_use("Edit", json!({"file_path": "a.rs"}))).await;
    assert_eq!(decision, PermissionDecision::Allow);
    assert!(control.state.lock().interactions.is_empty());
}

#[tokio::test]
async fn cached_rule_short_circuits_interaction() {
    let control = Arc::new(FakeControlPlane::new());
    let waiter = Arc::new(InteractionWaiter::new());
    let cache = Arc::new(PermissionCache::new("demo"));
    cache.replace_all(vec!["Bash(git status)".to_string()]);
    let resolver =
        session(PermissionMode::Default, cache, Arc::clone(&control), waiter);

    let decision = resolver.resolve(tool_use("Bash", json!({"command": "git status"}))).await;
    assert_eq!(decision, PermissionDecision::Allow);
    assert!(control.state.lock().interactions.is_empty());
}

#[tokio::test]
async fn uncached_tool_prompts_and_allow_answers() {
    let control = Arc::new(FakeControlPlane::new());
    let waiter = Arc::new(InteractionWaiter::new());
    let resolver = default_session(Arc::clone(&control), Arc::clone(&waiter));

    let resolve = tokio::spawn(async move {
        resolver.resolve(tool_use("Bash", json!({"command": "cargo test"}))).await
    });

    // Wait for the prompt, then answer Allow.
    let interaction = loop {
        if let Some(interaction) = control.state.lock().interactions.first().cloned() {
            break interaction;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    };
    assert_eq!(interaction.options.len(), 3);
    waiter.deliver(responded(interaction, "allow"));

    assert_eq!(resolve.await.unwrap(), PermissionDecision::Allow);
}

#[tokio::test]
async fn always_allow_persists_rule_and_syncs() {
    let control = Arc::new(FakeControlPlane::new());
    let waiter = Arc::new(InteractionWaiter::new());
    let cache = Arc::new(PermissionCache::new("demo"));
    let resolver = session(
        PermissionMode::Default,
        Arc::clone(&cache),
        Arc::clone(&control),
        Arc::clone(&waiter),
    );

    let resolve = tokio::spawn(async move {
        resolver.resolve(tool_use("Bash", json!({"command": "git status"}))).await
    });

    let interaction = loop {
        if let Some(interaction) = control.state.lock().interactions.first().cloned() {
            break interaction;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    };
    waiter.deliver(responded(interaction, "always_allow"));

    assert_eq!(resolve.await.unwrap(), PermissionDecision::Allow);
    // The rule is in the cache and went to the server.
    assert!(cache.check("Bash", &json!({"command": "git status"})));
    let syncs = &control.state.lock().permission_syncs;
    assert_eq!(syncs[0].local_allow, vec!["Bash(git status)".to_string()]);
}

#[tokio::test]
async fn suggestions_take_precedence_for_always_allow() {
    let request = ToolUseRequest {
        tool: "Bash".to_string(),
        input: json!({"command": "git push origin main"}),
        suggestions: vec!["Bash(git push *)".to_string()],
    };
    assert_eq!(
        SessionPermissions::always_allow_rules(&request),
        vec!["Bash(git push *)".to_string()]
    );
}

#[tokio::test]
async fn expired_prompt_denies() {
    let control = Arc::new(FakeControlPlane::new());
    let waiter = Arc::new(InteractionWaiter::new());
    let resolver = default_session(Arc::clone(&control), Arc::clone(&waiter));

    let resolve = tokio::spawn(async move {
        resolver.resolve(tool_use("Bash", json!({"command": "cargo test"}))).await
    });

    let interaction = loop {
        if let Some(interaction) = control.state.lock().interactions.first().cloned() {
            break interaction;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    };
    waiter.deliver(crate::control::fake::expired(interaction));

    assert!(matches!(resolve.await.unwrap(), PermissionDecision::Deny { .. }));
}

#[tokio::test]
async fn ask_user_question_collects_answers_keyed_by_question() {
    let control = Arc::new(FakeControlPlane::new());
    let waiter = Arc::new(InteractionWaiter::new());
    let resolver = default_session(Arc::clone(&control), Arc::clone(&waiter));

    let input = json!({
        "questions": [
            {"question": "Which database?", "options": ["Postgres", "SQLite"]},
        ]
    });
    let resolve =
        tokio::spawn(async move { resolver.resolve(tool_use("AskUserQuestion", input)).await });

    let interaction = loop {
        if let Some(interaction) = control.state.lock().interactions.first().cloned() {
            break interaction;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    };
    // Options carry the tool-provided labels plus the free-text escape.
    let labels: Vec<&str> = interaction.options.iter().map(|o| o.label.as_str()).collect();
    assert_eq!(labels, vec!["Postgres", "SQLite", "Other"]);
    waiter.deliver(responded(interaction, "Postgres"));

    match resolve.await.unwrap() {
        PermissionDecision::AllowWithInput(updated) => {
            assert_eq!(updated["answers"]["Which database?"], "Postgres");
        }
        other => panic!("unexpected decision {:?}", other),
    }
}
