// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::control::fake::FakeControlPlane;

#[tokio::test]
async fn slots_track_in_flight_count() {
    let tracker = ScriptTracker::new();
    assert_eq!(tracker.in_flight(), 0);

    let a = tracker.begin().unwrap();
    let b = tracker.begin().unwrap();
    assert_eq!(tracker.in_flight(), 2);

    drop(a);
    assert_eq!(tracker.in_flight(), 1);
    drop(b);
    assert_eq!(tracker.in_flight(), 0);
}

#[tokio::test]
async fn draining_rejects_new_scripts() {
    let tracker = ScriptTracker::new();
    assert!(tracker.drain(Some(Duration::from_millis(10))).await);

    let err = tracker.begin().unwrap_err();
    assert_eq!(err.code(), toil_core::Code::Unavailable);

    tracker.resume();
    assert!(tracker.begin().is_ok());
}

#[tokio::test]
async fn drain_waits_for_in_flight_scripts() {
    let tracker = ScriptTracker::new();
    let slot = tracker.begin().unwrap();

    let drainer = {
        let tracker = Arc::clone(&tracker);
        tokio::spawn(async move { tracker.drain(Some(Duration::from_secs(5))).await })
    };

    // The drain cannot finish while the slot is held.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!drainer.is_finished());

    drop(slot);
    assert!(drainer.await.unwrap());
}

#[tokio::test]
async fn drain_times_out_on_stuck_script() {
    let tracker = ScriptTracker::new();
    let _slot = tracker.begin().unwrap();
    assert!(!tracker.drain(Some(Duration::from_millis(30))).await);
}

#[tokio::test]
async fn begin_after_drain_started_is_rejected_while_old_script_runs() {
    let tracker = ScriptTracker::new();
    let slot = tracker.begin().unwrap();

    let drainer = {
        let tracker = Arc::clone(&tracker);
        tokio::spawn(async move { tracker.drain(None).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    // New work is refused even though the old script is still running.
    assert!(tracker.begin().is_err());
    drop(slot);
    assert!(drainer.await.unwrap());
}

#[tokio::test]
async fn execute_script_streams_output_and_reports_result() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("hello.sh");
    std::fs::write(&script, "echo one\necho two\necho err >&2\n").unwrap();

    let control = Arc::new(FakeControlPlane::new());
    let exit_code = execute_script(
        script,
        Vec::new(),
        "exec-1".to_string(),
        Arc::clone(&control) as Arc<dyn ControlPlane>,
    )
    .await
    .unwrap();
    assert_eq!(exit_code, 0);

    let state = control.state.lock();
    let stdout: Vec<&str> = state
        .script_chunks
        .iter()
        .filter(|c| c.stream == OutputStream::Stdout)
        .map(|c| c.chunk.as_str())
        .collect();
    assert_eq!(stdout, vec!["one", "two"]);
    let stderr: Vec<&str> = state
        .script_chunks
        .iter()
        .filter(|c| c.stream == OutputStream::Stderr)
        .map(|c| c.chunk.as_str())
        .collect();
    assert_eq!(stderr, vec!["err"]);

    assert_eq!(state.script_results.len(), 1);
    assert_eq!(state.script_results[0].exit_code, 0);
    assert!(state.script_results[0].error.is_none());
}

#[tokio::test]
async fn execute_script_reports_nonzero_exit() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("fail.sh");
    std::fs::write(&script, "exit 3\n").unwrap();

    let control = Arc::new(FakeControlPlane::new());
    let exit_code = execute_script(
        script,
        Vec::new(),
        "exec-2".to_string(),
        Arc::clone(&control) as Arc<dyn ControlPlane>,
    )
    .await
    .unwrap();
    assert_eq!(exit_code, 3);
    assert_eq!(control.state.lock().script_results[0].exit_code, 3);
}

#[tokio::test]
async fn script_args_are_passed_through() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("args.sh");
    std::fs::write(&script, "echo \"$1-$2\"\n").unwrap();

    let control = Arc::new(FakeControlPlane::new());
    execute_script(
        script,
        vec!["a".to_string(), "b".to_string()],
        "exec-3".to_string(),
        Arc::clone(&control) as Arc<dyn ControlPlane>,
    )
    .await
    .unwrap();

    let state = control.state.lock();
    assert_eq!(state.script_chunks[0].chunk, "a-b");
}
