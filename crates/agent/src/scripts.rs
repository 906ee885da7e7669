// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-demand script execution and the graceful-restart drain protocol.
//!
//! The tracker's reject-check and counter-increment are one critical
//! section: a drain that begins between the check and the increment would
//! otherwise observe zero in-flight scripts while one is about to start.

use crate::control::ControlPlane;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::Notify;
use toil_core::Error;
use toil_wire::{
    OutputStream, ReportScriptExecutionResultRequest, ReportScriptOutputChunkRequest,
};

/// Wall-clock cap per script invocation.
pub const SCRIPT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug)]
pub struct ScriptTracker {
    state: Mutex<TrackerState>,
    drained: Notify,
}

#[derive(Default, Debug)]
struct TrackerState {
    rejecting: bool,
    in_flight: usize,
}

/// RAII slot: dropping it decrements the in-flight count on every exit
/// path of a script handler.
#[derive(Debug)]
pub struct ScriptSlot {
    tracker: Arc<ScriptTracker>,
}

impl Drop for ScriptSlot {
    fn drop(&mut self) {
        let mut state = self.tracker.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.in_flight == 0 {
            self.tracker.drained.notify_waiters();
        }
    }
}

impl ScriptTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { state: Mutex::new(TrackerState::default()), drained: Notify::new() })
    }

    /// Reserve an execution slot. Atomically refuses once draining has
    /// started.
    pub fn begin(self: &Arc<Self>) -> Result<ScriptSlot, Error> {
        let mut state = self.state.lock();
        if state.rejecting {
            return Err(Error::unavailable(
                "worker is draining for restart; script execution rejected",
            ));
        }
        state.in_flight += 1;
        Ok(ScriptSlot { tracker: Arc::clone(self) })
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    /// Stop accepting new scripts and wait for in-flight ones to finish.
    ///
    /// Returns true when the count reached zero within `timeout`; with
    /// `None`, waits indefinitely.
    pub async fn drain(&self, timeout: Option<Duration>) -> bool {
        {
            let mut state = self.state.lock();
            state.rejecting = true;
            if state.in_flight == 0 {
                return true;
            }
        }
        let wait = async {
            loop {
                let notified = self.drained.notified();
                tokio::pin!(notified);
                // Register before re-checking so a slot dropped between the
                // check and the await still wakes us.
                notified.as_mut().enable();
                if self.state.lock().in_flight == 0 {
                    return;
                }
                notified.await;
            }
        };
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, wait).await.is_ok(),
            None => {
                wait.await;
                true
            }
        }
    }

    /// Accept scripts again (a drain that was not followed by an exit).
    pub fn resume(&self) {
        self.state.lock().rejecting = false;
    }
}

/// Stream one pipe back as output chunks, line by line.
fn spawn_pump<R>(
    reader: R,
    stream: OutputStream,
    execution_id: String,
    control: Arc<dyn ControlPlane>,
) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        let mut seq = 0u32;
        while let Ok(Some(chunk)) = lines.next_line().await {
            let request = ReportScriptOutputChunkRequest {
                execution_id: execution_id.clone(),
                stream,
                seq,
                chunk,
            };
            seq += 1;
            if let Err(e) = control.report_script_output(request).await {
                tracing::warn!(execution = %execution_id, error = %e, "chunk report failed");
            }
        }
    })
}

/// Run one synced script, streaming stdout/stderr back in chunks and
/// reporting the final exit code. The caller must already hold a
/// [`ScriptSlot`].
pub async fn execute_script(
    script_path: PathBuf,
    args: Vec<String>,
    execution_id: String,
    control: Arc<dyn ControlPlane>,
) -> Result<i32, Error> {
    let mut child = tokio::process::Command::new("sh")
        .arg(&script_path)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            Error::internal(format!("spawn {} failed", script_path.display())).with_cause(e)
        })?;

    let mut pumps = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        pumps.push(spawn_pump(
            stdout,
            OutputStream::Stdout,
            execution_id.clone(),
            Arc::clone(&control),
        ));
    }
    if let Some(stderr) = child.stderr.take() {
        pumps.push(spawn_pump(
            stderr,
            OutputStream::Stderr,
            execution_id.clone(),
            Arc::clone(&control),
        ));
    }

    let (exit_code, error) = match tokio::time::timeout(SCRIPT_TIMEOUT, child.wait()).await {
        Ok(Ok(status)) => (status.code().unwrap_or(-1), None),
        Ok(Err(e)) => (-1, Some(e.to_string())),
        Err(_) => {
            let _ = child.kill().await;
            (-1, Some(format!("script timed out after {}s", SCRIPT_TIMEOUT.as_secs())))
        }
    };
    for pump in pumps {
        let _ = pump.await;
    }

    let report = ReportScriptExecutionResultRequest {
        execution_id: execution_id.clone(),
        exit_code,
        error: error.clone(),
    };
    if let Err(e) = control.report_script_result(report).await {
        tracing::warn!(execution = %execution_id, error = %e, "script result report failed");
    }

    match error {
        Some(message) => Err(Error::deadline_exceeded(message)),
        None => Ok(exit_code),
    }
}

#[cfg(test)]
#[path = "scripts_tests.rs"]
mod tests;
