// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The sentinel: parent process that restarts the worker on crash and
//! hot-swaps it when the binary on disk changes.
//!
//! A child busy with user scripts must be allowed to finish them before
//! the swap, but an unresponsive child must not block deploys forever —
//! hence the graceful-restart signal followed by a bounded drain and a
//! two-phase kill.

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use notify::Watcher;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use toil_core::Error;

/// First restart delay after a crashing child.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(5);
/// Restart delay ceiling.
pub const MAX_BACKOFF: Duration = Duration::from_secs(600);
/// A child that lived this long counts as a success; backoff resets.
pub const SUCCESS_WINDOW: Duration = Duration::from_secs(30);
/// Quiet period after a filesystem event before re-hashing.
pub const DEBOUNCE: Duration = Duration::from_millis(100);
/// Budget for the child to drain scripts after the graceful-restart signal.
pub const DRAIN_BUDGET: Duration = Duration::from_secs(360);
/// Grace between SIGTERM and SIGKILL.
pub const TERM_GRACE: Duration = Duration::from_secs(10);
/// Pause before restarting a child that exited cleanly.
const CLEAN_EXIT_PAUSE: Duration = Duration::from_secs(1);

/// Double the backoff, capped at [`MAX_BACKOFF`].
pub fn increase_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

/// SHA-256 of a file's content, streamed.
pub fn hash_file(path: &Path) -> Result<String, Error> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

pub struct Supervisor {
    /// Resolved executable path (symlinks followed).
    exe_path: PathBuf,
    baseline_hash: String,
    backoff: Duration,
    _watcher: notify::RecommendedWatcher,
    fs_events: mpsc::Receiver<()>,
}

impl Supervisor {
    /// Watch the current executable. The *parent directory* is watched so
    /// atomic-replace deploys (write temp, rename over) are seen.
    pub fn for_current_exe() -> Result<Self, Error> {
        let exe = std::env::current_exe().map_err(Error::from)?;
        let exe_path = std::fs::canonicalize(&exe)?;
        Self::new(exe_path)
    }

    pub fn new(exe_path: PathBuf) -> Result<Self, Error> {
        let baseline_hash = hash_file(&exe_path)?;
        let watch_dir = exe_path
            .parent()
            .ok_or_else(|| Error::invalid_argument("executable has no parent directory"))?
            .to_path_buf();

        let (tx, fs_events) = mpsc::channel(16);
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            if let Ok(event) = result {
                if matches!(
                    event.kind,
                    notify::EventKind::Create(_)
                        | notify::EventKind::Modify(_)
                        | notify::EventKind::Remove(_)
                ) {
                    let _ = tx.try_send(());
                }
            }
        })
        .map_err(|e| Error::internal("failed to create file watcher").with_cause(e))?;
        watcher
            .watch(&watch_dir, notify::RecursiveMode::NonRecursive)
            .map_err(|e| Error::internal("failed to watch binary directory").with_cause(e))?;

        tracing::info!(
            exe = %exe_path.display(),
            hash = toil_core::short(&baseline_hash, 12),
            "sentinel watching binary"
        );
        Ok(Self {
            exe_path,
            baseline_hash,
            backoff: INITIAL_BACKOFF,
            _watcher: watcher,
            fs_events,
        })
    }

    /// Drain queued filesystem events, wait out the debounce, and report
    /// whether the binary content actually changed.
    async fn binary_changed(&mut self) -> bool {
        tokio::time::sleep(DEBOUNCE).await;
        while self.fs_events.try_recv().is_ok() {}
        match hash_file(&self.exe_path) {
            Ok(hash) if hash != self.baseline_hash => {
                tracing::info!(
                    old = toil_core::short(&self.baseline_hash, 12),
                    new = toil_core::short(&hash, 12),
                    "binary changed on disk"
                );
                self.baseline_hash = hash;
                true
            }
            Ok(_) => false,
            Err(e) => {
                // Mid-deploy the file may briefly be missing; ignore and
                // wait for the next event.
                tracing::debug!(error = %e, "binary re-hash failed");
                false
            }
        }
    }

    fn spawn_child(&self) -> Result<tokio::process::Child, Error> {
        let child = tokio::process::Command::new(&self.exe_path)
            .arg("run")
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::inherit())
            .stderr(std::process::Stdio::inherit())
            .spawn()
            .map_err(|e| Error::internal("failed to spawn worker child").with_cause(e))?;
        tracing::info!(pid = child.id().unwrap_or_default(), "worker child started");
        Ok(child)
    }

    /// Run until terminated. Never returns except on SIGTERM/SIGINT or an
    /// unrecoverable spawn failure.
    pub async fn run(mut self) -> Result<(), Error> {
        // Process-group delivery of the graceful-restart signal must not
        // kill the sentinel itself.
        let mut restart_signal =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::user_defined1())
                .map_err(|e| Error::internal("failed to install SIGUSR1 handler").with_cause(e))?;
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .map_err(|e| Error::internal("failed to install SIGTERM handler").with_cause(e))?;
        let mut interrupt =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
                .map_err(|e| Error::internal("failed to install SIGINT handler").with_cause(e))?;

        loop {
            let mut child = self.spawn_child()?;
            let started_at = Instant::now();

            let exit = loop {
                tokio::select! {
                    biased;

                    status = child.wait() => {
                        break ChildExit::Exited(status.map_err(Error::from)?);
                    }
                    _ = self.fs_events.recv() => {
                        if self.binary_changed().await {
                            break ChildExit::BinaryChanged;
                        }
                    }
                    _ = restart_signal.recv() => {
                        // Ignored: meant for the child.
                    }
                    _ = terminate.recv() => break ChildExit::Terminate,
                    _ = interrupt.recv() => break ChildExit::Terminate,
                }
            };

            match exit {
                ChildExit::Exited(status) if status.success() => {
                    // A long-running role exiting cleanly is still
                    // unexpected; restart after a short pause.
                    tracing::warn!("worker exited cleanly, restarting");
                    self.backoff = INITIAL_BACKOFF;
                    tokio::time::sleep(CLEAN_EXIT_PAUSE).await;
                }
                ChildExit::Exited(status) => {
                    if started_at.elapsed() >= SUCCESS_WINDOW {
                        self.backoff = INITIAL_BACKOFF;
                    }
                    tracing::warn!(
                        %status,
                        backoff_secs = self.backoff.as_secs(),
                        "worker crashed, backing off"
                    );
                    tokio::time::sleep(self.backoff).await;
                    self.backoff = increase_backoff(self.backoff);
                }
                ChildExit::BinaryChanged => {
                    self.graceful_swap(&mut child).await;
                }
                ChildExit::Terminate => {
                    tracing::info!("sentinel terminating");
                    terminate_child(&mut child).await;
                    return Ok(());
                }
            }
        }
    }

    /// Ask the child to drain and exit; escalate to a two-phase kill when
    /// it overstays the drain budget.
    async fn graceful_swap(&mut self, child: &mut tokio::process::Child) {
        if signal_child(child, Signal::SIGUSR1).is_err() {
            // Child already gone; the restart loop takes it from here.
            return;
        }
        tracing::info!("graceful-restart signalled, waiting for script drain");
        match tokio::time::timeout(DRAIN_BUDGET, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(%status, "worker drained and exited, swapping binary");
                self.backoff = INITIAL_BACKOFF;
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "wait on draining child failed");
            }
            Err(_) => {
                tracing::warn!("drain budget exhausted, terminating child");
                terminate_child(child).await;
            }
        }
    }
}

enum ChildExit {
    Exited(std::process::ExitStatus),
    BinaryChanged,
    Terminate,
}

fn signal_child(child: &tokio::process::Child, signal: Signal) -> Result<(), Error> {
    let Some(pid) = child.id() else {
        return Err(Error::failed_precondition("child already reaped"));
    };
    kill(Pid::from_raw(pid as i32), signal)
        .map_err(|e| Error::internal(format!("signal {} failed", signal)).with_cause(e))
}

/// Two-phase termination: SIGTERM, wait [`TERM_GRACE`], then SIGKILL.
async fn terminate_child(child: &mut tokio::process::Child) {
    if signal_child(child, Signal::SIGTERM).is_err() {
        return;
    }
    match tokio::time::timeout(TERM_GRACE, child.wait()).await {
        Ok(_) => {}
        Err(_) => {
            tracing::warn!("child ignored SIGTERM, killing");
            let _ = child.kill().await;
        }
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
