// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Race-free rendezvous between interaction replies and the subscription
//! stream.
//!
//! The interaction-created RPC reply and the interaction-responded stream
//! event can arrive in either order. Two maps close the race: `deliver`
//! wakes a registered waiter or buffers the record; `register` drains the
//! buffer first, or installs a channel. Whichever side arrives second
//! completes the handoff.

use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use toil_core::{Interaction, InteractionId, InteractionStatus};

/// How a wait ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    Responded(Interaction),
    Expired(Interaction),
    Cancelled,
}

#[derive(Default)]
pub struct InteractionWaiter {
    inner: Mutex<WaiterInner>,
}

#[derive(Default)]
struct WaiterInner {
    waiters: HashMap<InteractionId, oneshot::Sender<Interaction>>,
    pending: HashMap<InteractionId, Interaction>,
}

impl InteractionWaiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a waiter for `id`. A buffered delivery is handed over
    /// immediately; otherwise the returned channel yields the next one.
    pub fn register(&self, id: InteractionId) -> oneshot::Receiver<Interaction> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock();
        if let Some(interaction) = inner.pending.remove(&id) {
            let _ = tx.send(interaction);
        } else {
            inner.waiters.insert(id, tx);
        }
        rx
    }

    /// Hand a terminal interaction to its waiter, or buffer it (most
    /// recent wins) until one registers.
    pub fn deliver(&self, interaction: Interaction) {
        let id = interaction.id;
        let mut inner = self.inner.lock();
        match inner.waiters.remove(&id) {
            Some(tx) => {
                let _ = tx.send(interaction);
            }
            None => {
                inner.pending.insert(id, interaction);
            }
        }
    }

    /// Remove both the waiter and any buffered delivery for `id`.
    pub fn unregister(&self, id: &InteractionId) {
        let mut inner = self.inner.lock();
        inner.waiters.remove(id);
        inner.pending.remove(id);
    }

    /// Block until the interaction reaches a terminal state or the token
    /// fires.
    pub async fn wait(&self, id: InteractionId, cancel: &CancellationToken) -> WaitOutcome {
        let mut rx = self.register(id);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.unregister(&id);
                    return WaitOutcome::Cancelled;
                }
                received = &mut rx => {
                    match received {
                        Ok(interaction) => match interaction.status {
                            InteractionStatus::Responded => {
                                return WaitOutcome::Responded(interaction)
                            }
                            InteractionStatus::Expired => {
                                return WaitOutcome::Expired(interaction)
                            }
                            // Still pending (created echo); keep waiting.
                            InteractionStatus::Pending => {
                                rx = self.register(id);
                            }
                        },
                        Err(_) => {
                            // Sender dropped without a value; re-arm.
                            rx = self.register(id);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "waiter_tests.rs"]
mod tests;
