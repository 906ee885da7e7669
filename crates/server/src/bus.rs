// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process event bus with lossy fan-out.
//!
//! Each subscriber gets its own bounded buffer. `publish` never blocks: a
//! subscriber whose buffer is full loses that event (and only that
//! subscriber does). Within one subscriber, events arrive in publish order.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use toil_core::Event;

/// Handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscribers: HashMap<u64, mpsc::Sender<Event>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber with its own buffer of `buffer` events.
    pub fn subscribe(&self, buffer: usize) -> (SubscriberId, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.insert(id, tx);
        (SubscriberId(id), rx)
    }

    /// Drop a subscription; its stream ends.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.inner.lock().subscribers.remove(&id.0);
    }

    /// Deliver `event` to every live subscriber without blocking.
    ///
    /// Returns the number of subscribers that received it. Full buffers
    /// drop the event for that subscriber; closed receivers are pruned.
    pub fn publish(&self, event: &Event) -> usize {
        let mut inner = self.inner.lock();
        let mut delivered = 0;
        let mut dead = Vec::new();
        for (&id, tx) in inner.subscribers.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::debug!(
                        subscriber = id,
                        kind = ?event.kind,
                        "subscriber buffer full, dropping event"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(id),
            }
        }
        for id in dead {
            inner.subscribers.remove(&id);
        }
        delivered
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
