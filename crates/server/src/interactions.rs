// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interaction ledger: user-facing questions, permission prompts, and
//! notifications, plus the freshest-state subscription stream that session
//! drivers block on.

use crate::bus::EventBus;
use tokio::sync::mpsc;
use toil_core::event::meta_keys;
use toil_core::{
    Clock, Error, Event, EventKind, Interaction, InteractionId, InteractionStatus, TaskId,
};
use toil_storage::Stores;
use toil_wire::CreateInteractionRequest;

/// Buffer for per-subscription bus hookups.
const STREAM_BUFFER: usize = 64;

pub struct InteractionService<C: Clock> {
    stores: Stores,
    bus: EventBus,
    clock: C,
}

impl<C: Clock> InteractionService<C> {
    pub fn new(stores: Stores, bus: EventBus, clock: C) -> Self {
        Self { stores, bus, clock }
    }

    fn interaction_event(&self, kind: EventKind, interaction: &Interaction) -> Event {
        Event::new(kind, interaction.id.to_string(), self.clock.epoch_ms())
            .with_meta(meta_keys::TASK_ID, interaction.task_id.to_string())
            .with_meta(meta_keys::INTERACTION_ID, interaction.id.to_string())
    }

    /// Create a Pending interaction and publish `InteractionCreated`.
    pub async fn create(&self, request: CreateInteractionRequest) -> Result<Interaction, Error> {
        // The task must exist; its project scopes event filtering.
        let task = self.stores.tasks.get(&request.task_id).await?;

        let interaction = Interaction::new(
            request.task_id,
            request.agent_id,
            request.kind,
            request.title,
            self.clock.epoch_ms(),
        )
        .with_description(request.description)
        .with_options(request.options);
        self.stores.interactions.put(&interaction).await?;

        tracing::info!(
            interaction = %interaction.id,
            task = %interaction.task_id,
            kind = ?interaction.kind,
            "interaction created"
        );
        let event = self
            .interaction_event(EventKind::InteractionCreated, &interaction)
            .with_meta(meta_keys::PROJECT_ID, task.project_id.to_string());
        self.bus.publish(&event);
        Ok(interaction)
    }

    pub async fn get(&self, id: &InteractionId) -> Result<Interaction, Error> {
        self.stores.interactions.get(id).await
    }

    pub async fn list_for_task(&self, task_id: &TaskId) -> Result<Vec<Interaction>, Error> {
        self.stores.interactions.list_for_task(task_id).await
    }

    /// Record the user's response. Only Pending interactions accept one;
    /// anything else is a precondition failure.
    pub async fn respond(
        &self,
        id: &InteractionId,
        response: impl Into<String>,
    ) -> Result<Interaction, Error> {
        let mut interaction = self.stores.interactions.get(id).await?;
        if interaction.status != InteractionStatus::Pending {
            return Err(Error::failed_precondition(format!(
                "interaction {} is already {}",
                interaction.id, interaction.status
            )));
        }
        interaction.status = InteractionStatus::Responded;
        interaction.response = Some(response.into());
        interaction.responded_at_ms = Some(self.clock.epoch_ms());
        self.stores.interactions.put(&interaction).await?;

        tracing::info!(interaction = %interaction.id, "interaction responded");
        self.bus.publish(&self.interaction_event(EventKind::InteractionResponded, &interaction));
        Ok(interaction)
    }

    /// Flip every Pending interaction for a task to Expired.
    ///
    /// Runs when a task result is reported, so stale prompts stop waiting
    /// for humans who will never answer them.
    pub async fn expire_pending_by_task(&self, task_id: &TaskId) -> Result<usize, Error> {
        let pending: Vec<Interaction> = self
            .stores
            .interactions
            .list_for_task(task_id)
            .await?
            .into_iter()
            .filter(|i| i.status == InteractionStatus::Pending)
            .collect();

        let mut expired = 0;
        for mut interaction in pending {
            interaction.status = InteractionStatus::Expired;
            interaction.responded_at_ms = Some(self.clock.epoch_ms());
            self.stores.interactions.put(&interaction).await?;
            self.bus
                .publish(&self.interaction_event(EventKind::InteractionResponded, &interaction));
            expired += 1;
        }
        if expired > 0 {
            tracing::info!(task = %task_id, count = expired, "expired pending interactions");
        }
        Ok(expired)
    }

    /// Stream the freshest state of matching interactions.
    ///
    /// On every `interaction:*` event (optionally filtered to one task)
    /// the canonical record is re-read and emitted, so subscribers always
    /// observe current state, never a stale event payload. The stream ends
    /// when the receiver is dropped.
    pub fn subscribe(&self, task_id: Option<TaskId>) -> mpsc::Receiver<Interaction>
    where
        C: 'static,
    {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let (subscriber, mut events) = self.bus.subscribe(STREAM_BUFFER);
        let bus = self.bus.clone();
        let stores = self.stores.clone();

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event.kind {
                    EventKind::InteractionCreated | EventKind::InteractionResponded => {}
                    _ => continue,
                }
                if let Some(task_id) = task_id {
                    if event.task_id() != Some(task_id.as_str()) {
                        continue;
                    }
                }
                let id = InteractionId::from_string(&event.resource_id);
                let interaction = match stores.interactions.get(&id).await {
                    Ok(interaction) => interaction,
                    Err(e) => {
                        tracing::warn!(interaction = %id, error = %e, "stream re-read failed");
                        continue;
                    }
                };
                if tx.send(interaction).await.is_err() {
                    break;
                }
            }
            bus.unsubscribe(subscriber);
        });
        rx
    }
}

#[cfg(test)]
#[path = "interactions_tests.rs"]
mod tests;
