// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket streams: the agent command stream and the event/interaction
//! subscriptions.

use super::SharedApp;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;
use toil_core::{Clock, TaskId, WorkerId};
use toil_wire::SubscribeParams;

/// Subscription buffer for event-stream clients.
const EVENT_BUFFER: usize = 256;

/// `Subscribe`: the bidirectional agent-manager attachment.
///
/// Registers the worker, then forwards registry commands down the socket
/// until either side goes away. A replaced registration (same worker id
/// re-subscribed) shows up as a closed command channel; the stale handler
/// exits without touching the successor's registry entry.
pub async fn agent_stream<C: Clock + 'static>(
    State(app): State<SharedApp<C>>,
    Query(params): Query<SubscribeParams>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| run_agent_stream(app, params, socket))
}

async fn run_agent_stream<C: Clock>(
    app: SharedApp<C>,
    params: SubscribeParams,
    mut socket: WebSocket,
) {
    let worker_id = WorkerId::new(&params.worker_id);
    let mut registration =
        app.registry
            .register(worker_id.clone(), params.max_concurrent, &params.project_name);
    tracing::info!(
        worker = %worker_id,
        project = %params.project_name,
        max_concurrent = params.max_concurrent,
        "agent stream attached"
    );

    loop {
        tokio::select! {
            command = registration.commands.recv() => {
                let Some(command) = command else {
                    // Replaced by a re-registration (or unregistered); the
                    // successor owns the registry entry now.
                    tracing::info!(worker = %worker_id, "command channel closed, detaching");
                    break;
                };
                let frame = match serde_json::to_string(&command) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!(worker = %worker_id, error = %e, "command encode failed");
                        continue;
                    }
                };
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    app.registry.unregister(&worker_id, registration.generation);
                    break;
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => {
                        app.registry.unregister(&worker_id, registration.generation);
                        break;
                    }
                    Some(Ok(_)) => {} // Ping/Pong/Text — stream is one-way
                    Some(Err(e)) => {
                        tracing::warn!(worker = %worker_id, error = %e, "agent stream error");
                        app.registry.unregister(&worker_id, registration.generation);
                        break;
                    }
                }
            }
        }
    }
    tracing::info!(worker = %worker_id, "agent stream closed");
}

#[derive(Debug, Deserialize)]
pub struct EventStreamParams {
    #[serde(default)]
    pub project_id: Option<String>,
}

/// Server-streaming event subscription; optionally filtered by project.
pub async fn events_stream<C: Clock + 'static>(
    State(app): State<SharedApp<C>>,
    Query(params): Query<EventStreamParams>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |mut socket| async move {
        let (subscriber, mut events) = app.bus.subscribe(EVENT_BUFFER);
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    if let Some(project_id) = &params.project_id {
                        if event.project_id() != Some(project_id.as_str()) {
                            continue;
                        }
                    }
                    let Ok(frame) = serde_json::to_string(&event) else { continue };
                    if socket.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                inbound = socket.recv() => {
                    match inbound {
                        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
        app.bus.unsubscribe(subscriber);
    })
}

#[derive(Debug, Deserialize)]
pub struct InteractionStreamParams {
    #[serde(default)]
    pub task_id: Option<String>,
}

/// Freshest-state interaction subscription; optionally scoped to one task.
pub async fn interactions_stream<C: Clock + 'static>(
    State(app): State<SharedApp<C>>,
    Query(params): Query<InteractionStreamParams>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |mut socket| async move {
        let task_id = params.task_id.as_deref().map(TaskId::from_string);
        let mut interactions = app.interactions.subscribe(task_id);
        loop {
            tokio::select! {
                interaction = interactions.recv() => {
                    let Some(interaction) = interaction else { break };
                    let Ok(frame) = serde_json::to_string(&interaction) else { continue };
                    if socket.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                inbound = socket.recv() => {
                    match inbound {
                        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
    })
}
