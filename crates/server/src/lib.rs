// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! toil-server: the control plane.
//!
//! Owns the authoritative task/workflow model, the event bus, the worker
//! registry, and the dispatch orchestrator, and serves the RPC surface that
//! agent managers attach to.

pub mod bus;
pub mod config;
pub mod http;
pub mod interactions;
pub mod orchestrator;
pub mod permissions;
pub mod registry;
pub mod sync;
pub mod task_logs;
pub mod tasks;

pub use bus::EventBus;
pub use config::Config;
pub use interactions::InteractionService;
pub use orchestrator::Orchestrator;
pub use permissions::PermissionService;
pub use registry::{WorkerRegistry, COMMAND_BUFFER};
pub use sync::SyncService;
pub use task_logs::TaskLogService;
pub use tasks::TaskService;
