// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! toil-agent: the agent-manager worker runtime.
//!
//! Two roles share this binary: `run`, the long-running worker that attaches
//! to the control plane and drives task sessions, and `sentinel`, the
//! supervisor that watches the binary for deploys and restarts the run role.

pub mod client;
pub mod command_loop;
pub mod config;
pub mod control;
pub mod gitops;
pub mod hooks;
pub mod model;
pub mod permissions;
pub mod scripts;
pub mod session;
pub mod supervisor;
pub mod sync;
pub mod waiter;

pub use command_loop::CommandLoop;
pub use config::WorkerConfig;
pub use control::ControlPlane;
pub use model::{TurnOptions, TurnOutcome, TurnRunner};
pub use permissions::PermissionCache;
pub use scripts::ScriptTracker;
pub use session::SessionDriver;
pub use supervisor::Supervisor;
pub use waiter::InteractionWaiter;
