// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! toil-storage: the keyed blob-store port and the entity stores built on it.
//!
//! Records are JSON, one file per record, keyed by id under a type-named
//! prefix (`tasks/<id>`, `workflows/<id>`, …). Writes are atomic.

mod local;
mod port;
mod stores;

pub use local::LocalStore;
pub use port::{StorageError, StoragePort};
pub use stores::{
    AgentDefStore, InteractionStore, PermissionStore, ProjectStore, ScriptStore, SkillStore,
    Stores, TaskLogStore, TaskStore, WorkflowStore,
};
