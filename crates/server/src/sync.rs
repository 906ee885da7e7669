// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-authoritative definition sync.
//!
//! Workers mirror agent and script definitions to local files. The server
//! always returns the full set; the worker writes every entry and removes
//! leftovers, so deletions propagate without tombstones.

use toil_core::Error;
use toil_storage::Stores;
use toil_wire::{AgentFile, ScriptFile, SyncAgentsResponse, SyncScriptsResponse};

pub struct SyncService {
    stores: Stores,
}

impl SyncService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    pub async fn agents(&self) -> Result<SyncAgentsResponse, Error> {
        let agents = self
            .stores
            .agents
            .list()
            .await?
            .into_iter()
            .map(|a| AgentFile { name: a.name, content: a.content })
            .collect();
        Ok(SyncAgentsResponse { agents })
    }

    pub async fn scripts(&self) -> Result<SyncScriptsResponse, Error> {
        let scripts = self
            .stores
            .scripts
            .list()
            .await?
            .into_iter()
            .map(|s| ScriptFile { name: s.name, content: s.content })
            .collect();
        Ok(SyncScriptsResponse { scripts })
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
