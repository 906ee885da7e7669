// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-project permission rule sets and the worker union-merge sync.

use crate::bus::EventBus;
use toil_core::event::meta_keys;
use toil_core::{union_dedup, Clock, Error, Event, EventKind, PermissionSet, Project};
use toil_storage::Stores;
use toil_wire::{SyncPermissionsRequest, SyncPermissionsResponse};

pub struct PermissionService<C: Clock> {
    stores: Stores,
    bus: EventBus,
    clock: C,
}

impl<C: Clock> PermissionService<C> {
    pub fn new(stores: Stores, bus: EventBus, clock: C) -> Self {
        Self { stores, bus, clock }
    }

    async fn project_by_name(&self, name: &str) -> Result<Project, Error> {
        self.stores
            .projects
            .list()
            .await?
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| Error::not_found(format!("project '{}' not found", name)))
    }

    /// Union-merge locally added allow rules into the stored set and return
    /// the authoritative lists.
    ///
    /// The server set comes first in the merge so rule order stays stable
    /// across workers; a worker's cache is then replaced wholesale by the
    /// response.
    pub async fn sync(
        &self,
        request: &SyncPermissionsRequest,
    ) -> Result<SyncPermissionsResponse, Error> {
        let project = self.project_by_name(&request.project_name).await?;
        let mut set = self.stores.permissions.get(&project.id).await?;

        let merged = union_dedup(&set.allow, &request.local_allow);
        let changed = merged != set.allow;
        if changed {
            set.allow = merged;
            set.updated_at_ms = self.clock.epoch_ms();
            self.stores.permissions.put(&project.id, &set).await?;

            tracing::info!(
                project = %project.name,
                added = request.local_allow.len(),
                total = set.allow.len(),
                "permission set merged"
            );
            let event =
                Event::new(EventKind::PermissionChanged, project.id.to_string(), set.updated_at_ms)
                    .with_meta(meta_keys::PROJECT_ID, project.id.to_string());
            self.bus.publish(&event);
        }

        Ok(SyncPermissionsResponse {
            allow: set.allow,
            ask: set.ask,
            deny: set.deny,
        })
    }

    pub async fn get_for_project_name(&self, name: &str) -> Result<PermissionSet, Error> {
        let project = self.project_by_name(name).await?;
        self.stores.permissions.get(&project.id).await
    }
}

#[cfg(test)]
#[path = "permissions_tests.rs"]
mod tests;
