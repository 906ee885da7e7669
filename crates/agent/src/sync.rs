// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mirror server-side definitions into local files.
//!
//! The server is authoritative: every synced entry is written, and any
//! leftover file not in the current set is removed. Names that could
//! escape the target directory are skipped.

use crate::control::ControlPlane;
use crate::permissions::PermissionCache;
use std::collections::HashSet;
use std::path::Path;
use toil_core::Error;
use toil_wire::SyncPermissionsRequest;

/// True for names that must not become file paths.
fn unsafe_name(name: &str) -> bool {
    name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..")
}

/// Write the full entry set into `dir` and prune files not in it.
///
/// Returns how many entries were written.
pub fn mirror_files(
    dir: &Path,
    entries: &[(String, String)],
) -> Result<usize, Error> {
    std::fs::create_dir_all(dir)?;

    let mut kept: HashSet<String> = HashSet::new();
    let mut written = 0usize;
    for (name, content) in entries {
        if unsafe_name(name) {
            tracing::warn!(name = %name, "skipping unsafe definition name");
            continue;
        }
        std::fs::write(dir.join(name), content)?;
        kept.insert(name.clone());
        written += 1;
    }

    // Remove leftovers from previous syncs.
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !kept.contains(name) && entry.file_type()?.is_file() {
            if let Err(e) = std::fs::remove_file(entry.path()) {
                tracing::warn!(name = %name, error = %e, "leftover removal failed");
            }
        }
    }
    Ok(written)
}

/// Fetch agent definitions and mirror them into `dir`.
pub async fn sync_agents(control: &dyn ControlPlane, dir: &Path) -> Result<usize, Error> {
    let response = control.sync_agents().await?;
    let entries: Vec<(String, String)> =
        response.agents.into_iter().map(|a| (a.name, a.content)).collect();
    let written = mirror_files(dir, &entries)?;
    tracing::info!(dir = %dir.display(), count = written, "agents synced");
    Ok(written)
}

/// Fetch scripts and mirror them into `dir`.
pub async fn sync_scripts(control: &dyn ControlPlane, dir: &Path) -> Result<usize, Error> {
    let response = control.sync_scripts().await?;
    let entries: Vec<(String, String)> =
        response.scripts.into_iter().map(|s| (s.name, s.content)).collect();
    let written = mirror_files(dir, &entries)?;
    tracing::info!(dir = %dir.display(), count = written, "scripts synced");
    Ok(written)
}

/// Pull the authoritative permission allow-list into the cache.
pub async fn sync_permissions(
    control: &dyn ControlPlane,
    cache: &PermissionCache,
) -> Result<(), Error> {
    let response = control
        .sync_permissions(SyncPermissionsRequest {
            project_name: cache.project_name().to_string(),
            local_allow: Vec::new(),
        })
        .await?;
    let count = response.allow.len();
    cache.replace_all(response.allow);
    tracing::info!(project = %cache.project_name(), rules = count, "permissions synced");
    Ok(())
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
