// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin git adapter for worktree commands and branch naming.

use crate::model::{
    PermissionDecision, PermissionHandler, ToolUseRequest, TurnOptions, TurnRunner,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use toil_core::{Error, PermissionMode};
use toil_wire::WorktreeInfo;

/// Cap on the slug-translation model call.
const SLUG_TIMEOUT: Duration = Duration::from_secs(30);

/// Worktrees live under `<work_dir>/worktrees/<name>`.
pub struct GitOps {
    repo_dir: PathBuf,
}

impl GitOps {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self { repo_dir: repo_dir.into() }
    }

    fn worktrees_dir(&self) -> PathBuf {
        self.repo_dir.join("worktrees")
    }

    async fn git(&self, args: &[&str]) -> Result<String, Error> {
        let output = tokio::process::Command::new("git")
            .arg("-C")
            .arg(&self.repo_dir)
            .args(args)
            .output()
            .await
            .map_err(|e| Error::internal("git invocation failed").with_cause(e))?;
        if !output.status.success() {
            return Err(Error::internal(format!(
                "git {} failed: {}",
                args.first().unwrap_or(&""),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Parse `git worktree list --porcelain` into entries.
    pub async fn list_worktrees(&self) -> Result<Vec<WorktreeInfo>, Error> {
        let output = self.git(&["worktree", "list", "--porcelain"]).await?;
        Ok(parse_worktree_list(&output))
    }

    /// Create (or reuse) a worktree for a task branch. Returns its path.
    pub async fn ensure_worktree(&self, name: &str) -> Result<PathBuf, Error> {
        let path = self.worktrees_dir().join(name);
        if path.exists() {
            return Ok(path);
        }
        std::fs::create_dir_all(self.worktrees_dir())?;
        let path_str = path.to_string_lossy().into_owned();
        self.git(&["worktree", "add", "-b", name, &path_str]).await?;
        Ok(path)
    }

    pub async fn delete_worktree(&self, name: &str) -> Result<(), Error> {
        let path = self.worktrees_dir().join(name);
        let path_str = path.to_string_lossy().into_owned();
        self.git(&["worktree", "remove", "--force", &path_str]).await?;
        Ok(())
    }

    /// Pull the default branch in the main checkout.
    pub async fn pull_main(&self) -> Result<String, Error> {
        self.git(&["pull", "--ff-only"]).await
    }
}

fn parse_worktree_list(porcelain: &str) -> Vec<WorktreeInfo> {
    let mut worktrees = Vec::new();
    let mut path: Option<String> = None;
    let mut branch: Option<String> = None;
    for line in porcelain.lines().chain(std::iter::once("")) {
        if line.is_empty() {
            if let Some(path) = path.take() {
                let name = Path::new(&path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.clone());
                worktrees.push(WorktreeInfo { name, branch: branch.take(), path });
            }
            branch = None;
            continue;
        }
        if let Some(value) = line.strip_prefix("worktree ") {
            path = Some(value.to_string());
        } else if let Some(value) = line.strip_prefix("branch ") {
            branch = Some(value.trim_start_matches("refs/heads/").to_string());
        }
    }
    worktrees
}

struct DenyAll;

#[async_trait]
impl PermissionHandler for DenyAll {
    async fn resolve(&self, _request: ToolUseRequest) -> PermissionDecision {
        PermissionDecision::Deny { reason: "slug translation uses no tools".into() }
    }
}

/// Derive a branch-safe slug from a task title.
///
/// Asks the model for a short kebab-case translation (bounded by
/// [`SLUG_TIMEOUT`]); any failure falls back to sanitizing the title
/// directly.
pub async fn translate_slug(model: &dyn TurnRunner, title: &str) -> String {
    let prompt = format!(
        "Translate this task title into a short kebab-case git branch slug \
         (ascii, at most 40 characters). Reply with the slug only.\n\n{}",
        title
    );
    let options = TurnOptions {
        permission_mode: PermissionMode::Default,
        max_turns: Some(1),
        ..Default::default()
    };
    let translated = tokio::time::timeout(
        SLUG_TIMEOUT,
        model.run_turn(&prompt, &options, Arc::new(DenyAll)),
    )
    .await;

    match translated {
        Ok(Ok(outcome)) => {
            let slug = sanitize_slug(outcome.text.trim());
            if slug.is_empty() {
                sanitize_slug(title)
            } else {
                slug
            }
        }
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "slug translation failed, sanitizing title");
            sanitize_slug(title)
        }
        Err(_) => {
            tracing::debug!("slug translation timed out, sanitizing title");
            sanitize_slug(title)
        }
    }
}

/// Lowercase, keep `[a-z0-9]`, collapse everything else into single
/// hyphens, cap at 40 characters.
pub fn sanitize_slug(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len().min(40));
    let mut last_hyphen = true;
    for c in raw.chars().flat_map(char::to_lowercase) {
        if slug.len() >= 40 {
            break;
        }
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_hyphen = false;
        } else if !last_hyphen {
            slug.push('-');
            last_hyphen = true;
        }
    }
    slug.trim_matches('-').to_string()
}

#[cfg(test)]
#[path = "gitops_tests.rs"]
mod tests;
