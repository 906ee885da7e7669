// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the worker binary.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("API_KEY must be set")]
    MissingApiKey,
    #[error("invalid {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Worker configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub server_url: String,
    pub api_key: String,
    pub worker_id: String,
    pub max_concurrent: u32,
    pub work_dir: PathBuf,
    pub project_name: String,
    /// Command line the process turn runner execs for each model turn.
    pub agent_cmd: String,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("API_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let max_concurrent = match std::env::var("MAX_CONCURRENT_TASKS") {
            Ok(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::Invalid { name: "MAX_CONCURRENT_TASKS", value: raw })?,
            Err(_) => 1,
        };

        let work_dir = std::env::var("WORK_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        Ok(Self {
            server_url: std::env::var("SERVER_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string()),
            api_key,
            worker_id: std::env::var("AGENT_MANAGER_ID").unwrap_or_else(|_| default_worker_id()),
            max_concurrent,
            work_dir,
            project_name: std::env::var("PROJECT_NAME").unwrap_or_default(),
            agent_cmd: std::env::var("AGENT_CMD").unwrap_or_else(|_| "claude".to_string()),
        })
    }

    /// Directory agent definition files are mirrored into.
    pub fn agents_dir(&self) -> PathBuf {
        self.work_dir.join(".toil/agents")
    }

    /// Directory script files are mirrored into.
    pub fn scripts_dir(&self) -> PathBuf {
        self.work_dir.join(".toil/scripts")
    }
}

/// Stable-enough fallback id when `AGENT_MANAGER_ID` is unset.
fn default_worker_id() -> String {
    match std::env::var("HOSTNAME") {
        Ok(host) if !host.is_empty() => format!("agent-{}", host),
        _ => format!("agent-{}", std::process::id()),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
