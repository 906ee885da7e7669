// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the server binary.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("API_KEY must be set")]
    MissingApiKey,
    #[error("invalid {name}: {value}")]
    Invalid { name: &'static str, value: String },
    #[error("could not determine a state directory (set STORAGE_DIR or HOME)")]
    NoStateDir,
}

/// Server configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Deployment environment label ("development", "production", …).
    pub env: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub api_key: String,
    pub storage_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("API_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let port = match std::env::var("HTTP_PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid { name: "HTTP_PORT", value: raw })?,
            Err(_) => 8080,
        };

        Ok(Self {
            env: std::env::var("ENV").unwrap_or_else(|_| "development".to_string()),
            host: std::env::var("HTTP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_key,
            storage_dir: storage_dir()?,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Resolve the record directory: STORAGE_DIR > XDG_STATE_HOME/toild >
/// ~/.local/state/toild.
fn storage_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var("STORAGE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("toild"));
    }
    let home = std::env::var("HOME").map_err(|_| ConfigError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/toild"))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
