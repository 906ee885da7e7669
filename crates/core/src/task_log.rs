// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only per-task log records.

use crate::task::TaskId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a task log record.
    pub struct TaskLogId("tlog-");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// One log line reported by a session driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskLog {
    pub id: TaskLogId,
    pub task_id: TaskId,
    #[serde(default)]
    pub level: LogLevel,
    pub message: String,
    pub created_at_ms: u64,
}

impl TaskLog {
    pub fn new(task_id: TaskId, level: LogLevel, message: impl Into<String>, now_ms: u64) -> Self {
        Self { id: TaskLogId::new(), task_id, level, message: message.into(), created_at_ms: now_ms }
    }
}
