// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The model port: one turn of an AI-agent session.
//!
//! `run_turn` is opaque to the rest of the worker — it may take hours and
//! is one of the two suspension points of a session driver. The production
//! implementation bridges to an agent CLI process over a line-oriented
//! JSON protocol; tests use [`fake::FakeTurnRunner`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use toil_core::{Error, PermissionMode};

/// A named sub-agent definition passed through to the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubAgent {
    pub name: String,
    pub content: String,
}

/// Options for one model turn.
#[derive(Debug, Clone, Default)]
pub struct TurnOptions {
    /// System-prompt material (the agent definition's content).
    pub system_prompt: Option<String>,
    pub cwd: Option<PathBuf>,
    pub permission_mode: PermissionMode,
    /// Opaque session handle from a previous turn; `None` starts fresh.
    pub resume: Option<String>,
    pub sub_agents: Vec<SubAgent>,
    /// Cap on agent-internal turns; used by hook invocations.
    pub max_turns: Option<u32>,
}

/// Result of a successful turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// Session handle to resume with next turn.
    pub session_id: Option<String>,
    /// Full assistant text, directives included.
    pub text: String,
}

/// One tool invocation the model wants to make.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolUseRequest {
    pub tool: String,
    pub input: serde_json::Value,
    /// Rule strings the agent CLI suggests persisting on "always allow".
    pub suggestions: Vec<String>,
}

/// Verdict for one tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum PermissionDecision {
    Allow,
    /// Allow, substituting the tool input (question answers ride here).
    AllowWithInput(serde_json::Value),
    Deny { reason: String },
}

/// Answers Allow/Deny for every tool use inside a turn.
#[async_trait]
pub trait PermissionHandler: Send + Sync {
    async fn resolve(&self, request: ToolUseRequest) -> PermissionDecision;
}

/// The opaque model primitive.
#[async_trait]
pub trait TurnRunner: Send + Sync + 'static {
    async fn run_turn(
        &self,
        prompt: &str,
        options: &TurnOptions,
        permissions: Arc<dyn PermissionHandler>,
    ) -> Result<TurnOutcome, Error>;
}

/// Bridge to an agent CLI process.
///
/// The child is spawned per turn with the options passed by environment;
/// both pipes carry line-oriented JSON. Stdin starts with
/// `{"type":"prompt","text":…}`; stdout frames are:
///
/// - `{"type":"permission_request","id":…,"tool":…,"input":…,"suggestions":[…]}`
///   — resolved through the [`PermissionHandler`], answered on stdin as
///   `{"id":…,"behavior":"allow"|"deny",…}`.
/// - `{"type":"result","session_id":…,"text":…}` — terminates the turn.
pub struct ProcessTurnRunner {
    command: String,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ChildLine {
    PermissionRequest {
        id: u64,
        tool: String,
        #[serde(default)]
        input: serde_json::Value,
        #[serde(default)]
        suggestions: Vec<String>,
    },
    Result {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        text: String,
    },
}

impl ProcessTurnRunner {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into() }
    }
}

#[async_trait]
impl TurnRunner for ProcessTurnRunner {
    async fn run_turn(
        &self,
        prompt: &str,
        options: &TurnOptions,
        permissions: Arc<dyn PermissionHandler>,
    ) -> Result<TurnOutcome, Error> {
        let mut command = tokio::process::Command::new(&self.command);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .env("AGENT_PERMISSION_MODE", options.permission_mode.as_str());
        if let Some(cwd) = &options.cwd {
            command.current_dir(cwd);
        }
        if let Some(system_prompt) = &options.system_prompt {
            command.env("AGENT_SYSTEM_PROMPT", system_prompt);
        }
        if let Some(session_id) = &options.resume {
            command.env("AGENT_RESUME_SESSION", session_id);
        }
        if let Some(max_turns) = options.max_turns {
            command.env("AGENT_MAX_TURNS", max_turns.to_string());
        }
        if !options.sub_agents.is_empty() {
            let encoded = serde_json::to_string(&options.sub_agents)?;
            command.env("AGENT_SUB_AGENTS", encoded);
        }

        let mut child = command
            .spawn()
            .map_err(|e| Error::unavailable(format!("spawn {} failed", self.command)).with_cause(e))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::internal("child stdin unavailable"))?;
        let mut frame = serde_json::json!({"type": "prompt", "text": prompt}).to_string();
        frame.push('\n');
        stdin.write_all(frame.as_bytes()).await.map_err(Error::from)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::internal("child stdout unavailable"))?;
        let mut lines = BufReader::new(stdout).lines();

        let outcome = loop {
            let Some(line) = lines.next_line().await.map_err(Error::from)? else {
                let status = child.wait().await.map_err(Error::from)?;
                return Err(Error::unavailable(format!(
                    "agent process exited without a result ({})",
                    status
                )));
            };
            let parsed: ChildLine = match serde_json::from_str(&line) {
                Ok(parsed) => parsed,
                // Non-protocol output is agent noise; skip it.
                Err(_) => continue,
            };
            match parsed {
                ChildLine::PermissionRequest { id, tool, input, suggestions } => {
                    let decision = permissions
                        .resolve(ToolUseRequest { tool, input, suggestions })
                        .await;
                    let reply = match decision {
                        PermissionDecision::Allow => {
                            serde_json::json!({"id": id, "behavior": "allow"})
                        }
                        PermissionDecision::AllowWithInput(input) => {
                            serde_json::json!({"id": id, "behavior": "allow", "updated_input": input})
                        }
                        PermissionDecision::Deny { reason } => {
                            serde_json::json!({"id": id, "behavior": "deny", "message": reason})
                        }
                    };
                    let mut frame = reply.to_string();
                    frame.push('\n');
                    stdin.write_all(frame.as_bytes()).await.map_err(Error::from)?;
                }
                ChildLine::Result { session_id, text } => {
                    break TurnOutcome { session_id, text };
                }
            }
        };

        let _ = child.wait().await;
        Ok(outcome)
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    //! Scripted model for driver tests.

    use super::*;
    use parking_lot::Mutex;

    /// One scripted turn: either an outcome or an error.
    pub type ScriptedTurn = Result<TurnOutcome, Error>;

    /// Records prompts/options and replays scripted outcomes in order.
    /// Runs out of script → returns an error turn.
    #[derive(Default)]
    pub struct FakeTurnRunner {
        script: Mutex<Vec<ScriptedTurn>>,
        pub calls: Mutex<Vec<RecordedCall>>,
        /// Tool uses resolved through the handler before each turn's
        /// outcome is returned.
        pub tool_uses: Mutex<Vec<ToolUseRequest>>,
    }

    #[derive(Debug, Clone)]
    pub struct RecordedCall {
        pub prompt: String,
        pub resume: Option<String>,
        pub permission_mode: PermissionMode,
        pub cwd: Option<PathBuf>,
        pub max_turns: Option<u32>,
    }

    impl FakeTurnRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_turn(&self, outcome: ScriptedTurn) {
            self.script.lock().push(outcome);
        }

        pub fn push_text(&self, session_id: &str, text: &str) {
            self.push_turn(Ok(TurnOutcome {
                session_id: Some(session_id.to_string()),
                text: text.to_string(),
            }));
        }

        pub fn push_error(&self, message: &str) {
            self.push_turn(Err(Error::unavailable(message.to_string())));
        }

        /// Queue a tool use to resolve through the permission handler at
        /// the start of the next turn.
        pub fn push_tool_use(&self, request: ToolUseRequest) {
            self.tool_uses.lock().push(request);
        }
    }

    #[async_trait]
    impl TurnRunner for FakeTurnRunner {
        async fn run_turn(
            &self,
            prompt: &str,
            options: &TurnOptions,
            permissions: Arc<dyn PermissionHandler>,
        ) -> Result<TurnOutcome, Error> {
            self.calls.lock().push(RecordedCall {
                prompt: prompt.to_string(),
                resume: options.resume.clone(),
                permission_mode: options.permission_mode,
                cwd: options.cwd.clone(),
                max_turns: options.max_turns,
            });

            let tool_uses: Vec<ToolUseRequest> = self.tool_uses.lock().drain(..).collect();
            for request in tool_uses {
                let _ = permissions.resolve(request).await;
            }

            let mut script = self.script.lock();
            if script.is_empty() {
                Err(Error::unavailable("fake model has no scripted turns left"))
            } else {
                script.remove(0)
            }
        }
    }
}

/// Parse sub-agent definitions from the `_sub_agents` metadata value.
pub fn parse_sub_agents(metadata: &HashMap<String, String>) -> Vec<SubAgent> {
    metadata
        .get(toil_core::task::meta::SUB_AGENTS)
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
