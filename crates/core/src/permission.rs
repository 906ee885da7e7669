// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Permission rules, the wildcard matcher, and the per-project rule set.
//!
//! A rule is either `ToolName` (matches every invocation of that tool) or
//! `ToolName(pattern)` where the pattern is matched against the relevant
//! tool input with `*` wildcards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How permissive a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PermissionMode {
    #[default]
    #[serde(rename = "default")]
    Default,
    #[serde(rename = "acceptEdits")]
    AcceptEdits,
    #[serde(rename = "bypass")]
    Bypass,
}

impl PermissionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PermissionMode::Default => "default",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::Bypass => "bypass",
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionMode {
    type Err = ();

    /// Unknown values fall back to `Default` rather than failing: a stale
    /// metadata value must never brick a session.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "acceptEdits" => PermissionMode::AcceptEdits,
            "bypass" | "bypassPermissions" => PermissionMode::Bypass,
            _ => PermissionMode::Default,
        })
    }
}

/// Per-project permission rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PermissionSet {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub ask: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
    #[serde(default)]
    pub updated_at_ms: u64,
}

/// Parse a rule string into `(tool_name, pattern, has_pattern)`.
///
/// `"Bash(git *)"` → `("Bash", "git *", true)`. A rule without a trailing
/// `)` is treated as a bare tool name in full — `"Bash(git *"` parses as
/// `("Bash(git *", "", false)` — so malformed input degrades to a rule that
/// matches nothing rather than matching too much.
pub fn parse_rule(rule: &str) -> (&str, &str, bool) {
    if let Some(open) = rule.find('(') {
        if let Some(stripped) = rule.strip_suffix(')') {
            return (&rule[..open], &stripped[open + 1..], true);
        }
    }
    (rule, "", false)
}

/// Format a rule from a tool name and pattern. An empty pattern yields the
/// bare tool name.
pub fn format_rule(tool: &str, pattern: &str) -> String {
    if pattern.is_empty() {
        tool.to_string()
    } else {
        format!("{}({})", tool, pattern)
    }
}

/// Unix-style wildcard match where `*` matches any run of characters
/// (including none, and including spaces and slashes).
///
/// A leading `*` anchors on the suffix, a trailing `*` on the prefix, and
/// multiple wildcards require the literal segments to appear in order.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == text;
    }

    let segments: Vec<&str> = pattern.split('*').collect();
    let first = segments[0];
    let last = segments[segments.len() - 1];

    if !text.starts_with(first) {
        return false;
    }
    let mut pos = first.len();

    // Middle segments must appear in order, left to right.
    for segment in &segments[1..segments.len() - 1] {
        if segment.is_empty() {
            continue;
        }
        match text[pos..].find(segment) {
            Some(offset) => pos += offset + segment.len(),
            None => return false,
        }
    }

    if last.is_empty() {
        return true;
    }
    text.len() >= pos + last.len() && text.ends_with(last)
}

/// Union two rule lists, preserving order (all of `a`, then items of `b`
/// not already present). `union_dedup(a, a) == a`.
pub fn union_dedup(a: &[String], b: &[String]) -> Vec<String> {
    let mut result: Vec<String> = Vec::with_capacity(a.len() + b.len());
    for rule in a.iter().chain(b.iter()) {
        if !result.iter().any(|r| r == rule) {
            result.push(rule.clone());
        }
    }
    result
}

#[cfg(test)]
#[path = "permission_tests.rs"]
mod tests;
