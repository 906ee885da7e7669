// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Textual directives embedded in model output.
//!
//! These line formats are a stable contract with the prompts the control
//! plane issues; do not loosen them:
//!
//! - `NEXT_STATUS: <id>` — line-anchored, last occurrence wins.
//! - `TASK_DESCRIPTION_START` … `TASK_DESCRIPTION_END` — multi-line block.
//! - `TASK_METADATA: key=value` — one pair per line.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

const NEXT_STATUS_PREFIX: &str = "NEXT_STATUS:";
const DESCRIPTION_START: &str = "TASK_DESCRIPTION_START";
const DESCRIPTION_END: &str = "TASK_DESCRIPTION_END";

#[allow(clippy::expect_used)]
static METADATA_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^TASK_METADATA:\s*(\S+?)=(.+)$").expect("constant regex pattern is valid")
});

/// Extract the status id from the last `NEXT_STATUS:` line.
///
/// Returns `None` when no such line exists or the last one has an empty
/// value.
pub fn parse_next_status(text: &str) -> Option<String> {
    let mut result = None;
    for line in text.lines() {
        if let Some(value) = line.trim().strip_prefix(NEXT_STATUS_PREFIX) {
            result = Some(value.trim().to_string());
        }
    }
    result.filter(|v| !v.is_empty())
}

/// Extract the trimmed content between the description markers.
///
/// Returns `None` when either marker is missing.
pub fn parse_task_description(text: &str) -> Option<String> {
    let start = text.find(DESCRIPTION_START)?;
    let body_start = start + DESCRIPTION_START.len();
    let end_offset = text[body_start..].find(DESCRIPTION_END)?;
    Some(text[body_start..body_start + end_offset].trim().to_string())
}

/// Remove the description block (markers included, plus the trailing
/// newline) from the text. Text without a complete block is returned
/// unchanged.
pub fn strip_task_description(text: &str) -> String {
    let Some(start) = text.find(DESCRIPTION_START) else {
        return text.to_string();
    };
    let Some(end_offset) = text[start..].find(DESCRIPTION_END) else {
        return text.to_string();
    };
    let mut end = start + end_offset + DESCRIPTION_END.len();
    if text[end..].starts_with('\n') {
        end += 1;
    }
    format!("{}{}", &text[..start], &text[end..])
}

/// Collect `TASK_METADATA: key=value` lines into a map. Later lines win on
/// duplicate keys.
pub fn parse_task_metadata(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for captures in METADATA_LINE.captures_iter(text) {
        let key = captures[1].to_string();
        let value = captures[2].trim().to_string();
        map.insert(key, value);
    }
    map
}

#[cfg(test)]
#[path = "directive_tests.rs"]
mod tests;
