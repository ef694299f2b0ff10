//! Single source of truth for tool-result classification.

use serde_json::Value;

use crate::core::types::{ToolOutput, ToolStatus};

/// Prefix that marks a textual tool result as failed (case-insensitive).
pub const ERROR_PREFIX: &str = "error";

/// Classify a tool output as success or failure.
///
/// - Text fails iff it starts with [`ERROR_PREFIX`] after leading whitespace.
/// - Records fail iff their `status` field is `failure` or `error`.
pub fn classify(output: &ToolOutput) -> ToolStatus {
    let failed = match output {
        ToolOutput::Text(text) => is_failure_text(text),
        ToolOutput::Record(value) => is_failure_record(value),
    };
    if failed {
        ToolStatus::Failure
    } else {
        ToolStatus::Success
    }
}

pub fn is_failure_text(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed
        .get(..ERROR_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(ERROR_PREFIX))
}

fn is_failure_record(value: &Value) -> bool {
    value
        .get("status")
        .and_then(Value::as_str)
        .is_some_and(|status| {
            status.eq_ignore_ascii_case("failure") || status.eq_ignore_ascii_case("error")
        })
}
