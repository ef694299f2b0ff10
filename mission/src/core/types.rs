//! Shared deterministic types for mission core logic.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw result returned by a tool implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolOutput {
    /// Free-form text. Failure is signalled by an error prefix.
    Text(String),
    /// Structured record. Failure is signalled by its `status` field.
    Record(Value),
}

impl ToolOutput {
    pub fn text(message: impl Into<String>) -> Self {
        Self::Text(message.into())
    }

    /// Failure text in the canonical `Error: ...` shape.
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self::Text(format!("Error: {message}"))
    }

    /// Successful result carrying arbitrary content.
    ///
    /// Content is kept out of the text form so a payload that happens to start
    /// with "error" is not mistaken for a failure.
    pub fn payload(summary: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Record(serde_json::json!({
            "status": "success",
            "summary": summary.into(),
            "full_output": content.into(),
        }))
    }

    /// Human-readable rendering for notifications and reports.
    pub fn message(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Record(value) => {
                let summary = value.get("summary").and_then(Value::as_str);
                let detail = value.get("full_output").and_then(Value::as_str);
                match (summary, detail) {
                    (Some(summary), Some(detail)) if !detail.trim().is_empty() => {
                        format!("{summary}\n{detail}")
                    }
                    (Some(summary), _) => summary.to_string(),
                    _ => value.to_string(),
                }
            }
        }
    }
}

/// Success/failure verdict for one tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Failure,
}

/// What happened to a file between the existing and generated snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    /// No prior content.
    Created,
    /// Prior content changed.
    Modified,
    /// Diffed to empty.
    Deleted,
}

/// Unified diff for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDiff {
    pub filename: String,
    pub kind: DiffKind,
    pub unified: String,
    /// Count of inserted plus deleted lines.
    pub changed_lines: usize,
}
