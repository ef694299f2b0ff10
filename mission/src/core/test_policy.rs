//! Policy for auto-inserting "generate tests" follow-up tasks.
//!
//! When a task description names a source file being created or implemented,
//! the Mission Log appends a companion task that generates tests for it.
//! Descriptions that do not match are skipped silently.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::summary::summarize_tool_call;
use crate::task::ToolCallSpec;

/// Tool that the follow-up task invokes.
pub const GENERATE_TESTS_TOOL: &str = "generate_tests_for_file";

static FILE_TASK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b(?:write\s+file|create|implement)\b[^'"`\n]*?['"`]?(?P<path>[A-Za-z0-9_./-]+\.(?P<ext>[A-Za-z0-9]+))\b['"`]?"#,
    )
    .unwrap()
});

/// Configurable knobs for test follow-up insertion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TestPolicy {
    /// Append follow-up test tasks at all.
    pub auto_insert: bool,
    /// File extensions (without dot) that count as source files.
    pub source_extensions: Vec<String>,
}

impl Default for TestPolicy {
    fn default() -> Self {
        Self {
            auto_insert: true,
            source_extensions: ["py", "rs", "js", "ts", "go"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Follow-up task derived from a primary task description.
#[derive(Debug, Clone, PartialEq)]
pub struct FollowUp {
    pub description: String,
    pub tool_call: ToolCallSpec,
}

impl TestPolicy {
    pub fn disabled() -> Self {
        Self {
            auto_insert: false,
            ..Self::default()
        }
    }

    /// Derive the follow-up test task for `description`, if the policy applies.
    pub fn follow_up_for(&self, description: &str) -> Option<FollowUp> {
        if !self.auto_insert || is_test_generation_task(description) {
            return None;
        }
        let caps = FILE_TASK_RE.captures(description)?;
        let path = caps.name("path")?.as_str();
        let ext = caps.name("ext")?.as_str();
        if !self
            .source_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext))
        {
            return None;
        }
        if is_test_file(path) {
            return None;
        }
        let tool_call = ToolCallSpec::from_json(GENERATE_TESTS_TOOL, json!({ "path": path }));
        Some(FollowUp {
            description: summarize_tool_call(&tool_call),
            tool_call,
        })
    }
}

fn is_test_generation_task(description: &str) -> bool {
    let lower = description.to_ascii_lowercase();
    lower.contains("generate tests") || lower.contains("generate test")
}

/// True for paths that are themselves tests (`test_x.py`, `x_test.go`, `tests/…`).
pub fn is_test_file(path: &str) -> bool {
    let normalized = path.replace('\\', "/");
    let mut parts = normalized.split('/').collect::<Vec<_>>();
    let Some(file) = parts.pop() else {
        return false;
    };
    if parts.iter().any(|dir| *dir == "tests" || *dir == "test") {
        return true;
    }
    let stem = file.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(file);
    stem.starts_with("test_") || stem.ends_with("_test") || stem.ends_with(".test")
}

/// Where generated tests for `source` are written, relative to the project root.
///
/// Go tests sit beside their source; JS/TS tests use `tests/<stem>.test.<ext>`;
/// everything else gets `tests/test_<file>`.
pub fn companion_test_path(source: &str) -> String {
    let normalized = source.replace('\\', "/");
    let (dir, file) = match normalized.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, normalized.as_str()),
    };
    let (stem, ext) = file.rsplit_once('.').unwrap_or((file, ""));
    match ext {
        "go" => match dir {
            Some(dir) => format!("{dir}/{stem}_test.go"),
            None => format!("{stem}_test.go"),
        },
        "js" | "ts" => format!("tests/{stem}.test.{ext}"),
        _ => format!("tests/test_{file}"),
    }
}
