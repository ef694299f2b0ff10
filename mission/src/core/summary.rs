//! Human-readable task descriptions for tool calls.

use serde_json::Value;

use crate::task::ToolCallSpec;

/// Keys whose value best identifies what a tool call acts on, in priority order.
const SUBJECT_KEYS: [&str; 6] = [
    "path",
    "source_path",
    "project_name",
    "dependency",
    "command",
    "task_id",
];

/// Summarize a tool call as a Mission Log description.
///
/// `write_file{path: "app.py"}` becomes `Write File: 'app.py'`.
pub fn summarize_tool_call(call: &ToolCallSpec) -> String {
    let mut summary = title_case(&call.tool_name);
    if summary.is_empty() {
        summary = "Unknown Tool".to_string();
    }
    let subject = SUBJECT_KEYS
        .iter()
        .find_map(|key| call.arguments.get(*key).and_then(render_subject));
    if let Some(subject) = subject {
        summary.push_str(&format!(": '{subject}'"));
    }
    summary
}

fn render_subject(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn title_case(snake: &str) -> String {
    snake
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
