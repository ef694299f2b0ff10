use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A named request to perform one concrete side effect.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolCallSpec {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCallSpec {
    pub fn new(tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
        }
    }

    /// Build a call from a JSON object literal; non-object values yield no arguments.
    pub fn from_json(tool_name: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(tool_name, arguments)
    }

    /// String argument by key, if present.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }
}

/// One unit of work in the mission log.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: u64,
    pub description: String,
    pub done: bool,
    pub tool_call: Option<ToolCallSpec>,
}

/// A file the architect wants produced.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlannedFile {
    pub filename: String,
    #[serde(default)]
    pub purpose: String,
}

/// Declarative build plan produced once per architect cycle.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Plan {
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub files: Vec<PlannedFile>,
}

/// Mission state derived from the task list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MissionState {
    /// At least one task is not done.
    Pending,
    /// Every task is done (an empty log counts as complete).
    Complete,
}

impl MissionState {
    pub fn of(tasks: &[Task]) -> Self {
        if tasks.iter().all(|task| task.done) {
            Self::Complete
        } else {
            Self::Pending
        }
    }
}
