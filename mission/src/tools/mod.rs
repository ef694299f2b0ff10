//! Tool registry and the built-in tool set.
//!
//! Tools are registered once at startup in a static table. Each declares a
//! JSON Schema for its arguments and the collaborators it needs; the executor
//! validates, resolves path-like arguments, and hands every tool the same
//! [`ToolContext`].

mod deps;
mod fs;
mod mission;
mod shell;
mod testgen;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use jsonschema::Draft;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::core::types::ToolOutput;
use crate::error::MissionError;
use crate::events::EventBus;
use crate::io::config::MissionConfig;
use crate::io::model::TextCompletion;
use crate::io::project::ProjectManager;
use crate::mission_log::MissionLog;

pub use deps::{AddDependency, InstallDependencies};
pub use fs::{CopyFile, CreateDirectory, DeleteFile, ListFiles, MoveFile, ReadFile, ReplaceInFile, WriteFile};
pub use mission::{AddTaskToMissionLog, GetMissionLog, MarkTaskAsDone, RemoveTask};
pub use shell::{RunShellCommand, RunTests};
pub use testgen::GenerateTestsForFile;

/// Argument names resolved against the project root before invocation.
pub const PATH_KEYS: [&str; 4] = ["path", "source_path", "destination_path", "requirements_path"];

/// Live collaborators a tool may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Collaborator {
    ProjectManager,
    MissionLog,
    EventBus,
    Model,
}

/// Static description of a tool: name, schema, and requirements.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON Schema of the argument object.
    pub parameters: Value,
    #[serde(skip)]
    pub needs: &'static [Collaborator],
    /// Successful calls may have changed files under the project root.
    #[serde(skip)]
    pub modifies_files: bool,
}

impl ToolDescriptor {
    pub fn properties(&self) -> Option<&Map<String, Value>> {
        self.parameters.get("properties").and_then(Value::as_object)
    }

    /// Schema default of `key`, if declared.
    pub fn default_for(&self, key: &str) -> Option<&Value> {
        self.properties()?.get(key)?.get("default")
    }

    /// Validate `arguments` against the schema; returns one message per violation.
    pub fn validate_arguments(&self, arguments: &Map<String, Value>) -> Result<(), Vec<String>> {
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&self.parameters)
            .map_err(|err| vec![format!("invalid schema for '{}': {err}", self.name)])?;
        let instance = Value::Object(arguments.clone());
        let messages: Vec<String> = validator
            .iter_errors(&instance)
            .map(|err| err.to_string())
            .collect();
        if messages.is_empty() {
            Ok(())
        } else {
            Err(messages)
        }
    }
}

/// Object schema helper: `properties` plus `required`, no extra keys allowed.
pub fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

/// Collaborators handed to every tool call.
#[derive(Clone)]
pub struct ToolContext {
    pub project: Arc<ProjectManager>,
    pub mission_log: Arc<MissionLog>,
    pub events: EventBus,
    pub model: Option<Arc<dyn TextCompletion>>,
    pub config: Arc<MissionConfig>,
}

impl ToolContext {
    pub fn has(&self, collaborator: Collaborator) -> bool {
        match collaborator {
            Collaborator::ProjectManager => self.project.active_root().is_some(),
            Collaborator::Model => self.model.is_some(),
            Collaborator::MissionLog | Collaborator::EventBus => true,
        }
    }

    pub fn root(&self) -> Result<PathBuf> {
        Ok(self.project.require_root()?)
    }

    pub fn model(&self) -> Result<Arc<dyn TextCompletion>> {
        self.model
            .clone()
            .ok_or_else(|| anyhow!("no model configured"))
    }
}

/// One named side effect.
#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    /// Run with validated arguments whose path-like values are already absolute.
    async fn call(&self, ctx: &ToolContext, arguments: Map<String, Value>) -> Result<ToolOutput>;
}

/// Name-indexed set of tools in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<(ToolDescriptor, Arc<dyn Tool>)>,
    index: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in tool.
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        let builtins: Vec<Arc<dyn Tool>> = vec![
            Arc::new(WriteFile),
            Arc::new(ReplaceInFile),
            Arc::new(DeleteFile),
            Arc::new(ReadFile),
            Arc::new(ListFiles),
            Arc::new(CreateDirectory),
            Arc::new(CopyFile),
            Arc::new(MoveFile),
            Arc::new(AddDependency),
            Arc::new(InstallDependencies),
            Arc::new(RunTests),
            Arc::new(RunShellCommand),
            Arc::new(GenerateTestsForFile),
            Arc::new(AddTaskToMissionLog),
            Arc::new(MarkTaskAsDone),
            Arc::new(RemoveTask),
            Arc::new(GetMissionLog),
        ];
        for tool in builtins {
            registry.register(tool)?;
        }
        Ok(registry)
    }

    /// Add a tool. Duplicate names are rejected.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let descriptor = tool.descriptor();
        if self.index.contains_key(descriptor.name) {
            bail!("duplicate tool name '{}'", descriptor.name);
        }
        if descriptor.parameters.get("type").and_then(Value::as_str) != Some("object") {
            bail!("tool '{}' must take an object of arguments", descriptor.name);
        }
        self.index.insert(descriptor.name, self.tools.len());
        self.tools.push((descriptor, tool));
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<(&ToolDescriptor, Arc<dyn Tool>)> {
        let index = *self.index.get(name)?;
        let (descriptor, tool) = &self.tools[index];
        Some((descriptor, Arc::clone(tool)))
    }

    pub fn descriptor(&self, name: &str) -> Result<&ToolDescriptor, MissionError> {
        self.index
            .get(name)
            .map(|index| &self.tools[*index].0)
            .ok_or_else(|| MissionError::UnknownTool(name.to_string()))
    }

    pub fn list_schemas(&self) -> Vec<&ToolDescriptor> {
        self.tools.iter().map(|(descriptor, _)| descriptor).collect()
    }

    /// Pretty JSON array of all schemas, for planning prompts.
    pub fn schemas_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.list_schemas()).context("serialize tool schemas")
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Required string argument.
pub(crate) fn str_arg<'a>(arguments: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("missing string argument '{key}'"))
}

/// Path argument; the executor has already made it absolute.
pub(crate) fn path_arg(arguments: &Map<String, Value>, key: &str) -> Result<PathBuf> {
    str_arg(arguments, key).map(PathBuf::from)
}

/// `/`-separated form of `path` relative to the active root, for messages.
pub(crate) fn display_path(ctx: &ToolContext, path: &std::path::Path) -> String {
    match ctx.project.active_root() {
        Some(root) => match crate::io::project::relative_display(&root, path) {
            shown if shown.is_empty() => ".".to_string(),
            shown => shown,
        },
        None => path.display().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl Tool for Named {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor {
                name: self.0,
                description: "test tool",
                parameters: object_schema(json!({}), &[]),
                needs: &[],
                modifies_files: false,
            }
        }

        async fn call(&self, _ctx: &ToolContext, _arguments: Map<String, Value>) -> Result<ToolOutput> {
            Ok(ToolOutput::text("ok"))
        }
    }

    #[test]
    fn builtins_register_without_duplicates() {
        let registry = ToolRegistry::with_builtins().expect("builtins");
        assert_eq!(registry.len(), 17);
        assert!(registry.lookup("write_file").is_some());
        assert!(registry.lookup("nope").is_none());
        assert!(matches!(
            registry.descriptor("nope"),
            Err(MissionError::UnknownTool(_))
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Named("a"))).expect("first");
        let err = registry.register(Arc::new(Named("a"))).expect_err("dup");
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn schemas_preserve_registration_order() {
        let registry = ToolRegistry::with_builtins().expect("builtins");
        let names: Vec<_> = registry.list_schemas().iter().map(|d| d.name).collect();
        assert_eq!(names[0], "write_file");
        assert_eq!(names.last().copied(), Some("get_mission_log"));
        let json = registry.schemas_json().expect("json");
        assert!(json.contains("\"replace_in_file\""));
        assert!(!json.contains("modifies_files"));
    }

    #[test]
    fn validation_reports_missing_and_unknown_keys() {
        let registry = ToolRegistry::with_builtins().expect("builtins");
        let descriptor = registry.descriptor("write_file").expect("write_file");

        let mut args = Map::new();
        args.insert("path".into(), json!("a.py"));
        assert!(descriptor.validate_arguments(&args).is_err());

        args.insert("content".into(), json!("x"));
        assert!(descriptor.validate_arguments(&args).is_ok());

        args.insert("mode".into(), json!("w"));
        assert!(descriptor.validate_arguments(&args).is_err());
    }

    #[test]
    fn list_files_declares_path_default() {
        let registry = ToolRegistry::with_builtins().expect("builtins");
        let descriptor = registry.descriptor("list_files").expect("list_files");
        assert_eq!(descriptor.default_for("path"), Some(&json!(".")));
    }
}
