//! Diff Finalizer: turns desired file contents into an ordered tool plan.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, instrument, warn};

use super::parse_reply;
use crate::core::diff::file_diffs;
use crate::core::plan_rules::{diff_rule_violations, ordering_violations, unaddressed_diffs};
use crate::error::MissionError;
use crate::events::{EventBus, MissionEvent};
use crate::io::model::{Role, TextCompletion};
use crate::io::prompt::{PromptBuilder, PromptInputs, PromptKind};
use crate::task::ToolCallSpec;
use crate::tools::ToolRegistry;

#[derive(Debug, Deserialize)]
struct PlanReply {
    plan: Vec<ToolCallSpec>,
}

pub struct DiffFinalizer {
    model: Arc<dyn TextCompletion>,
    prompts: PromptBuilder,
    registry: Arc<ToolRegistry>,
    events: EventBus,
}

impl DiffFinalizer {
    pub fn new(
        model: Arc<dyn TextCompletion>,
        prompts: PromptBuilder,
        registry: Arc<ToolRegistry>,
        events: EventBus,
    ) -> Self {
        Self {
            model,
            prompts,
            registry,
            events,
        }
    }

    /// Tool plan turning `existing` into `generated` plus `dependencies`.
    ///
    /// Only files named in `generated` are diffed; an empty string there means
    /// the file should be deleted. No diffs and no dependencies is an empty plan.
    /// `error_report` re-primes the prompt during self-correction.
    #[instrument(skip_all, fields(generated = generated.len(), dependencies = dependencies.len()))]
    pub async fn create_tool_plan(
        &self,
        generated: &BTreeMap<String, String>,
        existing: &BTreeMap<String, String>,
        dependencies: &[String],
        error_report: Option<&str>,
    ) -> Result<Vec<ToolCallSpec>, MissionError> {
        let diffs = file_diffs(generated, existing);
        if diffs.is_empty() && dependencies.is_empty() {
            info!("nothing changed, empty tool plan");
            return Ok(Vec::new());
        }

        self.events.publish(MissionEvent::status(
            Role::Finalizer.as_str(),
            format!("Planning tool calls for {} changed file(s)", diffs.len()),
        ));
        let inputs = PromptInputs {
            dependencies: dependencies.to_vec(),
            diffs: diffs.clone(),
            tool_schemas: self.registry.schemas_json()?,
            error_report: error_report.map(str::to_string),
            ..PromptInputs::default()
        };
        let prompt = self.prompts.build(PromptKind::Finalizer, &inputs)?;
        let response = self.model.complete(Role::Finalizer, prompt.as_str()).await?;
        let reply: PlanReply = parse_reply(Role::Finalizer, &response)?;
        let plan = reply.plan;

        self.validate_steps(&plan)?;
        let violations = diff_rule_violations(&plan, &diffs);
        if !violations.is_empty() {
            return Err(MissionError::PlanParseError(format!(
                "tool plan breaks diff rules:\n- {}",
                violations.join("\n- ")
            )));
        }
        for violation in ordering_violations(&plan) {
            warn!(%violation, "tool plan ordering");
        }
        let untouched = unaddressed_diffs(&plan, &diffs);
        if !untouched.is_empty() {
            warn!(files = ?untouched, "tool plan leaves changed files untouched");
        }

        info!(steps = plan.len(), "tool plan ready");
        Ok(plan)
    }

    fn validate_steps(&self, plan: &[ToolCallSpec]) -> Result<(), MissionError> {
        for (index, step) in plan.iter().enumerate() {
            let descriptor = self.registry.descriptor(&step.tool_name)?;
            if let Err(messages) = descriptor.validate_arguments(&step.arguments) {
                return Err(MissionError::PlanParseError(format!(
                    "step {index} ('{}') has invalid arguments: {}",
                    step.tool_name,
                    messages.join("; ")
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedModel;

    fn finalizer(model: Arc<ScriptedModel>) -> DiffFinalizer {
        DiffFinalizer::new(
            model,
            PromptBuilder::new(40_000),
            Arc::new(ToolRegistry::with_builtins().expect("builtins")),
            EventBus::default(),
        )
    }

    fn files(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(name, content)| ((*name).to_string(), (*content).to_string()))
            .collect()
    }

    #[tokio::test]
    async fn no_diffs_and_no_dependencies_is_an_empty_plan() {
        let model = Arc::new(ScriptedModel::new(Vec::<String>::new()));
        let same = files(&[("a.py", "x = 1\n")]);
        let plan = finalizer(model.clone())
            .create_tool_plan(&same, &same, &[], None)
            .await
            .expect("plan");
        assert!(plan.is_empty());
        assert!(model.prompts().is_empty());
    }

    #[tokio::test]
    async fn parses_and_validates_plan() {
        let model = Arc::new(ScriptedModel::new([r#"```json
{"plan": [
  {"tool_name": "add_dependency_to_requirements", "arguments": {"dependency": "flask"}},
  {"tool_name": "write_file", "arguments": {"path": "hello.py", "content": "print('hi')\n"}},
  {"tool_name": "run_tests", "arguments": {}}
]}
```"#]));
        let plan = finalizer(model.clone())
            .create_tool_plan(
                &files(&[("hello.py", "print('hi')\n")]),
                &BTreeMap::new(),
                &["flask".to_string()],
                Some("Task 1 failed"),
            )
            .await
            .expect("plan");
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[1].str_arg("path"), Some("hello.py"));
        let prompt = &model.prompts()[0].1;
        assert!(prompt.contains("--- /dev/null"));
        assert!(prompt.contains("Task 1 failed"));
        assert!(prompt.contains("\"install_dependencies\""));
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let model = Arc::new(ScriptedModel::new([
            r#"{"plan": [{"tool_name": "pip_install", "arguments": {}}]}"#,
        ]));
        let err = finalizer(model)
            .create_tool_plan(&files(&[("a.py", "x\n")]), &BTreeMap::new(), &[], None)
            .await
            .expect_err("unknown");
        assert!(matches!(err, MissionError::UnknownTool(name) if name == "pip_install"));
    }

    #[tokio::test]
    async fn missing_arguments_are_plan_parse_errors() {
        let model = Arc::new(ScriptedModel::new([
            r#"{"plan": [{"tool_name": "write_file", "arguments": {"path": "a.py"}}]}"#,
        ]));
        let err = finalizer(model)
            .create_tool_plan(&files(&[("a.py", "x\n")]), &BTreeMap::new(), &[], None)
            .await
            .expect_err("invalid");
        assert!(matches!(err, MissionError::PlanParseError(_)));
    }

    #[tokio::test]
    async fn new_file_must_be_written_whole() {
        let model = Arc::new(ScriptedModel::new([
            r#"{"plan": [{"tool_name": "replace_in_file", "arguments": {"path": "a.py", "old": "x", "new": "y"}}]}"#,
        ]));
        let err = finalizer(model)
            .create_tool_plan(&files(&[("a.py", "y\n")]), &BTreeMap::new(), &[], None)
            .await
            .expect_err("rule");
        assert!(matches!(err, MissionError::PlanParseError(message) if message.contains("diff rules")));
    }

    #[tokio::test]
    async fn write_then_generate_tests_is_accepted() {
        let model = Arc::new(ScriptedModel::new([r#"{"plan": [
  {"tool_name": "write_file", "arguments": {"path": "hello.py", "content": "print('hi')\n"}},
  {"tool_name": "generate_tests_for_file", "arguments": {"path": "hello.py"}}
]}"#]));
        let plan = finalizer(model)
            .create_tool_plan(&files(&[("hello.py", "print('hi')\n")]), &BTreeMap::new(), &[], None)
            .await
            .expect("plan");
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[1].tool_name, "generate_tests_for_file");
    }

    #[tokio::test]
    async fn missing_plan_key_is_plan_parse_error() {
        let model = Arc::new(ScriptedModel::new([r#"{"steps": []}"#]));
        let err = finalizer(model)
            .create_tool_plan(&files(&[("a.py", "y\n")]), &BTreeMap::new(), &[], None)
            .await
            .expect_err("shape");
        assert!(matches!(err, MissionError::PlanParseError(_)));
    }
}
