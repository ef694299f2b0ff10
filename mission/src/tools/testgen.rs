//! `generate_tests_for_file`: Test Generator plus a write of the companion test file.

use std::fs;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::instrument;

use super::{Collaborator, Tool, ToolContext, ToolDescriptor, display_path, object_schema, path_arg};
use crate::agents::TestGenerator;
use crate::core::test_policy::{GENERATE_TESTS_TOOL, companion_test_path};
use crate::core::types::ToolOutput;
use crate::io::project::resolve_within;
use crate::io::prompt::PromptBuilder;

pub struct GenerateTestsForFile;

#[async_trait]
impl Tool for GenerateTestsForFile {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: GENERATE_TESTS_TOOL,
            description: "Generate unit tests for a source file and write them to its companion test file.",
            parameters: object_schema(
                json!({ "path": { "type": "string", "description": "Source file relative to the project root." } }),
                &["path"],
            ),
            needs: &[Collaborator::ProjectManager, Collaborator::Model],
            modifies_files: true,
        }
    }

    #[instrument(skip_all)]
    async fn call(&self, ctx: &ToolContext, arguments: Map<String, Value>) -> Result<ToolOutput> {
        let path = path_arg(&arguments, "path")?;
        let relative = display_path(ctx, &path);
        if !path.is_file() {
            bail!("source file '{relative}' not found");
        }
        let source =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;

        let generator = TestGenerator::new(
            ctx.model()?,
            PromptBuilder::new(ctx.config.prompt_budget_bytes),
            ctx.events.clone(),
        );
        let tests = generator.generate(&relative, &source).await?;

        let test_relative = companion_test_path(&relative);
        let test_path = resolve_within(&ctx.root()?, &test_relative)?;
        if let Some(parent) = test_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&test_path, &tests).with_context(|| format!("write {}", test_path.display()))?;
        Ok(ToolOutput::text(format!(
            "Generated tests for '{relative}' in '{test_relative}'."
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::io::model::TextCompletion;
    use crate::task::ToolCallSpec;
    use crate::test_support::{ScriptedModel, TestProject};

    #[tokio::test]
    async fn writes_companion_test_file() {
        let project = TestProject::new();
        project.write("calc.py", "def add(a, b):\n    return a + b\n");
        let model = Arc::new(ScriptedModel::new([
            "```python\nfrom calc import add\n\ndef test_add():\n    assert add(1, 2) == 3\n```",
        ]));

        let outcome = project
            .run_tool(
                ToolCallSpec::from_json("generate_tests_for_file", json!({"path": "calc.py"})),
                Some(model.clone() as Arc<dyn TextCompletion>),
            )
            .await;

        assert!(outcome.is_success(), "{}", outcome.message());
        assert_eq!(
            outcome.message(),
            "Generated tests for 'calc.py' in 'tests/test_calc.py'."
        );
        assert!(project.read("tests/test_calc.py").contains("def test_add"));
        assert!(model.prompts()[0].1.contains("return a + b"));
    }

    #[tokio::test]
    async fn missing_source_fails_without_asking_the_model() {
        let project = TestProject::new();
        let model = Arc::new(ScriptedModel::new(["unused"]));
        let outcome = project
            .run_tool(
                ToolCallSpec::from_json("generate_tests_for_file", json!({"path": "nope.py"})),
                Some(model.clone() as Arc<dyn TextCompletion>),
            )
            .await;
        assert!(!outcome.is_success());
        assert_eq!(model.remaining(), 1);
    }
}
