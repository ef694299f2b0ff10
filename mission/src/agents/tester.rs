//! Test Generator: writes a test file for one source file.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, instrument};

use super::coder::finish_file;
use super::collect_stream;
use crate::core::test_policy::{companion_test_path, is_test_file};
use crate::error::MissionError;
use crate::events::{EventBus, MissionEvent};
use crate::io::model::{Role, TextCompletion};
use crate::io::prompt::{PromptBuilder, PromptInputs, PromptKind};
use crate::task::PlannedFile;

pub struct TestGenerator {
    model: Arc<dyn TextCompletion>,
    prompts: PromptBuilder,
    events: EventBus,
}

impl TestGenerator {
    pub fn new(model: Arc<dyn TextCompletion>, prompts: PromptBuilder, events: EventBus) -> Self {
        Self {
            model,
            prompts,
            events,
        }
    }

    /// Test file contents for `filename`. An empty reply is an error.
    #[instrument(skip_all, fields(file = %filename))]
    pub async fn generate(&self, filename: &str, source: &str) -> Result<String, MissionError> {
        self.events.publish(MissionEvent::status(
            Role::Tester.as_str(),
            format!("Writing tests for {filename}"),
        ));
        let inputs = PromptInputs {
            target: Some(PlannedFile {
                filename: filename.to_string(),
                purpose: String::new(),
            }),
            existing_content: Some(source.to_string()),
            ..PromptInputs::default()
        };
        let prompt = self.prompts.build(PromptKind::Tester, &inputs)?;
        let raw = collect_stream(self.model.as_ref(), Role::Tester, prompt.as_str(), |_| {}).await?;
        let tests = finish_file(&raw);
        if tests.trim().is_empty() {
            return Err(MissionError::ToolExecutionFailure {
                tool_name: "generate_tests_for_file".to_string(),
                message: format!("test generation for '{filename}' produced no code"),
            });
        }
        Ok(tests)
    }

    /// Companion tests for every non-test source file in `generated`, keyed by test path.
    pub async fn generate_for_files(
        &self,
        generated: &BTreeMap<String, String>,
        source_extensions: &[String],
    ) -> Result<BTreeMap<String, String>, MissionError> {
        let mut tests = BTreeMap::new();
        for (filename, source) in generated {
            let ext = filename.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
            let is_source = source_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext));
            if !is_source || is_test_file(filename) || source.trim().is_empty() {
                continue;
            }
            let test_path = companion_test_path(filename);
            if generated.contains_key(&test_path) {
                continue;
            }
            tests.insert(test_path, self.generate(filename, source).await?);
        }
        info!(count = tests.len(), "tests generated");
        Ok(tests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedModel;

    fn exts() -> Vec<String> {
        vec!["py".to_string()]
    }

    #[tokio::test]
    async fn generates_companion_tests_for_sources_only() {
        let model = Arc::new(ScriptedModel::new(["```python\ndef test_a():\n    assert True\n```"]));
        let tester = TestGenerator::new(model.clone(), PromptBuilder::new(40_000), EventBus::default());
        let generated = BTreeMap::from([
            ("a.py".to_string(), "def a():\n    return 1\n".to_string()),
            ("README.md".to_string(), "# hi\n".to_string()),
            ("tests/test_b.py".to_string(), "def test_b(): pass\n".to_string()),
        ]);
        let tests = tester.generate_for_files(&generated, &exts()).await.expect("tests");
        assert_eq!(tests.keys().collect::<Vec<_>>(), vec!["tests/test_a.py"]);
        assert!(tests["tests/test_a.py"].starts_with("def test_a"));
        assert!(model.prompts()[0].1.contains("--- a.py"));
    }

    #[tokio::test]
    async fn empty_reply_is_a_failure() {
        let model = Arc::new(ScriptedModel::new(["   "]));
        let tester = TestGenerator::new(model, PromptBuilder::new(40_000), EventBus::default());
        let err = tester.generate("a.py", "x = 1\n").await.expect_err("empty");
        assert!(matches!(err, MissionError::ToolExecutionFailure { .. }));
    }
}
