//! Repair agent: proposes corrected file contents after a failed mission.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, instrument};

use super::{check_relative_filename, coder::finish_file, parse_reply};
use crate::error::MissionError;
use crate::events::{EventBus, MissionEvent};
use crate::io::model::{Role, TextCompletion};
use crate::io::prompt::{PromptBuilder, PromptInputs, PromptKind};

/// Corrected files (empty content means delete) and required dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RepairProposal {
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// What the repair agent knows about the failure.
#[derive(Debug, Clone, Copy)]
pub struct RepairContext<'a> {
    pub error_report: &'a str,
    pub goal: Option<&'a str>,
    pub repo_diff: &'a str,
    pub snapshot: &'a BTreeMap<String, String>,
}

pub struct RepairAgent {
    model: Arc<dyn TextCompletion>,
    prompts: PromptBuilder,
    events: EventBus,
}

impl RepairAgent {
    pub fn new(model: Arc<dyn TextCompletion>, prompts: PromptBuilder, events: EventBus) -> Self {
        Self {
            model,
            prompts,
            events,
        }
    }

    #[instrument(skip_all, fields(snapshot = context.snapshot.len()))]
    pub async fn propose(&self, context: RepairContext<'_>) -> Result<RepairProposal, MissionError> {
        self.events.publish(MissionEvent::status(
            Role::Repair.as_str(),
            "Diagnosing the failure",
        ));
        let inputs = PromptInputs {
            goal: context.goal.unwrap_or_default().to_string(),
            error_report: Some(context.error_report.to_string()),
            repo_diff: (!context.repo_diff.trim().is_empty()).then(|| context.repo_diff.to_string()),
            project_files: context.snapshot.clone(),
            ..PromptInputs::default()
        };
        let prompt = self.prompts.build(PromptKind::Repair, &inputs)?;
        let response = self.model.complete(Role::Repair, prompt.as_str()).await?;
        let mut proposal: RepairProposal = parse_reply(Role::Repair, &response)?;

        for filename in proposal.files.keys() {
            check_relative_filename(Role::Repair, filename)?;
        }
        proposal.files = proposal
            .files
            .into_iter()
            .map(|(name, content)| {
                let name = name.trim().trim_start_matches("./").to_string();
                let content = if content.trim().is_empty() {
                    String::new()
                } else {
                    finish_file(&content)
                };
                (name, content)
            })
            .collect();
        if proposal.files.is_empty() && proposal.dependencies.is_empty() {
            return Err(MissionError::PlanParseError(
                "repair reply proposes no changes".to_string(),
            ));
        }
        info!(
            files = proposal.files.len(),
            dependencies = proposal.dependencies.len(),
            "repair proposed"
        );
        Ok(proposal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedModel;

    fn agent(model: Arc<ScriptedModel>) -> RepairAgent {
        RepairAgent::new(model, PromptBuilder::new(40_000), EventBus::default())
    }

    #[tokio::test]
    async fn proposal_carries_files_and_prompt_carries_report() {
        let model = Arc::new(ScriptedModel::new([
            r#"{"files": {"./app.py": "print('fixed')", "old.py": ""}, "dependencies": ["flask"]}"#,
        ]));
        let snapshot = BTreeMap::from([("app.py".to_string(), "print(broken\n".to_string())]);
        let proposal = agent(model.clone())
            .propose(RepairContext {
                error_report: "Task 3 ('Run Tests') failed.\n\nSyntaxError",
                goal: Some("say hi"),
                repo_diff: "",
                snapshot: &snapshot,
            })
            .await
            .expect("proposal");

        assert_eq!(proposal.files["app.py"], "print('fixed')\n");
        assert_eq!(proposal.files["old.py"], "");
        assert_eq!(proposal.dependencies, vec!["flask"]);
        let prompt = &model.prompts()[0].1;
        assert!(prompt.contains("SyntaxError"));
        assert!(prompt.contains("print(broken"));
        assert!(!prompt.contains("### Uncommitted Changes"));
    }

    #[tokio::test]
    async fn empty_proposal_is_rejected() {
        let model = Arc::new(ScriptedModel::new([r#"{"files": {}}"#]));
        let snapshot = BTreeMap::new();
        let err = agent(model)
            .propose(RepairContext {
                error_report: "boom",
                goal: None,
                repo_diff: "",
                snapshot: &snapshot,
            })
            .await
            .expect_err("empty");
        assert!(matches!(err, MissionError::PlanParseError(_)));
    }
}
