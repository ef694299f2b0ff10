//! Plan Generator: goal in, declarative build plan out.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tracing::{info, instrument};

use super::{check_relative_filename, parse_reply};
use crate::error::MissionError;
use crate::events::{EventBus, MissionEvent};
use crate::io::model::{Role, TextCompletion};
use crate::io::prompt::{PromptBuilder, PromptInputs, PromptKind};
use crate::task::Plan;

pub struct PlanGenerator {
    model: Arc<dyn TextCompletion>,
    prompts: PromptBuilder,
    events: EventBus,
}

impl PlanGenerator {
    pub fn new(model: Arc<dyn TextCompletion>, prompts: PromptBuilder, events: EventBus) -> Self {
        Self {
            model,
            prompts,
            events,
        }
    }

    /// Plan for `goal`. A non-empty `existing` snapshot switches to modification mode.
    #[instrument(skip_all, fields(existing_files = existing.len()))]
    pub async fn generate(
        &self,
        goal: &str,
        existing: &BTreeMap<String, String>,
    ) -> Result<Plan, MissionError> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(MissionError::InvalidInput("goal must not be empty".to_string()));
        }
        let kind = if existing.is_empty() {
            PromptKind::Architect
        } else {
            PromptKind::Modify
        };
        self.events.publish(MissionEvent::status(
            Role::Architect.as_str(),
            "Drafting the build plan",
        ));
        let inputs = PromptInputs {
            goal: goal.to_string(),
            project_files: existing.clone(),
            ..PromptInputs::default()
        };
        let prompt = self.prompts.build(kind, &inputs)?;
        let response = self.model.complete(Role::Architect, prompt.as_str()).await?;
        let plan = normalize(parse_reply(Role::Architect, &response)?)?;

        info!(
            files = plan.files.len(),
            dependencies = plan.dependencies.len(),
            "plan generated"
        );
        self.events.publish(MissionEvent::status(
            Role::Architect.as_str(),
            format!("Plan ready: {} file(s)", plan.files.len()),
        ));
        Ok(plan)
    }
}

/// Trim names, drop duplicate files and dependencies, and reject empty plans.
fn normalize(mut plan: Plan) -> Result<Plan, MissionError> {
    let mut seen = HashSet::new();
    let mut files = Vec::with_capacity(plan.files.len());
    for mut file in plan.files {
        check_relative_filename(Role::Architect, &file.filename)?;
        file.filename = file.filename.trim().trim_start_matches("./").to_string();
        if seen.insert(file.filename.clone()) {
            files.push(file);
        }
    }
    plan.files = files;

    let mut seen = HashSet::new();
    plan.dependencies = plan
        .dependencies
        .into_iter()
        .map(|dep| dep.trim().to_string())
        .filter(|dep| !dep.is_empty() && seen.insert(dep.to_ascii_lowercase()))
        .collect();

    if plan.files.is_empty() {
        return Err(MissionError::PlanParseError(
            "architect reply lists no files".to_string(),
        ));
    }
    Ok(plan)
}
