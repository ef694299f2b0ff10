//! Code Generation Coordinator: one streamed completion per planned file.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use super::{check_relative_filename, collect_stream};
use crate::core::json_extract::strip_code_fence;
use crate::error::MissionError;
use crate::events::{EventBus, MissionEvent};
use crate::io::model::{Role, TextCompletion};
use crate::io::prompt::{PromptBuilder, PromptInputs, PromptKind};
use crate::task::Plan;

/// Dependency manifests are written by tools, not generated.
const SKIPPED_FILES: [&str; 1] = ["requirements.txt"];

pub struct CodeGenerator {
    model: Arc<dyn TextCompletion>,
    prompts: PromptBuilder,
    events: EventBus,
}

impl CodeGenerator {
    pub fn new(model: Arc<dyn TextCompletion>, prompts: PromptBuilder, events: EventBus) -> Self {
        Self {
            model,
            prompts,
            events,
        }
    }

    /// Generate every planned file in plan order.
    ///
    /// Each prompt sees the files generated before it; a modified file also
    /// sees its current contents. Any failure fails the whole batch.
    #[instrument(skip_all, fields(files = plan.files.len()))]
    pub async fn generate(
        &self,
        goal: &str,
        plan: &Plan,
        existing: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>, MissionError> {
        let targets: Vec<_> = plan
            .files
            .iter()
            .filter(|file| !SKIPPED_FILES.contains(&file.filename.as_str()))
            .collect();
        let total = targets.len();
        let mut generated = BTreeMap::new();

        for (index, target) in targets.into_iter().enumerate() {
            check_relative_filename(Role::Coder, &target.filename)?;
            let filename = target.filename.clone();
            self.events.publish(MissionEvent::status(
                Role::Coder.as_str(),
                format!("Writing {filename} ({}/{total})", index + 1),
            ));
            let inputs = PromptInputs {
                goal: goal.to_string(),
                plan: Some(plan.clone()),
                target: Some(target.clone()),
                existing_content: existing.get(&filename).cloned(),
                context_files: generated.clone(),
                ..PromptInputs::default()
            };
            let prompt = self.prompts.build(PromptKind::Coder, &inputs)?;
            let raw = collect_stream(self.model.as_ref(), Role::Coder, prompt.as_str(), |chunk| {
                self.events.publish(MissionEvent::CodeChunk {
                    filename: filename.clone(),
                    chunk: chunk.to_string(),
                });
            })
            .await?;
            let content = finish_file(&raw);
            debug!(file = %filename, bytes = content.len(), "file generated");
            generated.insert(filename, content);
        }

        info!(count = generated.len(), "code generation complete");
        Ok(generated)
    }
}

/// Strip Markdown fences and end non-empty files with a newline.
pub(crate) fn finish_file(raw: &str) -> String {
    let mut content = strip_code_fence(raw);
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content
}
