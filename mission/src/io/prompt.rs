//! Prompt rendering for the mission agents.
//!
//! Templates are sectioned with `<!-- section:KEY required|droppable -->`
//! markers. When a rendered prompt exceeds the byte budget, droppable sections
//! go first in [`DROP_ORDER`], then the last section is truncated.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::Environment;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::core::types::FileDiff;
use crate::task::{Plan, PlannedFile};

const ARCHITECT_TEMPLATE: &str = include_str!("prompts/architect.md");
const MODIFY_TEMPLATE: &str = include_str!("prompts/modify.md");
const CODER_TEMPLATE: &str = include_str!("prompts/coder.md");
const TESTER_TEMPLATE: &str = include_str!("prompts/tester.md");
const FINALIZER_TEMPLATE: &str = include_str!("prompts/finalizer.md");
const REPAIR_TEMPLATE: &str = include_str!("prompts/repair.md");

/// Least critical first.
const DROP_ORDER: [&str; 5] = ["context", "repo_diff", "project_files", "existing", "goal"];

const TRUNCATION_MARKER: &str = "\n[truncated]";

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->").unwrap()
});

/// Which prompt to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Fresh build plan.
    Architect,
    /// Plan against an existing project.
    Modify,
    Coder,
    Tester,
    Finalizer,
    Repair,
}

impl PromptKind {
    fn template_name(self) -> &'static str {
        match self {
            Self::Architect => "architect",
            Self::Modify => "modify",
            Self::Coder => "coder",
            Self::Tester => "tester",
            Self::Finalizer => "finalizer",
            Self::Repair => "repair",
        }
    }
}

/// Everything a template may reference. Unused fields stay empty.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptInputs {
    pub goal: String,
    pub plan: Option<Plan>,
    /// File being generated or tested.
    pub target: Option<PlannedFile>,
    /// Current contents of `target`, if it exists.
    pub existing_content: Option<String>,
    /// Files generated earlier in the same cycle.
    pub context_files: BTreeMap<String, String>,
    /// Full source snapshot of the project.
    pub project_files: BTreeMap<String, String>,
    pub dependencies: Vec<String>,
    pub diffs: Vec<FileDiff>,
    /// Pretty JSON of the available tool schemas.
    pub tool_schemas: String,
    pub error_report: Option<String>,
    pub repo_diff: Option<String>,
}

struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        for (name, source) in [
            ("architect", ARCHITECT_TEMPLATE),
            ("modify", MODIFY_TEMPLATE),
            ("coder", CODER_TEMPLATE),
            ("tester", TESTER_TEMPLATE),
            ("finalizer", FINALIZER_TEMPLATE),
            ("repair", REPAIR_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("embedded prompt template should be valid");
        }
        Self { env }
    }

    fn render(&self, kind: PromptKind, inputs: &PromptInputs) -> Result<String> {
        let name = kind.template_name();
        let template = self.env.get_template(name)?;
        template
            .render(inputs)
            .with_context(|| format!("render {name} prompt"))
    }
}

#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    let markers: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::with_capacity(markers.len());

    for (index, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = markers
            .get(index + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |next| next.start());
        let content = rendered[whole.end()..end].trim().to_string();
        let required = kind.as_str() == "required";
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }

    sections
}

fn total_len(sections: &[ParsedSection]) -> usize {
    sections.iter().map(|section| section.content.len()).sum()
}

fn apply_budget(sections: &mut Vec<ParsedSection>, budget: usize) {
    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(index) = sections
            .iter()
            .position(|section| section.key == key && !section.required)
        {
            debug!(
                section = key,
                bytes_dropped = sections[index].content.len(),
                "dropped section for budget"
            );
            sections.remove(index);
        }
    }

    if total_len(sections) <= budget {
        return;
    }
    let Some((last, rest)) = sections.split_last_mut() else {
        return;
    };
    let allowed = budget.saturating_sub(total_len(rest));
    let before_len = last.content.len();
    if allowed > TRUNCATION_MARKER.len() {
        truncate_on_char_boundary(&mut last.content, allowed - TRUNCATION_MARKER.len());
        last.content.push_str(TRUNCATION_MARKER);
    } else {
        truncate_on_char_boundary(&mut last.content, allowed);
    }
    debug!(
        section = %last.key,
        before_len,
        after_len = last.content.len(),
        "truncated section for budget"
    );
}

fn truncate_on_char_boundary(text: &mut String, max_len: usize) {
    if text.len() <= max_len {
        return;
    }
    let mut cut = max_len;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|section| section.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds prompts within a byte budget.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    pub fn build(&self, kind: PromptKind, inputs: &PromptInputs) -> Result<PromptPack> {
        let rendered = PromptEngine::new().render(kind, inputs)?;
        let mut sections = parse_sections(&rendered);
        apply_budget(&mut sections, self.budget_bytes);
        Ok(PromptPack {
            content: render_sections(&sections),
        })
    }
}

/// A rendered prompt ready for a model.
#[derive(Debug, Clone)]
pub struct PromptPack {
    content: String,
}

impl PromptPack {
    pub fn as_str(&self) -> &str {
        &self.content
    }

    pub fn into_string(self) -> String {
        self.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::diff::diff_one;

    fn plan() -> Plan {
        Plan {
            dependencies: vec!["flask".to_string()],
            files: vec![
                PlannedFile {
                    filename: "app.py".to_string(),
                    purpose: "Flask app".to_string(),
                },
                PlannedFile {
                    filename: "util.py".to_string(),
                    purpose: "Helpers".to_string(),
                },
            ],
        }
    }

    /// Coder prompts list sections in a stable order.
    #[test]
    fn coder_sections_are_ordered() {
        let inputs = PromptInputs {
            goal: "serve hello".to_string(),
            plan: Some(plan()),
            target: plan().files.into_iter().nth(1),
            context_files: BTreeMap::from([("app.py".to_string(), "import util\n".to_string())]),
            ..PromptInputs::default()
        };
        let content = PromptBuilder::new(10_000)
            .build(PromptKind::Coder, &inputs)
            .expect("build")
            .into_string();

        let contract = content.find("### Coder Contract").expect("contract");
        let goal = content.find("### Goal").expect("goal");
        let plan_pos = content.find("### Build Plan").expect("plan");
        let target = content.find("### Target File").expect("target");
        let context = content.find("### Files Written So Far").expect("context");
        assert!(contract < goal && goal < plan_pos && plan_pos < target && target < context);
        assert!(content.contains("Dependencies: flask"));
        assert!(content.contains("util.py: Helpers"));
        assert!(!content.contains("### Current Contents"));
    }

    /// A tight budget drops rolling context before required sections.
    #[test]
    fn budget_drops_context_first() {
        let inputs = PromptInputs {
            goal: "serve hello".to_string(),
            plan: Some(plan()),
            target: plan().files.into_iter().next(),
            context_files: BTreeMap::from([("big.py".to_string(), "x = 1\n".repeat(500))]),
            ..PromptInputs::default()
        };
        let content = PromptBuilder::new(1_500)
            .build(PromptKind::Coder, &inputs)
            .expect("build")
            .into_string();
        assert!(!content.contains("### Files Written So Far"));
        assert!(content.contains("### Target File"));
        assert!(content.len() <= 1_500);
    }

    #[test]
    fn finalizer_renders_diffs_and_error_report() {
        let inputs = PromptInputs {
            dependencies: vec!["requests".to_string()],
            diffs: vec![diff_one("hello.py", "", "print('hi')\n").expect("diff")],
            tool_schemas: "[]".to_string(),
            error_report: Some("Task 2 failed".to_string()),
            ..PromptInputs::default()
        };
        let content = PromptBuilder::new(40_000)
            .build(PromptKind::Finalizer, &inputs)
            .expect("build")
            .into_string();
        assert!(content.contains("--- /dev/null"));
        assert!(content.contains("+++ b/hello.py"));
        assert!(content.contains("- requests"));
        assert!(content.contains("Task 2 failed"));
        let error = content.find("### Error Report").expect("error");
        let diffs = content.find("### Diffs").expect("diffs");
        assert!(error < diffs);
    }

    #[test]
    fn finalizer_omits_error_report_when_absent() {
        let content = PromptBuilder::new(40_000)
            .build(PromptKind::Finalizer, &PromptInputs::default())
            .expect("build")
            .into_string();
        assert!(!content.contains("### Error Report"));
        assert!(content.contains("(none)"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let mut text = "héllo".to_string();
        truncate_on_char_boundary(&mut text, 2);
        assert_eq!(text, "h");
    }
}
