//! Deterministic checks applied to finalizer tool plans.

use crate::core::types::{DiffKind, FileDiff};
use crate::task::ToolCallSpec;

pub const WRITE_FILE: &str = "write_file";
pub const REPLACE_IN_FILE: &str = "replace_in_file";
pub const DELETE_FILE: &str = "delete_file";
pub const ADD_DEPENDENCY: &str = "add_dependency_to_requirements";
pub const INSTALL_DEPENDENCIES: &str = "install_dependencies";
pub const RUN_TESTS: &str = "run_tests";

/// Tools that rewrite the content of the file named by their `path`.
const CONTENT_EDITS: &[&str] = &[WRITE_FILE, REPLACE_IN_FILE, DELETE_FILE];

fn edits_content(tool_name: &str) -> bool {
    CONTENT_EDITS.contains(&tool_name)
}

/// Ordering phase of a plan step. Plans must be non-decreasing in phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StepPhase {
    Delete,
    Dependency,
    Write,
    Verify,
}

pub fn phase_of(tool_name: &str) -> StepPhase {
    match tool_name {
        DELETE_FILE => StepPhase::Delete,
        ADD_DEPENDENCY => StepPhase::Dependency,
        INSTALL_DEPENDENCIES | RUN_TESTS => StepPhase::Verify,
        _ => StepPhase::Write,
    }
}

/// Steps that appear after a step of a later phase.
///
/// Policy: deletions, then dependency additions, then writes, then verification.
pub fn ordering_violations(plan: &[ToolCallSpec]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut highest = StepPhase::Delete;
    for (index, step) in plan.iter().enumerate() {
        let phase = phase_of(&step.tool_name);
        if phase < highest {
            errors.push(format!(
                "step {index} ('{}') is a {phase:?} step after a {highest:?} step",
                step.tool_name
            ));
        } else {
            highest = phase;
        }
    }
    errors
}

/// Content edits that use the wrong tool for the kind of change their file underwent.
///
/// Created files must be written whole; emptied files must be deleted. Steps
/// that only read a file or derive another one from it are not edits.
pub fn diff_rule_violations(plan: &[ToolCallSpec], diffs: &[FileDiff]) -> Vec<String> {
    let mut errors = Vec::new();
    for diff in diffs {
        let required = match diff.kind {
            DiffKind::Created => WRITE_FILE,
            DiffKind::Deleted => DELETE_FILE,
            DiffKind::Modified => continue,
        };
        for (index, step) in plan.iter().enumerate() {
            if edits_content(&step.tool_name)
                && step_targets(step, &diff.filename)
                && step.tool_name != required
            {
                errors.push(format!(
                    "step {index} uses '{}' on {:?} file '{}' (expected '{required}')",
                    step.tool_name, diff.kind, diff.filename
                ));
            }
        }
    }
    errors
}

/// Diffs that no content edit in the plan applies.
pub fn unaddressed_diffs<'a>(plan: &[ToolCallSpec], diffs: &'a [FileDiff]) -> Vec<&'a str> {
    diffs
        .iter()
        .filter(|diff| {
            !plan
                .iter()
                .any(|step| edits_content(&step.tool_name) && step_targets(step, &diff.filename))
        })
        .map(|diff| diff.filename.as_str())
        .collect()
}

fn step_targets(step: &ToolCallSpec, filename: &str) -> bool {
    step.str_arg("path")
        .is_some_and(|path| normalize(path) == normalize(filename))
}

fn normalize(path: &str) -> &str {
    path.trim().trim_start_matches("./")
}
