//! Semantic invariants of a mission log.

use std::collections::HashSet;

use crate::task::Task;

/// Check invariants a persisted log must satisfy:
/// - ids are positive, unique, and strictly increasing in log order
/// - descriptions are non-empty
pub fn validate_task_log(tasks: &[Task]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    let mut prev: Option<u64> = None;

    for (index, task) in tasks.iter().enumerate() {
        if task.id == 0 {
            errors.push(format!("task[{index}]: id must be > 0"));
        }
        if !seen.insert(task.id) {
            errors.push(format!("task[{index}]: duplicate id {}", task.id));
        }
        if let Some(prev) = prev
            && task.id <= prev
        {
            errors.push(format!(
                "task[{index}]: id {} not greater than previous id {prev}",
                task.id
            ));
        }
        if task.description.trim().is_empty() {
            errors.push(format!("task {}: empty description", task.id));
        }
        prev = Some(task.id);
    }

    errors
}

/// Next id to assign: `max(existing ids) + 1`, or `1` for an empty log.
pub fn next_id(tasks: &[Task]) -> u64 {
    tasks.iter().map(|task| task.id).max().map_or(1, |max| max + 1)
}
