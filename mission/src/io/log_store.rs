//! Mission log persistence (`.mission/mission_log.json`) and the approved
//! plan awaiting dispatch (`.mission/plan.json`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::invariants::validate_task_log;
use crate::io::config::write_atomic;
use crate::task::{Plan, Task};

pub fn log_path(project_root: &Path) -> PathBuf {
    project_root.join(".mission").join("mission_log.json")
}

pub fn plan_path(project_root: &Path) -> PathBuf {
    project_root.join(".mission").join("plan.json")
}

/// A plan the user has seen but not yet dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovedPlan {
    pub goal: String,
    pub plan: Plan,
}

/// Load and validate a task log.
pub fn load_tasks(path: &Path) -> Result<Vec<Task>> {
    debug!(path = %path.display(), "loading mission log");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read mission log {}", path.display()))?;
    let tasks: Vec<Task> = serde_json::from_str(&contents)
        .with_context(|| format!("parse mission log {}", path.display()))?;
    let errors = validate_task_log(&tasks);
    if !errors.is_empty() {
        bail!(
            "invalid mission log {}:\n- {}",
            path.display(),
            errors.join("\n- ")
        );
    }
    debug!(count = tasks.len(), "mission log loaded");
    Ok(tasks)
}

/// Load a task log, treating a missing or unreadable file as empty.
pub fn load_tasks_or_empty(path: &Path) -> Vec<Task> {
    if !path.exists() {
        return Vec::new();
    }
    match load_tasks(path) {
        Ok(tasks) => tasks,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "mission log unreadable, starting empty");
            Vec::new()
        }
    }
}

/// Atomically write the task log (pretty JSON with trailing newline).
pub fn write_tasks(path: &Path, tasks: &[Task]) -> Result<()> {
    debug!(path = %path.display(), count = tasks.len(), "writing mission log");
    let mut buf = serde_json::to_string_pretty(tasks).context("serialize mission log")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Load the pending plan, if one was written.
pub fn load_plan(path: &Path) -> Result<Option<ApprovedPlan>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read plan {}", path.display()))?;
    let plan = serde_json::from_str(&contents)
        .with_context(|| format!("parse plan {}", path.display()))?;
    Ok(Some(plan))
}

pub fn write_plan(path: &Path, plan: &ApprovedPlan) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(plan).context("serialize plan")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Forget the pending plan. Missing files are fine.
pub fn remove_plan(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove plan {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::ToolCallSpec;
    use serde_json::json;

    fn sample() -> Vec<Task> {
        vec![
            Task {
                id: 1,
                description: "Write File: 'hello.py'".to_string(),
                done: true,
                tool_call: Some(ToolCallSpec::from_json(
                    "write_file",
                    json!({"path": "hello.py", "content": "print('hi')\n"}),
                )),
            },
            Task {
                id: 2,
                description: "Review the README".to_string(),
                done: false,
                tool_call: None,
            },
        ]
    }

    #[test]
    fn write_then_load_is_identical() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = log_path(temp.path());
        write_tasks(&path, &sample()).expect("write");
        let raw = fs::read_to_string(&path).expect("read");
        assert!(raw.ends_with('\n'));
        assert_eq!(load_tasks(&path).expect("load"), sample());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = log_path(temp.path());
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, "{not json").expect("write");
        assert!(load_tasks(&path).is_err());
        assert!(load_tasks_or_empty(&path).is_empty());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = log_path(temp.path());
        let mut tasks = sample();
        tasks[1].id = 1;
        write_tasks(&path, &tasks).expect("write");
        let err = load_tasks(&path).expect_err("invalid");
        assert!(format!("{err:#}").contains("duplicate id"));
    }

    #[test]
    fn plan_file_lifecycle() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = plan_path(temp.path());
        assert_eq!(load_plan(&path).expect("load"), None);

        let approved = ApprovedPlan {
            goal: "say hi".to_string(),
            plan: Plan {
                dependencies: vec!["flask".to_string()],
                files: vec![crate::task::PlannedFile {
                    filename: "app.py".to_string(),
                    purpose: "entry point".to_string(),
                }],
            },
        };
        write_plan(&path, &approved).expect("write");
        assert_eq!(load_plan(&path).expect("load"), Some(approved));

        remove_plan(&path).expect("remove");
        remove_plan(&path).expect("remove twice");
        assert_eq!(load_plan(&path).expect("load"), None);
    }
}
