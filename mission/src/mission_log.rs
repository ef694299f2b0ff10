//! The durable, ordered task list of the active project.
//!
//! Every mutation runs under one mutex: build the new task list, persist it,
//! commit it in memory, then notify. A failed write leaves the log unchanged.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::invariants::next_id;
use crate::core::summary::summarize_tool_call;
use crate::core::test_policy::TestPolicy;
use crate::error::MissionError;
use crate::events::{EventBus, MissionEvent};
use crate::io::log_store::{load_tasks_or_empty, log_path, write_tasks};
use crate::task::{MissionState, Task, ToolCallSpec};

/// Which tasks `get_tasks` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskFilter {
    #[default]
    All,
    Pending,
    Done,
}

impl TaskFilter {
    fn accepts(self, task: &Task) -> bool {
        match self {
            Self::All => true,
            Self::Pending => !task.done,
            Self::Done => task.done,
        }
    }
}

#[derive(Debug)]
struct LogState {
    tasks: Vec<Task>,
    next_id: u64,
    /// `None` while detached from any project.
    path: Option<PathBuf>,
    policy: TestPolicy,
}

/// Mission Log service shared by the conductor, tools, and pipeline.
#[derive(Debug)]
pub struct MissionLog {
    state: Mutex<LogState>,
    events: EventBus,
}

impl MissionLog {
    /// Detached, empty log.
    pub fn new(events: EventBus, policy: TestPolicy) -> Self {
        Self {
            state: Mutex::new(LogState {
                tasks: Vec::new(),
                next_id: 1,
                path: None,
                policy,
            }),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reload from `<root>/.mission/mission_log.json`. Missing or corrupt files load empty.
    #[instrument(skip_all, fields(root = %project_root.display()))]
    pub fn load_for_project(&self, project_root: &Path) -> usize {
        let path = log_path(project_root);
        let tasks = load_tasks_or_empty(&path);
        let count = tasks.len();
        {
            let mut state = self.lock();
            state.next_id = next_id(&tasks);
            state.tasks = tasks;
            state.path = Some(path);
            info!(count, next_id = state.next_id, "mission log loaded");
        }
        self.events.publish(MissionEvent::LogLoaded { count });
        count
    }

    /// Forget the project file; the log keeps working in memory only.
    pub fn detach(&self) {
        {
            let mut state = self.lock();
            state.path = None;
            state.tasks.clear();
            state.next_id = 1;
        }
        info!("mission log detached");
        self.events.publish(MissionEvent::LogLoaded { count: 0 });
    }

    pub fn set_policy(&self, policy: TestPolicy) {
        self.lock().policy = policy;
    }

    pub fn project_file(&self) -> Option<PathBuf> {
        self.lock().path.clone()
    }

    /// Append a task, plus its test follow-up when the policy applies.
    ///
    /// Both tasks are persisted in one write.
    #[instrument(skip_all, fields(description = %description))]
    pub fn add_task(
        &self,
        description: &str,
        tool_call: Option<ToolCallSpec>,
    ) -> Result<Task, MissionError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(MissionError::InvalidInput(
                "task description must not be empty".to_string(),
            ));
        }

        let mut state = self.lock();
        let mut tasks = state.tasks.clone();
        let mut next = state.next_id;
        let first_new = tasks.len();
        push_with_follow_up(&mut tasks, &mut next, &state.policy, description, tool_call);

        persist(&state, &tasks)?;
        let added: Vec<Task> = tasks[first_new..].to_vec();
        let primary = added[0].clone();
        state.tasks = tasks;
        state.next_id = next;
        debug!(added = added.len(), "tasks added");
        for task in added {
            self.events.publish(MissionEvent::TaskAdded { task });
        }
        Ok(primary)
    }

    /// Mark `id` done. Idempotent; `false` only when the id does not exist.
    pub fn mark_done(&self, id: u64) -> Result<bool, MissionError> {
        let mut state = self.lock();
        let Some(index) = state.tasks.iter().position(|task| task.id == id) else {
            return Ok(false);
        };
        if state.tasks[index].done {
            return Ok(true);
        }
        let mut tasks = state.tasks.clone();
        tasks[index].done = true;
        persist(&state, &tasks)?;
        state.tasks = tasks;
        self.events.publish(MissionEvent::TaskDone { task_id: id });
        Ok(true)
    }

    /// Remove `id`. Ids are never reused afterwards.
    pub fn remove_task(&self, id: u64) -> Result<bool, MissionError> {
        let mut state = self.lock();
        if !state.tasks.iter().any(|task| task.id == id) {
            return Ok(false);
        }
        let tasks: Vec<Task> = state
            .tasks
            .iter()
            .filter(|task| task.id != id)
            .cloned()
            .collect();
        persist(&state, &tasks)?;
        state.tasks = tasks;
        self.events.publish(MissionEvent::TaskRemoved { task_id: id });
        Ok(true)
    }

    /// Snapshot of the tasks in log order.
    pub fn get_tasks(&self, filter: TaskFilter) -> Vec<Task> {
        self.lock()
            .tasks
            .iter()
            .filter(|task| filter.accepts(task))
            .cloned()
            .collect()
    }

    /// Swap the whole log for one task per tool call, ids restarting at 1.
    #[instrument(skip_all, fields(steps = plan.len()))]
    pub fn replace_all(&self, plan: Vec<ToolCallSpec>) -> Result<(), MissionError> {
        let entries = plan
            .into_iter()
            .map(|call| (summarize_tool_call(&call), Some(call)))
            .collect();
        self.replace_entries(entries)
    }

    /// Swap the whole log for human-readable tasks without tool calls.
    pub fn replace_with_descriptions(&self, descriptions: Vec<String>) -> Result<(), MissionError> {
        if let Some(blank) = descriptions.iter().position(|d| d.trim().is_empty()) {
            return Err(MissionError::InvalidInput(format!(
                "task description {blank} is empty"
            )));
        }
        self.replace_entries(descriptions.into_iter().map(|d| (d, None)).collect())
    }

    fn replace_entries(&self, entries: Vec<(String, Option<ToolCallSpec>)>) -> Result<(), MissionError> {
        let mut state = self.lock();
        let mut tasks = Vec::with_capacity(entries.len());
        let mut next = 1;
        for (description, tool_call) in entries {
            push_with_follow_up(&mut tasks, &mut next, &state.policy, description.trim(), tool_call);
        }
        persist(&state, &tasks)?;
        let count = tasks.len();
        state.tasks = tasks;
        state.next_id = next;
        info!(count, "mission log replaced");
        self.events.publish(MissionEvent::LogReplaced { count });
        Ok(())
    }

    /// Empty the log and restart ids at 1. No-op when already empty.
    pub fn clear(&self) -> Result<(), MissionError> {
        let mut state = self.lock();
        if state.tasks.is_empty() {
            return Ok(());
        }
        persist(&state, &[])?;
        state.tasks.clear();
        state.next_id = 1;
        self.events.publish(MissionEvent::LogCleared);
        Ok(())
    }

    pub fn mission_state(&self) -> MissionState {
        MissionState::of(&self.lock().tasks)
    }

    /// Markdown checklist of the log.
    pub fn render_markdown(&self) -> String {
        let state = self.lock();
        if state.tasks.is_empty() {
            return "Mission log is empty.".to_string();
        }
        let mut out = String::from("# Mission Log\n\n");
        for task in &state.tasks {
            let mark = if task.done { 'x' } else { ' ' };
            out.push_str(&format!("- [{mark}] {}. {}\n", task.id, task.description));
        }
        out
    }
}

fn push_with_follow_up(
    tasks: &mut Vec<Task>,
    next: &mut u64,
    policy: &TestPolicy,
    description: &str,
    tool_call: Option<ToolCallSpec>,
) {
    let follow_up = policy.follow_up_for(description);
    tasks.push(Task {
        id: *next,
        description: description.to_string(),
        done: false,
        tool_call,
    });
    *next += 1;
    if let Some(follow_up) = follow_up {
        tasks.push(Task {
            id: *next,
            description: follow_up.description,
            done: false,
            tool_call: Some(follow_up.tool_call),
        });
        *next += 1;
    }
}

fn persist(state: &LogState, tasks: &[Task]) -> Result<(), MissionError> {
    match &state.path {
        Some(path) => write_tasks(path, tasks).map_err(MissionError::from),
        None => {
            warn!("no active project, mission log not saved");
            Ok(())
        }
    }
}
