//! Mission Conductor: runs pending tasks strictly in order, one mission at a time.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Map;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::core::plan_rules::RUN_TESTS;
use crate::error::MissionError;
use crate::events::{EventBus, MissionEvent};
use crate::executor::ToolExecutor;
use crate::mission_log::{MissionLog, TaskFilter};
use crate::task::{MissionState, Task, ToolCallSpec};

/// Task id reported when post-mission verification fails.
pub const VERIFICATION_TASK_ID: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConductorState {
    Idle,
    Running,
}

/// Result of a mission that drained the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionSummary {
    /// Ids of the tasks this run completed, in execution order.
    pub executed: Vec<u64>,
    pub state: MissionState,
}

/// Resets the conductor to idle when dropped, whatever way the run ends.
struct RunningGuard {
    state: Arc<Mutex<ConductorState>>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = ConductorState::Idle;
    }
}

pub struct Conductor {
    executor: Arc<ToolExecutor>,
    mission_log: Arc<MissionLog>,
    events: EventBus,
    verify_after_mission: bool,
    state: Arc<Mutex<ConductorState>>,
}

impl Conductor {
    pub fn new(executor: Arc<ToolExecutor>, mission_log: Arc<MissionLog>, events: EventBus) -> Self {
        let verify_after_mission = executor.context().config.verify_after_mission;
        Self {
            executor,
            mission_log,
            events,
            verify_after_mission,
            state: Arc::new(Mutex::new(ConductorState::Idle)),
        }
    }

    pub fn is_running(&self) -> bool {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) == ConductorState::Running
    }

    pub fn mission_log(&self) -> &Arc<MissionLog> {
        &self.mission_log
    }

    /// `Idle -> Running`, or `MissionInProgress` if a mission already holds the conductor.
    fn begin(&self) -> Result<RunningGuard, MissionError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == ConductorState::Running {
            return Err(MissionError::MissionInProgress);
        }
        *state = ConductorState::Running;
        Ok(RunningGuard {
            state: Arc::clone(&self.state),
        })
    }

    /// Execute every pending task in place.
    pub async fn run_mission(&self) -> Result<MissionSummary, MissionError> {
        let _guard = self.begin()?;
        self.execute_pending().await
    }

    /// Claim the conductor now and run the mission on a tokio task.
    pub fn dispatch_in_background(
        self: Arc<Self>,
    ) -> Result<JoinHandle<Result<MissionSummary, MissionError>>, MissionError> {
        let guard = self.begin()?;
        Ok(tokio::spawn(async move {
            let _guard = guard;
            self.execute_pending().await
        }))
    }

    #[instrument(skip_all)]
    async fn execute_pending(&self) -> Result<MissionSummary, MissionError> {
        let task_count = self.mission_log.get_tasks(TaskFilter::Pending).len();
        info!(task_count, "mission started");
        self.events.publish(MissionEvent::MissionStarted { task_count });

        let mut executed = Vec::new();
        // Re-read each round so tasks added by tools during the mission also run.
        while let Some(task) = self.next_pending() {
            let Some(call) = task.tool_call.as_ref() else {
                let reason = MissionError::InvalidInput(format!(
                    "task {} has no tool call to execute",
                    task.id
                ));
                return Err(self.abort(&task, reason.to_string()));
            };

            let outcome = self.executor.run(call).await;
            if !outcome.is_success() {
                return Err(self.abort(&task, outcome.message()));
            }
            if let Err(err) = self.mission_log.mark_done(task.id) {
                self.events.publish(MissionEvent::MissionFailed {
                    task_id: Some(task.id),
                    error: err.to_string(),
                });
                return Err(err);
            }
            executed.push(task.id);
        }

        if self.verify_after_mission {
            self.verify().await?;
        }

        info!(executed = executed.len(), "mission accomplished");
        self.events.publish(MissionEvent::MissionAccomplished {
            executed: executed.len(),
        });
        Ok(MissionSummary {
            executed,
            state: self.mission_log.mission_state(),
        })
    }

    fn next_pending(&self) -> Option<Task> {
        self.mission_log
            .get_tasks(TaskFilter::Pending)
            .into_iter()
            .next()
    }

    async fn verify(&self) -> Result<(), MissionError> {
        let call = ToolCallSpec::new(RUN_TESTS, Map::new());
        let outcome = self.executor.run(&call).await;
        if outcome.is_success() {
            return Ok(());
        }
        let task = Task {
            id: VERIFICATION_TASK_ID,
            description: "Post-mission verification: Run Tests".to_string(),
            done: false,
            tool_call: Some(call),
        };
        Err(self.abort(&task, outcome.message()))
    }

    fn abort(&self, task: &Task, error: String) -> MissionError {
        warn!(task_id = task.id, %error, "mission aborted");
        self.events.publish(MissionEvent::MissionFailed {
            task_id: Some(task.id),
            error: error.clone(),
        });
        MissionError::MissionAborted {
            task_id: task.id,
            description: task.description.clone(),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::events::drain;
    use crate::test_support::TestProject;
    use crate::tools::ToolRegistry;

    fn conductor_for(project: &TestProject) -> Conductor {
        let registry = Arc::new(ToolRegistry::with_builtins().expect("builtins"));
        let executor = Arc::new(ToolExecutor::new(registry, project.context(None)));
        Conductor::new(executor, Arc::clone(&project.mission_log), project.events.clone())
    }

    fn write(path: &str, content: &str) -> ToolCallSpec {
        ToolCallSpec::from_json("write_file", json!({ "path": path, "content": content }))
    }

    #[tokio::test]
    async fn empty_queue_is_immediate_success() {
        let project = TestProject::new();
        let conductor = conductor_for(&project);
        let mut events = project.events.subscribe();

        let summary = conductor.run_mission().await.expect("mission");

        assert!(summary.executed.is_empty());
        assert_eq!(summary.state, MissionState::Complete);
        assert_eq!(
            drain(&mut events),
            vec![
                MissionEvent::MissionStarted { task_count: 0 },
                MissionEvent::MissionAccomplished { executed: 0 },
            ]
        );
        assert!(!conductor.is_running());
    }

    #[tokio::test]
    async fn tasks_run_in_order_and_are_marked_done() {
        let project = TestProject::new();
        project.mission_log.set_policy(crate::core::test_policy::TestPolicy::disabled());
        project
            .mission_log
            .replace_all(vec![write("a.txt", "one\n"), write("b.txt", "two\n")])
            .expect("replace");
        let conductor = conductor_for(&project);

        let mut events = project.events.subscribe();
        let summary = conductor.run_mission().await.expect("mission");

        assert_eq!(summary.executed, vec![1, 2]);
        let tree_changes = drain(&mut events)
            .into_iter()
            .filter(|event| *event == MissionEvent::FileTreeChanged)
            .count();
        assert_eq!(tree_changes, 2);
        assert_eq!(summary.state, MissionState::Complete);
        assert_eq!(project.read("a.txt"), "one\n");
        assert_eq!(project.read("b.txt"), "two\n");
        assert!(project.mission_log.get_tasks(TaskFilter::Pending).is_empty());
    }

    #[tokio::test]
    async fn failure_stops_the_mission_and_leaves_later_tasks_pending() {
        let project = TestProject::new();
        project
            .mission_log
            .replace_all(vec![
                write("a.txt", "one\n"),
                ToolCallSpec::from_json("read_file", json!({ "path": "missing.txt" })),
                write("c.txt", "three\n"),
            ])
            .expect("replace");
        let conductor = conductor_for(&project);
        let mut events = project.events.subscribe();

        let err = conductor.run_mission().await.expect_err("aborts");

        match &err {
            MissionError::MissionAborted { task_id, error, .. } => {
                assert_eq!(*task_id, 2);
                assert!(error.starts_with("Error:"), "{error}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let tasks = project.mission_log.get_tasks(TaskFilter::All);
        assert!(tasks[0].done);
        assert!(!tasks[1].done);
        assert!(!tasks[2].done);
        assert!(!project.root().join("c.txt").exists());

        let events = drain(&mut events);
        assert!(events.iter().any(|event| matches!(
            event,
            MissionEvent::MissionFailed {
                task_id: Some(2),
                ..
            }
        )));
        assert!(
            !events
                .iter()
                .any(|event| matches!(event, MissionEvent::MissionAccomplished { .. }))
        );
        assert!(!conductor.is_running());
    }

    #[tokio::test]
    async fn task_without_tool_call_aborts() {
        let project = TestProject::new();
        project
            .mission_log
            .replace_with_descriptions(vec!["Create app.py".to_string()])
            .expect("replace");
        let conductor = conductor_for(&project);

        let err = conductor.run_mission().await.expect_err("aborts");

        assert!(matches!(err, MissionError::MissionAborted { task_id: 1, .. }));
        assert!(err.to_string().contains("no tool call"));
    }

    #[tokio::test]
    async fn dispatch_while_running_is_rejected() {
        let project = TestProject::new();
        let conductor = conductor_for(&project);

        let guard = conductor.begin().expect("claim");
        assert!(conductor.is_running());
        let err = conductor.run_mission().await.expect_err("busy");
        assert!(matches!(err, MissionError::MissionInProgress));

        drop(guard);
        assert!(!conductor.is_running());
        conductor.run_mission().await.expect("idle again");
    }

    #[tokio::test]
    async fn background_dispatch_claims_the_conductor_synchronously() {
        let project = TestProject::new();
        project
            .mission_log
            .replace_all(vec![write("a.txt", "one\n")])
            .expect("replace");
        let conductor = Arc::new(conductor_for(&project));

        let handle = Arc::clone(&conductor)
            .dispatch_in_background()
            .expect("dispatch");
        let err = conductor.run_mission().await.expect_err("busy");
        assert!(matches!(err, MissionError::MissionInProgress));

        let summary = handle.await.expect("join").expect("mission");
        assert!(summary.executed.contains(&1));
        assert!(!conductor.is_running());
    }
}
