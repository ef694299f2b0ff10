//! End-to-end mission tests driven through the public pipeline.
//!
//! A scripted model stands in for every agent, so each test spells out the
//! exact replies the architect, coder, finalizer, and tester give.

use std::fs;
use std::sync::Arc;

use mission::error::MissionError;
use mission::events::{EventBus, MissionEvent, drain};
use mission::io::config::MissionConfig;
use mission::io::log_store::{load_tasks, log_path, plan_path};
use mission::io::model::{Role, TextCompletion};
use mission::mission_log::TaskFilter;
use mission::pipeline::Pipeline;
use mission::task::{MissionState, ToolCallSpec};
use mission::test_support::ScriptedModel;
use serde_json::json;

fn pipeline(
    root: &std::path::Path,
    config: MissionConfig,
    model: Option<Arc<ScriptedModel>>,
    events: &EventBus,
) -> Pipeline {
    Pipeline::with_parts(
        root,
        config,
        model.map(|model| model as Arc<dyn TextCompletion>),
        events.clone(),
    )
    .expect("pipeline")
}

/// Goal -> plan -> approval -> generated code -> tool plan -> executed tasks.
///
/// Model replies, in order:
/// 1. Architect: one file, `hello.py`.
/// 2. Coder: the file body (streamed).
/// 3. Finalizer: a single `write_file` step.
/// 4. Tester: tests for `hello.py`, requested by the auto-inserted follow-up task.
#[tokio::test]
async fn hello_world_goal_runs_to_completion() {
    let temp = tempfile::tempdir().expect("tempdir");
    let model = Arc::new(
        ScriptedModel::new([
            json!({"files": [{"filename": "hello.py", "purpose": "prints a greeting"}]}).to_string(),
            "```python\nprint('Hello, World!')\n```".to_string(),
            json!({"plan": [{
                "tool_name": "write_file",
                "arguments": {"path": "hello.py", "content": "print('Hello, World!')\n"}
            }]})
            .to_string(),
            "import subprocess\n\ndef test_hello():\n    assert True\n".to_string(),
        ])
        .with_chunk_size(8),
    );
    let events = EventBus::default();
    let mut receiver = events.subscribe();
    let pipeline = pipeline(temp.path(), MissionConfig::default(), Some(model.clone()), &events);

    let plan = pipeline.plan("Write a hello world script").await.expect("plan");
    assert_eq!(plan.files[0].filename, "hello.py");
    let review = pipeline.mission_log().get_tasks(TaskFilter::All);
    assert_eq!(review[0].description, "Create 'hello.py': prints a greeting");
    assert!(review.iter().all(|task| !task.done));
    assert!(pipeline.has_pending_plan().expect("plan file"));

    let summary = pipeline.dispatch().await.expect("mission");

    assert_eq!(summary.state, MissionState::Complete);
    assert_eq!(summary.executed, vec![1, 2]);
    let root = temp.path().canonicalize().expect("canonical");
    assert_eq!(
        fs::read_to_string(root.join("hello.py")).expect("hello.py"),
        "print('Hello, World!')\n"
    );
    assert!(
        fs::read_to_string(root.join("tests/test_hello.py"))
            .expect("tests")
            .contains("def test_hello")
    );

    let roles: Vec<Role> = model.prompts().into_iter().map(|(role, _)| role).collect();
    assert_eq!(
        roles,
        vec![Role::Architect, Role::Coder, Role::Finalizer, Role::Tester]
    );

    let persisted = load_tasks(&log_path(&root)).expect("persisted log");
    assert_eq!(persisted, pipeline.mission_log().get_tasks(TaskFilter::All));
    assert!(persisted.iter().all(|task| task.done));
    assert!(!plan_path(&root).exists());

    let events = drain(&mut receiver);
    assert!(events.contains(&MissionEvent::MissionStarted { task_count: 2 }));
    assert!(events.contains(&MissionEvent::MissionAccomplished { executed: 2 }));
    assert!(events.iter().any(|event| matches!(
        event,
        MissionEvent::CodeChunk { filename, .. } if filename == "hello.py"
    )));
}

/// Task 2 of 3 fails: task 1 stays done, tasks 2 and 3 stay pending, and
/// task 3's side effect never happens.
#[tokio::test]
async fn failing_middle_task_stops_the_mission() {
    let temp = tempfile::tempdir().expect("tempdir");
    let events = EventBus::default();
    let pipeline = pipeline(temp.path(), MissionConfig::default(), None, &events);
    pipeline
        .mission_log()
        .replace_all(vec![
            ToolCallSpec::from_json("write_file", json!({"path": "one.txt", "content": "1\n"})),
            ToolCallSpec::from_json("delete_file", json!({"path": "missing.txt"})),
            ToolCallSpec::from_json("write_file", json!({"path": "three.txt", "content": "3\n"})),
        ])
        .expect("seed");

    let err = pipeline.conductor().run_mission().await.expect_err("aborted");

    let MissionError::MissionAborted {
        task_id,
        description,
        error,
    } = err
    else {
        panic!("expected an aborted mission");
    };
    assert_eq!(task_id, 2);
    assert_eq!(description, "Delete File: 'missing.txt'");
    assert!(error.contains("does not exist"), "{error}");

    let done: Vec<bool> = pipeline
        .mission_log()
        .get_tasks(TaskFilter::All)
        .iter()
        .map(|task| task.done)
        .collect();
    assert_eq!(done, vec![true, false, false]);
    let root = temp.path().canonicalize().expect("canonical");
    assert!(root.join("one.txt").exists());
    assert!(!root.join("three.txt").exists());
    assert_eq!(pipeline.mission_log().mission_state(), MissionState::Pending);
}

#[tokio::test]
async fn reopening_a_project_restores_its_log() {
    let temp = tempfile::tempdir().expect("tempdir");
    let events = EventBus::default();
    {
        let first = pipeline(temp.path(), MissionConfig::default(), None, &events);
        first.mission_log().add_task("Review README", None).expect("add");
        first.mission_log().add_task("Tidy imports", None).expect("add");
        first.mission_log().mark_done(1).expect("mark");
    }

    let reopened = pipeline(temp.path(), MissionConfig::default(), None, &events);
    let tasks = reopened.mission_log().get_tasks(TaskFilter::All);
    assert_eq!(tasks.len(), 2);
    assert!(tasks[0].done);
    let next = reopened.mission_log().add_task("Write docs", None).expect("add");
    assert_eq!(next.id, 3);
}

#[tokio::test]
async fn empty_goal_is_rejected_before_the_model_is_asked() {
    let temp = tempfile::tempdir().expect("tempdir");
    let model = Arc::new(ScriptedModel::new(["unused"]));
    let events = EventBus::default();
    let pipeline = pipeline(temp.path(), MissionConfig::default(), Some(model.clone()), &events);

    let err = pipeline.plan("   ").await.expect_err("empty goal");

    assert!(matches!(err, MissionError::InvalidInput(_)));
    assert_eq!(model.remaining(), 1);
}
