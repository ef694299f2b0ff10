//! Self-correction tests: bounded repair cycles through the public pipeline.

use std::sync::Arc;

use mission::core::test_policy::TestPolicy;
use mission::error::MissionError;
use mission::events::{EventBus, MissionEvent, drain};
use mission::io::config::MissionConfig;
use mission::io::model::{Role, TextCompletion};
use mission::mission_log::TaskFilter;
use mission::pipeline::Pipeline;
use mission::task::ToolCallSpec;
use mission::test_support::ScriptedModel;
use serde_json::json;

fn config() -> MissionConfig {
    MissionConfig {
        tests: TestPolicy::disabled(),
        ..MissionConfig::default()
    }
}

fn repair_reply(version: u32) -> String {
    json!({"files": {"app.py": format!("VERSION = {version}\n")}, "dependencies": []}).to_string()
}

/// The repaired plan rewrites `app.py` but still reads a file that never exists.
fn finalizer_reply(version: u32) -> String {
    json!({"plan": [
        {"tool_name": "write_file", "arguments": {"path": "app.py", "content": format!("VERSION = {version}\n")}},
        {"tool_name": "read_file", "arguments": {"path": "missing.py"}},
    ]})
    .to_string()
}

/// Three failures with a ceiling of two: two repair cycles, then terminal failure.
#[tokio::test]
async fn repeated_failures_exhaust_the_retry_ceiling() {
    let temp = tempfile::tempdir().expect("tempdir");
    let model = Arc::new(ScriptedModel::new([
        repair_reply(1),
        finalizer_reply(1),
        repair_reply(2),
        finalizer_reply(2),
    ]));
    let events = EventBus::default();
    let mut receiver = events.subscribe();
    let pipeline = Pipeline::with_parts(
        temp.path(),
        config(),
        Some(model.clone() as Arc<dyn TextCompletion>),
        events,
    )
    .expect("pipeline");
    pipeline
        .mission_log()
        .replace_all(vec![ToolCallSpec::from_json(
            "read_file",
            json!({"path": "missing.py"}),
        )])
        .expect("seed");

    let err = pipeline.run().await.expect_err("exhausted");

    let MissionError::SelfCorrectionExhausted { attempts, report } = err else {
        panic!("expected exhaustion");
    };
    assert_eq!(attempts, 2);
    assert!(report.contains("missing.py"), "{report}");
    assert_eq!(pipeline.corrector().fix_attempt_count(), 3);
    assert_eq!(model.remaining(), 0);

    let roles: Vec<Role> = model.prompts().into_iter().map(|(role, _)| role).collect();
    assert_eq!(
        roles,
        vec![Role::Repair, Role::Finalizer, Role::Repair, Role::Finalizer]
    );
    let second_finalizer_prompt = &model.prompts()[3].1;
    assert!(second_finalizer_prompt.contains("### Error Report"));

    // The log still shows the second repair plan as the last failure left it.
    let tasks = pipeline.mission_log().get_tasks(TaskFilter::All);
    assert_eq!(tasks.len(), 2);
    assert!(tasks[0].done);
    assert!(!tasks[1].done);
    let root = temp.path().canonicalize().expect("canonical");
    assert_eq!(
        std::fs::read_to_string(root.join("app.py")).expect("app.py"),
        "VERSION = 2\n"
    );

    let events = drain(&mut receiver);
    let corrections: Vec<&MissionEvent> = events
        .iter()
        .filter(|event| {
            matches!(
                event,
                MissionEvent::SelfCorrectionStarted { .. }
                    | MissionEvent::SelfCorrectionExhausted { .. }
            )
        })
        .collect();
    assert_eq!(corrections.len(), 4);
    assert_eq!(
        corrections[0],
        &MissionEvent::SelfCorrectionStarted {
            attempt: 1,
            max_attempts: 2
        }
    );
    // Every failure is announced, including the one that exceeds the ceiling.
    assert_eq!(
        corrections[2],
        &MissionEvent::SelfCorrectionStarted {
            attempt: 3,
            max_attempts: 2
        }
    );
    assert!(matches!(
        corrections[3],
        MissionEvent::SelfCorrectionExhausted { attempts: 2, .. }
    ));
    let failures = events
        .iter()
        .filter(|event| matches!(event, MissionEvent::MissionFailed { .. }))
        .count();
    assert_eq!(failures, 3);
}

/// One failure, one repair, and the re-dispatched plan succeeds.
#[tokio::test]
async fn single_repair_recovers_the_mission() {
    let temp = tempfile::tempdir().expect("tempdir");
    let model = Arc::new(ScriptedModel::new([
        repair_reply(1),
        json!({"plan": [
            {"tool_name": "write_file", "arguments": {"path": "app.py", "content": "VERSION = 1\n"}},
        ]})
        .to_string(),
    ]));
    let pipeline = Pipeline::with_parts(
        temp.path(),
        config(),
        Some(model as Arc<dyn TextCompletion>),
        EventBus::default(),
    )
    .expect("pipeline");
    pipeline
        .mission_log()
        .replace_all(vec![ToolCallSpec::from_json(
            "read_file",
            json!({"path": "missing.py"}),
        )])
        .expect("seed");

    let summary = pipeline.run().await.expect("repaired");

    assert_eq!(summary.executed, vec![1]);
    assert_eq!(pipeline.corrector().fix_attempt_count(), 1);
    assert!(
        pipeline
            .mission_log()
            .get_tasks(TaskFilter::Pending)
            .is_empty()
    );
}

/// Without a model the first repair attempt is still counted before it aborts.
#[tokio::test]
async fn repair_without_model_counts_then_aborts() {
    let temp = tempfile::tempdir().expect("tempdir");
    let pipeline =
        Pipeline::with_parts(temp.path(), config(), None, EventBus::default()).expect("pipeline");
    pipeline
        .mission_log()
        .replace_all(vec![ToolCallSpec::from_json(
            "read_file",
            json!({"path": "missing.py"}),
        )])
        .expect("seed");

    let err = pipeline.run().await.expect_err("no model");

    assert!(matches!(err, MissionError::Collaborator(_)));
    assert_eq!(pipeline.corrector().fix_attempt_count(), 1);
    assert_eq!(pipeline.mission_log().get_tasks(TaskFilter::All).len(), 1);
}
