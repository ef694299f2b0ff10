//! Tools that read and edit the Mission Log itself.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::{Collaborator, Tool, ToolContext, ToolDescriptor, object_schema, str_arg};
use crate::core::types::ToolOutput;

fn task_id_arg(arguments: &Map<String, Value>) -> Result<u64> {
    arguments
        .get("task_id")
        .and_then(Value::as_u64)
        .ok_or_else(|| anyhow!("missing integer argument 'task_id'"))
}

fn task_id_schema() -> Value {
    object_schema(
        json!({ "task_id": { "type": "integer", "minimum": 1 } }),
        &["task_id"],
    )
}

pub struct AddTaskToMissionLog;

#[async_trait]
impl Tool for AddTaskToMissionLog {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "add_task_to_mission_log",
            description: "Append a human-readable task to the Mission Log.",
            parameters: object_schema(
                json!({ "description": { "type": "string", "minLength": 1 } }),
                &["description"],
            ),
            needs: &[Collaborator::MissionLog],
            modifies_files: false,
        }
    }

    async fn call(&self, ctx: &ToolContext, arguments: Map<String, Value>) -> Result<ToolOutput> {
        let description = str_arg(&arguments, "description")?;
        let task = ctx.mission_log.add_task(description, None)?;
        Ok(ToolOutput::text(format!(
            "Added task {}: {}",
            task.id, task.description
        )))
    }
}

pub struct MarkTaskAsDone;

#[async_trait]
impl Tool for MarkTaskAsDone {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "mark_task_as_done",
            description: "Mark a Mission Log task as done.",
            parameters: task_id_schema(),
            needs: &[Collaborator::MissionLog],
            modifies_files: false,
        }
    }

    async fn call(&self, ctx: &ToolContext, arguments: Map<String, Value>) -> Result<ToolOutput> {
        let id = task_id_arg(&arguments)?;
        if ctx.mission_log.mark_done(id)? {
            Ok(ToolOutput::text(format!("Task {id} marked as done.")))
        } else {
            Ok(ToolOutput::error(format!("task {id} not found")))
        }
    }
}

pub struct RemoveTask;

#[async_trait]
impl Tool for RemoveTask {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "remove_task",
            description: "Remove a task from the Mission Log.",
            parameters: task_id_schema(),
            needs: &[Collaborator::MissionLog],
            modifies_files: false,
        }
    }

    async fn call(&self, ctx: &ToolContext, arguments: Map<String, Value>) -> Result<ToolOutput> {
        let id = task_id_arg(&arguments)?;
        if ctx.mission_log.remove_task(id)? {
            Ok(ToolOutput::text(format!("Task {id} removed.")))
        } else {
            Ok(ToolOutput::error(format!("task {id} not found")))
        }
    }
}

pub struct GetMissionLog;

#[async_trait]
impl Tool for GetMissionLog {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "get_mission_log",
            description: "Show the Mission Log as a checklist.",
            parameters: object_schema(json!({}), &[]),
            needs: &[Collaborator::MissionLog],
            modifies_files: false,
        }
    }

    async fn call(&self, ctx: &ToolContext, _arguments: Map<String, Value>) -> Result<ToolOutput> {
        Ok(ToolOutput::Text(ctx.mission_log.render_markdown()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::mission_log::TaskFilter;
    use crate::task::ToolCallSpec;
    use crate::test_support::TestProject;

    #[tokio::test]
    async fn log_tools_edit_the_shared_log() {
        let project = TestProject::new();
        let call = |tool: &str, args: serde_json::Value| ToolCallSpec::from_json(tool, args);

        let added = project
            .run_tool(call("add_task_to_mission_log", json!({"description": "Review README"})), None)
            .await;
        assert_eq!(added.message(), "Added task 1: Review README");

        let done = project
            .run_tool(call("mark_task_as_done", json!({"task_id": 1})), None)
            .await;
        assert!(done.is_success());
        assert!(project.mission_log.get_tasks(TaskFilter::All)[0].done);

        let rendered = project.run_tool(call("get_mission_log", json!({})), None).await;
        assert!(rendered.message().contains("- [x] 1. Review README"));

        let missing = project
            .run_tool(call("remove_task", json!({"task_id": 9})), None)
            .await;
        assert!(!missing.is_success());

        let removed = project
            .run_tool(call("remove_task", json!({"task_id": 1})), None)
            .await;
        assert!(removed.is_success());
        assert!(project.mission_log.get_tasks(TaskFilter::All).is_empty());
    }

    #[tokio::test]
    async fn task_ids_must_be_positive_integers() {
        let project = TestProject::new();
        let outcome = project
            .run_tool(ToolCallSpec::from_json("mark_task_as_done", json!({"task_id": "one"})), None)
            .await;
        assert!(!outcome.is_success());
        assert!(outcome.message().contains("invalid input"));
    }
}
