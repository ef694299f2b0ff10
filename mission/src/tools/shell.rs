//! Command-running tools: the test suite and arbitrary shell commands.

use std::process::Command;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use super::{Collaborator, Tool, ToolContext, ToolDescriptor, display_path, object_schema, str_arg};
use crate::core::plan_rules::RUN_TESTS;
use crate::core::types::ToolOutput;
use crate::io::process::{CommandOutput, command_from_argv, run_command_with_timeout, shell_command};

/// pytest's "no tests collected" exit code; not a failure.
const NO_TESTS_COLLECTED: i32 = 5;

async fn run_blocking(ctx: &ToolContext, cmd: Command) -> Result<CommandOutput> {
    let timeout = ctx.config.tool_timeout();
    let limit = ctx.config.output_limit_bytes;
    tokio::task::spawn_blocking(move || run_command_with_timeout(cmd, None, timeout, limit))
        .await
        .context("join command")?
}

pub struct RunTests;

#[async_trait]
impl Tool for RunTests {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: RUN_TESTS,
            description: "Run the project's test suite, optionally limited to one path.",
            parameters: object_schema(
                json!({
                    "path": { "type": "string", "description": "Optional test file or directory." },
                }),
                &[],
            ),
            needs: &[Collaborator::ProjectManager],
            modifies_files: false,
        }
    }

    #[instrument(skip_all)]
    async fn call(&self, ctx: &ToolContext, arguments: Map<String, Value>) -> Result<ToolOutput> {
        let root = ctx.root()?;
        let mut argv = ctx.config.commands.test.clone();
        let target = match arguments.get("path").and_then(Value::as_str) {
            Some(path) => {
                argv.push(path.to_string());
                format!("'{}'", display_path(ctx, std::path::Path::new(path)))
            }
            None => "the project".to_string(),
        };
        let cmd = command_from_argv(&argv, &root)?;
        let output = run_blocking(ctx, cmd).await?;
        let full_output = output.combined_text();
        let code = output.status.code();
        debug!(exit_code = ?code, timed_out = output.timed_out, "test run finished");

        let (status, summary) = if output.timed_out {
            (
                "failure",
                format!("Tests for {target} {}.", output.exit_description(ctx.config.tool_timeout())),
            )
        } else if output.status.success() {
            ("success", format!("All tests passed for {target}."))
        } else if code == Some(NO_TESTS_COLLECTED) {
            ("success", format!("No tests were found for {target}."))
        } else {
            (
                "failure",
                format!("Tests failed for {target} ({}).", output.exit_description(ctx.config.tool_timeout())),
            )
        };
        Ok(ToolOutput::Record(json!({
            "status": status,
            "summary": summary,
            "full_output": full_output,
        })))
    }
}

pub struct RunShellCommand;

#[async_trait]
impl Tool for RunShellCommand {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "run_shell_command",
            description: "Run a shell command in the project root and return its output.",
            parameters: object_schema(
                json!({ "command": { "type": "string", "minLength": 1 } }),
                &["command"],
            ),
            needs: &[Collaborator::ProjectManager],
            modifies_files: true,
        }
    }

    #[instrument(skip_all)]
    async fn call(&self, ctx: &ToolContext, arguments: Map<String, Value>) -> Result<ToolOutput> {
        let command = str_arg(&arguments, "command")?;
        let root = ctx.root()?;
        let output = run_blocking(ctx, shell_command(command, &root)).await?;
        let text = output.combined_text();
        if !output.success() {
            return Ok(ToolOutput::error(format!(
                "command '{command}' failed ({}):\n{}",
                output.exit_description(ctx.config.tool_timeout()),
                text.trim()
            )));
        }
        if text.trim().is_empty() {
            return Ok(ToolOutput::text("Command completed with no output."));
        }
        Ok(ToolOutput::payload(format!("Command '{command}' succeeded."), text))
    }
}
