//! Dependency manifest tools.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::instrument;

use super::{Collaborator, Tool, ToolContext, ToolDescriptor, display_path, object_schema, path_arg, str_arg};
use crate::core::plan_rules::{ADD_DEPENDENCY, INSTALL_DEPENDENCIES};
use crate::core::types::ToolOutput;
use crate::io::config::REQUIREMENTS_PLACEHOLDER;
use crate::io::process::{command_from_argv, run_command_with_timeout};

const DEFAULT_REQUIREMENTS: &str = "requirements.txt";

fn requirements_property() -> Value {
    json!({
        "type": "string",
        "default": DEFAULT_REQUIREMENTS,
        "description": "Requirements file relative to the project root.",
    })
}

/// Package name of a requirement line (`Flask>=2.0 ; python_version > "3"` is `flask`).
fn requirement_name(line: &str) -> Option<String> {
    let line = line.split('#').next().unwrap_or_default().trim();
    if line.is_empty() || line.starts_with('-') {
        return None;
    }
    let end = line
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        .unwrap_or(line.len());
    let name = &line[..end];
    (!name.is_empty()).then(|| name.to_ascii_lowercase().replace('_', "-"))
}

pub struct AddDependency;

#[async_trait]
impl Tool for AddDependency {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: ADD_DEPENDENCY,
            description: "Append a dependency to the requirements file unless it is already listed.",
            parameters: object_schema(
                json!({
                    "dependency": { "type": "string", "minLength": 1, "description": "Requirement line, e.g. 'flask>=2'." },
                    "requirements_path": requirements_property(),
                }),
                &["dependency"],
            ),
            needs: &[Collaborator::ProjectManager],
            modifies_files: true,
        }
    }

    async fn call(&self, ctx: &ToolContext, arguments: Map<String, Value>) -> Result<ToolOutput> {
        let dependency = str_arg(&arguments, "dependency")?.trim();
        let path = path_arg(&arguments, "requirements_path")?;
        let Some(name) = requirement_name(dependency) else {
            bail!("'{dependency}' is not a requirement");
        };
        let shown = display_path(ctx, &path);

        let mut content = if path.exists() {
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?
        } else {
            String::new()
        };
        if content
            .lines()
            .filter_map(requirement_name)
            .any(|existing| existing == name)
        {
            return Ok(ToolOutput::text(format!(
                "Dependency '{dependency}' is already listed in '{shown}'."
            )));
        }
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(dependency);
        content.push('\n');
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("write {}", path.display()))?;
        Ok(ToolOutput::text(format!(
            "Added '{dependency}' to '{shown}'."
        )))
    }
}

pub struct InstallDependencies;

#[async_trait]
impl Tool for InstallDependencies {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: INSTALL_DEPENDENCIES,
            description: "Install the packages listed in the requirements file.",
            parameters: object_schema(
                json!({ "requirements_path": requirements_property() }),
                &[],
            ),
            needs: &[Collaborator::ProjectManager],
            modifies_files: false,
        }
    }

    #[instrument(skip_all)]
    async fn call(&self, ctx: &ToolContext, arguments: Map<String, Value>) -> Result<ToolOutput> {
        let path = path_arg(&arguments, "requirements_path")?;
        if !path.is_file() {
            return Ok(ToolOutput::text(format!(
                "No '{}' found; nothing to install.",
                display_path(ctx, &path)
            )));
        }
        let root = ctx.root()?;
        let argv = install_argv(&ctx.config.commands.install, &path);
        let timeout = ctx.config.tool_timeout();
        let limit = ctx.config.output_limit_bytes;
        let output = tokio::task::spawn_blocking(move || {
            let cmd = command_from_argv(&argv, &root)?;
            run_command_with_timeout(cmd, None, timeout, limit)
        })
        .await
        .context("join install command")??;

        if !output.success() {
            bail!(
                "dependency installation failed ({}):\n{}",
                output.exit_description(timeout),
                output.combined_text().trim()
            );
        }
        Ok(ToolOutput::text(format!(
            "Installed dependencies from '{}'.",
            display_path(ctx, &path)
        )))
    }
}

fn install_argv(template: &[String], requirements: &Path) -> Vec<String> {
    let requirements = requirements.display().to_string();
    template
        .iter()
        .map(|arg| arg.replace(REQUIREMENTS_PLACEHOLDER, &requirements))
        .collect()
}
