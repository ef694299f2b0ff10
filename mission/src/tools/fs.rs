//! Filesystem tools.

use std::fs;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::{Collaborator, Tool, ToolContext, ToolDescriptor, display_path, object_schema, path_arg, str_arg};
use crate::core::plan_rules::{DELETE_FILE, REPLACE_IN_FILE, WRITE_FILE};
use crate::core::types::ToolOutput;
use crate::io::project::SKIPPED_DIRS;

const NEEDS_PROJECT: &[Collaborator] = &[Collaborator::ProjectManager];

fn path_property(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

pub struct WriteFile;

#[async_trait]
impl Tool for WriteFile {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: WRITE_FILE,
            description: "Write the full contents of a file, creating parent directories.",
            parameters: object_schema(
                json!({
                    "path": path_property("File path relative to the project root."),
                    "content": { "type": "string", "description": "Complete file contents." },
                }),
                &["path", "content"],
            ),
            needs: NEEDS_PROJECT,
            modifies_files: true,
        }
    }

    async fn call(&self, ctx: &ToolContext, arguments: Map<String, Value>) -> Result<ToolOutput> {
        let path = path_arg(&arguments, "path")?;
        let content = str_arg(&arguments, "content")?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("write {}", path.display()))?;
        Ok(ToolOutput::text(format!(
            "Successfully wrote {} bytes to '{}'.",
            content.len(),
            display_path(ctx, &path)
        )))
    }
}

pub struct ReplaceInFile;

#[async_trait]
impl Tool for ReplaceInFile {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: REPLACE_IN_FILE,
            description: "Replace one exact occurrence of `old` with `new` in an existing file.",
            parameters: object_schema(
                json!({
                    "path": path_property("File path relative to the project root."),
                    "old": { "type": "string", "minLength": 1, "description": "Exact text to replace; must occur once." },
                    "new": { "type": "string", "description": "Replacement text." },
                }),
                &["path", "old", "new"],
            ),
            needs: NEEDS_PROJECT,
            modifies_files: true,
        }
    }

    async fn call(&self, ctx: &ToolContext, arguments: Map<String, Value>) -> Result<ToolOutput> {
        let path = path_arg(&arguments, "path")?;
        let old = str_arg(&arguments, "old")?;
        let new = str_arg(&arguments, "new")?;
        let content =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        let shown = display_path(ctx, &path);
        match content.matches(old).count() {
            0 => bail!("text to replace not found in '{shown}'"),
            1 => {}
            n => bail!("text to replace occurs {n} times in '{shown}'; it must be unique"),
        }
        fs::write(&path, content.replacen(old, new, 1))
            .with_context(|| format!("write {}", path.display()))?;
        Ok(ToolOutput::text(format!("Replaced 1 occurrence in '{shown}'.")))
    }
}

pub struct DeleteFile;

#[async_trait]
impl Tool for DeleteFile {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: DELETE_FILE,
            description: "Delete a file.",
            parameters: object_schema(
                json!({ "path": path_property("File path relative to the project root.") }),
                &["path"],
            ),
            needs: NEEDS_PROJECT,
            modifies_files: true,
        }
    }

    async fn call(&self, ctx: &ToolContext, arguments: Map<String, Value>) -> Result<ToolOutput> {
        let path = path_arg(&arguments, "path")?;
        if !path.is_file() {
            bail!("file '{}' does not exist", display_path(ctx, &path));
        }
        fs::remove_file(&path).with_context(|| format!("delete {}", path.display()))?;
        Ok(ToolOutput::text(format!(
            "Deleted '{}'.",
            display_path(ctx, &path)
        )))
    }
}

pub struct ReadFile;

#[async_trait]
impl Tool for ReadFile {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "read_file",
            description: "Read a text file.",
            parameters: object_schema(
                json!({ "path": path_property("File path relative to the project root.") }),
                &["path"],
            ),
            needs: NEEDS_PROJECT,
            modifies_files: false,
        }
    }

    async fn call(&self, ctx: &ToolContext, arguments: Map<String, Value>) -> Result<ToolOutput> {
        let path = path_arg(&arguments, "path")?;
        let content =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        Ok(ToolOutput::payload(
            format!("Contents of '{}':", display_path(ctx, &path)),
            content,
        ))
    }
}

pub struct ListFiles;

#[async_trait]
impl Tool for ListFiles {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "list_files",
            description: "List the entries of a directory. Directories end with '/'.",
            parameters: object_schema(
                json!({
                    "path": {
                        "type": "string",
                        "default": ".",
                        "description": "Directory relative to the project root.",
                    },
                }),
                &[],
            ),
            needs: NEEDS_PROJECT,
            modifies_files: false,
        }
    }

    async fn call(&self, ctx: &ToolContext, arguments: Map<String, Value>) -> Result<ToolOutput> {
        let path = path_arg(&arguments, "path")?;
        let mut entries = Vec::new();
        for entry in fs::read_dir(&path).with_context(|| format!("list {}", path.display()))? {
            let entry = entry.with_context(|| format!("list {}", path.display()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry.file_type().map(|kind| kind.is_dir()).unwrap_or(false);
            if is_dir && SKIPPED_DIRS.contains(&name.as_str()) {
                continue;
            }
            entries.push(if is_dir { format!("{name}/") } else { name });
        }
        entries.sort();
        if entries.is_empty() {
            return Ok(ToolOutput::text(format!(
                "Directory '{}' is empty.",
                display_path(ctx, &path)
            )));
        }
        Ok(ToolOutput::payload(
            format!("Contents of '{}':", display_path(ctx, &path)),
            entries.join("\n"),
        ))
    }
}

pub struct CreateDirectory;

#[async_trait]
impl Tool for CreateDirectory {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "create_directory",
            description: "Create a directory and any missing parents.",
            parameters: object_schema(
                json!({ "path": path_property("Directory relative to the project root.") }),
                &["path"],
            ),
            needs: NEEDS_PROJECT,
            modifies_files: true,
        }
    }

    async fn call(&self, ctx: &ToolContext, arguments: Map<String, Value>) -> Result<ToolOutput> {
        let path = path_arg(&arguments, "path")?;
        fs::create_dir_all(&path).with_context(|| format!("create directory {}", path.display()))?;
        Ok(ToolOutput::text(format!(
            "Created directory '{}'.",
            display_path(ctx, &path)
        )))
    }
}

fn copy_move_schema() -> Value {
    object_schema(
        json!({
            "source_path": path_property("Existing file relative to the project root."),
            "destination_path": path_property("Target path relative to the project root."),
        }),
        &["source_path", "destination_path"],
    )
}

pub struct CopyFile;

#[async_trait]
impl Tool for CopyFile {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "copy_file",
            description: "Copy a file, creating destination directories.",
            parameters: copy_move_schema(),
            needs: NEEDS_PROJECT,
            modifies_files: true,
        }
    }

    async fn call(&self, ctx: &ToolContext, arguments: Map<String, Value>) -> Result<ToolOutput> {
        let source = path_arg(&arguments, "source_path")?;
        let destination = path_arg(&arguments, "destination_path")?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::copy(&source, &destination).with_context(|| {
            format!("copy {} to {}", source.display(), destination.display())
        })?;
        Ok(ToolOutput::text(format!(
            "Copied '{}' to '{}'.",
            display_path(ctx, &source),
            display_path(ctx, &destination)
        )))
    }
}

pub struct MoveFile;

#[async_trait]
impl Tool for MoveFile {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "move_file",
            description: "Move or rename a file, creating destination directories.",
            parameters: copy_move_schema(),
            needs: NEEDS_PROJECT,
            modifies_files: true,
        }
    }

    async fn call(&self, ctx: &ToolContext, arguments: Map<String, Value>) -> Result<ToolOutput> {
        let source = path_arg(&arguments, "source_path")?;
        let destination = path_arg(&arguments, "destination_path")?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::rename(&source, &destination).with_context(|| {
            format!("move {} to {}", source.display(), destination.display())
        })?;
        Ok(ToolOutput::text(format!(
            "Moved '{}' to '{}'.",
            display_path(ctx, &source),
            display_path(ctx, &destination)
        )))
    }
}
