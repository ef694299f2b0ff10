//! Tool Executor: the single path through which tool calls run.
//!
//! Every call is looked up, validated against its schema, has its path-like
//! arguments resolved against the active project root, and is classified by
//! [`crate::core::classifier::classify`]. Tool errors never escape as `Err`;
//! they become failure outcomes carrying the error text.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::core::classifier::classify;
use crate::core::types::{ToolOutput, ToolStatus};
use crate::error::MissionError;
use crate::events::MissionEvent;
use crate::io::project::resolve_within;
use crate::task::ToolCallSpec;
use crate::tools::{PATH_KEYS, ToolContext, ToolDescriptor, ToolRegistry};

/// Classified result of one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub call_id: u64,
    pub tool_name: String,
    pub status: ToolStatus,
    pub output: ToolOutput,
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    pub fn message(&self) -> String {
        self.output.message()
    }

    /// `ToolExecutionFailure` for a failed outcome.
    pub fn to_error(&self) -> MissionError {
        MissionError::ToolExecutionFailure {
            tool_name: self.tool_name.clone(),
            message: self.message(),
        }
    }
}

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    context: ToolContext,
    next_call_id: AtomicU64,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, context: ToolContext) -> Self {
        Self {
            registry,
            context,
            next_call_id: AtomicU64::new(1),
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn context(&self) -> &ToolContext {
        &self.context
    }

    /// Run one tool call to completion. Never fails; problems become failure outcomes.
    #[instrument(skip_all, fields(tool = %call.tool_name))]
    pub async fn run(&self, call: &ToolCallSpec) -> ToolOutcome {
        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        self.context.events.publish(MissionEvent::ToolCallStarted {
            call_id,
            tool_name: call.tool_name.clone(),
            arguments: call.arguments.clone(),
        });

        let (output, modifies_files) = match self.invoke(call).await {
            Ok((output, modifies_files)) => (output, modifies_files),
            Err(err) => (ToolOutput::error(err), false),
        };
        let status = classify(&output);
        let outcome = ToolOutcome {
            call_id,
            tool_name: call.tool_name.clone(),
            status,
            output,
        };
        match status {
            ToolStatus::Success => debug!(call_id, "tool call succeeded"),
            ToolStatus::Failure => warn!(call_id, message = %outcome.message(), "tool call failed"),
        }

        self.context.events.publish(MissionEvent::ToolCallFinished {
            call_id,
            tool_name: outcome.tool_name.clone(),
            status,
            message: outcome.message(),
        });
        if outcome.is_success() && modifies_files {
            self.context.events.publish(MissionEvent::FileTreeChanged);
        }
        outcome
    }

    async fn invoke(&self, call: &ToolCallSpec) -> Result<(ToolOutput, bool), MissionError> {
        let (descriptor, tool) = self
            .registry
            .lookup(&call.tool_name)
            .ok_or_else(|| MissionError::UnknownTool(call.tool_name.clone()))?;

        descriptor
            .validate_arguments(&call.arguments)
            .map_err(|violations| {
                MissionError::InvalidInput(format!(
                    "arguments for '{}': {}",
                    descriptor.name,
                    violations.join("; ")
                ))
            })?;

        for needed in descriptor.needs {
            if !self.context.has(*needed) {
                return Err(MissionError::InvalidInput(format!(
                    "tool '{}' needs {needed:?}, which is not available",
                    descriptor.name
                )));
            }
        }

        let arguments = self.resolve_paths(descriptor, &call.arguments)?;
        let modifies_files = descriptor.modifies_files;
        let output = tool
            .call(&self.context, arguments)
            .await
            .unwrap_or_else(|err| ToolOutput::error(format!("{err:#}")));
        Ok((output, modifies_files))
    }

    /// Make every path-like argument absolute, filling schema defaults first.
    fn resolve_paths(
        &self,
        descriptor: &ToolDescriptor,
        arguments: &Map<String, Value>,
    ) -> Result<Map<String, Value>, MissionError> {
        let mut resolved = arguments.clone();
        let Some(properties) = descriptor.properties() else {
            return Ok(resolved);
        };
        for key in PATH_KEYS {
            if !properties.contains_key(key) {
                continue;
            }
            let raw = resolved
                .get(key)
                .or_else(|| descriptor.default_for(key))
                .and_then(Value::as_str)
                .map(str::to_string);
            let Some(raw) = raw else {
                continue;
            };
            let root = self.context.project.require_root()?;
            let absolute = resolve_within(&root, &raw)?;
            resolved.insert(
                key.to_string(),
                Value::String(absolute.to_string_lossy().into_owned()),
            );
        }
        Ok(resolved)
    }
}
