//! Typed failures of the mission pipeline.
//!
//! I/O helpers return `anyhow::Result` with context; orchestration surfaces
//! these variants so callers can branch on them (directly or through
//! `anyhow::Error::downcast_ref`).

use thiserror::Error;

/// Failure taxonomy for planning, execution, and self-correction.
#[derive(Debug, Error)]
pub enum MissionError {
    /// Bad task description or malformed tool arguments.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A tool call named a tool that is not registered.
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    /// A tool ran and reported failure. Carries the tool's own diagnostic text.
    #[error("tool '{tool_name}' failed: {message}")]
    ToolExecutionFailure { tool_name: String, message: String },

    /// The planning collaborator returned something that is not a well-formed plan.
    #[error("plan parse error: {0}")]
    PlanParseError(String),

    /// The conductor stopped early because a task failed.
    #[error("mission aborted at task {task_id} ('{description}'): {error}")]
    MissionAborted {
        task_id: u64,
        description: String,
        error: String,
    },

    /// The retry ceiling was reached; carries the last diagnostic report.
    #[error("self-correction exhausted after {attempts} attempt(s): {report}")]
    SelfCorrectionExhausted { attempts: u32, report: String },

    /// A dispatch request arrived while a mission was already running.
    #[error("a mission is already in progress")]
    MissionInProgress,

    /// The operation needs an active project.
    #[error("no active project")]
    NoActiveProject,

    /// A collaborator (filesystem, model backend, git) failed.
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl MissionError {
    /// True for failures the self-correction controller may attempt to repair.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MissionAborted { .. })
    }

    /// Human-readable diagnostic used as the error report for repair prompts.
    pub fn report(&self) -> String {
        match self {
            Self::MissionAborted {
                task_id,
                description,
                error,
            } => format!("Task {task_id} ('{description}') failed.\n\n{error}"),
            other => other.to_string(),
        }
    }
}
