//! Text-completion seam and the command-backed adapter.
//!
//! Agents never talk to an inference client directly. They go through
//! [`TextCompletion`], which tests replace with scripted models.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::io::config::ModelConfig;
use crate::io::process::{command_from_argv, run_command_with_timeout};

/// Which agent is asking. Backends may route roles to different models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Architect,
    Coder,
    Tester,
    Finalizer,
    Repair,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Architect => "architect",
            Self::Coder => "coder",
            Self::Tester => "tester",
            Self::Finalizer => "finalizer",
            Self::Repair => "repair",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Produces text for a prompt, whole or in chunks.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(&self, role: Role, prompt: &str) -> Result<String>;

    /// Stream the completion. The default yields the whole completion as one chunk.
    async fn stream(&self, role: Role, prompt: &str) -> Result<BoxStream<'static, Result<String>>> {
        let text = self.complete(role, prompt).await?;
        Ok(futures::stream::once(async move { Ok(text) }).boxed())
    }
}

/// Model that pipes the prompt on stdin to a configured command and reads stdout.
///
/// The role is exported as `MISSION_ROLE` so wrapper scripts can route it.
#[derive(Debug, Clone)]
pub struct CommandModel {
    argv: Vec<String>,
    workdir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandModel {
    pub fn new(argv: Vec<String>, workdir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            argv,
            workdir: workdir.into(),
            timeout,
            output_limit_bytes: 1_000_000,
        }
    }

    /// `None` when no model command is configured.
    pub fn from_config(config: &ModelConfig, workdir: impl Into<PathBuf>) -> Option<Self> {
        if config.command.is_empty() {
            return None;
        }
        Some(Self::new(
            config.command.clone(),
            workdir,
            Duration::from_secs(config.timeout_secs),
        ))
    }

    pub fn with_output_limit(mut self, bytes: usize) -> Self {
        self.output_limit_bytes = bytes;
        self
    }
}

#[async_trait]
impl TextCompletion for CommandModel {
    #[instrument(skip_all, fields(role = %role, program = ?self.argv.first()))]
    async fn complete(&self, role: Role, prompt: &str) -> Result<String> {
        let mut cmd = command_from_argv(&self.argv, &self.workdir)?;
        cmd.env("MISSION_ROLE", role.as_str());
        let input = prompt.as_bytes().to_vec();
        let timeout = self.timeout;
        let limit = self.output_limit_bytes;
        debug!(prompt_bytes = input.len(), "invoking model command");

        let output = tokio::task::spawn_blocking(move || {
            run_command_with_timeout(cmd, Some(&input), timeout, limit)
        })
        .await
        .context("join model command")?
        .context("run model command")?;

        if output.timed_out {
            warn!(timeout_secs = timeout.as_secs(), "model command timed out");
            return Err(anyhow!("model command timed out after {timeout:?}"));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "model command failed");
            return Err(anyhow!(
                "model command failed with status {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        if output.stdout_truncated > 0 {
            return Err(anyhow!(
                "model output exceeded {limit} bytes ({} truncated)",
                output.stdout_truncated
            ));
        }
        Ok(output.stdout_text())
    }
}
