//! Test-only helpers: a scripted model and throwaway projects.

use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use tempfile::TempDir;

use crate::events::EventBus;
use crate::executor::{ToolExecutor, ToolOutcome};
use crate::io::config::MissionConfig;
use crate::io::model::{Role, TextCompletion};
use crate::io::project::ProjectManager;
use crate::mission_log::MissionLog;
use crate::task::ToolCallSpec;
use crate::tools::{ToolContext, ToolRegistry};

/// Model that answers with queued replies in order and records every prompt.
///
/// Running out of replies is an error, so tests notice unexpected calls.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<(Role, String)>>,
    chunk_size: Option<usize>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Stream replies in chunks of `chars` characters.
    pub fn with_chunk_size(mut self, chars: usize) -> Self {
        self.chunk_size = Some(chars.max(1));
        self
    }

    /// Every `(role, prompt)` received so far.
    pub fn prompts(&self) -> Vec<(Role, String)> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn next_reply(&self, role: Role, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((role, prompt.to_string()));
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| anyhow!("scripted model has no reply left for {role}"))
    }
}

#[async_trait]
impl TextCompletion for ScriptedModel {
    async fn complete(&self, role: Role, prompt: &str) -> Result<String> {
        self.next_reply(role, prompt)
    }

    async fn stream(&self, role: Role, prompt: &str) -> Result<BoxStream<'static, Result<String>>> {
        let reply = self.next_reply(role, prompt)?;
        let Some(size) = self.chunk_size else {
            return Ok(futures::stream::once(async move { Ok(reply) }).boxed());
        };
        let chars: Vec<char> = reply.chars().collect();
        let chunks: Vec<Result<String>> = chars
            .chunks(size)
            .map(|chunk| Ok(chunk.iter().collect()))
            .collect();
        Ok(futures::stream::iter(chunks).boxed())
    }
}

/// Temporary active project with its own Mission Log and event bus.
pub struct TestProject {
    _temp: TempDir,
    pub project: Arc<ProjectManager>,
    pub mission_log: Arc<MissionLog>,
    pub events: EventBus,
    pub config: Arc<MissionConfig>,
}

impl TestProject {
    pub fn new() -> Self {
        Self::with_config(MissionConfig::default())
    }

    pub fn with_config(config: MissionConfig) -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = Arc::new(ProjectManager::with_root(temp.path()).expect("activate project"));
        let events = EventBus::default();
        let mission_log = Arc::new(MissionLog::new(events.clone(), config.tests.clone()));
        mission_log.load_for_project(&project.active_root().expect("root"));
        Self {
            _temp: temp,
            project,
            mission_log,
            events,
            config: Arc::new(config),
        }
    }

    /// Canonical project root.
    pub fn root(&self) -> PathBuf {
        self.project.active_root().expect("root")
    }

    pub fn write(&self, relative: &str, contents: &str) {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, contents).expect("write file");
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.root().join(relative)).expect("read file")
    }

    /// Tool context over this project's collaborators.
    pub fn context(&self, model: Option<Arc<dyn TextCompletion>>) -> ToolContext {
        ToolContext {
            project: Arc::clone(&self.project),
            mission_log: Arc::clone(&self.mission_log),
            events: self.events.clone(),
            model,
            config: Arc::clone(&self.config),
        }
    }

    /// Run one call through a fresh executor holding the built-in tools.
    pub async fn run_tool(
        &self,
        call: ToolCallSpec,
        model: Option<Arc<dyn TextCompletion>>,
    ) -> ToolOutcome {
        let registry = Arc::new(ToolRegistry::with_builtins().expect("builtins"));
        ToolExecutor::new(registry, self.context(model))
            .run(&call)
            .await
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}
