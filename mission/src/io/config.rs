//! Mission configuration stored under `.mission/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::test_policy::TestPolicy;

/// Placeholder in `commands.install` replaced by the requirements file path.
pub const REQUIREMENTS_PLACEHOLDER: &str = "{requirements}";

/// Mission configuration (TOML).
///
/// Missing fields default to the values below, so an empty file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MissionConfig {
    /// Repair cycles allowed per top-level request.
    pub max_fix_attempts: u32,

    /// Byte budget for rendered prompts.
    pub prompt_budget_bytes: usize,

    /// Wall-clock limit for command-running tools.
    pub tool_timeout_secs: u64,

    /// Truncate captured command stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Run `run_tests` after the queue drains.
    pub verify_after_mission: bool,

    /// Run the Test Generator during dispatch instead of relying on follow-up tasks.
    pub generate_tests_in_plan: bool,

    pub tests: TestPolicy,
    pub commands: CommandsConfig,
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CommandsConfig {
    /// Test runner invocation (e.g. `["python","-m","pytest"]`).
    pub test: Vec<String>,
    /// Dependency installer; `{requirements}` is substituted.
    pub install: Vec<String>,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            test: strings(&["python", "-m", "pytest"]),
            install: strings(&["python", "-m", "pip", "install", "-r", REQUIREMENTS_PLACEHOLDER]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelConfig {
    /// Command that reads a prompt on stdin and prints the completion.
    /// Empty means no model is configured.
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: 600,
        }
    }
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            max_fix_attempts: 2,
            prompt_budget_bytes: 40_000,
            tool_timeout_secs: 600,
            output_limit_bytes: 100_000,
            verify_after_mission: false,
            generate_tests_in_plan: false,
            tests: TestPolicy::default(),
            commands: CommandsConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

impl MissionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.tool_timeout_secs == 0 {
            return Err(anyhow!("tool_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if !is_command(&self.commands.test) {
            return Err(anyhow!("commands.test must be a non-empty array"));
        }
        if !is_command(&self.commands.install) {
            return Err(anyhow!("commands.install must be a non-empty array"));
        }
        if !self.model.command.is_empty() && !is_command(&self.model.command) {
            return Err(anyhow!("model.command must be empty or start with a program"));
        }
        if self.model.timeout_secs == 0 {
            return Err(anyhow!("model.timeout_secs must be > 0"));
        }
        Ok(())
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

/// `<project>/.mission/config.toml`.
pub fn config_path(project_root: &Path) -> PathBuf {
    project_root.join(".mission").join("config.toml")
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `MissionConfig::default()`.
pub fn load_config(path: &Path) -> Result<MissionConfig> {
    if !path.exists() {
        let cfg = MissionConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: MissionConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &MissionConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Write `contents` to a sibling temp file, then rename over `path`.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents).with_context(|| format!("write temp {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

fn is_command(command: &[String]) -> bool {
    command.first().is_some_and(|program| !program.trim().is_empty())
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| (*item).to_string()).collect()
}
