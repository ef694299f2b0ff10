//! Top-level build pipeline: goal -> plan -> approval -> dispatch.
//!
//! A [`Pipeline`] owns every collaborator for one project. `plan` records a
//! human-readable task list for approval; `dispatch` generates code, turns it
//! into tool calls through the Diff Finalizer, and drives the Conductor under
//! the Self-Correction Controller.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::agents::{CodeGenerator, DiffFinalizer, PlanGenerator, TestGenerator};
use crate::conductor::{Conductor, MissionSummary};
use crate::core::test_policy::TestPolicy;
use crate::correction::SelfCorrector;
use crate::error::MissionError;
use crate::events::{EventBus, MissionEvent};
use crate::executor::ToolExecutor;
use crate::io::config::{MissionConfig, config_path, load_config, write_config};
use crate::io::log_store::{ApprovedPlan, load_plan, plan_path, remove_plan, write_plan};
use crate::io::model::{CommandModel, TextCompletion};
use crate::io::project::ProjectManager;
use crate::io::prompt::PromptBuilder;
use crate::mission_log::{MissionLog, TaskFilter};
use crate::task::Plan;
use crate::tools::{ToolContext, ToolRegistry};

pub struct Pipeline {
    context: ToolContext,
    registry: Arc<ToolRegistry>,
    conductor: Arc<Conductor>,
    corrector: SelfCorrector,
    busy: Arc<AtomicBool>,
}

/// Held for the whole of a plan or dispatch, code generation included.
struct BusyGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

impl Pipeline {
    /// Open `root`, reading its config and using the configured model command.
    pub fn open(root: impl AsRef<Path>, events: EventBus) -> Result<Self> {
        let root = root.as_ref();
        let config = load_config(&config_path(root))?;
        let model = CommandModel::from_config(&config.model, root)
            .map(|model| Arc::new(model.with_output_limit(config.output_limit_bytes)) as Arc<dyn TextCompletion>);
        Self::with_parts(root, config, model, events)
    }

    /// Open `root` with explicit config and model.
    pub fn with_parts(
        root: impl AsRef<Path>,
        config: MissionConfig,
        model: Option<Arc<dyn TextCompletion>>,
        events: EventBus,
    ) -> Result<Self> {
        config.validate()?;
        let project = Arc::new(ProjectManager::new());
        let mission_log = Arc::new(MissionLog::new(events.clone(), log_policy(&config)));
        let registry = Arc::new(ToolRegistry::with_builtins()?);
        let context = ToolContext {
            project,
            mission_log: Arc::clone(&mission_log),
            events: events.clone(),
            model,
            config: Arc::new(config),
        };
        let executor = Arc::new(ToolExecutor::new(Arc::clone(&registry), context.clone()));
        let conductor = Arc::new(Conductor::new(executor, mission_log, events));
        let corrector = SelfCorrector::new(context.clone(), Arc::clone(&registry));
        let pipeline = Self {
            context,
            registry,
            conductor,
            corrector,
            busy: Arc::new(AtomicBool::new(false)),
        };
        pipeline.open_project(root)?;
        Ok(pipeline)
    }

    /// Make `root` the active project and reload its Mission Log.
    ///
    /// The previous project, if any, is closed first.
    #[instrument(skip_all, fields(root = %root.as_ref().display()))]
    pub fn open_project(&self, root: impl AsRef<Path>) -> Result<PathBuf> {
        if self.context.project.active_root().is_some() {
            self.close_project()?;
        }
        let root = self.context.project.activate(root)?;
        let count = self.context.mission_log.load_for_project(&root);
        info!(count, "project opened");
        Ok(root)
    }

    /// Drop the active project. The Mission Log stays usable in memory but
    /// nothing is persisted until another project is opened.
    pub fn close_project(&self) -> Result<(), MissionError> {
        let _busy = self.claim()?;
        self.context.mission_log.detach();
        self.context.project.deactivate();
        info!("project closed");
        Ok(())
    }

    pub fn mission_log(&self) -> &Arc<MissionLog> {
        &self.context.mission_log
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn conductor(&self) -> &Arc<Conductor> {
        &self.conductor
    }

    pub fn corrector(&self) -> &SelfCorrector {
        &self.corrector
    }

    pub fn config(&self) -> &MissionConfig {
        &self.context.config
    }

    /// True while a plan or mission holds the pipeline.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire) || self.conductor.is_running()
    }

    /// Claim the pipeline or fail with `MissionInProgress`.
    fn claim(&self) -> Result<BusyGuard, MissionError> {
        if self.conductor.is_running()
            || self
                .busy
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
        {
            return Err(MissionError::MissionInProgress);
        }
        Ok(BusyGuard {
            busy: Arc::clone(&self.busy),
        })
    }

    fn prompts(&self) -> PromptBuilder {
        PromptBuilder::new(self.context.config.prompt_budget_bytes)
    }

    /// Draft a plan for `goal` and record it as tasks awaiting approval.
    #[instrument(skip_all)]
    pub async fn plan(&self, goal: &str) -> Result<Plan, MissionError> {
        let _busy = self.claim()?;
        self.corrector.reset(Some(goal));
        let root = self.context.project.require_root()?;
        let model = self.context.model()?;
        let existing = self.context.project.snapshot_files()?;

        let generator = PlanGenerator::new(model, self.prompts(), self.context.events.clone());
        let plan = generator.generate(goal, &existing).await?;

        let descriptions = plan_descriptions(&plan, &existing);
        self.context.mission_log.replace_with_descriptions(descriptions)?;
        write_plan(
            &plan_path(&root),
            &ApprovedPlan {
                goal: goal.trim().to_string(),
                plan: plan.clone(),
            },
        )?;
        Ok(plan)
    }

    /// True when `plan` recorded a plan that has not been dispatched yet.
    pub fn has_pending_plan(&self) -> Result<bool, MissionError> {
        let root = self.context.project.require_root()?;
        Ok(load_plan(&plan_path(&root))?.is_some())
    }

    /// Generate code for the approved plan and execute it.
    #[instrument(skip_all)]
    pub async fn dispatch(&self) -> Result<MissionSummary, MissionError> {
        let _busy = self.claim()?;
        let root = self.context.project.require_root()?;
        let approved = load_plan(&plan_path(&root))?.ok_or_else(|| {
            MissionError::InvalidInput("no approved plan to dispatch; run `plan` first".to_string())
        })?;
        self.corrector.reset(Some(&approved.goal));
        let model = self.context.model()?;
        let existing = self.context.project.snapshot_files()?;

        let coder = CodeGenerator::new(Arc::clone(&model), self.prompts(), self.context.events.clone());
        let mut generated = coder.generate(&approved.goal, &approved.plan, &existing).await?;

        if self.context.config.generate_tests_in_plan {
            let tester = TestGenerator::new(Arc::clone(&model), self.prompts(), self.context.events.clone());
            let tests = tester
                .generate_for_files(&generated, &self.context.config.tests.source_extensions)
                .await?;
            generated.extend(tests);
        }

        let finalizer = DiffFinalizer::new(
            model,
            self.prompts(),
            Arc::clone(&self.registry),
            self.context.events.clone(),
        );
        let tool_plan = finalizer
            .create_tool_plan(&generated, &existing, &approved.plan.dependencies, None)
            .await?;

        self.context.mission_log.replace_all(tool_plan)?;
        remove_plan(&plan_path(&root))?;
        self.corrector.drive(&self.conductor).await
    }

    /// Plan and dispatch without a pause for approval.
    pub async fn build(&self, goal: &str) -> Result<MissionSummary, MissionError> {
        self.plan(goal).await?;
        self.dispatch().await
    }

    /// Dispatch a pending plan, or else execute the Mission Log as it stands.
    #[instrument(skip_all)]
    pub async fn run(&self) -> Result<MissionSummary, MissionError> {
        if self.has_pending_plan()? {
            return self.dispatch().await;
        }
        let _busy = self.claim()?;
        self.corrector.reset(None);
        let pending = self.context.mission_log.get_tasks(TaskFilter::Pending).len();
        self.context.events.publish(MissionEvent::status(
            "conductor",
            format!("Executing {pending} pending task(s)"),
        ));
        self.corrector.drive(&self.conductor).await
    }
}

/// Test follow-ups are redundant when tests are generated up front.
fn log_policy(config: &MissionConfig) -> TestPolicy {
    if config.generate_tests_in_plan {
        TestPolicy {
            auto_insert: false,
            ..config.tests.clone()
        }
    } else {
        config.tests.clone()
    }
}

/// One reviewable task per planned file and dependency.
fn plan_descriptions(plan: &Plan, existing: &BTreeMap<String, String>) -> Vec<String> {
    let mut descriptions: Vec<String> = plan
        .files
        .iter()
        .map(|file| {
            let verb = if existing.contains_key(&file.filename) {
                "Modify"
            } else {
                "Create"
            };
            if file.purpose.trim().is_empty() {
                format!("{verb} '{}'", file.filename)
            } else {
                format!("{verb} '{}': {}", file.filename, file.purpose.trim())
            }
        })
        .collect();
    descriptions.extend(
        plan.dependencies
            .iter()
            .map(|dep| format!("Add dependency '{dep}'")),
    );
    descriptions
}

/// Write the default config unless one exists; returns its path.
pub fn init_project(root: &Path, force: bool) -> Result<PathBuf> {
    let path = config_path(root);
    if path.exists() && !force {
        return Ok(path);
    }
    write_config(&path, &MissionConfig::default())
        .with_context(|| format!("initialize {}", root.display()))?;
    Ok(path)
}
