//! Self-Correction Controller: bounded repair of failed missions.
//!
//! Each failure of a dispatched mission costs one attempt. While attempts
//! remain, the controller asks the repair agent for corrected files, turns them
//! into a fresh tool plan through the Diff Finalizer (re-primed with the error
//! report), swaps the Mission Log to that plan, and re-dispatches. Once the
//! ceiling is passed the Mission Log is left exactly as the failure left it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use tracing::{info, instrument, warn};

use crate::agents::{DiffFinalizer, RepairAgent, RepairContext};
use crate::conductor::{Conductor, MissionSummary};
use crate::error::MissionError;
use crate::events::MissionEvent;
use crate::io::git::Git;
use crate::io::project::snapshot_dir;
use crate::io::prompt::PromptBuilder;
use crate::tools::{ToolContext, ToolRegistry};

#[derive(Debug, Default)]
struct CorrectionState {
    fix_attempt_count: u32,
    last_error_report: Option<String>,
    goal: Option<String>,
}

pub struct SelfCorrector {
    context: ToolContext,
    registry: Arc<ToolRegistry>,
    max_fix_attempts: u32,
    state: Mutex<CorrectionState>,
}

impl SelfCorrector {
    pub fn new(context: ToolContext, registry: Arc<ToolRegistry>) -> Self {
        let max_fix_attempts = context.config.max_fix_attempts;
        Self {
            context,
            registry,
            max_fix_attempts,
            state: Mutex::new(CorrectionState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CorrectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new top-level request: zero the counter and remember its goal.
    pub fn reset(&self, goal: Option<&str>) {
        let mut state = self.lock();
        state.fix_attempt_count = 0;
        state.last_error_report = None;
        state.goal = goal.map(str::to_string);
    }

    pub fn fix_attempt_count(&self) -> u32 {
        self.lock().fix_attempt_count
    }

    pub fn last_error_report(&self) -> Option<String> {
        self.lock().last_error_report.clone()
    }

    pub fn max_fix_attempts(&self) -> u32 {
        self.max_fix_attempts
    }

    /// Dispatch until success, exhaustion, or a failure that repair cannot address.
    #[instrument(skip_all)]
    pub async fn drive(&self, conductor: &Conductor) -> Result<MissionSummary, MissionError> {
        loop {
            match conductor.run_mission().await {
                Ok(summary) => return Ok(summary),
                Err(err) if err.is_recoverable() => self.handle_failure(&err).await?,
                Err(err) => return Err(err),
            }
        }
    }

    /// Spend one attempt on `failure`. On `Ok` the Mission Log holds a repair plan.
    #[instrument(skip_all, fields(attempt = tracing::field::Empty))]
    pub async fn handle_failure(&self, failure: &MissionError) -> Result<(), MissionError> {
        let report = failure.report();
        let (attempt, goal) = {
            let mut state = self.lock();
            let attempt = state.fix_attempt_count + 1;
            // The notice goes out for every failure, before the ceiling check.
            info!(attempt, max = self.max_fix_attempts, "attempting self-correction");
            self.context.events.publish(MissionEvent::SelfCorrectionStarted {
                attempt,
                max_attempts: self.max_fix_attempts,
            });
            state.fix_attempt_count = attempt;
            state.last_error_report = Some(report.clone());
            (attempt, state.goal.clone())
        };
        tracing::Span::current().record("attempt", attempt);

        if attempt > self.max_fix_attempts {
            warn!(attempts = self.max_fix_attempts, "self-correction exhausted");
            self.context.events.publish(MissionEvent::SelfCorrectionExhausted {
                attempts: self.max_fix_attempts,
                report: report.clone(),
            });
            return Err(MissionError::SelfCorrectionExhausted {
                attempts: self.max_fix_attempts,
                report,
            });
        }

        let root = self.context.project.require_root()?;
        let model = self.context.model()?;

        let (repo_diff, snapshot) = tokio::task::spawn_blocking(move || {
            let repo_diff = Git::new(&root).diff_report()?;
            let snapshot = snapshot_dir(&root)?;
            anyhow::Ok((repo_diff, snapshot))
        })
        .await
        .context("join repository scan")??;

        let prompts = PromptBuilder::new(self.context.config.prompt_budget_bytes);
        let repair = RepairAgent::new(Arc::clone(&model), prompts.clone(), self.context.events.clone());
        let proposal = repair
            .propose(RepairContext {
                error_report: &report,
                goal: goal.as_deref(),
                repo_diff: &repo_diff,
                snapshot: &snapshot,
            })
            .await?;

        let finalizer = DiffFinalizer::new(
            model,
            prompts,
            Arc::clone(&self.registry),
            self.context.events.clone(),
        );
        let plan = finalizer
            .create_tool_plan(
                &proposal.files,
                &snapshot,
                &proposal.dependencies,
                Some(&report),
            )
            .await?;
        if plan.is_empty() {
            return Err(MissionError::PlanParseError(
                "repair proposal matches the current files".to_string(),
            ));
        }

        self.context.mission_log.replace_all(plan)?;
        Ok(())
    }
}
