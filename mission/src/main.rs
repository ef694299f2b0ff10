//! Mission CLI.
//!
//! Keeps a per-project Mission Log (`.mission/mission_log.json`), plans goals
//! into reviewable tasks, and executes them under bounded self-correction.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mission::error::MissionError;
use mission::events::{EventBus, MissionEvent};
use mission::exit_codes;
use mission::mission_log::TaskFilter;
use mission::pipeline::{Pipeline, init_project};
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(
    name = "mission",
    version,
    about = "Plan, execute, and self-correct code-generation missions"
)]
struct Cli {
    /// Project directory.
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write `.mission/config.toml` with defaults if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Print the Mission Log.
    Tasks {
        /// Only tasks that still need to run.
        #[arg(long, conflicts_with = "done")]
        pending: bool,
        /// Only completed tasks.
        #[arg(long)]
        done: bool,
    },
    /// Append a human-readable task.
    Add { description: String },
    /// Mark a task as done.
    Done { id: u64 },
    /// Remove a task.
    Remove { id: u64 },
    /// Remove every task.
    Clear,
    /// Print the tool schemas as JSON.
    Tools,
    /// Dispatch the approved plan, or execute the Mission Log as it stands.
    Run,
    /// Draft a plan for a goal and record it for approval.
    Plan { goal: String },
    /// Plan a goal and dispatch it immediately.
    Build { goal: String },
}

fn main() {
    mission::logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    if let Command::Init { force } = cli.command {
        let path = init_project(&cli.project, force)?;
        println!("{}", path.display());
        return Ok(exit_codes::OK);
    }

    let events = EventBus::default();
    let pipeline = Pipeline::open(&cli.project, events.clone())?;
    match cli.command {
        Command::Init { .. } => Ok(exit_codes::OK),
        Command::Tasks { pending, done } => {
            let filter = match (pending, done) {
                (true, _) => TaskFilter::Pending,
                (_, true) => TaskFilter::Done,
                _ => TaskFilter::All,
            };
            let tasks = pipeline.mission_log().get_tasks(filter);
            if tasks.is_empty() {
                println!("No tasks.");
            }
            for task in tasks {
                let mark = if task.done { 'x' } else { ' ' };
                println!("- [{mark}] {}. {}", task.id, task.description);
            }
            Ok(exit_codes::OK)
        }
        Command::Add { description } => {
            let task = pipeline.mission_log().add_task(&description, None)?;
            println!("Added task {}: {}", task.id, task.description);
            Ok(exit_codes::OK)
        }
        Command::Done { id } => found(pipeline.mission_log().mark_done(id)?, id),
        Command::Remove { id } => found(pipeline.mission_log().remove_task(id)?, id),
        Command::Clear => {
            pipeline.mission_log().clear()?;
            Ok(exit_codes::OK)
        }
        Command::Tools => {
            println!("{}", pipeline.registry().schemas_json()?);
            Ok(exit_codes::OK)
        }
        Command::Run => run_async(pipeline, events, Mission::Run),
        Command::Plan { goal } => run_async(pipeline, events, Mission::Plan(goal)),
        Command::Build { goal } => run_async(pipeline, events, Mission::Build(goal)),
    }
}

fn found(changed: bool, id: u64) -> Result<i32> {
    if changed {
        Ok(exit_codes::OK)
    } else {
        eprintln!("task {id} not found");
        Ok(exit_codes::INVALID)
    }
}

enum Mission {
    Run,
    Plan(String),
    Build(String),
}

/// Run a model-backed command while printing events as they arrive.
fn run_async(pipeline: Pipeline, events: EventBus, mission: Mission) -> Result<i32> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start tokio runtime")?;
    runtime.block_on(async move {
        let mut receiver = events.subscribe();
        drop(events);
        let printer = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        if let Some(line) = describe_event(&event) {
                            println!("{line}");
                        }
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let result = match &mission {
            Mission::Run => pipeline.run().await.map(|summary| summary.executed.len()),
            Mission::Plan(goal) => pipeline.plan(goal).await.map(|plan| plan.files.len()),
            Mission::Build(goal) => pipeline.build(goal).await.map(|summary| summary.executed.len()),
        };
        let rendered = pipeline.mission_log().render_markdown();
        // Closing every sender lets the printer drain and stop.
        drop(pipeline);
        printer.await.context("join event printer")?;

        anyhow::Ok(match result {
            Ok(_) => {
                if matches!(mission, Mission::Plan(_)) {
                    println!("\n{rendered}");
                    println!("Review the tasks, then run `mission run` to dispatch.");
                }
                exit_codes::OK
            }
            Err(err) => report_failure(&err),
        })
    })
}

fn report_failure(err: &MissionError) -> i32 {
    eprintln!("{err}");
    exit_codes::for_error(err)
}

/// One console line per event worth showing; streamed code is not echoed.
fn describe_event(event: &MissionEvent) -> Option<String> {
    let line = match event {
        MissionEvent::TaskAdded { task } => format!("+ task {}: {}", task.id, task.description),
        MissionEvent::TaskDone { task_id } => format!("* task {task_id} done"),
        MissionEvent::TaskRemoved { task_id } => format!("- task {task_id} removed"),
        MissionEvent::LogReplaced { count } => format!("Mission log now holds {count} task(s)"),
        MissionEvent::LogCleared => "Mission log cleared".to_string(),
        MissionEvent::LogLoaded { .. } | MissionEvent::FileTreeChanged => return None,
        MissionEvent::ToolCallStarted { tool_name, .. } => format!("> {tool_name}"),
        MissionEvent::ToolCallFinished {
            tool_name,
            status,
            message,
            ..
        } => {
            let first = message.lines().next().unwrap_or_default();
            format!("  {tool_name}: {status:?}: {first}")
        }
        MissionEvent::MissionStarted { task_count } => {
            format!("Mission started with {task_count} pending task(s)")
        }
        MissionEvent::MissionAccomplished { executed } => {
            format!("Mission accomplished: {executed} task(s) executed")
        }
        MissionEvent::MissionFailed { task_id, error } => match task_id {
            Some(id) => format!("Mission failed at task {id}: {error}"),
            None => format!("Mission failed: {error}"),
        },
        MissionEvent::SelfCorrectionStarted {
            attempt,
            max_attempts,
        } if attempt > max_attempts => {
            format!("Attempting self-correction: limit of {max_attempts} reached")
        }
        MissionEvent::SelfCorrectionStarted {
            attempt,
            max_attempts,
        } => format!("Attempting self-correction {attempt}/{max_attempts}"),
        MissionEvent::SelfCorrectionExhausted { attempts, .. } => {
            format!("Self-correction gave up after {attempts} attempt(s)")
        }
        MissionEvent::Status { agent, message } => format!("[{agent}] {message}"),
        MissionEvent::CodeChunk { .. } => return None,
    };
    Some(line)
}
