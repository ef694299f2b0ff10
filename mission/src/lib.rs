//! Mission orchestration and self-correcting code generation.
//!
//! A user goal becomes a durable Mission Log of tasks, each task a concrete
//! tool call, executed strictly in order and repaired a bounded number of
//! times when something fails. The crate is split the same way throughout:
//!
//! - **[`core`]**: Pure, deterministic logic (classification, diffing, plan
//!   rules, test-insertion policy). No I/O.
//! - **[`io`]**: Side-effecting helpers (config, persistence, project files,
//!   git, subprocesses, prompts, the model command adapter).
//! - **[`agents`]** and **[`tools`]**: model-backed planners and the built-in
//!   tool set.
//!
//! Orchestration modules ([`mission_log`], [`executor`], [`conductor`],
//! [`correction`], [`pipeline`]) tie them together for the CLI.

pub mod agents;
pub mod conductor;
pub mod core;
pub mod correction;
pub mod error;
pub mod events;
pub mod executor;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod mission_log;
pub mod pipeline;
pub mod task;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tools;
