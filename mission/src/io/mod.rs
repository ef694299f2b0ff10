//! I/O helpers for the mission pipeline.

pub mod config;
pub mod git;
pub mod log_store;
pub mod model;
pub mod process;
pub mod project;
pub mod prompt;
