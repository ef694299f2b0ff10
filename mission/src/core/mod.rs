//! Deterministic, pure logic shared by the mission pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod classifier;
pub mod diff;
pub mod invariants;
pub mod json_extract;
pub mod plan_rules;
pub mod summary;
pub mod test_policy;
pub mod types;
