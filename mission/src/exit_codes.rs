//! Stable exit codes for mission CLI commands.

use crate::error::MissionError;

/// Command succeeded (for missions: every task completed).
pub const OK: i32 = 0;
/// Invalid input, config, or project state, or any other error.
pub const INVALID: i32 = 1;
/// A mission stopped at a failed task and was not repaired.
pub const ABORTED: i32 = 3;
/// Self-correction ran out of attempts.
pub const EXHAUSTED: i32 = 4;

/// Exit code for a failed mission command.
pub fn for_error(err: &MissionError) -> i32 {
    match err {
        MissionError::MissionAborted { .. } => ABORTED,
        MissionError::SelfCorrectionExhausted { .. } => EXHAUSTED,
        _ => INVALID,
    }
}
