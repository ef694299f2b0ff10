//! Diagnostic tracing for missions.
//!
//! Tracing is for whoever debugs the tool and goes to stderr only. What a user
//! sees about a mission travels on the event bus (`events`) and is printed by
//! the CLI, independent of any filter set here.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Directive used when neither `MISSION_LOG` nor `RUST_LOG` is set.
pub const DEFAULT_DIRECTIVE: &str = "warn";

/// Env var checked before `RUST_LOG`, so mission tracing can be raised
/// without turning on every dependency's logs.
pub const ENV_VAR: &str = "MISSION_LOG";

/// Install the global subscriber: compact lines on stderr.
///
/// ```bash
/// MISSION_LOG=mission=debug mission run
/// ```
pub fn init() {
    let filter = filter_from(std::env::var(ENV_VAR).ok(), std::env::var("RUST_LOG").ok());
    // A second init (e.g. from tests sharing a process) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact().with_target(false))
        .try_init();
}

fn filter_from(mission: Option<String>, rust: Option<String>) -> EnvFilter {
    mission
        .or(rust)
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVE))
}
