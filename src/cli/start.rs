use crate::cli::{actions::Action, commands, dispatch, telemetry};
use anyhow::Result;

/// `-v` repeat count to tracing level; zero keeps the default (error only).
const fn level_from_count(count: u8) -> Option<tracing::Level> {
    match count {
        0 => None,
        1 => Some(tracing::Level::WARN),
        2 => Some(tracing::Level::INFO),
        3 => Some(tracing::Level::DEBUG),
        _ => Some(tracing::Level::TRACE),
    }
}

/// Parse arguments, bring up telemetry, and hand the selected action back
/// to the binary for execution.
///
/// # Errors
///
/// Returns an error when argument parsing, telemetry setup, or dispatch
/// fails.
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    let verbosity = matches
        .get_one::<u8>(commands::logging::ARG_VERBOSITY)
        .copied()
        .unwrap_or(0);
    telemetry::init(level_from_count(verbosity))?;

    dispatch::handler(&matches)
}
