//! Structured logging configured from the environment.
//!
//! Logs go to stderr so that stdout carries only command output. Records
//! emitted through the `log` facade by `rstest-bdd-messages` are bridged
//! into the same subscriber.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directive.
pub(crate) const LOG_VAR: &str = "RSTEST_BDD_MESSAGES_LOG";

const DEFAULT_FILTER: &str = "warn";

fn filter_from_directive(directive: Option<&str>) -> EnvFilter {
    directive
        .filter(|value| !value.trim().is_empty())
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialise logging from [`LOG_VAR`], defaulting to `warn`.
///
/// An unparsable directive falls back to the default. If a global subscriber
/// is already installed the call has no effect.
pub(crate) fn init_logging() {
    let directive = std::env::var(LOG_VAR).ok();
    let filter = filter_from_directive(directive.as_deref());
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .try_init();
    if installed.is_err() {
        tracing::debug!("logging already initialised");
    }
}
