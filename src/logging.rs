//! Logging Setup
//!
//! The core instruments scope entry/exit with `tracing` events under the
//! `dynascope` target. Embedders with their own subscriber need nothing from
//! this module; [`init`] is a convenience for binaries, examples, and tests.
//!
//! The filter comes from the `DYNASCOPE_LOG` environment variable when set
//! (standard `tracing_subscriber::EnvFilter` directives), otherwise from the
//! `default_directives` argument.

use tracing_subscriber::EnvFilter;

/// Environment variable consulted for filter directives.
pub const LOG_ENV_VAR: &str = "DYNASCOPE_LOG";

/// Initialize a formatted `tracing` subscriber for this process.
///
/// Does nothing if a global subscriber is already installed, so tests can
/// call it repeatedly.
pub fn init(default_directives: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(default_directives));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
