//! Logging setup shared by both binaries.
//!
//! Filter directives come from `MULTIAUTH_LOG`. Without it the level is
//! `warn`, or `debug` when `--verbose` was passed. Output goes to stderr so
//! the operator-facing text on stdout stays clean.

use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_ENV: &str = "MULTIAUTH_LOG";

pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "warn"
    }
}
