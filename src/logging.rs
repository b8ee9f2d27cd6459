//! Diagnostics for the CLI.
//!
//! Tracing goes to stderr and is controlled by `RUST_LOG`. It is not the
//! product output: results live in the evidence directory and on stdout.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. Defaults to `info` when `RUST_LOG` is unset.
///
/// ```bash
/// RUST_LOG=specrun_engine=debug specrun run specs/api.yaml
/// ```
pub fn init() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(std::io::stderr).compact())
    .init();
}
