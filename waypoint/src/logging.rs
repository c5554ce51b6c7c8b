//! Development-time tracing.
//!
//! Output goes to stderr so stdout stays machine-readable for `--format json`.
//! Persistent records (HISTORY.md, `loop_results.jsonl`) are written by the
//! commands themselves and do not depend on `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; defaults to `warn` if unset. Compact format on stderr.
///
/// # Example
/// ```bash
/// RUST_LOG=waypoint=debug waypoint next
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
