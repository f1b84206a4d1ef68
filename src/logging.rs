//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

/// Install the global subscriber at `level`.
///
/// `RUST_LOG` wins over the configured level. Returns false when a
/// subscriber was already installed, by an earlier call or by the host.
pub fn init(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
