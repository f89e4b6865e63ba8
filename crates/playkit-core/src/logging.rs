//! Logging initialization for SDK hosts.

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber for a host application.
///
/// Log level comes from `RUST_LOG` when set, otherwise from `level`.
/// Safe to call more than once; later calls are no-ops.
///
/// # Example
///
/// ```ignore
/// playkit_core::init_logging("info");
/// tracing::info!("queue started");
/// ```
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
