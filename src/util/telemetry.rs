//! Telemetry helpers for structured logging and tracing.

/// Initialize tracing for the delivery subsystem. Hosts usually install their
/// own subscriber; this helper installs an env-filtered fmt subscriber only
/// when none is set yet.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("telemetry_delivery=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init();
}
