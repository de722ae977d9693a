use tracing_subscriber::EnvFilter;

/// Initializes the process-wide `tracing` subscriber from `RUST_LOG`,
/// defaulting to `info` when unset.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
