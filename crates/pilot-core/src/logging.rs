use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber reading `RUST_LOG` (defaulting to
/// `info`), writing compact formatted lines to stderr. Call once from a
/// binary's `main`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
