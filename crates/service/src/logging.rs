use tracing_subscriber::{fmt, EnvFilter};

/// Initialize tracing from `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() {
    init_tracing_with_filter("info");
}

/// Initialize tracing with an explicit default filter; `RUST_LOG` still
/// overrides. Safe to call more than once (later calls are no-ops).
pub fn init_tracing_with_filter(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
