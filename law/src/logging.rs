use tracing_subscriber::{fmt, EnvFilter};

/// Initializes structured logging. Level defaults to `info`, overridable via
/// `RUST_LOG`. Called once from `main` before anything else runs.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(crate::defaults::DEFAULT_LOG_LEVEL));

    fmt().with_env_filter(filter).with_target(false).init();
}
