use tracing_subscriber::EnvFilter;

/// Initialize process-wide tracing output.
///
/// `LOG_LEVEL` picks the default level; `RUST_LOG` takes precedence for
/// per-target filtering.
pub fn init_logging() {
    let default_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}
