use tracing_subscriber::{EnvFilter, fmt};

/// Initializes tracing using the `RUST_LOG` environment variable.
///
/// If `RUST_LOG` is not set or fails to parse, `default_level` is used. Tests
/// should prefer [`try_init`] to avoid panicking if a subscriber is already
/// set.
///
/// # Examples
///
/// ```no_run
/// use sketch_tutor::logger;
/// logger::try_init("info").expect("logger initialized");
/// ```
pub fn init(default_level: &str) {
    try_init(default_level).expect("failed to initialize tracing")
}

/// Attempts to initialize tracing and returns an error if a subscriber is
/// already set.
pub fn try_init(default_level: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt().with_env_filter(filter).try_init().map_err(Into::into)
}
