//! Logging initialization for the identity engine.

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber for the engine.
///
/// Sets up tracing with:
/// - Log level from the `ROOST_LOG` env var, falling back to the provided default
/// - Plain formatter by default, structured JSON when `ROOST_LOG_FORMAT=json`
///
/// Safe to call more than once; later calls are no-ops.
///
/// # Example
///
/// ```ignore
/// init_logging("info");
/// tracing::info!("Engine started");
/// ```
pub fn init_logging(level: &str) {
    let filter =
        EnvFilter::try_from_env("ROOST_LOG").unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let json = std::env::var("ROOST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
