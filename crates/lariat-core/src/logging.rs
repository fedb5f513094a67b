//! Logging initialization.
//!
//! Library code only emits `tracing` events. Binaries and test harnesses call
//! one of the init functions once at startup to decide where they go.

use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize a human-readable subscriber.
///
/// The level comes from `RUST_LOG` when set, otherwise from `level`.
/// Calling this more than once is harmless; later calls are ignored.
///
/// # Example
///
/// ```ignore
/// lariat_core::init_logging(&config.log_level);
/// tracing::info!("publisher started");
/// ```
pub fn init_logging(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(true)
        .compact()
        .finish()
        .try_init();
}

/// Initialize a subscriber that writes one JSON object per line.
pub fn init_logging_json(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .json()
        .with_current_span(true)
        .finish()
        .try_init();
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(parse_level(level).to_string().to_lowercase()))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level_all_variants() {
        assert_eq!(parse_level("trace"), tracing::Level::TRACE);
        assert_eq!(parse_level("debug"), tracing::Level::DEBUG);
        assert_eq!(parse_level("info"), tracing::Level::INFO);
        assert_eq!(parse_level("warn"), tracing::Level::WARN);
        assert_eq!(parse_level("warning"), tracing::Level::WARN);
        assert_eq!(parse_level("error"), tracing::Level::ERROR);
    }

    #[test]
    fn parse_level_case_insensitive() {
        assert_eq!(parse_level("TRACE"), tracing::Level::TRACE);
        assert_eq!(parse_level("Debug"), tracing::Level::DEBUG);
        assert_eq!(parse_level("WARNING"), tracing::Level::WARN);
    }

    #[test]
    fn parse_level_unknown_defaults_to_info() {
        assert_eq!(parse_level(""), tracing::Level::INFO);
        assert_eq!(parse_level("verbose"), tracing::Level::INFO);
    }

    #[test]
    fn init_twice_does_not_panic() {
        init_logging("debug");
        init_logging("info");
        init_logging_json("info");
    }
}
