//! Logging initialization
//!
//! The embedding host calls one of these once at startup:
//! - `RUST_LOG` always takes precedence
//! - otherwise the configured filter (`logging.filter` / `ARKLET_LOG_FILTER`)
//! - otherwise "info"
//!
//! ```rust,no_run
//! use arklet::utils::init_logging;
//!
//! init_logging(Some("arklet=debug"));
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

const DEFAULT_FILTER: &str = "info";

/// Pick the effective filter: `RUST_LOG`, then `filter`, then "info"
pub fn resolve_filter(filter: Option<&str>) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }
    EnvFilter::new(filter.unwrap_or(DEFAULT_FILTER))
}

/// Initialize human-readable logging on stderr
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_logging(filter: Option<&str>) -> bool {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(std::env::var("NO_COLOR").is_err()),
        )
        .with(resolve_filter(filter))
        .try_init()
        .is_ok()
}

/// Initialize JSON logging for log aggregation
///
/// Spans are included so every dispatch line carries its command and module.
#[cfg(feature = "json-logging")]
pub fn init_json_logging(filter: Option<&str>) -> bool {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true)
                .with_span_list(true),
        )
        .with(resolve_filter(filter))
        .try_init()
        .is_ok()
}

/// Initialize logging from configuration
pub fn init_logging_from_config(config: &LoggingConfig) -> bool {
    let filter = config.filter.as_deref();

    if config.json_format {
        #[cfg(feature = "json-logging")]
        {
            return init_json_logging(filter);
        }
        #[cfg(not(feature = "json-logging"))]
        {
            // Built without JSON support: plain output
            return init_logging(filter);
        }
    }
    init_logging(filter)
}
