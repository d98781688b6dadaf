//! Logging setup for the CLI.
//!
//! Logging is off unless asked for:
//!
//! - `STRATA_DEBUG=true|1|yes` - debug level
//! - `STRATA_LOG_LEVEL=trace|debug|info|warn|error` - explicit level
//! - `STRATA_LOG_FORMAT=json|pretty|compact` - output format (default: json)
//!
//! Events go to stderr so command output on stdout stays parseable.

use std::env;
use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static INIT: Once = Once::new();

/// Check if debug logging is enabled via `STRATA_DEBUG`.
pub fn is_debug_enabled() -> bool {
    env::var("STRATA_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// The level from `STRATA_LOG_LEVEL`, falling back to debug when
/// `STRATA_DEBUG` is set and warn otherwise.
pub fn log_level() -> &'static str {
    let fallback = if is_debug_enabled() { "debug" } else { "warn" };
    match env::var("STRATA_LOG_LEVEL") {
        Ok(level) => match level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" => "warn",
            "error" => "error",
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

/// The format from `STRATA_LOG_FORMAT`.
pub fn log_format() -> &'static str {
    env::var("STRATA_LOG_FORMAT")
        .map(|f| match f.to_lowercase().as_str() {
            "pretty" => "pretty",
            "compact" => "compact",
            _ => "json",
        })
        .unwrap_or("json")
}

/// Install the global subscriber. Subsequent calls are no-ops.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var("STRATA_LOG_LEVEL").is_err() {
            return;
        }

        let level = log_level();
        let filter = EnvFilter::try_new(format!(
            "strata={level},strata_catalog={level},strata_migrate={level},strata_sqlite={level},strata_cli={level}"
        ))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

        let registry = tracing_subscriber::registry().with(filter);
        let result = match log_format() {
            "pretty" => registry
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .try_init(),
            "compact" => registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .try_init(),
            _ => registry
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init(),
        };
        if result.is_ok() {
            tracing::debug!(level, format = log_format(), "strata logging initialized");
        }
    });
}
