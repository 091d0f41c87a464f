//! Shared logging utilities for consistent tracing across the calculation system

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::types::CalcId;

/// Initialize the stdout tracing subscriber
///
/// `RUST_LOG` wins when set, otherwise both crates log at `log_level`
/// and HTTP plumbing is kept at warn.
pub fn init_tracing(log_level: Option<&str>) {
    use tracing_subscriber::{fmt, EnvFilter};

    let base_level = log_level.unwrap_or("info");
    let default_filter =
        format!("calc_orchestrator={base_level},calc_shared={base_level},reqwest=warn,hyper=warn");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    // try_init so repeated calls (tests, embedding) do not panic
    let _ = fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// Get formatted timestamp for consistent logging
pub fn format_timestamp() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%H:%M:%S%.3f").to_string()
}

/// Macro for calculation-aware info logging
#[macro_export]
macro_rules! calc_info {
    ($calc_id:expr, $($arg:tt)*) => {
        tracing::info!(
            calc = %$calc_id,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for calculation-aware warning logging
#[macro_export]
macro_rules! calc_warn {
    ($calc_id:expr, $($arg:tt)*) => {
        tracing::warn!(
            calc = %$calc_id,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for calculation-aware error logging
#[macro_export]
macro_rules! calc_error {
    ($calc_id:expr, $($arg:tt)*) => {
        tracing::error!(
            calc = %$calc_id,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for calculation-aware debug logging
#[macro_export]
macro_rules! calc_debug {
    ($calc_id:expr, $($arg:tt)*) => {
        tracing::debug!(
            calc = %$calc_id,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Contextual logging helper for startup messages
pub fn log_startup(details: &str) {
    info!(timestamp = format_timestamp(), "🚀 Starting {}", details);
}

/// Contextual logging helper for shutdown messages
pub fn log_shutdown(reason: &str) {
    info!(timestamp = format_timestamp(), "🛑 Shutting down: {}", reason);
}

/// Contextual logging helper for errors
pub fn log_error(calc_id: &CalcId, context: &str, error: &dyn std::error::Error) {
    error!(
        calc = %calc_id,
        timestamp = format_timestamp(),
        "❌ {}: {}",
        context,
        error
    );
}

/// Contextual logging helper for terminal success
pub fn log_success(calc_id: &CalcId, details: &str) {
    info!(calc = %calc_id, timestamp = format_timestamp(), "✅ {}", details);
}

/// Contextual logging helper for progress updates
pub fn log_progress(calc_id: &CalcId, progress: f64, message: &str) {
    debug!(
        calc = %calc_id,
        timestamp = format_timestamp(),
        "📊 {:.1}% {}",
        progress,
        message
    );
}
