//! Shared logging utilities for consistent tracing across the engine link

use crate::types::Component;
use chrono::{DateTime, Utc};
use tracing::{error, info};

/// Build the filter directive for a binary built around `component`
pub fn filter_directive(component: Component, log_level: Option<&str>) -> String {
    let base_level = log_level.unwrap_or("info");

    match component {
        Component::Client => {
            format!("client={base_level},shared={base_level},tungstenite=warn,tokio_tungstenite=warn")
        }
        Component::Host => {
            format!("host={base_level},shared={base_level},tungstenite=warn,tokio_tungstenite=warn")
        }
        Component::Supervisor => {
            format!("supervisor={base_level},client={base_level},host={base_level},shared={base_level}")
        }
    }
}

/// Initialize the stdout tracing subscriber for a binary.
///
/// `RUST_LOG` wins over the computed directive when set.
pub fn init_tracing(component: Component, log_level: Option<&str>) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(component, log_level)));

    // A second init (tests, embedding applications) keeps the first subscriber
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

/// Macro for component-aware info logging
#[macro_export]
macro_rules! link_info {
    ($component:expr, $($arg:tt)*) => {
        tracing::info!(
            component = %$component,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for component-aware warning logging
#[macro_export]
macro_rules! link_warn {
    ($component:expr, $($arg:tt)*) => {
        tracing::warn!(
            component = %$component,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for component-aware error logging
#[macro_export]
macro_rules! link_error {
    ($component:expr, $($arg:tt)*) => {
        tracing::error!(
            component = %$component,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for component-aware debug logging
#[macro_export]
macro_rules! link_debug {
    ($component:expr, $($arg:tt)*) => {
        tracing::debug!(
            component = %$component,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for component-aware trace logging
#[macro_export]
macro_rules! link_trace {
    ($component:expr, $($arg:tt)*) => {
        tracing::trace!(
            component = %$component,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Contextual logging helper for startup messages
pub fn log_startup(component: Component, details: &str) {
    info!(
        component = %component,
        timestamp = format_timestamp(),
        "🚀 Starting {}",
        details
    );
}

/// Contextual logging helper for shutdown messages
pub fn log_shutdown(component: Component, reason: &str) {
    info!(
        component = %component,
        timestamp = format_timestamp(),
        "🛑 Shutting down: {}",
        reason
    );
}

/// Contextual logging helper for error conditions
pub fn log_error(component: Component, context: &str, error: &dyn std::fmt::Display) {
    error!(
        component = %component,
        timestamp = format_timestamp(),
        error = %error,
        "❌ {} failed: {}",
        context,
        error
    );
}
