//! # Structured Logging Module
//!
//! Environment-aware structured logging for worker processes. Console output is
//! always enabled; a JSON file layer is added when a log directory is supplied.

use chrono::Utc;
use std::path::Path;
use std::process;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<Option<WorkerGuard>> = OnceLock::new();

/// Initialize structured logging with console output only
pub fn init_structured_logging() {
    init_structured_logging_with_dir(None);
}

/// Initialize structured logging, optionally writing JSON lines under `log_dir`
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_structured_logging_with_dir(log_dir: Option<&Path>) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let pid = process::id();

        let console = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(true)
            .with_filter(env_filter(&log_level));

        let (file_layer, guard, log_file) = match log_dir {
            Some(dir) if std::fs::create_dir_all(dir).is_ok() => {
                let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
                let file_name = format!("{environment}.{pid}.{timestamp}.log");
                let appender = tracing_appender::rolling::never(dir, &file_name);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_ansi(false)
                    .json()
                    .with_filter(env_filter(&log_level));
                (Some(layer), Some(guard), Some(dir.join(file_name)))
            }
            _ => (None, None, None),
        };

        // Another subscriber may already be installed (tests, embedding hosts)
        if tracing_subscriber::registry()
            .with(console)
            .with(file_layer)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized - continuing");
        }

        tracing::info!(
            pid = pid,
            environment = %environment,
            log_file = ?log_file,
            "🔧 STRUCTURED LOGGING: Initialized"
        );

        guard
    });
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Get current environment from environment variables
pub fn get_environment() -> String {
    std::env::var("PRESERVATION_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "test" => "warn".to_string(),
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for work item transitions
pub fn log_work_item_operation(
    operation: &str,
    work_item_id: i64,
    topic: &str,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        work_item_id = work_item_id,
        topic = %topic,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 WORK_ITEM_OPERATION"
    );
}

/// Log structured data for restoration steps
pub fn log_restore_operation(
    operation: &str,
    identifier: &str,
    bucket: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        identifier = %identifier,
        bucket = bucket,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📦 RESTORE_OPERATION"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_levels_by_environment() {
        assert_eq!(get_log_level("test"), "warn");
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("staging"), "debug");
    }

    #[test]
    fn test_init_is_repeatable() {
        init_structured_logging();
        init_structured_logging();
        log_work_item_operation("start", 7, "restore_object", "Started", None);
    }
}
