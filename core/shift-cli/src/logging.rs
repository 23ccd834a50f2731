//! Log setup for `shiftctl`.
//!
//! Stdout is reserved for command output, so events go to a daily file under
//! `<root>/logs`. Level comes from `SHIFT_LOG`, then `RUST_LOG`, then `info`;
//! `SHIFT_DEBUG_LOG=1` forces `debug`.

use std::env;

use shift_core::StorageConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "shiftctl.log";

/// Keep the returned guard alive until exit or buffered lines are lost.
pub fn init(storage: &StorageConfig) -> Option<WorkerGuard> {
    let filter = env_filter();

    if let Err(e) = storage.ensure_dirs() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        tracing::warn!(error = %e, "Log directory unavailable, logging to stderr");
        return None;
    }

    let appender = tracing_appender::rolling::daily(storage.logs_dir(), LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}

fn env_filter() -> EnvFilter {
    let debug_enabled = env::var("SHIFT_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_env("SHIFT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
