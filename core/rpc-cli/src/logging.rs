//! Diagnostic logging.
//!
//! Nothing is logged to the terminal: the foreground session owns stdout and
//! the daemon has no terminal at all. Foreground runs write a daily rolling
//! file; the daemon appends to `logs/daemon.log`, its only durable record.

use fs_err as fs;
use std::env;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const DEBUG_ENV: &str = "SIMPLERPC_DEBUG_LOG";
const FOREGROUND_LOG_PREFIX: &str = "simplerpc.log";
const DAEMON_LOG_FILE: &str = "daemon.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Foreground,
    Daemon,
}

/// Installs the global subscriber. Keep the guard alive for the whole process
/// or buffered lines are lost on exit.
pub fn init(log_dir: &Path, target: LogTarget) -> Option<WorkerGuard> {
    if let Err(err) = fs::create_dir_all(log_dir) {
        eprintln!("Warning: failed to create log directory: {}", err);
        return None;
    }

    let appender = match target {
        LogTarget::Foreground => tracing_appender::rolling::daily(log_dir, FOREGROUND_LOG_PREFIX),
        LogTarget::Daemon => tracing_appender::rolling::never(log_dir, DAEMON_LOG_FILE),
    };
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .try_init();
    if installed.is_err() {
        return None;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        target = ?target,
        dir = %log_dir.display(),
        "Logging initialized"
    );
    Some(guard)
}

fn filter() -> EnvFilter {
    if debug_enabled(env::var(DEBUG_ENV).ok().as_deref()) {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn debug_enabled(value: Option<&str>) -> bool {
    matches!(value, Some("1" | "true" | "TRUE" | "yes" | "YES"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_values() {
        assert!(debug_enabled(Some("1")));
        assert!(debug_enabled(Some("yes")));
        assert!(!debug_enabled(Some("0")));
        assert!(!debug_enabled(None));
    }
}
