//! Tracing setup for the `tm` binary.
//!
//! Logs go to stderr so JSON output on stdout stays parseable. The filter is
//! read from `TM_LOG` (e.g. `TM_LOG=taskmind=debug`), falling back to the
//! level passed by the caller. The web server additionally writes JSON lines
//! to `<data dir>/logs/taskmind.log`.

use crate::{Error, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "TM_LOG";

/// Name of the server log file.
pub const LOG_FILE: &str = "taskmind.log";

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install a stderr-only subscriber.
pub fn init(default_level: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| Error::Other(format!("Failed to initialize logging: {}", e)))
}

/// Install a subscriber writing to stderr and to a JSON log file in `log_dir`.
///
/// The returned guard flushes the file writer on drop and must be held for
/// as long as logging is needed.
pub fn init_with_file(default_level: &str, log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;
    let appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(file_writer),
        )
        .try_init()
        .map_err(|e| Error::Other(format!("Failed to initialize logging: {}", e)))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_reports_error() {
        // Whichever call installs the global subscriber, the next one cannot.
        let _ = init("warn");
        let err = init("warn").unwrap_err();
        assert!(err.to_string().contains("Failed to initialize logging"));
    }
}
