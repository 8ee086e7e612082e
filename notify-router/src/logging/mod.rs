//! Logging setup with a reloadable filter and optional daily log files.
//!
//! - Runtime log level changes via `tracing_subscriber::reload`
//! - Text or JSON console output
//! - Daily rolled log files with retention cleanup
//! - Local timezone timestamps

use chrono::{Local, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    reload::{self, Handle},
    util::SubscriberInitExt,
};

use crate::config::LoggingSettings;

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "notify_router=info,rdkafka=warn,sqlx=warn";

/// File name prefix of rolled log files.
const LOG_FILE_PREFIX: &str = "notify-router.log";

/// Log retention period in days.
const LOG_RETENTION_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Type alias for the reload handle.
pub type FilterHandle = Handle<EnvFilter, tracing_subscriber::Registry>;

/// Handle to the installed subscriber.
pub struct LoggingHandle {
    handle: FilterHandle,
    log_dir: Option<PathBuf>,
    _guard: Option<WorkerGuard>,
}

impl LoggingHandle {
    /// Get the current filter directive string.
    pub fn get_filter(&self) -> String {
        self.handle
            .with_current(|filter| filter.to_string())
            .unwrap_or_default()
    }

    /// Replace the filter directive, e.g. `notify_router=debug`.
    pub fn set_filter(&self, directive: &str) -> crate::Result<()> {
        let new_filter = EnvFilter::try_new(directive)
            .map_err(|e| crate::Error::Other(format!("Invalid filter directive: {}", e)))?;

        self.handle
            .reload(new_filter)
            .map_err(|e| crate::Error::Other(format!("Failed to reload filter: {}", e)))?;

        info!(directive = %directive, "Log filter updated");
        Ok(())
    }

    /// Apply the `RUST_LOG` entry of the dotenv file at `path`.
    ///
    /// Returns the applied directive, or `None` when the file has no
    /// `RUST_LOG` entry and the current filter is kept.
    pub fn reload_from_env_file(&self, path: &Path) -> crate::Result<Option<String>> {
        let entries = dotenvy::from_path_iter(path)
            .map_err(|e| crate::Error::config(format!("Failed to read {}: {}", path.display(), e)))?;

        let mut directive = None;
        for entry in entries {
            let (key, value) = entry.map_err(|e| {
                crate::Error::config(format!("Failed to parse {}: {}", path.display(), e))
            })?;
            if key == "RUST_LOG" {
                directive = Some(value);
            }
        }

        match directive {
            Some(directive) => {
                self.set_filter(&directive)?;
                Ok(Some(directive))
            }
            None => {
                debug!(path = %path.display(), filter = %self.get_filter(), "No RUST_LOG entry, keeping filter");
                Ok(None)
            }
        }
    }

    /// Delete rolled log files older than the retention period once a day.
    /// No-op when logging to the console only.
    pub fn start_retention_cleanup(self: &Arc<Self>, cancel_token: CancellationToken) {
        let Some(log_dir) = self.log_dir.clone() else {
            return;
        };

        tokio::spawn(async move {
            let cleanup_interval = Duration::from_secs(24 * 60 * 60);

            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Log retention cleanup task shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(cleanup_interval) => {
                        if let Err(e) = cleanup_old_logs(&log_dir, LOG_RETENTION_DAYS).await {
                            warn!(error = %e, "Failed to cleanup old logs");
                        }
                    }
                }
            }
        });
    }
}

/// Date encoded in a rolled log file name (`notify-router.log.YYYY-MM-DD`).
fn rolled_file_date(filename: &str) -> Option<chrono::NaiveDate> {
    let date_str = filename.strip_prefix(LOG_FILE_PREFIX)?.strip_prefix('.')?;
    chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d").ok()
}

async fn cleanup_old_logs(log_dir: &Path, retention_days: i64) -> std::io::Result<usize> {
    let cutoff = (Utc::now() - chrono::Duration::days(retention_days)).date_naive();

    let mut entries = tokio::fs::read_dir(log_dir).await?;
    let mut deleted_count = 0;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(file_date) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(rolled_file_date)
        else {
            continue;
        };

        if file_date < cutoff {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to delete old log file");
            } else {
                deleted_count += 1;
                debug!(path = %path.display(), "Deleted old log file");
            }
        }
    }

    if deleted_count > 0 {
        info!(count = deleted_count, "Cleaned up old log files");
    }

    Ok(deleted_count)
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides [`DEFAULT_LOG_FILTER`] when set. Keep the returned
/// handle alive for the lifetime of the process so buffered file output is
/// flushed.
pub fn init_logging(settings: &LoggingSettings) -> crate::Result<Arc<LoggingHandle>> {
    let initial_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let (filter_layer, filter_handle) = reload::Layer::new(initial_filter);

    let (text_console, json_console) = if settings.json {
        (None, Some(fmt::layer().json().with_timer(LocalTimer)))
    } else {
        (Some(fmt::layer().with_ansi(true).with_timer(LocalTimer)), None)
    };

    let mut guard = None;
    let mut log_dir = None;
    let file_layer = match settings.log_dir.as_deref() {
        Some(dir) => {
            let path = PathBuf::from(dir);
            std::fs::create_dir_all(&path)?;
            let file_appender = tracing_appender::rolling::daily(&path, LOG_FILE_PREFIX);
            let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
            guard = Some(worker_guard);
            log_dir = Some(path);
            Some(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_timer(LocalTimer),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(text_console)
        .with(json_console)
        .with(file_layer)
        .try_init()
        .map_err(|e| {
            crate::Error::Other(format!("Failed to set global default subscriber: {}", e))
        })?;

    Ok(Arc::new(LoggingHandle {
        handle: filter_handle,
        log_dir,
        _guard: guard,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Handle over a subscriber that is kept alive but not installed globally.
    fn local_handle() -> (LoggingHandle, impl tracing::Subscriber) {
        let (filter_layer, handle) = reload::Layer::new(EnvFilter::new(DEFAULT_LOG_FILTER));
        let subscriber = tracing_subscriber::registry().with(filter_layer);
        (
            LoggingHandle {
                handle,
                log_dir: None,
                _guard: None,
            },
            subscriber,
        )
    }

    #[test]
    fn test_set_filter_replaces_directive() {
        let (logging, _subscriber) = local_handle();
        assert!(logging.get_filter().contains("notify_router=info"));

        logging.set_filter("notify_router=debug").unwrap();
        assert_eq!(logging.get_filter(), "notify_router=debug");

        assert!(logging.set_filter("notify_router=loud").is_err());
        assert_eq!(logging.get_filter(), "notify_router=debug");
    }

    #[test]
    fn test_reload_from_env_file() {
        let (logging, _subscriber) = local_handle();
        let dir = tempfile::tempdir().unwrap();
        let env_file = dir.path().join(".env");

        std::fs::write(&env_file, "MOCK_MODE=true\n").unwrap();
        assert_eq!(logging.reload_from_env_file(&env_file).unwrap(), None);
        assert!(logging.get_filter().contains("notify_router=info"));

        std::fs::write(&env_file, "MOCK_MODE=true\nRUST_LOG=notify_router=trace\n").unwrap();
        assert_eq!(
            logging.reload_from_env_file(&env_file).unwrap().as_deref(),
            Some("notify_router=trace")
        );
        assert_eq!(logging.get_filter(), "notify_router=trace");

        assert!(logging.reload_from_env_file(&dir.path().join("missing.env")).is_err());
    }

    #[test]
    fn test_default_filter() {
        assert!(DEFAULT_LOG_FILTER.contains("notify_router=info"));
        assert!(DEFAULT_LOG_FILTER.contains("rdkafka=warn"));
    }

    #[test]
    fn test_rolled_file_date() {
        assert_eq!(
            rolled_file_date("notify-router.log.2024-03-01"),
            chrono::NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(rolled_file_date("notify-router.log"), None);
        assert_eq!(rolled_file_date("other.log.2024-03-01"), None);
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_expired_files() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("notify-router.log.2000-01-01");
        let today = dir
            .path()
            .join(format!("notify-router.log.{}", Utc::now().format("%Y-%m-%d")));
        let unrelated = dir.path().join("keep.txt");
        for path in [&old, &today, &unrelated] {
            std::fs::write(path, b"x").unwrap();
        }

        let deleted = cleanup_old_logs(dir.path(), LOG_RETENTION_DAYS).await.unwrap();

        assert_eq!(deleted, 1);
        assert!(!old.exists());
        assert!(today.exists());
        assert!(unrelated.exists());
    }
}
