//! Logging setup for hosts embedding clearpane.
//!
//! The crate itself only uses the `log` facade. `init_logging` installs an
//! `env_logger` backend with timestamped lines, writing either to stderr or
//! to a dated file in a log directory with old files cleaned up.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use lazy_static::lazy_static;
use parking_lot::Mutex;

use crate::config::LoggingConfig;
use crate::error::{OverlayResult, ResultExt};

/// Maximum number of log files to keep
const MAX_LOG_FILES: usize = 5;

/// Log file name prefix
const LOG_FILE_PREFIX: &str = "clearpane";

lazy_static! {
    /// Log directory path, when file logging is enabled
    static ref LOG_DIR: Mutex<Option<PathBuf>> = Mutex::new(None);
}

/// Initialize the logging system.
///
/// Safe to call more than once: if a global logger is already installed the
/// call only records the log directory and returns Ok.
pub fn init_logging(config: &LoggingConfig) -> OverlayResult<()> {
    let mut builder = env_logger::Builder::new();
    builder.parse_filters(&config.level);
    builder.format(|buf, record| {
        writeln!(
            buf,
            "[{}] [{}] [{}] {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    if let Some(dir) = &config.log_dir {
        fs::create_dir_all(dir).context("Failed to create log directory")?;
        let path = current_log_path(dir);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file {:?}", path))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));

        *LOG_DIR.lock() = Some(dir.clone());
        cleanup_old_logs(dir);
    }

    if builder.try_init().is_err() {
        log::debug!("[LOGGING] Logger already installed, keeping existing backend");
        return Ok(());
    }

    log::info!("[LOGGING] Logging initialized (filter: {})", config.level);
    if let Some(dir) = &config.log_dir {
        log::info!("[LOGGING] Log directory: {:?}", dir);
    }
    Ok(())
}

/// The directory file logging writes to, if enabled.
pub fn log_dir() -> Option<PathBuf> {
    LOG_DIR.lock().clone()
}

/// Get the path for the current log file (one per day)
pub fn current_log_path(log_dir: &Path) -> PathBuf {
    let date = Local::now().format("%Y-%m-%d");
    log_dir.join(format!("{}_{}.log", LOG_FILE_PREFIX, date))
}

/// Clean up old log files, keeping only the most recent MAX_LOG_FILES.
///
/// Returns the number of files removed.
pub fn cleanup_old_logs(log_dir: &Path) -> usize {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return 0;
    };

    let mut log_files: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext == "log")
                .unwrap_or(false)
        })
        .collect();

    // Newest first
    log_files.sort_by(|a, b| {
        let a_time = a.metadata().and_then(|m| m.modified()).ok();
        let b_time = b.metadata().and_then(|m| m.modified()).ok();
        b_time.cmp(&a_time)
    });

    let mut removed = 0;
    for file in log_files.into_iter().skip(MAX_LOG_FILES) {
        if fs::remove_file(file.path()).is_ok() {
            removed += 1;
        }
    }
    removed
}
