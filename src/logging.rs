//! Tracing setup shared by the training tool and embedding services.
//!
//! Each launch writes to its own timestamped file under the logs directory,
//! optionally mirrored to stdout. Old launch files beyond the retention count
//! are removed at startup.

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::OnceLock,
    time::SystemTime,
};

use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

use crate::app_dirs;

const LOG_FILE_PREFIX: &str = "leadscore";
const LOG_EXTENSION: &str = "log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error(transparent)]
    Dir(#[from] app_dirs::AppDirError),
    #[error("Log directory {path} is unusable: {source}")]
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to remove old log file {path}: {source}")]
    Prune {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to create log file at {path}: {source}")]
    CreateLogFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to format log filename time: {0}")]
    FormatTime(#[from] time::error::Format),
    #[error("Failed to install global tracing subscriber: {0}")]
    SetGlobal(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Knobs for [`init`] and [`init_in`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    /// Mirror events to stdout in addition to the launch file.
    pub stdout: bool,
    /// Filter directive used when `RUST_LOG` is unset.
    pub default_directive: String,
    /// Launch files kept after pruning, including the current one.
    pub keep_files: usize,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            stdout: true,
            default_directive: "info".to_string(),
            keep_files: 10,
        }
    }
}

impl LogOptions {
    /// File-only logging, used by `--quiet` runs.
    pub fn file_only() -> Self {
        Self {
            stdout: false,
            ..Self::default()
        }
    }
}

/// Install the global subscriber under the application logs directory.
///
/// Returns the path of this launch's log file. Later calls return `Ok(None)`.
pub fn init(options: &LogOptions) -> Result<Option<PathBuf>, LoggingError> {
    if LOG_GUARD.get().is_some() {
        return Ok(None);
    }
    init_in(&app_dirs::logs_dir()?, options)
}

/// Install the global subscriber with launch files written to `log_dir`.
pub fn init_in(log_dir: &Path, options: &LogOptions) -> Result<Option<PathBuf>, LoggingError> {
    if LOG_GUARD.get().is_some() {
        return Ok(None);
    }
    let log_path = open_launch_file(log_dir, now_local_or_utc())?;
    prune_launch_files(log_dir, options.keep_files.max(1))?;

    let file_name = log_path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    let (file_writer, guard) = tracing_appender::non_blocking(rolling::never(log_dir, file_name));
    let timer = fmt::time::OffsetTime::new(
        UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
        DISPLAY_FORMAT,
    );

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_timer(timer.clone())
        .with_writer(file_writer)
        .boxed();
    let stdout_layer = options.stdout.then(|| {
        fmt::layer()
            .with_timer(timer)
            .with_writer(std::io::stdout)
            .boxed()
    });
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&options.default_directive));
    let subscriber = Registry::default()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer);
    tracing::subscriber::set_global_default(subscriber)?;
    let _ = LOG_GUARD.set(guard);

    tracing::info!("Logging to {}", log_path.display());
    Ok(Some(log_path))
}

const DISPLAY_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

fn open_launch_file(log_dir: &Path, now: OffsetDateTime) -> Result<PathBuf, LoggingError> {
    fs::create_dir_all(log_dir).map_err(|source| LoggingError::Directory {
        path: log_dir.to_path_buf(),
        source,
    })?;
    let path = log_dir.join(launch_file_name(now)?);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| LoggingError::CreateLogFile {
            path: path.clone(),
            source,
        })?;
    Ok(path)
}

fn launch_file_name(now: OffsetDateTime) -> Result<String, LoggingError> {
    const NAME_FORMAT: &[FormatItem<'_>] =
        format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");
    Ok(format!(
        "{LOG_FILE_PREFIX}_{}.{LOG_EXTENSION}",
        now.format(NAME_FORMAT)?
    ))
}

/// Remove the oldest `*.log` files so at most `keep` remain.
fn prune_launch_files(dir: &Path, keep: usize) -> Result<(), LoggingError> {
    let entries = fs::read_dir(dir).map_err(|source| LoggingError::Directory {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut logs: Vec<(SystemTime, PathBuf)> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some(LOG_EXTENSION)
        })
        .map(|path| {
            let modified = fs::metadata(&path)
                .and_then(|meta| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, path)
        })
        .collect();
    if logs.len() <= keep {
        return Ok(());
    }
    logs.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    let excess = logs.len() - keep;
    for (_, path) in logs.into_iter().take(excess) {
        fs::remove_file(&path).map_err(|source| LoggingError::Prune { path, source })?;
    }
    Ok(())
}

fn now_local_or_utc() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{thread, time::Duration};
    use tempfile::tempdir;

    #[test]
    fn launch_file_name_is_prefixed_and_timestamped() {
        let fixed = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        assert_eq!(
            launch_file_name(fixed).unwrap(),
            "leadscore_2023-11-14_22-13-20.log"
        );
    }

    #[test]
    fn launch_file_is_created_with_missing_parents() {
        let dir = tempdir().unwrap();
        let logs = dir.path().join("nested").join("logs");
        let fixed = OffsetDateTime::from_unix_timestamp(0).unwrap();
        let path = open_launch_file(&logs, fixed).unwrap();
        assert!(path.is_file());
        assert!(path.starts_with(&logs));
    }

    #[test]
    fn pruning_keeps_newest_logs_and_ignores_other_files() {
        let dir = tempdir().unwrap();
        for idx in 0..5 {
            fs::write(dir.path().join(format!("leadscore_{idx}.log")), "").unwrap();
            thread::sleep(Duration::from_millis(10));
        }
        fs::write(dir.path().join("feedback.jsonl"), "{}").unwrap();

        prune_launch_files(dir.path(), 2).unwrap();
        let mut remaining: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        remaining.sort();
        assert_eq!(
            remaining,
            vec!["feedback.jsonl", "leadscore_3.log", "leadscore_4.log"]
        );
    }

    #[test]
    fn quiet_options_disable_stdout_only() {
        let quiet = LogOptions::file_only();
        assert!(!quiet.stdout);
        assert_eq!(quiet.keep_files, LogOptions::default().keep_files);
    }
}
