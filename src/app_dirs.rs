//! Directory helpers anchored to a single `.leadscore` folder.
//!
//! Artifacts, logs, feedback and the TOML config all live under one root,
//! defaulting to the OS config directory and allowing a `LEADSCORE_HOME`
//! override for tests, containers or portable setups.

use std::{
    path::PathBuf,
    sync::{LazyLock, Mutex},
};

use directories::BaseDirs;
use thiserror::Error;

/// Name of the application directory that lives under the OS config root.
pub const APP_DIR_NAME: &str = ".leadscore";
/// Environment variable overriding the base directory.
pub const HOME_ENV: &str = "LEADSCORE_HOME";

static BASE_OVERRIDE: LazyLock<Mutex<Option<PathBuf>>> = LazyLock::new(|| Mutex::new(None));

/// Errors that can occur while resolving or preparing application directories.
#[derive(Debug, Error)]
pub enum AppDirError {
    /// No suitable base config directory could be resolved.
    #[error("No suitable base directory available for lead scoring files")]
    NoBaseDir,
    /// Failed to create the application directory.
    #[error("Failed to create directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Return the root `.leadscore` directory, creating it if needed.
pub fn app_root_dir() -> Result<PathBuf, AppDirError> {
    let base = base_dir().ok_or(AppDirError::NoBaseDir)?;
    ensure_dir(base.join(APP_DIR_NAME))
}

/// Directory holding the persisted preprocessor, model and explainer.
pub fn artifacts_dir() -> Result<PathBuf, AppDirError> {
    ensure_dir(app_root_dir()?.join("artifacts"))
}

/// Return the logs directory inside the root, creating it if needed.
pub fn logs_dir() -> Result<PathBuf, AppDirError> {
    ensure_dir(app_root_dir()?.join("logs"))
}

/// Directory holding the append-only feedback log.
pub fn feedback_dir() -> Result<PathBuf, AppDirError> {
    ensure_dir(app_root_dir()?.join("feedback"))
}

/// Pin the base directory for the rest of the process.
pub fn set_base_override(path: PathBuf) {
    if let Ok(mut guard) = BASE_OVERRIDE.lock() {
        *guard = Some(path);
    }
}

/// Drop a previously pinned base directory.
pub fn clear_base_override() {
    if let Ok(mut guard) = BASE_OVERRIDE.lock() {
        *guard = None;
    }
}

fn ensure_dir(path: PathBuf) -> Result<PathBuf, AppDirError> {
    std::fs::create_dir_all(&path).map_err(|source| AppDirError::CreateDir {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

fn base_dir() -> Option<PathBuf> {
    if let Some(path) = BASE_OVERRIDE.lock().ok().and_then(|guard| guard.clone()) {
        return Some(path);
    }
    if let Ok(path) = std::env::var(HOME_ENV) {
        return Some(PathBuf::from(path));
    }
    BaseDirs::new().map(|dirs| dirs.config_dir().to_path_buf())
}
