//! Scoring configuration loaded from `leadscore.toml`.
//!
//! Config keys (TOML): `artifact_dir`, `feedback_log`, `review_threshold`,
//! `importance_sample_cap`, `seed`, `selection`, `holdout_fraction`,
//! `attribution_permutations`. Every key is optional.

mod defaults;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app_dirs;
pub(crate) use defaults::clamp_review_threshold;
use defaults::{
    clamp_holdout_fraction, default_attribution_permutations,
    default_holdout_fraction, default_importance_sample_cap, default_review_threshold,
    default_seed,
};

/// Default filename used to store the configuration.
pub const CONFIG_FILE_NAME: &str = "leadscore.toml";
/// Default filename of the feedback log inside the feedback directory.
pub const FEEDBACK_LOG_FILE_NAME: &str = "feedback.jsonl";

/// Errors raised while reading or writing the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Dir(#[from] app_dirs::AppDirError),
    #[error("Failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    SerializeToml(#[from] toml::ser::Error),
    #[error("Failed to write config at {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// How the trainer picks a winner among the candidate classifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionRule {
    /// Highest accuracy on the data the candidates were fit on.
    #[default]
    InSample,
    /// Highest accuracy on a seeded held-out split of the training data.
    Holdout,
}

/// Settings shared by training, scoring and feedback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoringConfig {
    /// Artifact storage directory; defaults to `<root>/artifacts`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_dir: Option<PathBuf>,
    /// Feedback log path; defaults to `<root>/feedback/feedback.jsonl`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_log: Option<PathBuf>,
    #[serde(default = "default_review_threshold")]
    pub review_threshold: f64,
    #[serde(default = "default_importance_sample_cap")]
    pub importance_sample_cap: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub selection: SelectionRule,
    #[serde(default = "default_holdout_fraction")]
    pub holdout_fraction: f64,
    #[serde(default = "default_attribution_permutations")]
    pub attribution_permutations: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            artifact_dir: None,
            feedback_log: None,
            review_threshold: default_review_threshold(),
            importance_sample_cap: default_importance_sample_cap(),
            seed: default_seed(),
            selection: SelectionRule::default(),
            holdout_fraction: default_holdout_fraction(),
            attribution_permutations: default_attribution_permutations(),
        }
    }
}

impl ScoringConfig {
    /// Clamp values into their supported ranges.
    pub fn normalized(mut self) -> Self {
        self.review_threshold = clamp_review_threshold(self.review_threshold);
        self.holdout_fraction = clamp_holdout_fraction(self.holdout_fraction);
        self.importance_sample_cap = self.importance_sample_cap.max(1);
        self.attribution_permutations = self.attribution_permutations.max(1);
        self
    }

    /// Resolve the artifact directory, falling back to the application root.
    pub fn resolve_artifact_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.artifact_dir {
            Some(path) => Ok(path.clone()),
            None => Ok(app_dirs::artifacts_dir()?),
        }
    }

    /// Resolve the feedback log path, falling back to the application root.
    pub fn resolve_feedback_log(&self) -> Result<PathBuf, ConfigError> {
        match &self.feedback_log {
            Some(path) => Ok(path.clone()),
            None => Ok(app_dirs::feedback_dir()?.join(FEEDBACK_LOG_FILE_NAME)),
        }
    }
}

/// Resolve the configuration file path inside the application root.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(app_dirs::app_root_dir()?.join(CONFIG_FILE_NAME))
}

/// Load configuration from the application root, returning defaults if missing.
pub fn load_or_default() -> Result<ScoringConfig, ConfigError> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(ScoringConfig::default());
    }
    load_from(&path)
}

/// Load configuration from an explicit TOML file.
pub fn load_from(path: &Path) -> Result<ScoringConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str::<ScoringConfig>(&text)
        .map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        })
        .map(ScoringConfig::normalized)
}

/// Save configuration to a specific path, creating parent directories as needed.
pub fn save_to_path(config: &ScoringConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let text = toml::to_string_pretty(config)?;
    std::fs::write(path, text).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}
