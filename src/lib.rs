//! Lead conversion scoring: preprocessing, candidate training and selection,
//! explainability, thresholded decisions with human review, and feedback.
/// Application directory resolution.
pub mod app_dirs;
/// TOML configuration.
pub mod config;
/// Lead records, frames and CSV loading.
pub mod dataset;
/// Feature attribution.
pub mod explain;
/// Feedback capture.
pub mod feedback;
/// Logging setup.
pub mod logging;
/// Candidate classifiers and metrics.
pub mod ml;
/// Feature preprocessing.
pub mod preprocess;
/// Serving-time scoring and decision policy.
pub mod scoring;
/// Artifact persistence.
pub mod storage;
/// Model training and selection.
pub mod training;
