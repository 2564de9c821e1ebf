//! Feature preprocessing: structural validation, the fitted transform and its
//! persisted artifact.

mod transform;

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ScoringConfig;
use crate::dataset::LeadFrame;
use crate::explain::{FeatureImportanceMap, additive_importance};
use crate::storage::{
    ArtifactStore, LazyArtifact, RunManifest, StorageError, Versioned, load_artifact,
    publish_run, stage_artifact,
};

pub use transform::{CategoricalState, FeatureSchema, FittedTransform, NumericState};

/// Artifact name of the persisted preprocessor.
pub const PREPROCESSOR_ARTIFACT: &str = "preprocessor";

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<&'static str>),
    #[error("dataset is empty")]
    EmptyDataset,
    #[error("preprocessor has not been fitted")]
    NotFitted,
    #[error("non-finite value in `{column}` on row {row}")]
    NonFinite { column: &'static str, row: usize },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Persisted preprocessor: the fitted transform plus fit-time importance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedPreprocessor {
    pub transform: FittedTransform,
    /// Absent when importance could not be computed at fit time.
    #[serde(default)]
    pub feature_importance: Option<FeatureImportanceMap>,
}

/// Owns the fitted transform state and its persisted artifact.
///
/// After a fit the transform is held in memory; a fresh instance (or one in
/// another process) loads it from the artifact store on first use.
pub struct FeaturePreprocessor {
    store: Arc<dyn ArtifactStore>,
    fitted: LazyArtifact<Versioned<FittedPreprocessor>>,
    sample_cap: usize,
    seed: u64,
}

impl FeaturePreprocessor {
    pub fn new(store: Arc<dyn ArtifactStore>, config: &ScoringConfig) -> Self {
        Self {
            store,
            fitted: LazyArtifact::new(),
            sample_cap: config.importance_sample_cap.max(1),
            seed: config.seed,
        }
    }

    /// Structural check: every required raw column present and at least one row.
    pub fn validate(&self, frame: &LeadFrame) -> bool {
        match check_structure(frame) {
            Ok(()) => true,
            Err(err) => {
                error!("Dataset validation failed: {err}");
                false
            }
        }
    }

    /// Fit on `frame`, publish it as a run of its own and keep it in memory.
    ///
    /// The published run carries no model, so scoring needs a full training
    /// run afterwards.
    pub fn fit(&self, frame: &LeadFrame) -> Result<Arc<Versioned<FittedPreprocessor>>, PreprocessError> {
        let _lease = self.store.acquire_write()?;
        let staged = self.fit_staged(frame, Uuid::new_v4())?;
        let store = self.store.as_ref();
        stage_artifact(store, PREPROCESSOR_ARTIFACT, staged.run_id, &staged.value)?;
        publish_run(store, RunManifest::new(staged.run_id, &[PREPROCESSOR_ARTIFACT]))?;
        Ok(self.install(staged))
    }

    /// Fit without persisting; the caller publishes it with the rest of a run.
    pub(crate) fn fit_staged(
        &self,
        frame: &LeadFrame,
        run_id: Uuid,
    ) -> Result<Versioned<FittedPreprocessor>, PreprocessError> {
        check_structure(frame).inspect_err(|err| error!("Dataset validation failed: {err}"))?;
        let transform = FittedTransform::fit(frame)?;
        info!(
            "Fitted preprocessor on {} rows ({} features)",
            frame.len(),
            transform.schema().width()
        );
        let feature_importance = match self.sample_importance(&transform, frame) {
            Ok(importance) => Some(importance),
            Err(err) => {
                warn!("Feature importance unavailable: {err}");
                None
            }
        };
        Ok(Versioned {
            run_id,
            created_at: time::OffsetDateTime::now_utc().unix_timestamp(),
            value: FittedPreprocessor {
                transform,
                feature_importance,
            },
        })
    }

    pub(crate) fn install(
        &self,
        fitted: Versioned<FittedPreprocessor>,
    ) -> Arc<Versioned<FittedPreprocessor>> {
        self.fitted.set(fitted)
    }

    /// The in-memory transform, loading the persisted one on first use.
    pub fn fitted(&self) -> Result<Arc<Versioned<FittedPreprocessor>>, PreprocessError> {
        self.fitted.get_or_try_load(|| {
            let loaded = load_artifact(self.store.as_ref(), PREPROCESSOR_ARTIFACT).map_err(
                |err| match err {
                    StorageError::NotFound { .. } => PreprocessError::NotFitted,
                    other => PreprocessError::Storage(other),
                },
            )?;
            debug!("Loaded preprocessor from run {}", loaded.run_id);
            Ok(loaded)
        })
    }

    /// Encode `frame` with the fitted transform.
    pub fn transform(&self, frame: &LeadFrame) -> Result<Vec<Vec<f64>>, PreprocessError> {
        check_structure(frame)?;
        self.fitted()?.value.transform.transform(frame)
    }

    pub fn feature_names(&self) -> Result<Vec<String>, PreprocessError> {
        Ok(self.fitted()?.value.transform.feature_names().to_vec())
    }

    /// Aggregate importance computed at the last fit, if it succeeded.
    pub fn feature_importance(&self) -> Result<Option<FeatureImportanceMap>, PreprocessError> {
        Ok(self.fitted()?.value.feature_importance.clone())
    }

    fn sample_importance(
        &self,
        transform: &FittedTransform,
        frame: &LeadFrame,
    ) -> Result<FeatureImportanceMap, Box<dyn std::error::Error>> {
        let amount = self.sample_cap.min(frame.len());
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut picked = index::sample(&mut rng, frame.len(), amount).into_vec();
        picked.sort_unstable();
        let rows = transform.transform(&frame.select(&picked))?;
        Ok(additive_importance(transform.feature_names(), &rows)?)
    }
}

fn check_structure(frame: &LeadFrame) -> Result<(), PreprocessError> {
    let missing = frame.missing_columns();
    if !missing.is_empty() {
        return Err(PreprocessError::MissingColumns(missing));
    }
    if frame.is_empty() {
        return Err(PreprocessError::EmptyDataset);
    }
    Ok(())
}
