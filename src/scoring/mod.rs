//! Serving-time lead scoring.
//!
//! [`LeadScorer`] holds a lazily loaded, shared handle to the persisted
//! preprocessor, model and explainer. Concurrent first requests collapse into
//! one load. Per-record failures become [`ScoreOutcome::Degraded`] results
//! flagged for review; only missing or inconsistent artifacts are errors.

mod policy;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ScoringConfig;
use crate::dataset::LeadRecord;
use crate::explain::{Explainer, Explanation};
use crate::preprocess::{FittedPreprocessor, PREPROCESSOR_ARTIFACT};
use crate::storage::{
    ArtifactStore, LazyArtifact, StorageError, Versioned, current_run, load_run_artifact,
};
use crate::training::{EXPLAINER_ARTIFACT, MODEL_ARTIFACT, TrainedModelArtifact};

pub use policy::{Decision, DecisionPolicy, confidence};

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("artifact `{name}` is not available; train a model first")]
    ArtifactsUnavailable { name: &'static str },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("model expects {expected} features but the preprocessor produces {found}")]
    SchemaMismatch { expected: usize, found: usize },
}

/// Per-request scoring options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRequest {
    #[serde(default)]
    pub include_explanation: bool,
}

impl ScoreRequest {
    pub fn with_explanation() -> Self {
        Self {
            include_explanation: true,
        }
    }
}

/// Decision for one lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub prediction_id: Uuid,
    /// Training run of the artifacts that produced this result.
    pub run_id: Uuid,
    pub score: f64,
    pub prediction: bool,
    pub needs_human_review: bool,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<Explanation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedReason {
    TransformFailed,
    ScoringFailed,
}

/// Well-formed envelope returned when a single record cannot be scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradedResult {
    pub reason: DegradedReason,
    pub detail: String,
    pub needs_human_review: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScoreOutcome {
    Scored(PredictionResult),
    Degraded(DegradedResult),
}

impl ScoreOutcome {
    pub fn needs_human_review(&self) -> bool {
        match self {
            ScoreOutcome::Scored(result) => result.needs_human_review,
            ScoreOutcome::Degraded(result) => result.needs_human_review,
        }
    }

    pub fn result(&self) -> Option<&PredictionResult> {
        match self {
            ScoreOutcome::Scored(result) => Some(result),
            ScoreOutcome::Degraded(_) => None,
        }
    }

    fn degraded(reason: DegradedReason, detail: String) -> Self {
        ScoreOutcome::Degraded(DegradedResult {
            reason,
            detail,
            needs_human_review: true,
        })
    }
}

/// Immutable artifact set loaded for serving.
#[derive(Debug)]
pub struct ServingArtifacts {
    pub run_id: Uuid,
    pub preprocessor: FittedPreprocessor,
    pub model: TrainedModelArtifact,
    pub explainer: Option<Explainer>,
}

/// Shared scoring handle; cheap to share behind an `Arc`.
pub struct LeadScorer {
    store: Arc<dyn ArtifactStore>,
    policy: DecisionPolicy,
    artifacts: LazyArtifact<ServingArtifacts>,
}

impl LeadScorer {
    pub fn new(store: Arc<dyn ArtifactStore>, config: &ScoringConfig) -> Self {
        Self {
            store,
            policy: DecisionPolicy::new(config.review_threshold),
            artifacts: LazyArtifact::new(),
        }
    }

    pub fn policy(&self) -> DecisionPolicy {
        self.policy
    }

    /// Load the artifact set if it is not in memory yet.
    pub fn ensure_loaded(&self) -> Result<Arc<ServingArtifacts>, ScoringError> {
        self.artifacts.get_or_try_load(|| self.load_artifacts())
    }

    /// Drop the loaded artifacts; the next request loads the current set.
    pub fn unload(&self) {
        self.artifacts.clear();
        debug!("Scorer artifacts unloaded");
    }

    /// Run id of the loaded artifacts, without triggering a load.
    pub fn loaded_run_id(&self) -> Option<Uuid> {
        self.artifacts.get().map(|artifacts| artifacts.run_id)
    }

    /// Score one lead.
    pub fn score(
        &self,
        record: &LeadRecord,
        request: &ScoreRequest,
    ) -> Result<ScoreOutcome, ScoringError> {
        let artifacts = self.ensure_loaded()?;
        Ok(self.score_loaded(&artifacts, record, request))
    }

    /// Score each lead independently against one artifact snapshot.
    pub fn score_batch(
        &self,
        records: &[LeadRecord],
        request: &ScoreRequest,
    ) -> Result<Vec<ScoreOutcome>, ScoringError> {
        let artifacts = self.ensure_loaded()?;
        Ok(records
            .iter()
            .map(|record| self.score_loaded(&artifacts, record, request))
            .collect())
    }

    fn score_loaded(
        &self,
        artifacts: &ServingArtifacts,
        record: &LeadRecord,
        request: &ScoreRequest,
    ) -> ScoreOutcome {
        let features = match artifacts.preprocessor.transform.transform_record(record) {
            Ok(features) => features,
            Err(err) => {
                warn!("Transform failed; routing to review: {err}");
                return ScoreOutcome::degraded(DegradedReason::TransformFailed, err.to_string());
            }
        };
        let score = match artifacts.model.predict_proba(&features) {
            Ok(score) => score,
            Err(err) => {
                warn!("Scoring failed; routing to review: {err}");
                return ScoreOutcome::degraded(DegradedReason::ScoringFailed, err);
            }
        };
        let decision = self.policy.decide(score);
        let explanation = if request.include_explanation {
            explain(artifacts, &features)
        } else {
            None
        };
        ScoreOutcome::Scored(PredictionResult {
            prediction_id: Uuid::new_v4(),
            run_id: artifacts.run_id,
            score,
            prediction: decision.prediction,
            needs_human_review: decision.needs_human_review,
            confidence: decision.confidence,
            explanation,
        })
    }

    fn load_artifacts(&self) -> Result<ServingArtifacts, ScoringError> {
        let store = self.store.as_ref();
        // One pointer read pins every artifact to the same run.
        let manifest = current_run(store).map_err(unavailable(PREPROCESSOR_ARTIFACT))?;
        let preprocessor: Versioned<FittedPreprocessor> =
            load_run_artifact(store, &manifest, PREPROCESSOR_ARTIFACT)
                .map_err(unavailable(PREPROCESSOR_ARTIFACT))?;
        let model: Versioned<TrainedModelArtifact> =
            load_run_artifact(store, &manifest, MODEL_ARTIFACT).map_err(unavailable(MODEL_ARTIFACT))?;
        let produced = preprocessor.value.transform.feature_names();
        if produced != model.value.feature_names.as_slice()
            || model.value.classifier.feature_len() != produced.len()
        {
            return Err(ScoringError::SchemaMismatch {
                expected: model.value.classifier.feature_len(),
                found: produced.len(),
            });
        }
        let explainer = match load_run_artifact::<Explainer>(store, &manifest, EXPLAINER_ARTIFACT) {
            Ok(explainer) => Some(explainer.value),
            Err(err) => {
                warn!("Explainer unavailable; explanations disabled: {err}");
                None
            }
        };
        info!(
            "Loaded {} model from run {}",
            model.value.candidate.name(),
            model.run_id
        );
        Ok(ServingArtifacts {
            run_id: model.run_id,
            preprocessor: preprocessor.value,
            model: model.value,
            explainer,
        })
    }
}

fn explain(artifacts: &ServingArtifacts, features: &[f64]) -> Option<Explanation> {
    let Some(explainer) = &artifacts.explainer else {
        warn!("Explanation requested but no explainer is loaded");
        return None;
    };
    match explainer.explain(features) {
        Ok(explanation) => Some(explanation),
        Err(err) => {
            warn!("Explanation unavailable: {err}");
            None
        }
    }
}

fn unavailable(name: &'static str) -> impl Fn(StorageError) -> ScoringError {
    move |err| match err {
        StorageError::NotFound { .. } => ScoringError::ArtifactsUnavailable { name },
        other => ScoringError::Storage(other),
    }
}
