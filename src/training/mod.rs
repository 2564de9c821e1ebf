//! Candidate training, model selection and artifact publishing.

mod split;

use std::path::Path;
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ScoringConfig, SelectionRule};
use crate::dataset::{DatasetError, LabeledFrame, LeadFrame, load_csv};
use crate::explain::{ExplainError, ExplainOptions, Explainer, Explanation};
use crate::ml::metrics::EvaluationMetrics;
use crate::ml::{CandidateKind, Classifier, TrainDataset};
use crate::preprocess::{
    FeaturePreprocessor, FittedPreprocessor, PREPROCESSOR_ARTIFACT, PreprocessError,
};
use crate::storage::{
    ArtifactStore, LazyArtifact, RunManifest, StorageError, Versioned, discard_run,
    load_artifact, publish_run, stage_artifact,
};

/// Artifact name of the winning model.
pub const MODEL_ARTIFACT: &str = "model";
/// Artifact name of the explainer built against the winning model.
pub const EXPLAINER_ARTIFACT: &str = "explainer";

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Explain(#[from] ExplainError),
    #[error("{features} feature rows but {labels} labels")]
    LabelMismatch { features: usize, labels: usize },
    #[error("candidate `{candidate}` failed: {reason}")]
    CandidateFailed {
        candidate: &'static str,
        reason: String,
    },
    #[error("no trained model is available")]
    NotTrained,
    #[error("preprocessor run {preprocessor} does not match artifact run {artifact}; reload the trainer")]
    MixedRuns { preprocessor: Uuid, artifact: Uuid },
}

/// Selection score of one candidate in a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub candidate: CandidateKind,
    pub score: f64,
}

/// Winning classifier tagged with how it won.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModelArtifact {
    pub candidate: CandidateKind,
    pub selection_score: f64,
    pub selection_rule: SelectionRule,
    pub feature_names: Vec<String>,
    pub classifier: Classifier,
    /// Every candidate's score, in registry order.
    pub candidate_scores: Vec<CandidateScore>,
}

impl TrainedModelArtifact {
    pub fn predict_proba(&self, features: &[f64]) -> Result<f64, String> {
        self.classifier.predict_proba(features)
    }
}

/// Fits the preprocessor and every candidate, then publishes the winner.
pub struct ModelTrainer {
    store: Arc<dyn ArtifactStore>,
    config: ScoringConfig,
    preprocessor: FeaturePreprocessor,
    model: LazyArtifact<Versioned<TrainedModelArtifact>>,
    explainer: LazyArtifact<Versioned<Explainer>>,
}

impl ModelTrainer {
    pub fn new(store: Arc<dyn ArtifactStore>, config: ScoringConfig) -> Self {
        let config = config.normalized();
        Self {
            preprocessor: FeaturePreprocessor::new(Arc::clone(&store), &config),
            store,
            config,
            model: LazyArtifact::new(),
            explainer: LazyArtifact::new(),
        }
    }

    pub fn preprocessor(&self) -> &FeaturePreprocessor {
        &self.preprocessor
    }

    /// Read a labeled CSV; fails when the label column is absent.
    pub fn load_data(&self, path: &Path) -> Result<LabeledFrame, TrainingError> {
        Ok(load_csv(path)?)
    }

    /// Fit, select and publish.
    ///
    /// Nothing is published unless every candidate fits and every artifact is
    /// staged. The preprocessor, model and explainer are staged under one run
    /// id and become current together; on failure the previous run stays
    /// current and the staged keys are discarded.
    pub fn train(
        &self,
        features: &LeadFrame,
        labels: &[bool],
    ) -> Result<Arc<Versioned<TrainedModelArtifact>>, TrainingError> {
        if features.len() != labels.len() {
            return Err(TrainingError::LabelMismatch {
                features: features.len(),
                labels: labels.len(),
            });
        }
        let _lease = self.store.acquire_write()?;
        let run_id = Uuid::new_v4();
        let preprocessor = self.preprocessor.fit_staged(features, run_id)?;
        let transform = &preprocessor.value.transform;
        let data = TrainDataset {
            x: transform.transform(features)?,
            y: labels.to_vec(),
        };
        let feature_names = transform.feature_names().to_vec();

        let rule = self.config.selection;
        let split = match rule {
            SelectionRule::InSample => None,
            SelectionRule::Holdout => {
                let split =
                    split::holdout_split(&data, self.config.holdout_fraction, self.config.seed);
                if split.is_none() {
                    warn!("Too few rows for a holdout split; selecting in-sample");
                }
                split
            }
        };
        let (fit_set, score_set) = match &split {
            Some(split) => (&split.fit, &split.score),
            None => (&data, &data),
        };

        let mut winner: Option<(Classifier, f64)> = None;
        let mut candidate_scores = Vec::with_capacity(CandidateKind::REGISTRY.len());
        for kind in CandidateKind::REGISTRY {
            let failed = |reason: String| TrainingError::CandidateFailed {
                candidate: kind.name(),
                reason,
            };
            let model = kind.fit(fit_set, self.config.seed).map_err(failed)?;
            let score = model.accuracy(&score_set.x, &score_set.y).map_err(failed)?;
            info!("Candidate {} scored {score:.4} ({rule:?})", kind.name());
            candidate_scores.push(CandidateScore {
                candidate: kind,
                score,
            });
            if winner.as_ref().is_none_or(|(_, best)| score > *best) {
                winner = Some((model, score));
            }
        }
        let Some((mut classifier, selection_score)) = winner else {
            return Err(TrainingError::NotTrained);
        };
        let candidate = classifier.kind();
        if split.is_some() {
            classifier = candidate.fit(&data, self.config.seed).map_err(|reason| {
                TrainingError::CandidateFailed {
                    candidate: candidate.name(),
                    reason,
                }
            })?;
        }
        info!("Selected {} with score {selection_score:.4}", candidate.name());

        let explainer = match self.fit_explainer(&classifier, &feature_names, &data.x) {
            Ok(explainer) => Some(explainer),
            Err(err) => {
                warn!("Explainer unavailable for run {run_id}: {err}");
                None
            }
        };
        let artifact = TrainedModelArtifact {
            candidate,
            selection_score,
            selection_rule: rule,
            feature_names,
            classifier,
            candidate_scores,
        };

        let mut names = vec![PREPROCESSOR_ARTIFACT, MODEL_ARTIFACT];
        if explainer.is_some() {
            names.push(EXPLAINER_ARTIFACT);
        }
        let manifest = RunManifest::new(run_id, &names);
        if let Err(err) = self.publish(&manifest, &preprocessor.value, &artifact, explainer.as_ref()) {
            warn!("Run {run_id} not published: {err}");
            discard_run(self.store.as_ref(), &manifest);
            return Err(err.into());
        }

        let created_at = preprocessor.created_at;
        self.preprocessor.install(preprocessor);
        match explainer {
            Some(value) => {
                self.explainer.set(Versioned {
                    run_id,
                    created_at,
                    value,
                });
            }
            None => self.explainer.clear(),
        }
        Ok(self.model.set(Versioned {
            run_id,
            created_at,
            value: artifact,
        }))
    }

    /// Score the winning model on a labeled evaluation set.
    pub fn evaluate(
        &self,
        features: &LeadFrame,
        labels: &[bool],
    ) -> Result<EvaluationMetrics, TrainingError> {
        if features.len() != labels.len() {
            return Err(TrainingError::LabelMismatch {
                features: features.len(),
                labels: labels.len(),
            });
        }
        let model = self.model()?;
        self.check_same_run(model.run_id)?;
        let x = self.preprocessor.transform(features)?;
        let scores = x
            .iter()
            .map(|row| model.value.predict_proba(row))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|reason| TrainingError::CandidateFailed {
                candidate: model.value.candidate.name(),
                reason,
            })?;
        let metrics = EvaluationMetrics::from_scores(labels, &scores);
        info!(
            "Evaluation on {} rows: accuracy {:.4}, f1 {:.4}, roc_auc {:?}",
            metrics.support, metrics.accuracy, metrics.f1, metrics.roc_auc
        );
        Ok(metrics)
    }

    /// Per-row attribution for `sample` using the persisted explainer.
    pub fn explain(&self, sample: &LeadFrame) -> Result<Vec<Explanation>, TrainingError> {
        let explainer = self.explainer.get_or_try_load(|| {
            load_artifact::<Explainer>(self.store.as_ref(), EXPLAINER_ARTIFACT).map_err(not_trained)
        })?;
        self.check_same_run(explainer.run_id)?;
        let x = self.preprocessor.transform(sample)?;
        Ok(explainer.value.explain_batch(&x)?)
    }

    /// The winning model, loading the persisted one on first use.
    pub fn model(&self) -> Result<Arc<Versioned<TrainedModelArtifact>>, TrainingError> {
        self.model.get_or_try_load(|| {
            let loaded = load_artifact(self.store.as_ref(), MODEL_ARTIFACT).map_err(not_trained)?;
            debug!("Loaded model from run {}", loaded.run_id);
            Ok(loaded)
        })
    }

    fn check_same_run(&self, artifact: Uuid) -> Result<(), TrainingError> {
        let preprocessor = self.preprocessor.fitted()?.run_id;
        if preprocessor == artifact {
            Ok(())
        } else {
            Err(TrainingError::MixedRuns {
                preprocessor,
                artifact,
            })
        }
    }

    fn publish(
        &self,
        manifest: &RunManifest,
        preprocessor: &FittedPreprocessor,
        model: &TrainedModelArtifact,
        explainer: Option<&Explainer>,
    ) -> Result<(), StorageError> {
        let store = self.store.as_ref();
        let run_id = manifest.run_id;
        stage_artifact(store, PREPROCESSOR_ARTIFACT, run_id, preprocessor)?;
        stage_artifact(store, MODEL_ARTIFACT, run_id, model)?;
        if let Some(explainer) = explainer {
            stage_artifact(store, EXPLAINER_ARTIFACT, run_id, explainer)?;
        }
        publish_run(store, manifest.clone())
    }

    fn fit_explainer(
        &self,
        classifier: &Classifier,
        feature_names: &[String],
        x: &[Vec<f64>],
    ) -> Result<Explainer, ExplainError> {
        let amount = self.config.importance_sample_cap.min(x.len());
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let background: Vec<Vec<f64>> = index::sample(&mut rng, x.len(), amount)
            .iter()
            .map(|i| x[i].clone())
            .collect();
        let options = ExplainOptions {
            permutations: self.config.attribution_permutations,
            seed: self.config.seed,
        };
        Explainer::fit(
            classifier.clone(),
            feature_names.to_vec(),
            &background,
            &options,
        )
    }
}

fn not_trained(err: StorageError) -> TrainingError {
    match err {
        StorageError::NotFound { .. } => TrainingError::NotTrained,
        other => TrainingError::Storage(other),
    }
}
