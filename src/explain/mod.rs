//! Feature attribution over the processed feature space.
//!
//! Two granularities are offered: aggregate importance computed once after
//! the preprocessor is fit, and per-prediction attribution computed on demand
//! from a persisted [`Explainer`]. Both name features by their serving-time
//! processed names (`industry_technology`, `company_size`, ...).

mod attribution;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ml::Classifier;

pub use attribution::additive_importance;

/// Processed feature name to non-negative aggregate importance.
pub type FeatureImportanceMap = BTreeMap<String, f64>;

#[derive(Debug, Error, PartialEq)]
pub enum ExplainError {
    #[error("explainer needs at least one background row")]
    EmptyBackground,
    #[error("expected {expected} features, got {found}")]
    WidthMismatch { expected: usize, found: usize },
    #[error("feature values must be finite")]
    NonFinite,
    #[error("model evaluation failed: {0}")]
    Model(String),
}

/// Units the contributions are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSpace {
    LogOdds,
    Probability,
}

/// Attribution algorithm bound to the explained model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AttributionMethod {
    /// Exact `w_j * (x_j - mean_j)` contributions for linear models.
    Linear,
    /// Sampled Shapley values against the background mean.
    Permutation { permutations: usize, seed: u64 },
}

/// Attribution of a single feature to a single prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub feature: String,
    pub value: f64,
}

/// Per-prediction attribution; contributions sum to `output - base_value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub base_value: f64,
    pub output: OutputSpace,
    pub contributions: Vec<FeatureContribution>,
}

impl Explanation {
    /// Contributions sorted by decreasing magnitude, truncated to `n`.
    pub fn top(&self, n: usize) -> Vec<&FeatureContribution> {
        let mut sorted: Vec<&FeatureContribution> = self.contributions.iter().collect();
        sorted.sort_by(|a, b| b.value.abs().total_cmp(&a.value.abs()));
        sorted.truncate(n);
        sorted
    }

    pub fn total(&self) -> f64 {
        self.contributions.iter().map(|c| c.value).sum()
    }
}

/// Options for fitting an [`Explainer`].
#[derive(Debug, Clone)]
pub struct ExplainOptions {
    pub permutations: usize,
    pub seed: u64,
}

impl Default for ExplainOptions {
    fn default() -> Self {
        Self {
            permutations: 32,
            seed: 42,
        }
    }
}

/// Persisted explainer built against one trained model.
///
/// The explainer embeds the model it explains so that it can be loaded and
/// used on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explainer {
    feature_names: Vec<String>,
    background: Vec<f64>,
    base_value: f64,
    output: OutputSpace,
    method: AttributionMethod,
    model: Classifier,
}

impl Explainer {
    /// Summarize `background` rows and bind the attribution method to `model`.
    pub fn fit(
        model: Classifier,
        feature_names: Vec<String>,
        background: &[Vec<f64>],
        options: &ExplainOptions,
    ) -> Result<Self, ExplainError> {
        let expected = feature_names.len();
        if model.feature_len() != expected {
            return Err(ExplainError::WidthMismatch {
                expected,
                found: model.feature_len(),
            });
        }
        let mean = attribution::column_means(background, expected)?;
        let (method, output, base_value) = match &model {
            Classifier::LogisticRegression(linear) => (
                AttributionMethod::Linear,
                OutputSpace::LogOdds,
                linear.decision(&mean),
            ),
            _ => (
                AttributionMethod::Permutation {
                    permutations: options.permutations.max(1),
                    seed: options.seed,
                },
                OutputSpace::Probability,
                model.predict_proba(&mean).map_err(ExplainError::Model)?,
            ),
        };
        Ok(Self {
            feature_names,
            background: mean,
            base_value,
            output,
            method,
            model,
        })
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn model(&self) -> &Classifier {
        &self.model
    }

    /// Attribute the model output for one processed feature vector.
    pub fn explain(&self, features: &[f64]) -> Result<Explanation, ExplainError> {
        if features.len() != self.feature_names.len() {
            return Err(ExplainError::WidthMismatch {
                expected: self.feature_names.len(),
                found: features.len(),
            });
        }
        if features.iter().any(|v| !v.is_finite()) {
            return Err(ExplainError::NonFinite);
        }
        let values = match (&self.method, &self.model) {
            (AttributionMethod::Linear, Classifier::LogisticRegression(linear)) => {
                attribution::linear(&linear.weights, &self.background, features)
            }
            (AttributionMethod::Linear, _) => {
                return Err(ExplainError::Model(
                    "linear attribution requires a linear model".to_string(),
                ));
            }
            (AttributionMethod::Permutation { permutations, seed }, model) => {
                attribution::sampled_shapley(
                    |row| model.predict_proba(row),
                    &self.background,
                    features,
                    *permutations,
                    *seed,
                )
                .map_err(ExplainError::Model)?
            }
        };
        Ok(Explanation {
            base_value: self.base_value,
            output: self.output,
            contributions: self
                .feature_names
                .iter()
                .zip(values)
                .map(|(feature, value)| FeatureContribution {
                    feature: feature.clone(),
                    value,
                })
                .collect(),
        })
    }

    pub fn explain_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<Explanation>, ExplainError> {
        rows.iter().map(|row| self.explain(row)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::CandidateKind;
    use crate::ml::TrainDataset;
    use crate::ml::logreg::LogRegModel;

    fn names() -> Vec<String> {
        vec!["a".into(), "b".into()]
    }

    fn background() -> Vec<Vec<f64>> {
        vec![vec![0.0, 0.0], vec![2.0, 0.0], vec![1.0, 3.0]]
    }

    #[test]
    fn linear_contributions_sum_to_log_odds_gap() {
        let model = Classifier::LogisticRegression(LogRegModel {
            weights: vec![1.5, -0.5],
            bias: 0.25,
        });
        let explainer =
            Explainer::fit(model, names(), &background(), &ExplainOptions::default()).unwrap();
        let explanation = explainer.explain(&[3.0, 1.0]).unwrap();
        assert_eq!(explanation.output, OutputSpace::LogOdds);
        let expected_output = 0.25 + 1.5 * 3.0 - 0.5;
        assert!((explanation.base_value + explanation.total() - expected_output).abs() < 1e-12);
        assert_eq!(explanation.contributions[0].feature, "a");
        assert!((explanation.contributions[0].value - 3.0).abs() < 1e-12);
    }

    #[test]
    fn permutation_contributions_sum_to_probability_gap() {
        let x: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![(i % 2) as f64, (i / 20) as f64])
            .collect();
        let y = x.iter().map(|row| row[0] + row[1] >= 1.0).collect();
        let data = TrainDataset { x: x.clone(), y };
        let model = CandidateKind::RandomForest.fit(&data, 5).unwrap();
        let explainer = Explainer::fit(model.clone(), names(), &x, &ExplainOptions::default())
            .unwrap();
        let point = [1.0, 1.0];
        let explanation = explainer.explain(&point).unwrap();
        let output = model.predict_proba(&point).unwrap();
        assert_eq!(explanation.output, OutputSpace::Probability);
        assert!((explanation.base_value + explanation.total() - output).abs() < 1e-9);
    }

    #[test]
    fn explanations_are_deterministic() {
        let x: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64, (i % 4) as f64]).collect();
        let y = x.iter().map(|row| row[0] > 14.0).collect();
        let model = CandidateKind::GradientBoosting
            .fit(&TrainDataset { x: x.clone(), y }, 1)
            .unwrap();
        let explainer = Explainer::fit(model, names(), &x, &ExplainOptions::default()).unwrap();
        let first = explainer.explain(&[20.0, 1.0]).unwrap();
        let second = explainer.explain(&[20.0, 1.0]).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.top(1)[0].feature, "a");
    }

    #[test]
    fn rejects_wrong_width_and_empty_background() {
        let model = Classifier::LogisticRegression(LogRegModel {
            weights: vec![1.0, 1.0],
            bias: 0.0,
        });
        assert_eq!(
            Explainer::fit(model.clone(), names(), &[], &ExplainOptions::default()).unwrap_err(),
            ExplainError::EmptyBackground
        );
        let explainer =
            Explainer::fit(model, names(), &background(), &ExplainOptions::default()).unwrap();
        assert!(matches!(
            explainer.explain(&[1.0]),
            Err(ExplainError::WidthMismatch { .. })
        ));
        assert_eq!(
            explainer.explain(&[f64::NAN, 0.0]),
            Err(ExplainError::NonFinite)
        );
    }
}
