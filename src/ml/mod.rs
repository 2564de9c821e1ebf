//! Candidate classifiers for conversion scoring.
//!
//! Every candidate trains deterministically from a seed on dense feature
//! vectors and exports to JSON through the [`Classifier`] enum, so the winner
//! of a training run can be persisted and reloaded in another process.

pub mod forest;
pub mod gbdt_stump;
pub mod logreg;
pub mod metrics;

use serde::{Deserialize, Serialize};

use forest::ForestModel;
use gbdt_stump::GbdtStumpModel;
use logreg::LogRegModel;

/// In-memory binary training set shared by every candidate.
#[derive(Debug, Clone, Default)]
pub struct TrainDataset {
    /// Feature matrix, row-major.
    pub x: Vec<Vec<f64>>,
    /// Conversion labels aligned with `x`.
    pub y: Vec<bool>,
}

impl TrainDataset {
    /// Check shape invariants and return the feature width.
    pub fn feature_len(&self) -> Result<usize, String> {
        if self.x.len() != self.y.len() {
            return Err("Mismatched X/Y lengths".to_string());
        }
        let Some(first) = self.x.first() else {
            return Err("Empty dataset".to_string());
        };
        let dim = first.len();
        if dim == 0 {
            return Err("Feature vectors are empty".to_string());
        }
        if self.x.iter().any(|row| row.len() != dim) {
            return Err("Inconsistent feature row length".to_string());
        }
        if self.x.iter().flatten().any(|v| !v.is_finite()) {
            return Err("Feature matrix contains non-finite values".to_string());
        }
        Ok(dim)
    }

    /// Fraction of positive labels.
    pub fn positive_rate(&self) -> f64 {
        if self.y.is_empty() {
            return 0.0;
        }
        self.y.iter().filter(|&&y| y).count() as f64 / self.y.len() as f64
    }
}

/// Identifier of a candidate in the fixed training registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    GradientBoosting,
    RandomForest,
    LogisticRegression,
}

impl CandidateKind {
    /// Candidates in the order they are trained and compared.
    pub const REGISTRY: [CandidateKind; 3] = [
        CandidateKind::GradientBoosting,
        CandidateKind::RandomForest,
        CandidateKind::LogisticRegression,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CandidateKind::GradientBoosting => "gradient_boosting",
            CandidateKind::RandomForest => "random_forest",
            CandidateKind::LogisticRegression => "logistic_regression",
        }
    }

    /// Fit this candidate with its default options and the given seed.
    pub fn fit(self, dataset: &TrainDataset, seed: u64) -> Result<Classifier, String> {
        match self {
            CandidateKind::GradientBoosting => {
                let options = gbdt_stump::TrainOptions::default();
                gbdt_stump::train_gbdt_stump(dataset, &options).map(Classifier::GradientBoosting)
            }
            CandidateKind::RandomForest => {
                let options = forest::TrainOptions {
                    seed,
                    ..forest::TrainOptions::default()
                };
                forest::train_forest(dataset, &options).map(Classifier::RandomForest)
            }
            CandidateKind::LogisticRegression => {
                let options = logreg::TrainOptions {
                    seed,
                    ..logreg::TrainOptions::default()
                };
                logreg::train_logreg(dataset, &options).map(Classifier::LogisticRegression)
            }
        }
    }
}

/// A fitted candidate producing the probability of conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classifier {
    GradientBoosting(GbdtStumpModel),
    RandomForest(ForestModel),
    LogisticRegression(LogRegModel),
}

impl Classifier {
    pub fn kind(&self) -> CandidateKind {
        match self {
            Classifier::GradientBoosting(_) => CandidateKind::GradientBoosting,
            Classifier::RandomForest(_) => CandidateKind::RandomForest,
            Classifier::LogisticRegression(_) => CandidateKind::LogisticRegression,
        }
    }

    /// Number of features the model expects.
    pub fn feature_len(&self) -> usize {
        match self {
            Classifier::GradientBoosting(model) => model.feature_len,
            Classifier::RandomForest(model) => model.feature_len,
            Classifier::LogisticRegression(model) => model.weights.len(),
        }
    }

    /// Probability of the positive (converted) class.
    pub fn predict_proba(&self, features: &[f64]) -> Result<f64, String> {
        if features.len() != self.feature_len() {
            return Err(format!(
                "Expected {} features, got {}",
                self.feature_len(),
                features.len()
            ));
        }
        let p = match self {
            Classifier::GradientBoosting(model) => model.predict_proba(features),
            Classifier::RandomForest(model) => model.predict_proba(features),
            Classifier::LogisticRegression(model) => model.predict_proba(features),
        };
        if p.is_finite() {
            Ok(p.clamp(0.0, 1.0))
        } else {
            Err("Model produced a non-finite probability".to_string())
        }
    }

    /// Fraction of rows whose thresholded prediction (`p > 0.5`) matches the label.
    pub fn accuracy(&self, x: &[Vec<f64>], y: &[bool]) -> Result<f64, String> {
        if x.len() != y.len() || x.is_empty() {
            return Err("Accuracy needs a non-empty, aligned evaluation set".to_string());
        }
        let mut correct = 0usize;
        for (row, &label) in x.iter().zip(y) {
            if (self.predict_proba(row)? > 0.5) == label {
                correct += 1;
            }
        }
        Ok(correct as f64 / x.len() as f64)
    }
}

/// Numerically stable logistic function.
pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Inverse of [`sigmoid`], clamped away from infinities.
pub fn logit(p: f64) -> f64 {
    let p = p.clamp(1e-9, 1.0 - 1e-9);
    (p / (1.0 - p)).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable() -> TrainDataset {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..60 {
            let v = i as f64 / 10.0 - 3.0;
            x.push(vec![v, (i % 3) as f64]);
            y.push(v > 0.0);
        }
        TrainDataset { x, y }
    }

    #[test]
    fn sigmoid_is_symmetric_and_stable() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!((sigmoid(2.0) + sigmoid(-2.0) - 1.0).abs() < 1e-12);
        assert!(sigmoid(-1000.0).is_finite());
        assert!((logit(sigmoid(1.3)) - 1.3).abs() < 1e-9);
    }

    #[test]
    fn dataset_shape_errors_are_reported() {
        let ragged = TrainDataset {
            x: vec![vec![1.0, 2.0], vec![1.0]],
            y: vec![true, false],
        };
        assert!(ragged.feature_len().is_err());
        assert!(TrainDataset::default().feature_len().is_err());
        assert_eq!(separable().feature_len(), Ok(2));
    }

    #[test]
    fn every_registered_candidate_learns_a_separable_problem() {
        let data = separable();
        for kind in CandidateKind::REGISTRY {
            let model = kind.fit(&data, 7).unwrap();
            assert_eq!(model.kind(), kind);
            let acc = model.accuracy(&data.x, &data.y).unwrap();
            assert!(acc >= 0.9, "{} accuracy {acc}", kind.name());
        }
    }

    #[test]
    fn classifier_round_trips_through_json() {
        let data = separable();
        let model = CandidateKind::RandomForest.fit(&data, 3).unwrap();
        let json = serde_json::to_string(&model).unwrap();
        let restored: Classifier = serde_json::from_str(&json).unwrap();
        let point = [0.4, 1.0];
        assert_eq!(
            model.predict_proba(&point).unwrap(),
            restored.predict_proba(&point).unwrap()
        );
    }

    #[test]
    fn wrong_width_is_an_error() {
        let model = CandidateKind::LogisticRegression
            .fit(&separable(), 1)
            .unwrap();
        assert!(model.predict_proba(&[1.0]).is_err());
    }
}
