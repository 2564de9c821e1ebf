//! Binary logistic regression over preprocessed lead features.

use serde::{Deserialize, Serialize};

use super::sigmoid;

mod train;
pub use train::{TrainOptions, train_logreg};

/// Linear conversion model: `p = sigmoid(w . x + b)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRegModel {
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl LogRegModel {
    /// Validate weight shapes and finiteness.
    pub fn validate(&self) -> Result<(), String> {
        if self.weights.is_empty() {
            return Err("weights must not be empty".to_string());
        }
        if !self.bias.is_finite() || self.weights.iter().any(|w| !w.is_finite()) {
            return Err("weights must be finite".to_string());
        }
        Ok(())
    }

    /// Log-odds of conversion for a single feature vector.
    pub fn decision(&self, features: &[f64]) -> f64 {
        self.bias
            + self
                .weights
                .iter()
                .zip(features)
                .map(|(w, x)| w * x)
                .sum::<f64>()
    }

    pub fn predict_proba(&self, features: &[f64]) -> f64 {
        sigmoid(self.decision(features))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_model_is_undecided() {
        let model = LogRegModel {
            weights: vec![0.0; 3],
            bias: 0.0,
        };
        model.validate().unwrap();
        assert_eq!(model.predict_proba(&[1.0, 2.0, 3.0]), 0.5);
    }

    #[test]
    fn decision_is_affine() {
        let model = LogRegModel {
            weights: vec![2.0, -1.0],
            bias: 0.5,
        };
        assert_eq!(model.decision(&[1.0, 3.0]), -0.5);
        assert!(model.predict_proba(&[3.0, 0.0]) > 0.99);
    }

    #[test]
    fn rejects_non_finite_weights() {
        let model = LogRegModel {
            weights: vec![f64::NAN],
            bias: 0.0,
        };
        assert!(model.validate().is_err());
    }
}
