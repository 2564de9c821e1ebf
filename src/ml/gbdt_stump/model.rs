use serde::{Deserialize, Serialize};

use crate::ml::sigmoid;

/// One boosting round: a single cut on one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stump {
    pub feature: usize,
    /// Rows with `value < cut` take `below`; the rest take `above`.
    pub cut: f64,
    pub below: f64,
    pub above: f64,
}

impl Stump {
    /// Log-odds contribution of this round before shrinkage.
    pub fn output(&self, features: &[f64]) -> f64 {
        match features.get(self.feature) {
            Some(&value) if value < self.cut => self.below,
            _ => self.above,
        }
    }
}

/// Boosted stump ensemble over log-odds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbdtStumpModel {
    pub feature_len: usize,
    /// Multiplier applied to every stump output.
    pub shrinkage: f64,
    /// Log-odds of the training positive rate.
    pub base_log_odds: f64,
    pub stumps: Vec<Stump>,
}

impl GbdtStumpModel {
    pub fn validate(&self) -> Result<(), String> {
        if self.feature_len == 0 {
            return Err("Model must expect at least one feature".to_string());
        }
        if !self.base_log_odds.is_finite() || !self.shrinkage.is_finite() {
            return Err("Base log-odds and shrinkage must be finite".to_string());
        }
        for (round, stump) in self.stumps.iter().enumerate() {
            if stump.feature >= self.feature_len {
                return Err(format!(
                    "Round {round} cuts feature {} of a {}-feature model",
                    stump.feature, self.feature_len
                ));
            }
            if ![stump.cut, stump.below, stump.above].iter().all(|v| v.is_finite()) {
                return Err(format!("Round {round} holds a non-finite value"));
            }
        }
        Ok(())
    }

    pub fn log_odds(&self, features: &[f64]) -> f64 {
        self.base_log_odds
            + self.shrinkage * self.stumps.iter().map(|s| s.output(features)).sum::<f64>()
    }

    pub fn predict_proba(&self, features: &[f64]) -> f64 {
        sigmoid(self.log_odds(features))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump(feature: usize) -> Stump {
        Stump {
            feature,
            cut: 0.5,
            below: -2.0,
            above: 2.0,
        }
    }

    #[test]
    fn cut_value_itself_goes_above() {
        let s = stump(0);
        assert_eq!(s.output(&[0.49]), -2.0);
        assert_eq!(s.output(&[0.5]), 2.0);
    }

    #[test]
    fn rounds_add_up_in_log_odds() {
        let model = GbdtStumpModel {
            feature_len: 2,
            shrinkage: 0.5,
            base_log_odds: 0.0,
            stumps: vec![stump(1), stump(1)],
        };
        model.validate().unwrap();
        assert_eq!(model.log_odds(&[0.0, 1.0]), 2.0);
        assert!(model.predict_proba(&[0.0, 0.0]) < 0.2);
    }

    #[test]
    fn stump_on_missing_feature_is_invalid() {
        let model = GbdtStumpModel {
            feature_len: 1,
            shrinkage: 0.1,
            base_log_odds: 0.0,
            stumps: vec![stump(3)],
        };
        assert!(model.validate().is_err());
    }
}
