use serde::{Deserialize, Serialize};

use crate::config::clamp_review_threshold;

/// Outcome of applying the decision policy to a probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub prediction: bool,
    pub needs_human_review: bool,
    pub confidence: f64,
}

/// Thresholded conversion decision with an uncertainty band for human review.
///
/// Probabilities strictly inside `(1 - threshold, threshold)` are routed to a
/// reviewer; the band edges themselves are decided automatically.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionPolicy {
    threshold: f64,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD)
    }
}

impl DecisionPolicy {
    pub const DEFAULT_THRESHOLD: f64 = 0.7;

    /// Build a policy; the threshold is clamped to `[0.5, 1.0]`.
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: clamp_review_threshold(threshold),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn decide(&self, probability: f64) -> Decision {
        Decision {
            prediction: probability > 0.5,
            needs_human_review: self.needs_review(probability),
            confidence: confidence(probability),
        }
    }

    pub fn needs_review(&self, probability: f64) -> bool {
        if !probability.is_finite() {
            return true;
        }
        probability > 1.0 - self.threshold && probability < self.threshold
    }
}

/// Distance from the decision boundary mapped onto `[0, 1]`.
pub fn confidence(probability: f64) -> f64 {
    ((probability - 0.5).abs() * 2.0).clamp(0.0, 1.0)
}
