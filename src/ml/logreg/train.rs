use rand::rngs::StdRng;
use rand::{SeedableRng, seq::SliceRandom};

use super::LogRegModel;
use crate::ml::{TrainDataset, logit};

/// Training options for the logistic regression candidate.
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
    pub batch_size: usize,
    pub seed: u64,
    pub balance_classes: bool,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: 200,
            learning_rate: 0.1,
            l2: 1e-3,
            batch_size: 32,
            seed: 42,
            balance_classes: false,
        }
    }
}

/// Fit weights with seeded minibatch gradient descent on log-loss plus L2.
///
/// Weights start at zero and the bias at the log-odds of the positive rate,
/// so the seed only controls the visiting order.
pub fn train_logreg(
    dataset: &TrainDataset,
    options: &TrainOptions,
) -> Result<LogRegModel, String> {
    let dim = dataset.feature_len()?;
    let class_weights = ClassWeights::new(&dataset.y, options.balance_classes);
    let mut model = LogRegModel {
        weights: vec![0.0; dim],
        bias: logit(dataset.positive_rate()),
    };

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut order: Vec<usize> = (0..dataset.x.len()).collect();
    let mut step = Gradient::zeros(dim);
    for _ in 0..options.epochs {
        order.shuffle(&mut rng);
        for batch in order.chunks(options.batch_size.max(1)) {
            step.reset();
            for &i in batch {
                let label = dataset.y[i];
                step.accumulate(&model, &dataset.x[i], label, class_weights.of(label));
            }
            step.apply(&mut model, options.learning_rate, options.l2.max(0.0));
        }
    }

    model.validate()?;
    Ok(model)
}

#[derive(Debug, Clone, Copy)]
struct ClassWeights {
    negative: f64,
    positive: f64,
}

impl ClassWeights {
    fn new(labels: &[bool], balance: bool) -> Self {
        if !balance {
            return Self {
                negative: 1.0,
                positive: 1.0,
            };
        }
        let total = labels.len() as f64;
        let positives = labels.iter().filter(|&&y| y).count() as f64;
        let inverse = |count: f64| if count > 0.0 { total / (2.0 * count) } else { 0.0 };
        Self {
            negative: inverse(total - positives),
            positive: inverse(positives),
        }
    }

    fn of(&self, label: bool) -> f64 {
        if label { self.positive } else { self.negative }
    }
}

/// Weighted gradient sums for one minibatch.
struct Gradient {
    weights: Vec<f64>,
    bias: f64,
    mass: f64,
}

impl Gradient {
    fn zeros(dim: usize) -> Self {
        Self {
            weights: vec![0.0; dim],
            bias: 0.0,
            mass: 0.0,
        }
    }

    fn reset(&mut self) {
        self.weights.iter_mut().for_each(|g| *g = 0.0);
        self.bias = 0.0;
        self.mass = 0.0;
    }

    fn accumulate(&mut self, model: &LogRegModel, x: &[f64], label: bool, weight: f64) {
        if weight == 0.0 {
            return;
        }
        let error = (model.predict_proba(x) - f64::from(u8::from(label))) * weight;
        for (g, v) in self.weights.iter_mut().zip(x) {
            *g += error * v;
        }
        self.bias += error;
        self.mass += weight;
    }

    fn apply(&self, model: &mut LogRegModel, learning_rate: f64, l2: f64) {
        if self.mass == 0.0 {
            return;
        }
        for (w, g) in model.weights.iter_mut().zip(&self.weights) {
            *w -= learning_rate * (g / self.mass + l2 * *w);
        }
        model.bias -= learning_rate * self.bias / self.mass;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn threshold_data() -> TrainDataset {
        let x: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64 / 20.0 - 1.0]).collect();
        let y = x.iter().map(|row| row[0] > 0.0).collect();
        TrainDataset { x, y }
    }

    #[test]
    fn learns_positive_weight_for_positive_signal() {
        let model = train_logreg(&threshold_data(), &TrainOptions::default()).unwrap();
        assert!(model.weights[0] > 0.0);
        assert!(model.predict_proba(&[0.9]) > 0.7);
        assert!(model.predict_proba(&[-0.9]) < 0.3);
    }

    #[test]
    fn same_seed_gives_identical_weights() {
        let data = threshold_data();
        let a = train_logreg(&data, &TrainOptions::default()).unwrap();
        let b = train_logreg(&data, &TrainOptions::default()).unwrap();
        assert_eq!(a.weights, b.weights);
        assert_eq!(a.bias, b.bias);
    }

    #[test]
    fn balanced_weights_favor_the_rare_class() {
        let weights = ClassWeights::new(&[true, false, false, false], true);
        assert_eq!(weights.of(true), 2.0);
        assert!((weights.of(false) - 4.0 / 6.0).abs() < 1e-12);
        assert_eq!(ClassWeights::new(&[true], false).of(false), 1.0);
    }

    #[test]
    fn empty_dataset_is_rejected() {
        assert!(train_logreg(&TrainDataset::default(), &TrainOptions::default()).is_err());
    }
}
