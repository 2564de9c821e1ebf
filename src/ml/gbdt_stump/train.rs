use super::model::{GbdtStumpModel, Stump};
use crate::ml::{TrainDataset, logit, sigmoid};

/// Leaf outputs are clamped to this magnitude in log-odds.
const MAX_LEAF_VALUE: f64 = 4.0;

#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub rounds: usize,
    pub learning_rate: f64,
    /// Equal-width bins per feature for split search.
    pub bins: usize,
    /// L2 penalty on leaf outputs.
    pub lambda: f64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            rounds: 100,
            learning_rate: 0.1,
            bins: 32,
            lambda: 1.0,
        }
    }
}

/// Fit a stump ensemble by second-order boosting on log-loss.
///
/// Boosting stops early once no cut improves the regularized loss.
pub fn train_gbdt_stump(
    dataset: &TrainDataset,
    options: &TrainOptions,
) -> Result<GbdtStumpModel, String> {
    let feature_len = dataset.feature_len()?;
    let bins = options.bins.clamp(2, 256);
    let lambda = options.lambda.max(0.0);
    let quantizers: Vec<Quantizer> = (0..feature_len)
        .map(|j| Quantizer::fit(dataset.x.iter().map(|row| row[j]), bins))
        .collect();
    let codes: Vec<Vec<u8>> = dataset
        .x
        .iter()
        .map(|row| quantizers.iter().zip(row).map(|(q, &v)| q.code(v)).collect())
        .collect();

    let base_log_odds = logit(dataset.positive_rate());
    let mut margin = vec![base_log_odds; dataset.x.len()];
    let mut stumps = Vec::with_capacity(options.rounds);
    for _ in 0..options.rounds {
        let stats: Vec<(f64, f64)> = margin
            .iter()
            .zip(&dataset.y)
            .map(|(&m, &y)| {
                let p = sigmoid(m);
                (f64::from(u8::from(y)) - p, p * (1.0 - p))
            })
            .collect();
        let Some(stump) = best_stump(&codes, &stats, &quantizers, lambda) else {
            break;
        };
        for (m, row) in margin.iter_mut().zip(&dataset.x) {
            *m += options.learning_rate * stump.output(row);
        }
        stumps.push(stump);
    }

    let model = GbdtStumpModel {
        feature_len,
        shrinkage: options.learning_rate,
        base_log_odds,
        stumps,
    };
    model.validate()?;
    Ok(model)
}

/// Equal-width quantization of one feature column.
#[derive(Debug, Clone, Copy)]
struct Quantizer {
    lo: f64,
    width: f64,
    bins: usize,
}

impl Quantizer {
    fn fit(column: impl Iterator<Item = f64>, bins: usize) -> Self {
        let (lo, hi) = column.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        let width = (hi - lo) / bins as f64;
        if lo.is_finite() && width.is_finite() && width > 0.0 {
            Self { lo, width, bins }
        } else {
            Self {
                lo: if lo.is_finite() { lo } else { 0.0 },
                width: 1.0,
                bins,
            }
        }
    }

    fn code(&self, value: f64) -> u8 {
        let raw = ((value - self.lo) / self.width).floor();
        raw.clamp(0.0, (self.bins - 1) as f64) as u8
    }

    /// Smallest value that lands above bin `code`.
    fn cut_after(&self, code: usize) -> f64 {
        self.lo + (code + 1) as f64 * self.width
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    grad: f64,
    hess: f64,
    rows: usize,
}

impl Bucket {
    fn add(&mut self, other: &Bucket) {
        self.grad += other.grad;
        self.hess += other.hess;
        self.rows += other.rows;
    }

    fn minus(&self, other: &Bucket) -> Bucket {
        Bucket {
            grad: self.grad - other.grad,
            hess: self.hess - other.hess,
            rows: self.rows - other.rows,
        }
    }

    fn score(&self, lambda: f64) -> f64 {
        self.grad * self.grad / (self.hess + lambda).max(1e-12)
    }

    fn leaf(&self, lambda: f64) -> f64 {
        (self.grad / (self.hess + lambda).max(1e-12)).clamp(-MAX_LEAF_VALUE, MAX_LEAF_VALUE)
    }
}

/// Highest-gain cut over all features, if any cut has positive gain.
fn best_stump(
    codes: &[Vec<u8>],
    stats: &[(f64, f64)],
    quantizers: &[Quantizer],
    lambda: f64,
) -> Option<Stump> {
    let mut best: Option<(f64, Stump)> = None;
    for (feature, quantizer) in quantizers.iter().enumerate() {
        let mut histogram = vec![Bucket::default(); quantizer.bins];
        for (row, &(grad, hess)) in codes.iter().zip(stats) {
            let bucket = &mut histogram[row[feature] as usize];
            bucket.grad += grad;
            bucket.hess += hess;
            bucket.rows += 1;
        }
        let mut total = Bucket::default();
        histogram.iter().for_each(|bucket| total.add(bucket));
        let parent = total.score(lambda);

        let mut left = Bucket::default();
        for (code, bucket) in histogram.iter().enumerate().take(quantizer.bins - 1) {
            left.add(bucket);
            let right = total.minus(&left);
            if left.rows == 0 || right.rows == 0 {
                continue;
            }
            let gain = left.score(lambda) + right.score(lambda) - parent;
            if gain > 1e-12 && best.as_ref().is_none_or(|(top, _)| gain > *top) {
                let stump = Stump {
                    feature,
                    cut: quantizer.cut_after(code),
                    below: left.leaf(lambda),
                    above: right.leaf(lambda),
                };
                best = Some((gain, stump));
            }
        }
    }
    best.map(|(_, stump)| stump)
}
