use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::{ExplainError, FeatureImportanceMap};

pub(super) fn column_means(rows: &[Vec<f64>], width: usize) -> Result<Vec<f64>, ExplainError> {
    if rows.is_empty() {
        return Err(ExplainError::EmptyBackground);
    }
    let mut sums = vec![0.0f64; width];
    for row in rows {
        if row.len() != width {
            return Err(ExplainError::WidthMismatch {
                expected: width,
                found: row.len(),
            });
        }
        for (sum, v) in sums.iter_mut().zip(row) {
            *sum += v;
        }
    }
    let n = rows.len() as f64;
    Ok(sums.into_iter().map(|s| s / n).collect())
}

pub(super) fn linear(weights: &[f64], baseline: &[f64], features: &[f64]) -> Vec<f64> {
    weights
        .iter()
        .zip(baseline)
        .zip(features)
        .map(|((w, b), x)| w * (x - b))
        .collect()
}

/// Shapley values estimated over seeded feature orderings.
///
/// Each ordering walks from `baseline` to `features` one coordinate at a time
/// and credits every step's output change to the coordinate that moved, so
/// the estimates always sum to `f(features) - f(baseline)`.
pub(super) fn sampled_shapley<F>(
    model: F,
    baseline: &[f64],
    features: &[f64],
    permutations: usize,
    seed: u64,
) -> Result<Vec<f64>, String>
where
    F: Fn(&[f64]) -> Result<f64, String>,
{
    let d = features.len();
    let mut totals = vec![0.0f64; d];
    let mut order: Vec<usize> = (0..d).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    let start = model(baseline)?;
    for _ in 0..permutations {
        order.shuffle(&mut rng);
        let mut current = baseline.to_vec();
        let mut previous = start;
        for &j in &order {
            current[j] = features[j];
            let next = model(&current)?;
            totals[j] += next - previous;
            previous = next;
        }
    }
    let scale = 1.0 / permutations.max(1) as f64;
    Ok(totals.into_iter().map(|t| t * scale).collect())
}

/// Model-free importance: mean absolute deviation of each processed feature
/// from its sample mean.
///
/// For scaled numeric columns this tracks spread; for one-hot columns it is
/// `2p(1-p)`, peaking for evenly split categories.
pub fn additive_importance(
    feature_names: &[String],
    rows: &[Vec<f64>],
) -> Result<FeatureImportanceMap, ExplainError> {
    let means = column_means(rows, feature_names.len())?;
    let n = rows.len() as f64;
    let mut importance = FeatureImportanceMap::new();
    for (j, name) in feature_names.iter().enumerate() {
        let mad = rows.iter().map(|row| (row[j] - means[j]).abs()).sum::<f64>() / n;
        if !mad.is_finite() {
            return Err(ExplainError::NonFinite);
        }
        importance.insert(name.clone(), mad);
    }
    Ok(importance)
}
