pub(super) const MIN_REVIEW_THRESHOLD: f64 = 0.5;
pub(super) const MAX_REVIEW_THRESHOLD: f64 = 1.0;
pub(super) const MIN_HOLDOUT_FRACTION: f64 = 0.05;
pub(super) const MAX_HOLDOUT_FRACTION: f64 = 0.5;

pub(crate) fn clamp_review_threshold(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(MIN_REVIEW_THRESHOLD, MAX_REVIEW_THRESHOLD)
    } else {
        default_review_threshold()
    }
}

pub(super) fn clamp_holdout_fraction(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(MIN_HOLDOUT_FRACTION, MAX_HOLDOUT_FRACTION)
    } else {
        default_holdout_fraction()
    }
}

pub(super) fn default_review_threshold() -> f64 {
    0.7
}

pub(super) fn default_importance_sample_cap() -> usize {
    100
}

pub(super) fn default_seed() -> u64 {
    42
}

pub(super) fn default_holdout_fraction() -> f64 {
    0.2
}

pub(super) fn default_attribution_permutations() -> usize {
    32
}
