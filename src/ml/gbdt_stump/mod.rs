//! Gradient-boosted decision stumps for binary conversion scoring.
//!
//! Split search runs over equal-width histograms of gradient and hessian
//! sums; leaf outputs are regularized Newton steps. Training is fully
//! deterministic for a given dataset.

mod model;
mod train;

pub use model::{GbdtStumpModel, Stump};
pub use train::{TrainOptions, train_gbdt_stump};
