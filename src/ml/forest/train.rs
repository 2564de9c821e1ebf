use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

use super::{DecisionTree, ForestModel, TreeNode};
use crate::ml::TrainDataset;

/// Training hyperparameters for the forest candidate.
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    /// Features considered per split; `None` uses `sqrt(d)`.
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            trees: 50,
            max_depth: 8,
            min_samples_split: 2,
            max_features: None,
            seed: 42,
        }
    }
}

/// Train bootstrapped gini trees with per-split feature subsampling.
pub fn train_forest(dataset: &TrainDataset, options: &TrainOptions) -> Result<ForestModel, String> {
    let d = dataset.feature_len()?;
    if options.trees == 0 {
        return Err("Forest needs at least one tree".to_string());
    }
    let n = dataset.x.len();
    let max_features = options
        .max_features
        .unwrap_or_else(|| (d as f64).sqrt().ceil() as usize)
        .clamp(1, d);

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut trees = Vec::with_capacity(options.trees);
    for _ in 0..options.trees {
        let sample: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
        let mut builder = TreeBuilder {
            dataset,
            options,
            max_features,
            rng: &mut rng,
            nodes: Vec::new(),
        };
        builder.grow(sample, 0);
        trees.push(DecisionTree {
            nodes: builder.nodes,
        });
    }
    Ok(ForestModel {
        feature_len: d,
        trees,
    })
}

struct TreeBuilder<'a> {
    dataset: &'a TrainDataset,
    options: &'a TrainOptions,
    max_features: usize,
    rng: &'a mut StdRng,
    nodes: Vec<TreeNode>,
}

struct Split {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl TreeBuilder<'_> {
    /// Grow the subtree for `rows` and return its node index.
    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> u32 {
        let positives = rows.iter().filter(|&&i| self.dataset.y[i]).count();
        let probability = if rows.is_empty() {
            0.5
        } else {
            positives as f64 / rows.len() as f64
        };
        let slot = self.nodes.len() as u32;
        self.nodes.push(TreeNode::Leaf { probability });

        let pure = positives == 0 || positives == rows.len();
        if pure || depth >= self.options.max_depth || rows.len() < self.options.min_samples_split {
            return slot;
        }
        let Some(split) = self.best_split(&rows) else {
            return slot;
        };
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&i| self.dataset.x[i][split.feature] <= split.threshold);
        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[slot as usize] = TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        slot
    }

    fn best_split(&mut self, rows: &[usize]) -> Option<Split> {
        let d = self.dataset.x[rows[0]].len();
        let features = index::sample(&mut *self.rng, d, self.max_features);
        let mut best: Option<Split> = None;
        for feature in features.iter() {
            let Some(candidate) = self.best_split_for_feature(rows, feature) else {
                continue;
            };
            if best
                .as_ref()
                .is_none_or(|current| candidate.impurity < current.impurity)
            {
                best = Some(candidate);
            }
        }
        best
    }

    /// Scan sorted values, scoring midpoints by weighted gini impurity.
    fn best_split_for_feature(&self, rows: &[usize], feature: usize) -> Option<Split> {
        let mut values: Vec<(f64, bool)> = rows
            .iter()
            .map(|&i| (self.dataset.x[i][feature], self.dataset.y[i]))
            .collect();
        values.sort_by(|a, b| a.0.total_cmp(&b.0));

        let total = values.len() as f64;
        let total_pos = values.iter().filter(|(_, y)| *y).count() as f64;
        let mut left_pos = 0.0f64;
        let mut best: Option<Split> = None;
        for i in 0..values.len() - 1 {
            if values[i].1 {
                left_pos += 1.0;
            }
            let (current, next) = (values[i].0, values[i + 1].0);
            if current == next {
                continue;
            }
            let left_n = (i + 1) as f64;
            let right_n = total - left_n;
            let impurity = (left_n * gini(left_pos, left_n)
                + right_n * gini(total_pos - left_pos, right_n))
                / total;
            if best.as_ref().is_none_or(|b| impurity < b.impurity) {
                best = Some(Split {
                    feature,
                    threshold: current + (next - current) / 2.0,
                    impurity,
                });
            }
        }
        best
    }
}

fn gini(positives: f64, count: f64) -> f64 {
    if count == 0.0 {
        return 0.0;
    }
    let p = positives / count;
    2.0 * p * (1.0 - p)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xor_like() -> TrainDataset {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..80 {
            let a = (i % 2) as f64;
            let b = ((i / 2) % 2) as f64;
            x.push(vec![a, b]);
            y.push((a == 1.0) != (b == 1.0));
        }
        TrainDataset { x, y }
    }

    #[test]
    fn learns_interaction_a_linear_model_cannot() {
        let data = xor_like();
        let options = TrainOptions {
            max_features: Some(2),
            ..TrainOptions::default()
        };
        let model = train_forest(&data, &options).unwrap();
        assert!(model.predict_proba(&[1.0, 0.0]) > 0.9);
        assert!(model.predict_proba(&[1.0, 1.0]) < 0.1);
    }

    #[test]
    fn respects_max_depth() {
        let data = xor_like();
        let options = TrainOptions {
            max_depth: 1,
            trees: 5,
            ..TrainOptions::default()
        };
        let model = train_forest(&data, &options).unwrap();
        assert!(model.trees.iter().all(|tree| tree.depth() <= 1));
    }

    #[test]
    fn seeded_training_is_reproducible() {
        let data = xor_like();
        let a = train_forest(&data, &TrainOptions::default()).unwrap();
        let b = train_forest(&data, &TrainOptions::default()).unwrap();
        for point in [[0.0, 0.0], [0.0, 1.0], [1.0, 0.0]] {
            assert_eq!(a.predict_proba(&point), b.predict_proba(&point));
        }
    }

    #[test]
    fn wide_one_hot_indices_are_kept_exact() {
        // Only one column past the u16 range carries signal.
        let width = 70_000;
        let signal = 65_600;
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..20 {
            let mut row = vec![0.0; width];
            let positive = i % 2 == 0;
            row[signal] = if positive { 1.0 } else { 0.0 };
            x.push(row);
            y.push(positive);
        }
        let options = TrainOptions {
            trees: 3,
            max_features: Some(width),
            ..TrainOptions::default()
        };
        let model = train_forest(&TrainDataset { x, y }, &options).unwrap();
        assert!(model.trees.iter().any(|tree| tree
            .nodes
            .iter()
            .any(|node| matches!(node, TreeNode::Split { feature, .. } if *feature == signal))));

        let mut hit = vec![0.0; width];
        hit[signal] = 1.0;
        assert!(model.predict_proba(&hit) > 0.5);
        assert!(model.predict_proba(&vec![0.0; width]) < 0.5);
    }

    #[test]
    fn gini_is_zero_for_pure_nodes() {
        assert_eq!(gini(0.0, 4.0), 0.0);
        assert_eq!(gini(4.0, 4.0), 0.0);
        assert_eq!(gini(2.0, 4.0), 0.5);
    }
}
