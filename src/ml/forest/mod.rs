//! Bagged decision-tree ensemble (random forest) classifier.

use serde::{Deserialize, Serialize};

mod train;
pub use train::{TrainOptions, train_forest};

/// Node of a flattened binary decision tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum TreeNode {
    /// Terminal node holding the positive-class frequency of its samples.
    Leaf { probability: f64 },
    /// Internal node; `feature <= threshold` follows `left`.
    Split {
        feature: usize,
        threshold: f64,
        left: u32,
        right: u32,
    },
}

/// Single decision tree stored as a node arena rooted at index 0.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Positive-class probability of the leaf `features` falls into.
    pub fn predict(&self, features: &[f64]) -> f64 {
        let mut idx = 0usize;
        // Bounded by node count so malformed trees cannot loop forever.
        for _ in 0..self.nodes.len() {
            match self.nodes.get(idx) {
                Some(TreeNode::Leaf { probability }) => return *probability,
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = features.get(*feature).copied().unwrap_or(0.0);
                    idx = if value <= *threshold {
                        *left as usize
                    } else {
                        *right as usize
                    };
                }
                None => break,
            }
        }
        0.5
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], idx: usize, budget: usize) -> usize {
            if budget == 0 {
                return 0;
            }
            match nodes.get(idx) {
                Some(TreeNode::Split { left, right, .. }) => {
                    1 + walk(nodes, *left as usize, budget - 1)
                        .max(walk(nodes, *right as usize, budget - 1))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0, self.nodes.len())
    }
}

/// Averaged ensemble of bootstrapped trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestModel {
    pub feature_len: usize,
    pub trees: Vec<DecisionTree>,
}

impl ForestModel {
    pub fn predict_proba(&self, features: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.5;
        }
        let sum: f64 = self.trees.iter().map(|tree| tree.predict(features)).sum();
        sum / self.trees.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump_tree(threshold: f64) -> DecisionTree {
        DecisionTree {
            nodes: vec![
                TreeNode::Split {
                    feature: 0,
                    threshold,
                    left: 1,
                    right: 2,
                },
                TreeNode::Leaf { probability: 0.0 },
                TreeNode::Leaf { probability: 1.0 },
            ],
        }
    }

    #[test]
    fn tree_routes_on_threshold() {
        let tree = stump_tree(0.5);
        assert_eq!(tree.predict(&[0.5]), 0.0);
        assert_eq!(tree.predict(&[0.7]), 1.0);
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn forest_averages_trees() {
        let forest = ForestModel {
            feature_len: 1,
            trees: vec![stump_tree(0.0), stump_tree(1.0)],
        };
        assert_eq!(forest.predict_proba(&[0.5]), 0.5);
        assert_eq!(forest.predict_proba(&[2.0]), 1.0);
    }

    #[test]
    fn cyclic_tree_falls_back_to_undecided() {
        let tree = DecisionTree {
            nodes: vec![TreeNode::Split {
                feature: 0,
                threshold: 0.0,
                left: 0,
                right: 0,
            }],
        };
        assert_eq!(tree.predict(&[1.0]), 0.5);
    }
}
