//! Regression forest inference.
//!
//! Trees are exported from a trained sklearn `RandomForestRegressor` as flat
//! node arrays. A split sends `x[feature] <= threshold` to `left`, anything
//! else to `right`; the forest predicts the mean of the leaf values reached
//! in every tree.
//!
//! Nodes are validated on construction: children must point forward in the
//! array, which rules out cycles, so traversal always reaches a leaf. Feature
//! indices are checked against the forest's feature list when the forest is
//! assembled, and inputs are length-checked before any tree is walked.
use serde::{Deserialize, Serialize};

use crate::{ScoringError, ScoringModel};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    /// Check the node structure. Feature indices are checked by
    /// [`RandomForestModel::new`].
    pub fn new(nodes: Vec<TreeNode>) -> Result<Self, ScoringError> {
        let tree = Self { nodes };
        tree.validate(usize::MAX).map_err(ScoringError::InvalidModel)?;
        Ok(tree)
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".into());
        }
        let n = self.nodes.len();
        for (index, node) in self.nodes.iter().enumerate() {
            match *node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if feature >= n_features {
                        return Err(format!(
                            "node {index} splits on feature {feature} of {n_features}"
                        ));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {index} has a non-finite threshold"));
                    }
                    for child in [left, right] {
                        if child <= index || child >= n {
                            return Err(format!("node {index} has invalid child {child}"));
                        }
                    }
                }
                TreeNode::Leaf { value } => {
                    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                        return Err(format!("leaf {index} value {value} is outside [0, 1]"));
                    }
                }
            }
        }
        Ok(())
    }

    /// Caller guarantees the tree passed `validate` for `features.len()` features.
    pub(crate) fn predict(&self, features: &[f32]) -> f64 {
        let mut index = 0;
        loop {
            match self.nodes[index] {
                TreeNode::Leaf { value } => return value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if f64::from(features[feature]) <= threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    #[cfg(test)]
    fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], index: usize) -> usize {
            match nodes[index] {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => {
                    1 + walk(nodes, left).max(walk(nodes, right))
                }
            }
        }
        walk(&self.nodes, 0)
    }
}

#[derive(Debug, Clone)]
pub struct RandomForestModel {
    name: String,
    feature_names: Vec<String>,
    trees: Vec<RegressionTree>,
}

impl RandomForestModel {
    pub fn new(
        name: impl Into<String>,
        feature_names: Vec<String>,
        trees: Vec<RegressionTree>,
    ) -> Result<Self, ScoringError> {
        if feature_names.is_empty() {
            return Err(ScoringError::InvalidModel("model declares no features".into()));
        }
        if trees.is_empty() {
            return Err(ScoringError::InvalidModel("empty forest".into()));
        }
        for (i, tree) in trees.iter().enumerate() {
            tree.validate(feature_names.len())
                .map_err(|e| ScoringError::InvalidModel(format!("tree {i}: {e}")))?;
        }
        Ok(Self {
            name: name.into(),
            feature_names,
            trees,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl ScoringModel for RandomForestModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict(&self, features: &[f32]) -> Result<f32, ScoringError> {
        if features.len() != self.feature_names.len() {
            return Err(ScoringError::DimensionMismatch {
                expected: self.feature_names.len(),
                got: features.len(),
            });
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict(features)).sum();
        Ok((sum / self.trees.len() as f64) as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump(feature: usize, threshold: f64, low: f64, high: f64) -> RegressionTree {
        RegressionTree {
            nodes: vec![
                TreeNode::Split {
                    feature,
                    threshold,
                    left: 1,
                    right: 2,
                },
                TreeNode::Leaf { value: low },
                TreeNode::Leaf { value: high },
            ],
        }
    }

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{i}")).collect()
    }

    #[test]
    fn threshold_is_inclusive_on_the_left() {
        let tree = stump(0, 0.5, 0.1, 0.9);
        assert_eq!(tree.predict(&[0.5]), 0.1);
        assert_eq!(tree.predict(&[0.51]), 0.9);
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn forest_averages_trees() {
        let forest = RandomForestModel::new(
            "rf",
            names(2),
            vec![stump(0, 0.5, 0.0, 1.0), stump(1, 0.5, 0.2, 0.6)],
        )
        .unwrap();
        assert_eq!(forest.n_trees(), 2);
        assert!((forest.predict(&[0.9, 0.1]).unwrap() - 0.6).abs() < 1e-6);
        assert!((forest.predict(&[0.1, 0.9]).unwrap() - 0.3).abs() < 1e-6);
        assert!((forest.predict(&[0.9, 0.9]).unwrap() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn rejects_backward_children() {
        let cyclic = vec![
            TreeNode::Split {
                feature: 0,
                threshold: 0.5,
                left: 0,
                right: 1,
            },
            TreeNode::Leaf { value: 0.5 },
        ];
        assert!(matches!(
            RegressionTree::new(cyclic.clone()),
            Err(ScoringError::InvalidModel(_))
        ));
        let result = RandomForestModel::new("bad", names(1), vec![RegressionTree { nodes: cyclic }]);
        assert!(matches!(result, Err(ScoringError::InvalidModel(_))));
    }

    #[test]
    fn rejects_unknown_feature_and_bad_leaf() {
        assert!(RandomForestModel::new("bad", names(1), vec![stump(3, 0.5, 0.0, 1.0)]).is_err());
        assert!(RandomForestModel::new("bad", names(1), vec![stump(0, 0.5, 0.0, 1.5)]).is_err());
        assert!(RandomForestModel::new("bad", names(1), Vec::new()).is_err());
    }

    #[test]
    fn tree_constructor_checks_structure() {
        let dangling = vec![TreeNode::Split {
            feature: 0,
            threshold: 0.5,
            left: 1,
            right: 2,
        }];
        assert!(RegressionTree::new(dangling).is_err());
        assert!(RegressionTree::new(Vec::new()).is_err());
        assert!(RegressionTree::new(vec![TreeNode::Leaf { value: -0.1 }]).is_err());

        let tree = RegressionTree::new(stump(4, 0.5, 0.1, 0.9).nodes).unwrap();
        assert_eq!(tree.depth(), 1);
        // Feature 4 does not exist in a two-feature forest.
        assert!(RandomForestModel::new("rf", names(2), vec![tree]).is_err());
    }

    #[test]
    fn wrong_input_length_is_rejected() {
        let forest = RandomForestModel::new("rf", names(2), vec![stump(0, 0.5, 0.0, 1.0)]).unwrap();
        assert_eq!(
            forest.predict(&[0.1]),
            Err(ScoringError::DimensionMismatch {
                expected: 2,
                got: 1
            })
        );
    }

    #[test]
    fn nodes_deserialize_untagged() {
        let json = r#"{ "nodes": [
            { "feature": 0, "threshold": 0.5, "left": 1, "right": 2 },
            { "value": 0.25 },
            { "value": 0.75 }
        ] }"#;
        let tree: RegressionTree = serde_json::from_str(json).unwrap();
        assert_eq!(tree, stump(0, 0.5, 0.25, 0.75));
    }
}
