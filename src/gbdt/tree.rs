// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Regression tree representation used by the boosted ensemble

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One tree node. Children always sit at higher indices than their parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Rows with `features[feature] <= threshold` go left
    Split {
        feature: u32,
        threshold: f32,
        left: u32,
        right: u32,
        gain: f32,
    },
    Leaf {
        value: f32,
    },
}

/// Structural validation errors for [`Tree`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TreeValidationError {
    #[error("tree has no nodes")]
    Empty,
    #[error("node {node}: child {child} is not after its parent or out of range")]
    BadChild { node: usize, child: u32 },
    #[error("node {node}: feature {feature} out of range for {n_features} features")]
    FeatureOutOfRange {
        node: usize,
        feature: u32,
        n_features: usize,
    },
    #[error("node {node}: non-finite value")]
    NonFinite { node: usize },
}

/// Immutable binary decision tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Single-leaf tree
    pub fn constant(value: f32) -> Self {
        Self {
            nodes: vec![Node::Leaf { value }],
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    /// Output of the leaf reached by `features`
    #[inline]
    pub fn predict(&self, features: &[f32]) -> f32 {
        let mut index = 0usize;
        loop {
            match self.nodes[index] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    index = if features[feature as usize] <= threshold {
                        left as usize
                    } else {
                        right as usize
                    };
                }
            }
        }
    }

    /// Check that traversal always terminates inside the node array and only
    /// reads features below `n_features`.
    pub fn validate(&self, n_features: usize) -> Result<(), TreeValidationError> {
        if self.nodes.is_empty() {
            return Err(TreeValidationError::Empty);
        }
        for (i, node) in self.nodes.iter().enumerate() {
            match *node {
                Node::Leaf { value } => {
                    if !value.is_finite() {
                        return Err(TreeValidationError::NonFinite { node: i });
                    }
                }
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    if feature as usize >= n_features {
                        return Err(TreeValidationError::FeatureOutOfRange {
                            node: i,
                            feature,
                            n_features,
                        });
                    }
                    if threshold.is_nan() {
                        return Err(TreeValidationError::NonFinite { node: i });
                    }
                    for child in [left, right] {
                        if child as usize <= i || child as usize >= self.nodes.len() {
                            return Err(TreeValidationError::BadChild { node: i, child });
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Grows a tree by turning leaves into splits
#[derive(Debug)]
pub(crate) struct TreeBuilder {
    nodes: Vec<Node>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::Leaf { value: 0.0 }],
        }
    }

    /// Replace leaf `node` with a split; returns the new (left, right) leaves
    pub fn split(&mut self, node: usize, feature: u32, threshold: f32, gain: f32) -> (usize, usize) {
        let left = self.nodes.len();
        let right = left + 1;
        self.nodes.push(Node::Leaf { value: 0.0 });
        self.nodes.push(Node::Leaf { value: 0.0 });
        self.nodes[node] = Node::Split {
            feature,
            threshold,
            left: left as u32,
            right: right as u32,
            gain,
        };
        (left, right)
    }

    pub fn set_leaf_value(&mut self, node: usize, value: f32) {
        if let Node::Leaf { value: v } = &mut self.nodes[node] {
            *v = value;
        }
    }

    pub fn build(self) -> Tree {
        Tree { nodes: self.nodes }
    }
}
