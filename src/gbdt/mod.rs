// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Gradient-boosted decision trees for binary classification
//!
//! [`FastTreeTrainer`] fits a logistic-loss ensemble with leaf-wise growth
//! over quantile-binned features, then optionally Platt-calibrates the raw
//! margin. The result, [`TreeEnsemble`], is immutable and serializable.

mod binning;
mod calibration;
mod grower;
mod tree;

pub use binning::{BinMapper, BinnedMatrix};
pub use calibration::PlattCalibrator;
pub use tree::{Node, Tree, TreeValidationError};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::context::TrainingContext;
use crate::error::{Error, Result};
use crate::featurizer::FeatureVector;
use crate::trainer::{check_training_input, sigmoid, BinaryClassifier, Prediction, Trainer};

use grower::{GrowerParams, TreeGrower};

/// Random stream reserved for per-tree row subsampling
const SUBSAMPLE_STREAM: u64 = 1;

/// Smallest hessian used for a row, keeps leaf weights finite
const MIN_HESSIAN: f64 = 1e-16;

/// Hyperparameters of [`FastTreeTrainer`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FastTreeOptions {
    /// Number of boosting rounds (default 100)
    pub n_trees: usize,
    /// Maximum leaves per tree (default 20)
    pub n_leaves: usize,
    /// Minimum training rows in every leaf (default 10). Capped at half the
    /// training rows, so a tiny training set can still split once.
    pub min_samples_in_leaf: usize,
    /// Shrinkage applied to each tree (default 0.2)
    pub learning_rate: f64,
    /// Histogram bins per feature, 2..=256 (default 255)
    pub max_bins: usize,
    /// L2 penalty on leaf weights (default 1.0)
    pub l2_regularization: f64,
    /// Minimum gain for a split to be kept (default 0.0)
    pub min_split_gain: f64,
    /// Fraction of rows sampled for each tree, in (0, 1] (default 1.0)
    pub subsample: f64,
    /// Fit Platt scaling on the training margins (default true)
    pub calibrate: bool,
}

impl Default for FastTreeOptions {
    fn default() -> Self {
        Self {
            n_trees: 100,
            n_leaves: 20,
            min_samples_in_leaf: 10,
            learning_rate: 0.2,
            max_bins: 255,
            l2_regularization: 1.0,
            min_split_gain: 0.0,
            subsample: 1.0,
            calibrate: true,
        }
    }
}

impl FastTreeOptions {
    pub fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(Error::config("n_trees must be at least 1"));
        }
        if self.n_leaves < 2 {
            return Err(Error::config("n_leaves must be at least 2"));
        }
        if self.min_samples_in_leaf == 0 {
            return Err(Error::config("min_samples_in_leaf must be at least 1"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(Error::config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(2..=256).contains(&self.max_bins) {
            return Err(Error::config(format!(
                "max_bins must be in 2..=256, got {}",
                self.max_bins
            )));
        }
        if !(self.l2_regularization >= 0.0 && self.l2_regularization.is_finite()) {
            return Err(Error::config("l2_regularization must be non-negative"));
        }
        if !(self.min_split_gain >= 0.0 && self.min_split_gain.is_finite()) {
            return Err(Error::config("min_split_gain must be non-negative"));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(Error::config(format!(
                "subsample must be in (0, 1], got {}",
                self.subsample
            )));
        }
        Ok(())
    }

    fn grower_params(&self, n_rows: usize) -> GrowerParams {
        GrowerParams {
            n_leaves: self.n_leaves,
            min_samples_in_leaf: self.min_samples_in_leaf.min((n_rows / 2).max(1)),
            l2: self.l2_regularization,
            min_split_gain: self.min_split_gain,
            learning_rate: self.learning_rate,
        }
    }
}

/// Boosted tree trainer with logistic loss
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FastTreeTrainer {
    options: FastTreeOptions,
}

impl FastTreeTrainer {
    pub fn new(options: FastTreeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &FastTreeOptions {
        &self.options
    }

    fn train(
        &self,
        features: &[FeatureVector],
        labels: &[bool],
        n_features: usize,
        ctx: &TrainingContext,
    ) -> TreeEnsemble {
        let options = &self.options;
        let n_rows = labels.len();
        let matrix = BinnedMatrix::from_features(features, options.max_bins);

        let positives = labels.iter().filter(|l| **l).count() as f64;
        let negatives = n_rows as f64 - positives;
        let base_score = (positives / negatives).ln() as f32;
        let targets: Vec<f64> = labels.iter().map(|l| if *l { 1.0 } else { 0.0 }).collect();

        let mut scores = vec![base_score; n_rows];
        let mut grad = vec![0.0f64; n_rows];
        let mut hess = vec![0.0f64; n_rows];
        let mut rng = ctx.rng(SUBSAMPLE_STREAM);
        let grower = TreeGrower::new(&matrix, options.grower_params(n_rows), ctx.parallelism());
        let mut trees = Vec::with_capacity(options.n_trees);

        for round in 0..options.n_trees {
            for i in 0..n_rows {
                let p = sigmoid(scores[i] as f64);
                grad[i] = p - targets[i];
                hess[i] = (p * (1.0 - p)).max(MIN_HESSIAN);
            }

            let rows: Vec<u32> = if options.subsample < 1.0 {
                let sampled: Vec<u32> = (0..n_rows as u32)
                    .filter(|_| rng.gen::<f64>() < options.subsample)
                    .collect();
                if sampled.is_empty() {
                    (0..n_rows as u32).collect()
                } else {
                    sampled
                }
            } else {
                (0..n_rows as u32).collect()
            };

            let tree = grower.grow(rows, &grad, &hess);
            for (score, row) in scores.iter_mut().zip(features) {
                *score += tree.predict(row.as_slice());
            }
            debug!(round, n_leaves = tree.n_leaves(), "Tree grown");
            trees.push(tree);
        }

        let calibrator = options
            .calibrate
            .then(|| PlattCalibrator::fit(&scores, labels));

        info!(
            n_trees = trees.len(),
            n_features,
            n_rows,
            calibrated = calibrator.is_some(),
            "Boosted ensemble trained"
        );

        TreeEnsemble {
            n_features,
            base_score,
            trees,
            calibrator,
            options: options.clone(),
        }
    }
}

impl Trainer for FastTreeTrainer {
    type Model = TreeEnsemble;

    fn fit(
        &self,
        features: &[FeatureVector],
        labels: &[bool],
        ctx: &TrainingContext,
    ) -> Result<TreeEnsemble> {
        self.options.validate()?;
        let n_features = check_training_input(features, labels)?;
        if n_features > u32::MAX as usize || labels.len() > u32::MAX as usize {
            return Err(Error::config("training set too large"));
        }
        ctx.install(|| self.train(features, labels, n_features, ctx))
    }
}

/// Fitted boosted ensemble: margin = base score + sum of tree outputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    n_features: usize,
    base_score: f32,
    trees: Vec<Tree>,
    calibrator: Option<PlattCalibrator>,
    options: FastTreeOptions,
}

impl TreeEnsemble {
    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn base_score(&self) -> f32 {
        self.base_score
    }

    pub fn calibrator(&self) -> Option<&PlattCalibrator> {
        self.calibrator.as_ref()
    }

    /// Hyperparameters the ensemble was trained with
    pub fn options(&self) -> &FastTreeOptions {
        &self.options
    }

    /// Uncalibrated margin. Accumulates in tree order exactly like training.
    pub fn raw_score(&self, features: &[f32]) -> f32 {
        let mut score = self.base_score;
        for tree in &self.trees {
            score += tree.predict(features);
        }
        score
    }

    pub fn probability(&self, score: f32) -> f64 {
        match &self.calibrator {
            Some(calibrator) => calibrator.probability(score),
            None => sigmoid(score as f64),
        }
    }

    /// Total split gain per feature
    pub fn feature_importance(&self) -> Vec<f64> {
        let mut importance = vec![0.0; self.n_features];
        for tree in &self.trees {
            for node in tree.nodes() {
                if let Node::Split { feature, gain, .. } = node {
                    if let Some(slot) = importance.get_mut(*feature as usize) {
                        *slot += *gain as f64;
                    }
                }
            }
        }
        importance
    }
}

impl BinaryClassifier for TreeEnsemble {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict(&self, features: &FeatureVector) -> Result<Prediction> {
        if features.len() != self.n_features {
            return Err(Error::Dimension {
                expected: self.n_features,
                actual: features.len(),
            });
        }
        let score = self.raw_score(features.as_slice());
        Ok(Prediction::from_probability(self.probability(score), score))
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.n_features == 0 {
            return Err("ensemble has zero features".to_string());
        }
        if !self.base_score.is_finite() {
            return Err("non-finite base score".to_string());
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features)
                .map_err(|e| format!("tree {i}: {e}"))?;
        }
        if let Some(calibrator) = &self.calibrator {
            if !calibrator.is_finite() {
                return Err("non-finite calibration parameters".to_string());
            }
        }
        Ok(())
    }
}
