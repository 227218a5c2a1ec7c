// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Trainer and binary classifier contracts
//!
//! A [`Trainer`] turns feature vectors plus labels into an immutable
//! [`BinaryClassifier`]. Classifiers score a vector into a probability and
//! label it positive when the probability reaches [`DECISION_THRESHOLD`].

use serde::{Deserialize, Serialize};

use crate::context::TrainingContext;
use crate::error::{Error, Result};
use crate::featurizer::FeatureVector;

/// Fixed probability threshold for the positive label
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Output of a binary classifier for one input
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// `true` = positive sentiment
    pub label: bool,
    /// Calibrated probability of the positive class, in [0, 1]
    pub probability: f64,
    /// Raw ensemble margin before calibration
    pub score: f32,
}

impl Prediction {
    pub fn from_probability(probability: f64, score: f32) -> Self {
        Self {
            label: probability >= DECISION_THRESHOLD,
            probability,
            score,
        }
    }
}

/// Produces a fitted classifier from featurized training data
pub trait Trainer {
    type Model: BinaryClassifier;

    fn fit(
        &self,
        features: &[FeatureVector],
        labels: &[bool],
        ctx: &TrainingContext,
    ) -> Result<Self::Model>;
}

/// A fitted, read-only binary classifier
pub trait BinaryClassifier: Send + Sync {
    /// Feature dimension the model was trained on
    fn n_features(&self) -> usize;

    /// Score one feature vector. Fails on a dimension mismatch.
    fn predict(&self, features: &FeatureVector) -> Result<Prediction>;

    /// Structural self-check, run after deserialization
    fn validate(&self) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Logistic function
#[inline]
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Check the shape of a training set and return its feature dimension
pub(crate) fn check_training_input(features: &[FeatureVector], labels: &[bool]) -> Result<usize> {
    if features.len() != labels.len() {
        return Err(Error::config(format!(
            "{} feature vectors but {} labels",
            features.len(),
            labels.len()
        )));
    }
    let first = features
        .first()
        .ok_or_else(|| Error::config("training set is empty"))?;
    let dimension = first.len();
    if dimension == 0 {
        return Err(Error::config("feature vectors are empty"));
    }
    if let Some(bad) = features.iter().find(|f| f.len() != dimension) {
        return Err(Error::Dimension {
            expected: dimension,
            actual: bad.len(),
        });
    }
    let positives = labels.iter().filter(|l| **l).count();
    if positives == 0 || positives == labels.len() {
        return Err(Error::config("training set must contain both positive and negative labels"));
    }
    Ok(dimension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_threshold_is_inclusive() {
        assert!(Prediction::from_probability(0.5, 0.0).label);
        assert!(!Prediction::from_probability(0.4999, -0.1).label);
        assert!(Prediction::from_probability(0.9, 2.0).label);
    }

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
    }

    #[test]
    fn test_check_training_input() {
        let features = vec![FeatureVector::zeros(3), FeatureVector::zeros(3)];
        assert_eq!(check_training_input(&features, &[true, false]).unwrap(), 3);

        let err = check_training_input(&features, &[true]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        let err = check_training_input(&features, &[true, true]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        let ragged = vec![FeatureVector::zeros(3), FeatureVector::zeros(2)];
        let err = check_training_input(&ragged, &[true, false]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Dimension);

        assert!(check_training_input(&[], &[]).is_err());
    }
}
