// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Held-out evaluation of a fitted pipeline

use tracing::info;

use crate::datasets::{label_distribution, Record};
use crate::error::{Error, Result};
use crate::featurizer::FittedFeaturizer;
use crate::metrics::BinaryClassificationMetrics;
use crate::pipeline::FittedPipeline;
use crate::trainer::BinaryClassifier;

/// Apply `fitted` to every test record and score the predictions.
///
/// Fails with a configuration error when a record is unlabeled or the test
/// set lacks one of the classes, since AUC and F1 are undefined there.
pub fn evaluate<FF, M>(fitted: &FittedPipeline<FF, M>, test: &[Record]) -> Result<BinaryClassificationMetrics>
where
    FF: FittedFeaturizer,
    M: BinaryClassifier,
{
    let distribution = label_distribution(test);
    if distribution.unlabeled > 0 {
        return Err(Error::config(format!(
            "{} test records have no label",
            distribution.unlabeled
        )));
    }
    if !distribution.has_both_classes() {
        return Err(Error::config(format!(
            "test set needs both classes (positive={}, negative={})",
            distribution.positive, distribution.negative
        )));
    }

    let mut truth = Vec::with_capacity(test.len());
    let mut predicted = Vec::with_capacity(test.len());
    let mut probabilities = Vec::with_capacity(test.len());
    for record in test {
        let prediction = fitted.apply(&record.text)?;
        truth.push(record.label == Some(true));
        predicted.push(prediction.label);
        probabilities.push(prediction.probability);
    }

    let metrics = BinaryClassificationMetrics::compute(&truth, &predicted, &probabilities)?;
    info!(
        records = test.len(),
        accuracy = metrics.accuracy,
        auc = metrics.auc,
        f1 = metrics.f1_score,
        "Evaluation finished"
    );
    Ok(metrics)
}
