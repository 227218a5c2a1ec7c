// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Binary sentiment classification pipeline
//!
//! This crate provides:
//! - Delimited dataset loading and seeded train/test splitting
//! - Word and character n-gram TF-IDF featurization
//! - Gradient-boosted decision trees with Platt calibration
//! - Fit/apply pipeline composition with a versioned binary model format
//! - Evaluation metrics (Accuracy, AUC, F1, log loss, AUPRC)
//! - A shared, thread-safe inference façade
//!
//! Every training entry point takes an explicit [`TrainingContext`] carrying
//! the seed and thread budget, so runs are reproducible in isolation.

pub mod config;
pub mod context;
pub mod datasets;
pub mod error;
pub mod evaluation;
pub mod featurizer;
pub mod gbdt;
pub mod inference;
pub mod metrics;
pub mod persist;
pub mod pipeline;
pub mod report;
pub mod trainer;

pub use config::RunConfig;
pub use context::{Parallelism, TrainingContext};
pub use datasets::{ColumnOrder, Dataset, LabelDistribution, Record, TextLoaderOptions, TrainTestSplit};
pub use error::{Error, ErrorKind, Result};
pub use evaluation::evaluate;
pub use featurizer::{FeatureVector, Featurizer, FittedFeaturizer, TextFeaturizer, TextFeaturizerOptions};
pub use gbdt::{FastTreeOptions, FastTreeTrainer, TreeEnsemble};
pub use inference::Predictor;
pub use metrics::{BinaryClassificationMetrics, ConfusionMatrix};
pub use persist::FormatError;
pub use pipeline::{FittedPipeline, Pipeline, SentimentModel, SentimentPipeline};
pub use report::TrainingReport;
pub use trainer::{BinaryClassifier, Prediction, Trainer, DECISION_THRESHOLD};
