// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Load-once, apply-many prediction façade

use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;

use crate::error::Result;
use crate::persist;
use crate::pipeline::SentimentModel;
use crate::trainer::Prediction;

/// Batches smaller than this are scored on the calling thread
const MIN_PARALLEL_BATCH: usize = 256;

/// Shared handle to a fitted model. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct Predictor {
    model: Arc<SentimentModel>,
}

impl Predictor {
    pub fn new(model: SentimentModel) -> Self {
        Self {
            model: Arc::new(model),
        }
    }

    /// Read a saved model from disk
    pub fn load(path: &Path) -> Result<Self> {
        persist::load(path).map(Self::new)
    }

    pub fn model(&self) -> &SentimentModel {
        &self.model
    }

    pub fn predict_one(&self, text: &str) -> Result<Prediction> {
        self.model.apply(text)
    }

    /// One prediction per input, in input order
    pub fn predict_batch<S>(&self, texts: &[S]) -> Result<Vec<Prediction>>
    where
        S: AsRef<str> + Sync,
    {
        if texts.len() < MIN_PARALLEL_BATCH {
            return texts.iter().map(|t| self.model.apply(t.as_ref())).collect();
        }
        texts
            .par_iter()
            .map(|t| self.model.apply(t.as_ref()))
            .collect()
    }
}

impl From<SentimentModel> for Predictor {
    fn from(model: SentimentModel) -> Self {
        Self::new(model)
    }
}
