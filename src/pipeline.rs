// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Fit/apply composition of a featurizer and a trainer
//!
//! [`Pipeline`] holds the untrained components. [`Pipeline::fit`] returns a
//! brand-new [`FittedPipeline`]; nothing is mutated in place, so a fitted
//! pipeline can be shared across threads and applied concurrently.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::TrainingContext;
use crate::datasets::Record;
use crate::error::{Error, Result};
use crate::featurizer::{
    FeatureVector, Featurizer, FittedFeaturizer, FittedTextFeaturizer, TextFeaturizer,
    TextFeaturizerOptions,
};
use crate::gbdt::{FastTreeOptions, FastTreeTrainer, TreeEnsemble};
use crate::trainer::{BinaryClassifier, Prediction, Trainer};

/// Untrained featurizer + trainer pair
#[derive(Debug, Clone, Default)]
pub struct Pipeline<F = TextFeaturizer, T = FastTreeTrainer> {
    featurizer: F,
    trainer: T,
}

/// Default text pipeline
pub type SentimentPipeline = Pipeline<TextFeaturizer, FastTreeTrainer>;

/// Fitted default text pipeline, the unit saved to and loaded from disk
pub type SentimentModel = FittedPipeline<FittedTextFeaturizer, TreeEnsemble>;

impl<F, T> Pipeline<F, T>
where
    F: Featurizer,
    T: Trainer,
{
    pub fn new(featurizer: F, trainer: T) -> Self {
        Self {
            featurizer,
            trainer,
        }
    }

    pub fn featurizer(&self) -> &F {
        &self.featurizer
    }

    pub fn trainer(&self) -> &T {
        &self.trainer
    }

    /// Fit the featurizer on the training texts only, then the trainer on the
    /// resulting vectors. Every record must carry a label.
    pub fn fit(
        &self,
        train: &[Record],
        ctx: &TrainingContext,
    ) -> Result<FittedPipeline<F::Fitted, T::Model>> {
        if train.is_empty() {
            return Err(Error::config("training set is empty"));
        }

        let mut texts = Vec::with_capacity(train.len());
        let mut labels = Vec::with_capacity(train.len());
        for (i, record) in train.iter().enumerate() {
            let label = record
                .label
                .ok_or_else(|| Error::config(format!("training record {i} has no label")))?;
            texts.push(record.text.as_str());
            labels.push(label);
        }

        let featurizer = self.featurizer.fit(&texts)?;
        let features: Vec<FeatureVector> = texts.iter().map(|t| featurizer.transform(t)).collect();
        info!(
            rows = features.len(),
            dimension = featurizer.dimension(),
            "Training set featurized"
        );

        let model = self.trainer.fit(&features, &labels, ctx)?;
        FittedPipeline::from_parts(featurizer, model)
    }
}

impl SentimentPipeline {
    pub fn with_options(featurizer: TextFeaturizerOptions, trainer: FastTreeOptions) -> Self {
        Self::new(TextFeaturizer::new(featurizer), FastTreeTrainer::new(trainer))
    }
}

/// Immutable fitted featurizer + model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPipeline<FF, M> {
    featurizer: FF,
    model: M,
}

impl<FF, M> FittedPipeline<FF, M>
where
    FF: FittedFeaturizer,
    M: BinaryClassifier,
{
    /// Combine fitted parts; their feature dimensions must agree
    pub fn from_parts(featurizer: FF, model: M) -> Result<Self> {
        if featurizer.dimension() != model.n_features() {
            return Err(Error::Dimension {
                expected: model.n_features(),
                actual: featurizer.dimension(),
            });
        }
        Ok(Self { featurizer, model })
    }

    pub fn featurizer(&self) -> &FF {
        &self.featurizer
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn dimension(&self) -> usize {
        self.featurizer.dimension()
    }

    pub fn transform(&self, text: &str) -> FeatureVector {
        self.featurizer.transform(text)
    }

    /// Featurize then predict
    pub fn apply(&self, text: &str) -> Result<Prediction> {
        self.model.predict(&self.featurizer.transform(text))
    }

    /// Consistency of both parts and of their shared dimension
    pub fn validate(&self) -> std::result::Result<(), String> {
        self.featurizer
            .validate()
            .map_err(|e| format!("featurizer: {e}"))?;
        self.model.validate().map_err(|e| format!("model: {e}"))?;
        if self.featurizer.dimension() != self.model.n_features() {
            return Err(format!(
                "featurizer produces {} features, model expects {}",
                self.featurizer.dimension(),
                self.model.n_features()
            ));
        }
        Ok(())
    }
}

impl SentimentModel {
    /// The `k` vocabulary terms with the highest accumulated split gain
    pub fn top_terms(&self, k: usize) -> Vec<(String, f64)> {
        let vocabulary = self.featurizer.vocabulary();
        let mut ranked: Vec<(usize, f64)> = self
            .model
            .feature_importance()
            .into_iter()
            .enumerate()
            .filter(|(_, gain)| *gain > 0.0)
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked
            .into_iter()
            .take(k)
            .filter_map(|(index, gain)| {
                vocabulary
                    .get(index)
                    .map(|term| (display_term(term), gain))
            })
            .collect()
    }
}

/// Strip the internal term-kind prefix and make framing markers visible
fn display_term(term: &str) -> String {
    let body = term
        .strip_prefix("w:")
        .or_else(|| term.strip_prefix("c:"))
        .unwrap_or(term);
    body.replace('\u{2}', "^").replace('\u{3}', "$")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::Dataset;
    use crate::error::ErrorKind;

    fn tiny_options() -> FastTreeOptions {
        FastTreeOptions {
            min_samples_in_leaf: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_two_sentence_scenario() {
        let train = vec![
            Record::labeled("great food", true),
            Record::labeled("terrible food", false),
        ];
        let fitted = SentimentPipeline::default()
            .fit(&train, &TrainingContext::new(42))
            .unwrap();

        let positive = fitted.apply("great food").unwrap();
        assert!(positive.label);
        assert!(positive.probability > 0.5);

        let negative = fitted.apply("terrible food").unwrap();
        assert!(!negative.label);
        assert!(negative.probability < 0.5);
    }

    #[test]
    fn test_fit_on_synthetic_reviews() {
        let dataset = Dataset::load_synthetic(400, 42);
        let split = dataset.split(0.2, 42).unwrap();
        let options = FastTreeOptions {
            n_trees: 30,
            ..Default::default()
        };
        let pipeline = SentimentPipeline::with_options(TextFeaturizerOptions::default(), options);
        let fitted = pipeline.fit(&split.train, &TrainingContext::new(42)).unwrap();

        assert!(fitted.validate().is_ok());
        let correct = split
            .test
            .iter()
            .filter(|r| fitted.apply(&r.text).map(|p| Some(p.label) == r.label).unwrap_or(false))
            .count();
        assert!(correct as f64 / split.test.len() as f64 > 0.7);

        let top = fitted.top_terms(5);
        assert!(!top.is_empty());
        assert!(top.len() <= 5);
        assert!(top.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn test_fit_requires_labels() {
        let train = vec![Record::labeled("good", true), Record::unlabeled("bad")];
        let err = SentimentPipeline::default()
            .fit(&train, &TrainingContext::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        let err = SentimentPipeline::default()
            .fit(&[], &TrainingContext::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_apply_unseen_text() {
        let train = vec![
            Record::labeled("great food", true),
            Record::labeled("terrible food", false),
        ];
        let fitted = SentimentPipeline::with_options(TextFeaturizerOptions::default(), tiny_options())
            .fit(&train, &TrainingContext::default())
            .unwrap();
        let prediction = fitted.apply("zzz qqq").unwrap();
        assert!((0.0..=1.0).contains(&prediction.probability));
        assert_eq!(fitted.transform("zzz qqq"), fitted.transform("zzz qqq"));
    }

    #[test]
    fn test_from_parts_rejects_dimension_mismatch() {
        let a = SentimentPipeline::with_options(TextFeaturizerOptions::default(), tiny_options())
            .fit(
                &[Record::labeled("great food", true), Record::labeled("terrible food", false)],
                &TrainingContext::default(),
            )
            .unwrap();
        let b = SentimentPipeline::with_options(TextFeaturizerOptions::default(), tiny_options())
            .fit(
                &[
                    Record::labeled("a wonderful evening out", true),
                    Record::labeled("never again", false),
                ],
                &TrainingContext::default(),
            )
            .unwrap();
        let err = FittedPipeline::from_parts(a.featurizer().clone(), b.model().clone()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Dimension);
    }

    #[test]
    fn test_display_term() {
        assert_eq!(display_term("w:not good"), "not good");
        assert_eq!(display_term("c:\u{2}ba"), "^ba");
    }
}
