// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Text featurization: fit a vocabulary on training text, then map any text into
//! the same fixed-length numeric space
//!
//! The default [`TextFeaturizer`] combines word n-grams and character n-grams,
//! weighted by TF-IDF and L2-normalised. Once fitted it never changes: unseen
//! terms contribute nothing.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Longest word or character n-gram a featurizer accepts
pub const MAX_NGRAM_LENGTH: usize = 16;

/// Fixed-length dense feature representation of one text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn zeros(len: usize) -> Self {
        Self(vec![0.0; len])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Indices and values of the non-zero entries, in index order
    pub fn nonzero(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0.0)
            .map(|(i, v)| (i, *v))
    }
}

impl From<Vec<f32>> for FeatureVector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// A trainable text-to-features transform
pub trait Featurizer {
    /// Immutable state produced by fitting
    type Fitted: FittedFeaturizer;

    /// Learn vocabulary and statistics from `texts` only
    fn fit<S: AsRef<str>>(&self, texts: &[S]) -> Result<Self::Fitted>;
}

/// A fitted, read-only text transform
pub trait FittedFeaturizer: Send + Sync {
    /// Length of every vector produced by [`transform`](Self::transform)
    fn dimension(&self) -> usize;

    /// Map text into the fitted feature space. Pure and infallible.
    fn transform(&self, text: &str) -> FeatureVector;

    /// Structural self-check, run after deserialization
    fn validate(&self) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Term weighting scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermWeighting {
    /// Raw term counts
    Tf,
    /// Term counts scaled by smoothed inverse document frequency
    #[default]
    TfIdf,
}

/// Options for [`TextFeaturizer`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextFeaturizerOptions {
    pub lowercase: bool,
    /// Word n-grams of every length in `1..=word_ngram_length`, at most
    /// [`MAX_NGRAM_LENGTH`]
    pub word_ngram_length: usize,
    /// Character n-gram length, 0 disables character n-grams. At most
    /// [`MAX_NGRAM_LENGTH`].
    pub char_ngram_length: usize,
    /// Terms seen in fewer documents are dropped
    pub min_document_frequency: u32,
    /// Keep at most this many terms (highest document frequency first)
    pub max_features: Option<usize>,
    pub weighting: TermWeighting,
    /// Scale each vector to unit L2 norm
    pub normalize: bool,
}

impl Default for TextFeaturizerOptions {
    fn default() -> Self {
        Self {
            lowercase: true,
            word_ngram_length: 2,
            char_ngram_length: 3,
            min_document_frequency: 1,
            max_features: Some(5000),
            weighting: TermWeighting::TfIdf,
            normalize: true,
        }
    }
}

impl TextFeaturizerOptions {
    pub fn validate(&self) -> Result<()> {
        if self.word_ngram_length == 0 && self.char_ngram_length == 0 {
            return Err(Error::config("featurizer needs word or character n-grams"));
        }
        if self.word_ngram_length > MAX_NGRAM_LENGTH || self.char_ngram_length > MAX_NGRAM_LENGTH {
            return Err(Error::config(format!(
                "n-gram lengths must not exceed {MAX_NGRAM_LENGTH}"
            )));
        }
        if self.min_document_frequency == 0 {
            return Err(Error::config("min_document_frequency must be at least 1"));
        }
        if self.max_features == Some(0) {
            return Err(Error::config("max_features must be positive"));
        }
        Ok(())
    }

    /// All terms of `text`, with repetitions, in occurrence order
    fn extract_terms(&self, text: &str) -> Vec<String> {
        let normalized = if self.lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        };

        let words: Vec<&str> = normalized
            .split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .map(|w| w.trim_matches('\''))
            .filter(|w| !w.is_empty())
            .collect();

        let mut terms = Vec::new();
        for n in 1..=self.word_ngram_length {
            for window in words.windows(n) {
                terms.push(format!("w:{}", window.join(" ")));
            }
        }

        if self.char_ngram_length > 0 {
            let framed: Vec<char> = std::iter::once('\u{2}')
                .chain(words.join(" ").chars())
                .chain(std::iter::once('\u{3}'))
                .collect();
            for window in framed.windows(self.char_ngram_length) {
                let mut term = String::with_capacity(2 + window.len() * 4);
                term.push_str("c:");
                term.extend(window.iter());
                terms.push(term);
            }
        }

        terms
    }
}

/// Word + character n-gram featurizer
#[derive(Debug, Clone, Default)]
pub struct TextFeaturizer {
    options: TextFeaturizerOptions,
}

impl TextFeaturizer {
    pub fn new(options: TextFeaturizerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TextFeaturizerOptions {
        &self.options
    }
}

impl Featurizer for TextFeaturizer {
    type Fitted = FittedTextFeaturizer;

    fn fit<S: AsRef<str>>(&self, texts: &[S]) -> Result<FittedTextFeaturizer> {
        self.options.validate()?;

        let mut document_frequency: BTreeMap<String, u32> = BTreeMap::new();
        for text in texts {
            let unique: BTreeSet<String> = self.options.extract_terms(text.as_ref()).into_iter().collect();
            for term in unique {
                *document_frequency.entry(term).or_insert(0) += 1;
            }
        }

        let mut kept: Vec<(String, u32)> = document_frequency
            .into_iter()
            .filter(|(_, df)| *df >= self.options.min_document_frequency)
            .collect();

        if let Some(max) = self.options.max_features {
            if kept.len() > max {
                kept.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                kept.truncate(max);
                kept.sort_by(|a, b| a.0.cmp(&b.0));
            }
        }

        if kept.is_empty() {
            return Err(Error::config("featurizer found no terms in the training text"));
        }

        let n_docs = texts.len() as f64;
        let mut terms = BTreeMap::new();
        let mut idf = Vec::with_capacity(kept.len());
        for (index, (term, df)) in kept.into_iter().enumerate() {
            idf.push((((1.0 + n_docs) / (1.0 + df as f64)).ln() + 1.0) as f32);
            terms.insert(term, index as u32);
        }

        tracing::info!(
            "Featurizer fitted on {} texts: {} terms",
            texts.len(),
            terms.len()
        );

        Ok(FittedTextFeaturizer {
            options: self.options.clone(),
            terms,
            idf,
        })
    }
}

/// Vocabulary and idf statistics learned by [`TextFeaturizer`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedTextFeaturizer {
    options: TextFeaturizerOptions,
    terms: BTreeMap<String, u32>,
    idf: Vec<f32>,
}

impl FittedTextFeaturizer {
    pub fn options(&self) -> &TextFeaturizerOptions {
        &self.options
    }

    /// Term stored at a feature index
    pub fn term(&self, index: usize) -> Option<&str> {
        // Indices follow lexicographic term order
        self.terms.keys().nth(index).map(String::as_str)
    }

    /// All terms, indexed by feature position
    pub fn vocabulary(&self) -> Vec<&str> {
        self.terms.keys().map(String::as_str).collect()
    }

    #[cfg(test)]
    pub(crate) fn with_options(mut self, options: TextFeaturizerOptions) -> Self {
        self.options = options;
        self
    }
}

impl FittedFeaturizer for FittedTextFeaturizer {
    fn dimension(&self) -> usize {
        self.idf.len()
    }

    fn transform(&self, text: &str) -> FeatureVector {
        let mut counts: HashMap<u32, u32> = HashMap::new();
        for term in self.options.extract_terms(text) {
            if let Some(&index) = self.terms.get(&term) {
                *counts.entry(index).or_insert(0) += 1;
            }
        }

        let mut values = vec![0.0f32; self.dimension()];
        for (index, count) in counts {
            let index = index as usize;
            values[index] = match self.options.weighting {
                TermWeighting::Tf => count as f32,
                TermWeighting::TfIdf => count as f32 * self.idf[index],
            };
        }

        if self.options.normalize {
            let norm = values.iter().map(|v| f64::from(*v) * f64::from(*v)).sum::<f64>().sqrt();
            if norm > 0.0 {
                for v in &mut values {
                    *v = (f64::from(*v) / norm) as f32;
                }
            }
        }

        FeatureVector(values)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        self.options.validate().map_err(|e| e.to_string())?;
        if self.terms.len() != self.idf.len() {
            return Err(format!(
                "vocabulary has {} terms but {} idf weights",
                self.terms.len(),
                self.idf.len()
            ));
        }
        // Positions must be exactly 0..n in key order
        for (position, index) in self.terms.values().enumerate() {
            if *index as usize != position {
                return Err(format!("term index {index} out of order at position {position}"));
            }
        }
        if self.idf.iter().any(|w| !w.is_finite()) {
            return Err("non-finite idf weight".to_string());
        }
        Ok(())
    }
}
