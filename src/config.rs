// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Run configuration for the end-to-end training flow

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::context::TrainingContext;
use crate::datasets::TextLoaderOptions;
use crate::error::{Error, Result};
use crate::featurizer::TextFeaturizerOptions;
use crate::gbdt::FastTreeOptions;

/// Configuration for a train → evaluate → save run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Labeled input file
    pub data_path: PathBuf,
    /// Where the fitted model is written
    pub model_path: PathBuf,
    pub loader: TextLoaderOptions,
    /// Fraction of records held out for evaluation
    pub test_fraction: f64,
    /// Random seed for the split and for training
    pub seed: u64,
    /// Training threads (0 = all cores, 1 = sequential)
    pub n_threads: usize,
    pub featurizer: TextFeaturizerOptions,
    pub trainer: FastTreeOptions,
    /// Write JSON and Markdown reports here when set
    pub report_dir: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/yelp_labelled.txt"),
            model_path: PathBuf::from("data/model.bin"),
            loader: TextLoaderOptions::default(),
            test_fraction: 0.2,
            seed: 42,
            n_threads: 1,
            featurizer: TextFeaturizerOptions::default(),
            trainer: FastTreeOptions {
                n_trees: 50,
                n_leaves: 50,
                min_samples_in_leaf: 20,
                ..FastTreeOptions::default()
            },
            report_dir: None,
        }
    }
}

impl RunConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| Error::config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(Error::config(format!(
                "test_fraction must lie in (0, 1), got {}",
                self.test_fraction
            )));
        }
        self.featurizer.validate()?;
        self.trainer.validate()?;
        Ok(())
    }

    pub fn context(&self) -> TrainingContext {
        TrainingContext::new(self.seed).with_threads(self.n_threads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Parallelism;
    use crate::error::ErrorKind;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.trainer.n_trees, 50);
        assert_eq!(config.trainer.n_leaves, 50);
        assert_eq!(config.trainer.min_samples_in_leaf, 20);
        assert_eq!(config.context().seed(), 42);
        assert_eq!(config.context().parallelism(), Parallelism::Sequential);
    }

    #[test]
    fn test_partial_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"seed": 7, "test_fraction": 0.3, "trainer": {{"n_trees": 5}}}}"#).unwrap();

        let config = RunConfig::from_file(file.path()).unwrap();
        assert_eq!(config.seed, 7);
        assert!((config.test_fraction - 0.3).abs() < 1e-12);
        assert_eq!(config.trainer.n_trees, 5);
        // Nested structs fall back to their own defaults
        assert_eq!(config.trainer.n_leaves, FastTreeOptions::default().n_leaves);
        assert_eq!(config.data_path, PathBuf::from("data/yelp_labelled.txt"));
    }

    #[test]
    fn test_invalid_config() {
        let config = RunConfig {
            test_fraction: 1.0,
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::Config);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert_eq!(RunConfig::from_file(file.path()).unwrap_err().kind(), ErrorKind::Config);

        let missing = RunConfig::from_file(Path::new("/definitely/not/here.json")).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::Io);
    }
}
