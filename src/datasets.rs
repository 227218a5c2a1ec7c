// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Dataset loading and seeded train/test splitting for sentiment data
//!
//! Input files hold one record per line, `<label><delimiter><text>` by default
//! (or `<text><delimiter><label>` for Yelp-style files).

use std::fs::File;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single piece of text with an optional sentiment label (`true` = positive)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub text: String,
    pub label: Option<bool>,
}

impl Record {
    pub fn labeled(text: impl Into<String>, positive: bool) -> Self {
        Self {
            text: text.into(),
            label: Some(positive),
        }
    }

    pub fn unlabeled(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            label: None,
        }
    }
}

/// Position of the label column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnOrder {
    #[default]
    LabelFirst,
    TextFirst,
}

/// How a delimited text file maps onto records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextLoaderOptions {
    pub has_header: bool,
    pub delimiter: u8,
    pub column_order: ColumnOrder,
}

impl Default for TextLoaderOptions {
    fn default() -> Self {
        Self {
            has_header: false,
            delimiter: b'\t',
            column_order: ColumnOrder::LabelFirst,
        }
    }
}

/// Map a label token to a sentiment value
///
/// Accepts `1/true/positive/pos/yes` and `0/false/negative/neg/no`, case-insensitive.
pub fn parse_label(token: &str) -> Option<bool> {
    match token.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "positive" | "pos" | "yes" => Some(true),
        "0" | "false" | "negative" | "neg" | "no" => Some(false),
        _ => None,
    }
}

/// Label counts of a record set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelDistribution {
    pub positive: usize,
    pub negative: usize,
    pub unlabeled: usize,
}

impl LabelDistribution {
    pub fn total(&self) -> usize {
        self.positive + self.negative + self.unlabeled
    }

    /// Both classes are represented
    pub fn has_both_classes(&self) -> bool {
        self.positive > 0 && self.negative > 0
    }
}

/// Disjoint train/test partition of a dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    pub train: Vec<Record>,
    pub test: Vec<Record>,
}

/// An ordered record set loaded from one source
#[derive(Debug, Clone)]
pub struct Dataset {
    source: Option<PathBuf>,
    records: Vec<Record>,
}

impl Dataset {
    pub fn from_records(records: Vec<Record>) -> Self {
        Self {
            source: None,
            records,
        }
    }

    /// Load a delimited file with default options (tab, label first)
    pub fn load(path: &Path, has_header: bool) -> Result<Self> {
        let options = TextLoaderOptions {
            has_header,
            ..TextLoaderOptions::default()
        };
        Self::load_with(path, &options)
    }

    /// Load a delimited file of `(label, text)` rows
    pub fn load_with(path: &Path, options: &TextLoaderOptions) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(options.has_header)
            .delimiter(options.delimiter)
            .quoting(false)
            .flexible(true)
            .from_reader(file);

        let mut records = Vec::new();
        let mut raw = csv::StringRecord::new();
        loop {
            let line = reader.position().line();
            let more = reader.read_record(&mut raw).map_err(|e| Error::MalformedRow {
                path: path.to_path_buf(),
                line: e.position().map_or(line, |p| p.line()),
                reason: e.to_string(),
            })?;
            if !more {
                break;
            }
            let line = raw.position().map_or(line, |p| p.line());
            let malformed = |reason: String| Error::MalformedRow {
                path: path.to_path_buf(),
                line,
                reason,
            };

            if raw.len() != 2 {
                return Err(malformed(format!("expected 2 columns, found {}", raw.len())));
            }
            let (label_field, text_field) = match options.column_order {
                ColumnOrder::LabelFirst => (&raw[0], &raw[1]),
                ColumnOrder::TextFirst => (&raw[1], &raw[0]),
            };
            let label = parse_label(label_field)
                .ok_or_else(|| malformed(format!("unrecognized label token '{}'", label_field.trim())))?;
            if text_field.trim().is_empty() {
                return Err(malformed("empty text".to_string()));
            }

            records.push(Record::labeled(text_field, label));
        }

        let dataset = Self {
            source: Some(path.to_path_buf()),
            records,
        };
        let dist = dataset.label_distribution();
        tracing::info!(
            "Loaded {} records from {} (positive={}, negative={})",
            dataset.len(),
            path.display(),
            dist.positive,
            dist.negative
        );
        Ok(dataset)
    }

    /// Seeded synthetic restaurant reviews for demos and tests
    pub fn load_synthetic(size: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let positive_phrases = [
            "I love this place",
            "The food was great and fresh",
            "Friendly staff and amazing service",
            "Best pasta I have had in years",
            "Delicious dessert, will come back",
        ];
        let negative_phrases = [
            "This was a horrible meal",
            "The food was cold and bland",
            "Rude waiter and terrible service",
            "Worst steak I have ever eaten",
            "Overpriced and disappointing, never again",
        ];
        let fillers = ["tonight", "for lunch", "with friends", "on a weekday", "downtown"];

        let records = (0..size)
            .map(|_| {
                let positive = rng.gen_bool(0.5);
                let phrases = if positive {
                    &positive_phrases
                } else {
                    &negative_phrases
                };
                let phrase = phrases[rng.gen_range(0..phrases.len())];
                let filler = fillers[rng.gen_range(0..fillers.len())];
                Record::labeled(format!("{phrase} {filler}"), positive)
            })
            .collect();

        Self::from_records(records)
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn label_distribution(&self) -> LabelDistribution {
        label_distribution(&self.records)
    }

    /// Split into disjoint train/test sets covering the whole dataset.
    ///
    /// A seeded shuffle puts exactly `round(len * test_fraction)` records in the
    /// test set; both halves keep the input order. Same seed and input order
    /// always give the same split.
    pub fn split(&self, test_fraction: f64, seed: u64) -> Result<TrainTestSplit> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(Error::config(format!(
                "test fraction must lie in (0, 1), got {test_fraction}"
            )));
        }

        let n = self.records.len();
        let n_test = (n as f64 * test_fraction).round() as usize;
        if n_test == 0 || n_test == n {
            return Err(Error::config(format!(
                "splitting {n} records at {test_fraction} leaves train={} test={n_test}",
                n - n_test
            )));
        }

        let mut order: Vec<usize> = (0..n).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        order.shuffle(&mut rng);

        let mut in_test = vec![false; n];
        for &idx in &order[..n_test] {
            in_test[idx] = true;
        }

        let (test, train): (Vec<_>, Vec<_>) = self
            .records
            .iter()
            .cloned()
            .zip(in_test)
            .partition(|(_, is_test)| *is_test);

        let split = TrainTestSplit {
            train: train.into_iter().map(|(r, _)| r).collect(),
            test: test.into_iter().map(|(r, _)| r).collect(),
        };
        tracing::info!(
            "Split {} records: train={}, test={} (seed {})",
            n,
            split.train.len(),
            split.test.len(),
            seed
        );
        Ok(split)
    }
}

/// Label counts of an arbitrary record slice
pub fn label_distribution(records: &[Record]) -> LabelDistribution {
    let mut dist = LabelDistribution::default();
    for record in records {
        match record.label {
            Some(true) => dist.positive += 1,
            Some(false) => dist.negative += 1,
            None => dist.unlabeled += 1,
        }
    }
    dist
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_parse_label() {
        assert_eq!(parse_label("1"), Some(true));
        assert_eq!(parse_label(" TRUE "), Some(true));
        assert_eq!(parse_label("Positive"), Some(true));
        assert_eq!(parse_label("0"), Some(false));
        assert_eq!(parse_label("neg"), Some(false));
        assert_eq!(parse_label("maybe"), None);
        assert_eq!(parse_label("2"), None);
    }

    #[test]
    fn test_load_label_first() {
        let file = write_file("1\tGreat food\n0\tCold fries, \"rude\" staff\n\n1\tWould return\n");
        let dataset = Dataset::load(file.path(), false).unwrap();

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.records()[0], Record::labeled("Great food", true));
        assert_eq!(dataset.records()[1].text, "Cold fries, \"rude\" staff");
        assert_eq!(dataset.records()[1].label, Some(false));
        assert_eq!(dataset.source(), Some(file.path()));
    }

    #[test]
    fn test_load_text_first_with_header() {
        let file = write_file("text\tlabel\nWow... Loved this place.\t1\nCrust is not good.\t0\n");
        let options = TextLoaderOptions {
            has_header: true,
            column_order: ColumnOrder::TextFirst,
            ..TextLoaderOptions::default()
        };
        let dataset = Dataset::load_with(file.path(), &options).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.records()[0], Record::labeled("Wow... Loved this place.", true));
        assert_eq!(dataset.records()[1], Record::labeled("Crust is not good.", false));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Dataset::load(Path::new("/definitely/not/here.tsv"), false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_load_rejects_bad_rows() {
        let bad_label = write_file("1\tfine\nmaybe\tnot fine\n");
        let err = Dataset::load(bad_label.path(), false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(matches!(err, Error::MalformedRow { line: 2, .. }), "{err}");

        let wrong_columns = write_file("1\tfine\textra\n");
        let err = Dataset::load(wrong_columns.path(), false).unwrap_err();
        assert!(err.to_string().contains("expected 2 columns"));

        let empty_text = write_file("1\t   \n");
        assert!(Dataset::load(empty_text.path(), false).is_err());
    }

    #[test]
    fn test_synthetic_dataset() {
        let dataset = Dataset::load_synthetic(200, 42);
        assert_eq!(dataset.len(), 200);

        let dist = dataset.label_distribution();
        assert_eq!(dist.total(), 200);
        assert_eq!(dist.unlabeled, 0);
        assert!(dist.has_both_classes());

        let again = Dataset::load_synthetic(200, 42);
        assert_eq!(dataset.records(), again.records());
    }

    #[test]
    fn test_split_rejects_bad_fraction() {
        let dataset = Dataset::load_synthetic(10, 1);
        for fraction in [0.0, 1.0, -0.1, 1.5, f64::NAN] {
            let err = dataset.split(fraction, 42).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Config);
        }
    }

    #[test]
    fn test_split_rejects_empty_side() {
        let one = Dataset::from_records(vec![Record::labeled("only review", true)]);
        assert_eq!(one.split(0.2, 42).unwrap_err().kind(), ErrorKind::Config);

        let empty = Dataset::from_records(Vec::new());
        assert_eq!(empty.split(0.5, 42).unwrap_err().kind(), ErrorKind::Config);

        let two = Dataset::from_records(vec![
            Record::labeled("good", true),
            Record::labeled("bad", false),
        ]);
        assert_eq!(two.split(0.9, 42).unwrap_err().kind(), ErrorKind::Config);
        let split = two.split(0.5, 42).unwrap();
        assert_eq!((split.train.len(), split.test.len()), (1, 1));
    }

    #[test]
    fn test_split_reproducible_and_disjoint() {
        let records: Vec<Record> = (0..100)
            .map(|i| Record::labeled(format!("review number {i}"), i % 2 == 0))
            .collect();
        let dataset = Dataset::from_records(records);

        let a = dataset.split(0.3, 7).unwrap();
        let b = dataset.split(0.3, 7).unwrap();
        assert_eq!(a.train, b.train);
        assert_eq!(a.test, b.test);
        assert_eq!(a.train.len() + a.test.len(), 100);
        assert_eq!(a.test.len(), 30);

        for record in &a.test {
            assert!(!a.train.contains(record));
        }

        let c = dataset.split(0.3, 8).unwrap();
        assert_eq!(c.test.len(), 30);
        assert_ne!(a.test, c.test);
    }

    #[test]
    fn test_split_balanced_thousand() {
        let records: Vec<Record> = (0..1000)
            .map(|i| Record::labeled(format!("row {i}"), i < 500))
            .collect();
        let split = Dataset::from_records(records).split(0.2, 42).unwrap();

        assert_eq!(split.train.len(), 800);
        assert_eq!(split.test.len(), 200);
        assert!(label_distribution(&split.train).has_both_classes());
        assert!(label_distribution(&split.test).has_both_classes());
    }
}
