// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Training run reports in JSON and Markdown

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::datasets::{LabelDistribution, Record};
use crate::error::{Error, Result};
use crate::metrics::BinaryClassificationMetrics;
use crate::pipeline::SentimentModel;

/// Preview length for sample texts
const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub source: String,
    pub total_records: usize,
    pub train_records: usize,
    pub test_records: usize,
    pub label_distribution: LabelDistribution,
}

/// A test prediction kept for inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionSample {
    pub text_preview: String,
    pub predicted: bool,
    pub actual: bool,
    pub probability: f64,
    pub correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub config: RunConfig,
    pub dataset_info: DatasetInfo,
    pub metrics: BinaryClassificationMetrics,
    /// Vocabulary terms with the highest split gain
    pub top_terms: Vec<(String, f64)>,
    pub predictions_sample: Vec<PredictionSample>,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl TrainingReport {
    pub fn new(
        config: RunConfig,
        dataset_info: DatasetInfo,
        metrics: BinaryClassificationMetrics,
        model: &SentimentModel,
        test: &[Record],
    ) -> Self {
        Self {
            config,
            dataset_info,
            metrics,
            top_terms: model.top_terms(20),
            predictions_sample: sample_predictions(model, test, 10),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Save results to a JSON file
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::config(format!("cannot serialize report: {e}")))?;
        write_creating_parent(path, json.as_bytes())?;
        tracing::info!("Report saved to {}", path.display());
        Ok(())
    }

    /// Render as Markdown
    pub fn to_markdown(&self) -> String {
        let mut report = String::new();

        report.push_str("# Sentiment Model Training Report\n\n");
        report.push_str(&format!(
            "**Generated:** {}\n\n",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        report.push_str(&format!("**Version:** {}\n\n", self.version));

        let info = &self.dataset_info;
        report.push_str("## Dataset\n\n");
        report.push_str(&format!("- **Source:** {}\n", info.source));
        report.push_str(&format!("- **Total Records:** {}\n", info.total_records));
        report.push_str(&format!(
            "- **Split Sizes:** Train={}, Test={}\n",
            info.train_records, info.test_records
        ));
        report.push_str(&format!(
            "- **Labels:** positive={}, negative={}\n\n",
            info.label_distribution.positive, info.label_distribution.negative
        ));

        report.push_str("## Metrics\n\n");
        report.push_str(&format!("```\n{}\n```\n\n", self.metrics.format()));

        if !self.top_terms.is_empty() {
            report.push_str("## Most Informative Terms\n\n");
            report.push_str("| Term | Gain |\n");
            report.push_str("|------|------|\n");
            for (term, gain) in &self.top_terms {
                report.push_str(&format!("| `{}` | {:.4} |\n", term.replace('|', "\\|"), gain));
            }
            report.push('\n');
        }

        if !self.predictions_sample.is_empty() {
            report.push_str("## Sample Predictions\n\n");
            for sample in &self.predictions_sample {
                let mark = if sample.correct { "ok" } else { "MISS" };
                report.push_str(&format!(
                    "- [{}] {} (predicted {}, p={:.3})\n",
                    mark,
                    sample.text_preview,
                    sentiment_name(sample.predicted),
                    sample.probability
                ));
            }
            report.push('\n');
        }

        report.push_str("## Configuration\n\n");
        report.push_str(&format!(
            "```json\n{}\n```\n",
            serde_json::to_string_pretty(&self.config).unwrap_or_default()
        ));

        report
    }

    /// Write `report_<timestamp>.json` and `.md` into `dir`
    pub fn save(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let stamp = self.timestamp.format("%Y%m%d_%H%M%S");
        let json_path = dir.join(format!("report_{stamp}.json"));
        let md_path = dir.join(format!("report_{stamp}.md"));
        self.save_json(&json_path)?;
        write_creating_parent(&md_path, self.to_markdown().as_bytes())?;
        Ok(vec![json_path, md_path])
    }
}

/// Up to `per_kind` correct and `per_kind` wrong predictions, in test order
fn sample_predictions(model: &SentimentModel, test: &[Record], per_kind: usize) -> Vec<PredictionSample> {
    let mut samples = Vec::new();
    let (mut correct_count, mut error_count) = (0, 0);
    for record in test {
        if correct_count >= per_kind && error_count >= per_kind {
            break;
        }
        let (Some(actual), Ok(prediction)) = (record.label, model.apply(&record.text)) else {
            continue;
        };
        let correct = prediction.label == actual;
        let counter = if correct { &mut correct_count } else { &mut error_count };
        if *counter >= per_kind {
            continue;
        }
        *counter += 1;
        samples.push(PredictionSample {
            text_preview: preview(&record.text),
            predicted: prediction.label,
            actual,
            probability: prediction.probability,
            correct,
        });
    }
    samples
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_string();
    }
    text.chars().take(PREVIEW_CHARS).collect::<String>() + "..."
}

pub fn sentiment_name(label: bool) -> &'static str {
    if label {
        "Positive"
    } else {
        "Negative"
    }
}

fn write_creating_parent(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    std::fs::write(path, bytes).map_err(|e| Error::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TrainingContext;
    use crate::datasets::Dataset;
    use crate::evaluation::evaluate;
    use crate::featurizer::TextFeaturizerOptions;
    use crate::gbdt::FastTreeOptions;
    use crate::pipeline::SentimentPipeline;

    fn report() -> TrainingReport {
        let dataset = Dataset::load_synthetic(200, 1);
        let split = dataset.split(0.2, 1).unwrap();
        let options = FastTreeOptions {
            n_trees: 10,
            ..Default::default()
        };
        let model = SentimentPipeline::with_options(TextFeaturizerOptions::default(), options)
            .fit(&split.train, &TrainingContext::new(1))
            .unwrap();
        let metrics = evaluate(&model, &split.test).unwrap();
        let info = DatasetInfo {
            source: "synthetic".to_string(),
            total_records: dataset.len(),
            train_records: split.train.len(),
            test_records: split.test.len(),
            label_distribution: dataset.label_distribution(),
        };
        TrainingReport::new(RunConfig::default(), info, metrics, &model, &split.test)
    }

    #[test]
    fn test_markdown_sections() {
        let markdown = report().to_markdown();
        assert!(markdown.contains("Sentiment Model Training Report"));
        assert!(markdown.contains("## Metrics"));
        assert!(markdown.contains("Train=160, Test=40"));
    }

    #[test]
    fn test_save_writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let report = report();
        let paths = report.save(&dir.path().join("reports")).unwrap();
        assert_eq!(paths.len(), 2);
        for path in &paths {
            assert!(path.exists());
        }
        let json = std::fs::read_to_string(&paths[0]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed["metrics"]["accuracy"].is_number());
        assert!(report.predictions_sample.len() <= 20);
    }

    #[test]
    fn test_preview_truncates() {
        let long = "x".repeat(150);
        assert_eq!(preview(&long).chars().count(), PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
    }
}
