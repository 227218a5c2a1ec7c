// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! End-to-end sentiment CLI: train, evaluate, save, reload and predict
//!
//! Usage:
//!   sentiment
//!   sentiment --data data/yelp_labelled.txt --text-first --seed 7
//!   sentiment --synthetic 1000 --no-interactive

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sentiment_pipeline::datasets::ColumnOrder;
use sentiment_pipeline::report::{sentiment_name, DatasetInfo};
use sentiment_pipeline::{
    evaluate, persist, Dataset, Prediction, Predictor, RunConfig, SentimentPipeline, TrainingReport,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sentiment")]
#[command(about = "Train and evaluate a binary sentiment classifier")]
#[command(version)]
struct Args {
    /// JSON run configuration; flags below override its fields
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Labeled dataset file
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Where to write the fitted model
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Use N generated reviews instead of a dataset file
    #[arg(long, value_name = "N")]
    synthetic: Option<usize>,

    /// Dataset rows are `<text><TAB><label>`
    #[arg(long)]
    text_first: bool,

    /// Dataset has a header row
    #[arg(long)]
    header: bool,

    /// Random seed for reproducibility
    #[arg(short, long)]
    seed: Option<u64>,

    /// Fraction of records held out for evaluation
    #[arg(long)]
    test_fraction: Option<f64>,

    /// Training threads (0 = all cores)
    #[arg(long)]
    threads: Option<usize>,

    /// Number of boosted trees
    #[arg(long)]
    trees: Option<usize>,

    /// Maximum leaves per tree
    #[arg(long)]
    leaves: Option<usize>,

    /// Minimum training rows per leaf
    #[arg(long)]
    min_samples: Option<usize>,

    /// Write JSON and Markdown reports into this directory
    #[arg(long)]
    report_dir: Option<PathBuf>,

    /// Skip the interactive prediction loop
    #[arg(long)]
    no_interactive: bool,
}

impl Args {
    fn into_config(self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_file(path)
                .with_context(|| format!("failed to read config {}", path.display()))?,
            None => RunConfig::default(),
        };

        if let Some(data) = self.data {
            config.data_path = data;
        }
        if let Some(model) = self.model {
            config.model_path = model;
        }
        if self.text_first {
            config.loader.column_order = ColumnOrder::TextFirst;
        }
        if self.header {
            config.loader.has_header = true;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(fraction) = self.test_fraction {
            config.test_fraction = fraction;
        }
        if let Some(threads) = self.threads {
            config.n_threads = threads;
        }
        if let Some(trees) = self.trees {
            config.trainer.n_trees = trees;
        }
        if let Some(leaves) = self.leaves {
            config.trainer.n_leaves = leaves;
        }
        if let Some(min_samples) = self.min_samples {
            config.trainer.min_samples_in_leaf = min_samples;
        }
        if self.report_dir.is_some() {
            config.report_dir = self.report_dir;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Ends the interactive loop when read verbatim
const EXIT_LINE: &str = "exit";

/// Only an exact `exit` line quits; a CRLF line ending is tolerated
fn is_exit_line(line: &str) -> bool {
    line.strip_suffix('\r').unwrap_or(line) == EXIT_LINE
}

fn print_prediction(text: &str, prediction: &Prediction) {
    println!(
        "Sentiment: {} | Prediction: {} | Probability: {:.4}",
        text,
        sentiment_name(prediction.label),
        prediction.probability
    );
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let synthetic = args.synthetic;
    let interactive = !args.no_interactive;
    let config = args.into_config()?;
    let ctx = config.context();

    let dataset = match synthetic {
        Some(n) => {
            tracing::info!("Generating {} synthetic reviews (seed {})", n, config.seed);
            Dataset::load_synthetic(n, config.seed)
        }
        None => Dataset::load_with(&config.data_path, &config.loader)
            .with_context(|| format!("failed to load dataset {}", config.data_path.display()))?,
    };
    let split = dataset.split(config.test_fraction, config.seed)?;

    println!("\n{}", "=".repeat(60));
    println!("TRAINING");
    println!("{}", "=".repeat(60));
    let pipeline = SentimentPipeline::with_options(config.featurizer.clone(), config.trainer.clone());
    let model = pipeline.fit(&split.train, &ctx).context("training failed")?;

    let metrics = evaluate(&model, &split.test).context("evaluation failed")?;
    println!("\n{}", metrics.format());

    if let Some(dir) = &config.report_dir {
        let info = DatasetInfo {
            source: match synthetic {
                Some(_) => "synthetic".to_string(),
                None => config.data_path.display().to_string(),
            },
            total_records: dataset.len(),
            train_records: split.train.len(),
            test_records: split.test.len(),
            label_distribution: dataset.label_distribution(),
        };
        let report = TrainingReport::new(config.clone(), info, metrics, &model, &split.test);
        for path in report.save(dir)? {
            println!("Report saved to: {}", path.display());
        }
    }

    persist::save(&model, &config.model_path)
        .with_context(|| format!("failed to save model to {}", config.model_path.display()))?;
    println!("Model saved to: {}", config.model_path.display());

    println!("\n{}", "=".repeat(60));
    println!("SINGLE PREDICTION");
    println!("{}", "=".repeat(60));
    let predictor = Predictor::new(model);
    let text = "This was a very bad steak";
    print_prediction(text, &predictor.predict_one(text)?);

    println!("\n{}", "=".repeat(60));
    println!("BATCH PREDICTION (reloaded model)");
    println!("{}", "=".repeat(60));
    let reloaded = Predictor::load(&config.model_path)
        .with_context(|| format!("failed to reload model from {}", config.model_path.display()))?;
    let texts = ["This was a horrible meal", "I love this spaghetti."];
    for (text, prediction) in texts.iter().zip(reloaded.predict_batch(&texts)?) {
        print_prediction(text, &prediction);
    }

    if interactive {
        println!("\nType a review and press enter (a line reading exactly '{EXIT_LINE}' quits, blank lines are ignored):");
        let stdin = std::io::stdin();
        let mut lines = stdin.lock().lines();
        loop {
            print!("> ");
            std::io::stdout().flush()?;
            let Some(line) = lines.next() else {
                break;
            };
            let line = line?;
            if is_exit_line(&line) {
                break;
            }
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            print_prediction(text, &reloaded.predict_one(text)?);
        }
    }

    println!("\nDone.");
    Ok(())
}
