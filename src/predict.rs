// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Score texts with a saved sentiment model
//!
//! Texts come from the command line, or one per line from stdin when none
//! are given.

use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sentiment_pipeline::report::sentiment_name;
use sentiment_pipeline::Predictor;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sentiment-predict")]
#[command(about = "Predict sentiment with a saved model")]
#[command(version)]
struct Args {
    /// Saved model file
    #[arg(short, long, default_value = "data/model.bin")]
    model: PathBuf,

    /// Emit one JSON object per line
    #[arg(long)]
    json: bool,

    /// Texts to score (read from stdin when empty)
    texts: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let predictor = Predictor::load(&args.model)
        .with_context(|| format!("failed to load model {}", args.model.display()))?;

    let texts = if args.texts.is_empty() {
        let mut texts = Vec::new();
        for line in std::io::stdin().lock().lines() {
            let line = line.context("failed to read stdin")?;
            let line = line.trim();
            if !line.is_empty() {
                texts.push(line.to_string());
            }
        }
        texts
    } else {
        args.texts
    };

    let predictions = predictor.predict_batch(&texts)?;
    for (text, prediction) in texts.iter().zip(&predictions) {
        if args.json {
            let line = serde_json::json!({
                "text": text,
                "label": prediction.label,
                "sentiment": sentiment_name(prediction.label),
                "probability": prediction.probability,
                "score": prediction.score,
            });
            println!("{line}");
        } else {
            println!(
                "{}\t{:.4}\t{}",
                sentiment_name(prediction.label),
                prediction.probability,
                text
            );
        }
    }

    Ok(())
}
