// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Train → save → load → apply, end to end through the public API

use std::io::Write;

use sentiment_pipeline::{
    evaluate, persist, ColumnOrder, Dataset, ErrorKind, FastTreeOptions, Predictor, Record,
    SentimentPipeline, TextFeaturizerOptions, TextLoaderOptions, TrainingContext,
};

fn options() -> FastTreeOptions {
    FastTreeOptions {
        n_trees: 30,
        n_leaves: 8,
        min_samples_in_leaf: 5,
        ..Default::default()
    }
}

#[test]
fn test_saved_model_behaves_identically() {
    let dataset = Dataset::load_synthetic(500, 11);
    let split = dataset.split(0.2, 11).unwrap();
    let fitted = SentimentPipeline::with_options(TextFeaturizerOptions::default(), options())
        .fit(&split.train, &TrainingContext::new(11))
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");
    persist::save(&fitted, &path).unwrap();
    let predictor = Predictor::load(&path).unwrap();

    let mut texts: Vec<String> = split.test.iter().map(|r| r.text.clone()).collect();
    texts.push("words the model has never seen".to_string());
    texts.push("".to_string());

    let reloaded = predictor.predict_batch(&texts).unwrap();
    for (text, after) in texts.iter().zip(&reloaded) {
        let before = fitted.apply(text).unwrap();
        assert_eq!(before.label, after.label, "{text}");
        assert_eq!(before.probability.to_bits(), after.probability.to_bits(), "{text}");
        assert_eq!(before.score.to_bits(), after.score.to_bits(), "{text}");
    }

    let before = evaluate(&fitted, &split.test).unwrap();
    let after = evaluate(predictor.model(), &split.test).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_split_scenario_and_training_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for i in 0..1000 {
        if i % 2 == 0 {
            writeln!(file, "1\tThe service was wonderful and the food delicious {i}").unwrap();
        } else {
            writeln!(file, "0\tThe service was slow and the food bland {i}").unwrap();
        }
    }
    file.flush().unwrap();

    let loader = TextLoaderOptions {
        column_order: ColumnOrder::LabelFirst,
        ..Default::default()
    };
    let dataset = Dataset::load_with(file.path(), &loader).unwrap();
    assert_eq!(dataset.len(), 1000);

    let split = dataset.split(0.2, 42).unwrap();
    assert_eq!(split.train.len(), 800);
    assert_eq!(split.test.len(), 200);
    let again = dataset.split(0.2, 42).unwrap();
    assert_eq!(split, again);

    for part in [&split.train, &split.test] {
        assert!(part.iter().any(|r| r.label == Some(true)));
        assert!(part.iter().any(|r| r.label == Some(false)));
    }

    let fitted = SentimentPipeline::with_options(TextFeaturizerOptions::default(), options())
        .fit(&split.train, &TrainingContext::new(42).with_threads(2))
        .unwrap();
    let metrics = evaluate(&fitted, &split.test).unwrap();
    assert!(metrics.accuracy > 0.95);
}

#[test]
fn test_corrupted_file_is_a_format_error() {
    let train = vec![
        Record::labeled("great food", true),
        Record::labeled("terrible food", false),
    ];
    let fitted = SentimentPipeline::with_options(
        TextFeaturizerOptions::default(),
        FastTreeOptions {
            n_trees: 5,
            min_samples_in_leaf: 1,
            ..Default::default()
        },
    )
    .fit(&train, &TrainingContext::default())
    .unwrap();

    let mut bytes = persist::to_bytes(&fitted).unwrap();
    bytes.truncate(bytes.len() / 2);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.bin");
    std::fs::write(&path, &bytes).unwrap();

    let err = Predictor::load(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
}
