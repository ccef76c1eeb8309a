//! End-to-end integration tests for the accumulation workflow
//!
//! These tests drive the full pipeline through real files: model JSON,
//! JSON-Lines feature / weight / selection archives, the corpus loop, and
//! the serialized accumulator sink in both output formats.

use std::fs;
use std::path::Path;

use assert_approx_eq::assert_approx_eq;
use rand::prelude::*;
use rand_distr::StandardNormal;

use gmm_acc_stats::{
    archive, log_sum_exp, softmax_in_place, AccumDiagGmm, AccumulationDriver, DiagGmm,
    OutputFormat, SequentialFeatureReader, UpdateFlags,
};

fn write_lines(path: &Path, lines: &[String]) {
    let mut body = lines.join("\n");
    body.push('\n');
    fs::write(path, body).unwrap();
}

fn two_comp_model_json() -> String {
    r#"{"format": 1, "weights": [0.5, 0.5], "means": [[0.0], [10.0]], "vars": [[1.0], [1.0]]}"#
        .to_string()
}

/// Full pipeline: model and archives on disk, corpus loop, sink round-trip.
#[test]
fn test_end_to_end_accumulation() {
    let dir = tempfile::tempdir().unwrap();
    let model_path = dir.path().join("final.mdl");
    let feats_path = dir.path().join("feats.jsonl");
    let acc_path = dir.path().join("stats.acc");

    fs::write(&model_path, two_comp_model_json()).unwrap();
    write_lines(
        &feats_path,
        &[
            r#"{"key": "utt1", "frames": [[0.0], [0.5]]}"#.to_string(),
            r#"{"key": "utt2", "frames": [[9.5], [10.0], [10.5]]}"#.to_string(),
        ],
    );

    let model = archive::read_model(&model_path).unwrap();
    let mut acc = AccumDiagGmm::new(&model, UpdateFlags::all());
    let corpus = {
        let mut driver = AccumulationDriver::new(&model, &mut acc, None, None);
        let stream = SequentialFeatureReader::open(&feats_path).unwrap();
        driver.run(stream).unwrap()
    };

    assert_eq!(corpus.num_processed, 2);
    assert_eq!(corpus.num_skipped, 0);
    assert_approx_eq!(corpus.total_weight, 5.0, 1e-12);

    // Five unit-weight frames: total occupancy equals total weight, split
    // between the components around each cluster.
    assert_approx_eq!(acc.total_occupancy(), 5.0, 1e-10);
    assert!(acc.occupancy()[0] > 1.9 && acc.occupancy()[0] < 2.1);
    assert!(acc.occupancy()[1] > 2.9 && acc.occupancy()[1] < 3.1);

    for format in [OutputFormat::Binary, OutputFormat::Text] {
        archive::write_accumulator(&acc_path, &acc, format).unwrap();
        let loaded = archive::read_accumulator(&acc_path, format).unwrap();
        assert_approx_eq!(loaded.occupancy()[0], acc.occupancy()[0], 1e-12);
        assert_approx_eq!(loaded.mean_acc()[1][0], acc.mean_acc()[1][0], 1e-12);
        assert_approx_eq!(loaded.var_acc()[1][0], acc.var_acc()[1][0], 1e-12);
    }
}

/// Scenario: per-frame weights [1.0, 0.0, 2.0] over three frames. The
/// zero-weight frame must be fully inert and the utterance weight total 3.0.
#[test]
fn test_weighted_frames_through_archives() {
    let dir = tempfile::tempdir().unwrap();
    let model_path = dir.path().join("final.mdl");
    let feats_path = dir.path().join("feats.jsonl");
    let weights_path = dir.path().join("weights.jsonl");

    fs::write(&model_path, two_comp_model_json()).unwrap();
    write_lines(
        &feats_path,
        &[r#"{"key": "utt1", "frames": [[0.0], [3.0], [0.2]]}"#.to_string()],
    );
    write_lines(
        &weights_path,
        &[r#"{"key": "utt1", "weights": [1.0, 0.0, 2.0]}"#.to_string()],
    );

    let model = archive::read_model(&model_path).unwrap();
    let weights = archive::read_weights_archive(&weights_path).unwrap();

    let mut acc = AccumDiagGmm::new(&model, UpdateFlags::all());
    let corpus = {
        let mut driver = AccumulationDriver::new(&model, &mut acc, Some(&weights), None);
        let stream = SequentialFeatureReader::open(&feats_path).unwrap();
        driver.run(stream).unwrap()
    };

    assert_eq!(corpus.num_processed, 1);
    assert_approx_eq!(corpus.total_weight, 3.0, 1e-12);

    // Hand-computed expectation: frames 0 and 2 only, frame 2 doubled.
    let mut expected = [0.0f64; 2];
    for (x, w) in [(0.0, 1.0), (0.2, 2.0)] {
        let mut posts = model.log_likelihoods(&[x]).unwrap();
        softmax_in_place(&mut posts);
        for c in 0..2 {
            expected[c] += w * posts[c];
        }
    }
    for c in 0..2 {
        assert_approx_eq!(acc.occupancy()[c], expected[c], 1e-10);
    }
}

/// A missing weight entry skips exactly that utterance; the rest of the
/// corpus still accumulates, and the error counter increments once.
#[test]
fn test_missing_weight_entry_skips_one_utterance() {
    let dir = tempfile::tempdir().unwrap();
    let model_path = dir.path().join("final.mdl");
    let feats_path = dir.path().join("feats.jsonl");
    let weights_path = dir.path().join("weights.jsonl");

    fs::write(&model_path, two_comp_model_json()).unwrap();
    write_lines(
        &feats_path,
        &[
            r#"{"key": "covered", "frames": [[0.0]]}"#.to_string(),
            r#"{"key": "uncovered", "frames": [[10.0], [10.0]]}"#.to_string(),
        ],
    );
    write_lines(
        &weights_path,
        &[r#"{"key": "covered", "weights": [1.0]}"#.to_string()],
    );

    let model = archive::read_model(&model_path).unwrap();
    let weights = archive::read_weights_archive(&weights_path).unwrap();

    let mut acc = AccumDiagGmm::new(&model, UpdateFlags::all());
    let corpus = {
        let mut driver = AccumulationDriver::new(&model, &mut acc, Some(&weights), None);
        let stream = SequentialFeatureReader::open(&feats_path).unwrap();
        driver.run(stream).unwrap()
    };

    assert_eq!(corpus.num_processed, 1);
    assert_eq!(corpus.num_skipped, 1);
    // The skipped utterance's frames sit at component 1's mean; none of
    // their mass may leak into the accumulator.
    assert!(acc.occupancy()[1] < 1e-10);
    assert_approx_eq!(acc.total_occupancy(), 1.0, 1e-10);
}

/// Candidate-selection pruning through the archive path agrees with full
/// scoring when the lists contain every component.
#[test]
fn test_gselect_full_lists_match_unpruned_run() {
    let dir = tempfile::tempdir().unwrap();
    let model_path = dir.path().join("final.mdl");
    let feats_path = dir.path().join("feats.jsonl");
    let gselect_path = dir.path().join("gselect.jsonl");

    fs::write(&model_path, two_comp_model_json()).unwrap();
    write_lines(
        &feats_path,
        &[r#"{"key": "utt1", "frames": [[1.0], [4.0], [8.0]]}"#.to_string()],
    );
    write_lines(
        &gselect_path,
        &[r#"{"key": "utt1", "gselect": [[0, 1], [0, 1], [0, 1]]}"#.to_string()],
    );

    let model = archive::read_model(&model_path).unwrap();
    let gselect = archive::read_gselect_archive(&gselect_path).unwrap();

    let mut acc_pruned = AccumDiagGmm::new(&model, UpdateFlags::all());
    {
        let mut driver =
            AccumulationDriver::new(&model, &mut acc_pruned, None, Some(&gselect));
        let stream = SequentialFeatureReader::open(&feats_path).unwrap();
        driver.run(stream).unwrap();
    }

    let mut acc_full = AccumDiagGmm::new(&model, UpdateFlags::all());
    {
        let mut driver = AccumulationDriver::new(&model, &mut acc_full, None, None);
        let stream = SequentialFeatureReader::open(&feats_path).unwrap();
        driver.run(stream).unwrap();
    }

    for c in 0..2 {
        assert_approx_eq!(acc_pruned.occupancy()[c], acc_full.occupancy()[c], 1e-10);
        assert_approx_eq!(acc_pruned.mean_acc()[c][0], acc_full.mean_acc()[c][0], 1e-10);
        assert_approx_eq!(acc_pruned.var_acc()[c][0], acc_full.var_acc()[c][0], 1e-10);
    }
}

/// With the variance flag excluded, the variance buffer stays empty for an
/// entire run regardless of data magnitude.
#[test]
fn test_variance_buffer_absent_without_flag() {
    let model = DiagGmm::new(
        vec![0.3, 0.7],
        vec![vec![0.0, 0.0], vec![100.0, -100.0]],
        vec![vec![1.0, 1.0], vec![50.0, 50.0]],
    )
    .unwrap();

    let mut acc = AccumDiagGmm::new(&model, "wm".parse().unwrap());
    let mut driver = AccumulationDriver::new(&model, &mut acc, None, None);
    driver
        .process_utterance(
            "utt1",
            &[vec![1e8, -1e8], vec![0.0, 0.0], vec![-3.0, 97.0]],
        )
        .unwrap();

    assert!(acc.var_acc().is_empty());
    assert!(acc.total_occupancy() > 0.0);
}

/// Posterior normalization holds for randomly generated high-dimensional
/// frames whose raw likelihoods underflow double precision.
#[test]
fn test_posteriors_sum_to_one_on_random_data() {
    let dim = 40;
    let num_comps = 8;
    let mut rng = StdRng::seed_from_u64(42);

    let weights = vec![1.0 / num_comps as f64; num_comps];
    let means: Vec<Vec<f64>> = (0..num_comps)
        .map(|_| (0..dim).map(|_| 10.0 * rng.sample::<f64, _>(StandardNormal)).collect())
        .collect();
    let vars: Vec<Vec<f64>> = (0..num_comps)
        .map(|_| (0..dim).map(|_| 0.1 + rng.gen::<f64>()).collect())
        .collect();
    let model = DiagGmm::new(weights, means, vars).unwrap();

    for _ in 0..50 {
        let frame: Vec<f64> = (0..dim)
            .map(|_| 20.0 * rng.sample::<f64, _>(StandardNormal))
            .collect();
        let loglikes = model.log_likelihoods(&frame).unwrap();
        let total = log_sum_exp(&loglikes);
        assert!(total.is_finite());

        let mut posts = loglikes;
        softmax_in_place(&mut posts);
        let sum: f64 = posts.iter().sum();
        assert_approx_eq!(sum, 1.0, 1e-6);
    }
}

/// Per-utterance private accumulators merged at the end equal one shared
/// accumulator over the same stream.
#[test]
fn test_merged_private_accumulators_match_shared() {
    let model = DiagGmm::new(
        vec![0.5, 0.5],
        vec![vec![0.0], vec![10.0]],
        vec![vec![1.0], vec![1.0]],
    )
    .unwrap();
    let utterances: Vec<(&str, Vec<Vec<f64>>)> = vec![
        ("utt1", vec![vec![0.2], vec![1.1]]),
        ("utt2", vec![vec![9.1], vec![10.4], vec![5.5]]),
        ("utt3", vec![vec![-0.7]]),
    ];

    let mut shared = AccumDiagGmm::new(&model, UpdateFlags::all());
    {
        let mut driver = AccumulationDriver::new(&model, &mut shared, None, None);
        for (key, frames) in &utterances {
            driver.process_utterance(key, frames).unwrap();
        }
    }

    let mut merged = AccumDiagGmm::new(&model, UpdateFlags::all());
    for (key, frames) in &utterances {
        let mut private = AccumDiagGmm::new(&model, UpdateFlags::all());
        let mut driver = AccumulationDriver::new(&model, &mut private, None, None);
        driver.process_utterance(key, frames).unwrap();
        merged.merge(&private).unwrap();
    }

    for c in 0..2 {
        assert_approx_eq!(merged.occupancy()[c], shared.occupancy()[c], 1e-10);
        assert_approx_eq!(merged.mean_acc()[c][0], shared.mean_acc()[c][0], 1e-10);
        assert_approx_eq!(merged.var_acc()[c][0], shared.var_acc()[c][0], 1e-10);
    }
}

/// An empty feature archive is a clean zero-utterance run: no error, no
/// output statistics, undefined corpus average.
#[test]
fn test_empty_corpus_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let feats_path = dir.path().join("feats.jsonl");
    fs::write(&feats_path, "").unwrap();

    let model = DiagGmm::new(vec![1.0], vec![vec![0.0]], vec![vec![1.0]]).unwrap();
    let mut acc = AccumDiagGmm::new(&model, UpdateFlags::all());
    let corpus = {
        let mut driver = AccumulationDriver::new(&model, &mut acc, None, None);
        let stream = SequentialFeatureReader::open(&feats_path).unwrap();
        driver.run(stream).unwrap()
    };

    assert_eq!(corpus.num_processed, 0);
    assert_eq!(corpus.num_skipped, 0);
    assert!(corpus.avg_log_like().is_none());
    assert_approx_eq!(acc.total_occupancy(), 0.0, 1e-15);
}

/// A malformed feature line aborts the run as a fatal error.
#[test]
fn test_malformed_feature_stream_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let feats_path = dir.path().join("feats.jsonl");
    write_lines(
        &feats_path,
        &[
            r#"{"key": "utt1", "frames": [[0.0]]}"#.to_string(),
            "garbage".to_string(),
        ],
    );

    let model = DiagGmm::new(vec![1.0], vec![vec![0.0]], vec![vec![1.0]]).unwrap();
    let mut acc = AccumDiagGmm::new(&model, UpdateFlags::all());
    let mut driver = AccumulationDriver::new(&model, &mut acc, None, None);
    let stream = SequentialFeatureReader::open(&feats_path).unwrap();
    assert!(driver.run(stream).is_err());
}
