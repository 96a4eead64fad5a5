//! End-to-end tests for the evaluation pipeline.
//!
//! These run the full split → preprocess → train → predict → score cycle on
//! synthetic data through the public API only.

use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::io::Write;

use tabula_ml::config::load_config;
use tabula_ml::data::{Dataset, SplitIndices, Value, load_delimited, split};
use tabula_ml::error::PipelineError;
use tabula_ml::eval::score_predictions;
use tabula_ml::model::{Algorithm, ModelConfig};
use tabula_ml::resample::ResamplePlan;
use tabula_ml::{Pipeline, PipelineConfig};

const SITES: [&str; 3] = ["Biscoe", "Dream", "Torgersen"];

/// 100 records, 3 balanced classes. With `informative` the features track the
/// class; otherwise the labels are a fixed permutation unrelated to the features.
fn synthetic(informative: bool) -> Dataset {
    let rows = (0..100usize)
        .map(|i| {
            let class = if informative { i % 3 } else { (i * 37) % 100 % 3 };
            let spread = ((i * 7919) % 101) as f64 / 101.0;
            let (x1, x2, site) = if informative {
                (
                    class as f64 * 4.0 + spread,
                    class as f64 * -2.0 + (i as f64).sin() * 0.5,
                    SITES[class],
                )
            } else {
                (spread * 10.0, (i as f64 * 0.61).cos(), SITES[i % 3])
            };
            vec![
                Value::from(x1),
                Value::from(x2),
                Value::from(site),
                Value::from(format!("class{class}")),
            ]
        })
        .collect();
    Dataset::new(
        vec!["x1".into(), "x2".into(), "site".into(), "label".into()],
        rows,
    )
    .unwrap()
}

fn pipeline() -> Pipeline {
    Pipeline::new("label", &["x1", "x2"], &["site"])
}

fn majority() -> ModelConfig {
    ModelConfig::new("majority", Algorithm::MajorityClass)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[test]
fn split_of_100_records_is_80_20() {
    let ds = synthetic(true);
    let s = split(&ds, 0.8, 42).unwrap();
    assert_eq!(s.training.len(), 80);
    assert_eq!(s.testing.len(), 20);

    let result = pipeline().run_once(&majority(), &ds, 42).unwrap();
    assert_eq!(result.predictions.len(), 20);
    assert_eq!(result.confusion.total(), 20);
}

#[test]
fn majority_class_on_shuffled_labels_is_near_chance() {
    let ds = synthetic(false);
    let p = pipeline();
    let base = majority();
    let accuracies: Vec<f64> = p
        .repeat_evaluation(&base, &ds, 0.8, 200, 7)
        .iter()
        .map(|r| r.unwrap().accuracy())
        .collect();
    let mean_accuracy = mean(&accuracies);
    assert!(
        (mean_accuracy - 1.0 / 3.0).abs() < 0.15,
        "mean accuracy {mean_accuracy}"
    );
    assert!(accuracies.iter().all(|a| (0.0..=1.0).contains(a)));
}

#[test]
fn memorizing_the_testing_records_is_perfect_but_held_out_is_chance() {
    let ds = synthetic(false);
    let p = pipeline();
    let memorizer = ModelConfig::new("1nn", Algorithm::Knn { k: 1 });

    // Leaky: the "testing" records are the training records themselves.
    let s = split(&ds, 0.8, 3).unwrap();
    let run = p.fit(&memorizer, &s.training, 3).unwrap();
    let predicted = run.predict(&s.training).unwrap();
    let truth = s.training.labels("label").unwrap();
    let leaky = score_predictions("1nn", &s.training.ids(), &truth, &predicted).unwrap();
    assert_eq!(leaky.accuracy(), 1.0);

    // Leak-free: held-out records with labels unrelated to features.
    let held_out: Vec<f64> = p
        .repeat_evaluation(&memorizer, &ds, 0.8, 100, 3)
        .iter()
        .map(|r| r.unwrap().accuracy())
        .collect();
    assert!(mean(&held_out) < 0.5, "held-out accuracy {}", mean(&held_out));
}

#[test]
fn informative_features_are_learned() {
    let ds = synthetic(true);
    let forest = ModelConfig::new(
        "rf",
        Algorithm::RandomForest {
            n_trees: 25,
            max_depth: None,
        },
    );
    let result = pipeline().run_once(&forest, &ds, 1).unwrap();
    assert_eq!(result.accuracy(), 1.0);
    assert_eq!(result.kappa(), 1.0);
}

#[test]
fn same_seed_same_results() {
    let ds = synthetic(true);
    let p = pipeline();
    let knn = ModelConfig::new("knn", Algorithm::Knn { k: 5 });

    let a: Vec<_> = p
        .repeat_evaluation(&knn, &ds, 0.7, 10, 99)
        .iter()
        .collect::<Result<_, _>>()
        .unwrap();
    let b: Vec<_> = p
        .repeat_evaluation(&knn, &ds, 0.7, 10, 99)
        .iter()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(a, b);

    let c: Vec<_> = p
        .repeat_evaluation(&knn, &ds, 0.7, 10, 100)
        .iter()
        .collect::<Result<_, _>>()
        .unwrap();
    let ids = |runs: &[tabula_ml::EvaluationResult]| -> Vec<Vec<usize>> {
        runs.iter()
            .map(|r| r.predictions.iter().map(|p| p.id).collect())
            .collect()
    };
    assert_ne!(ids(&a), ids(&c));
}

#[test]
fn running_mean_converges_to_large_sample_estimate() {
    let ds = synthetic(false);
    let p = pipeline();
    let tree = ModelConfig::new(
        "stump",
        Algorithm::DecisionTree { max_depth: Some(2) },
    );

    let small = p
        .repeat_evaluation(&tree, &ds, 0.8, 1000, 2024)
        .summarize()
        .unwrap();
    let large = p
        .repeat_evaluation(&tree, &ds, 0.8, 4000, 4048)
        .summarize()
        .unwrap();
    assert_eq!(small.resamples, 1000);
    let diff = (small.mean_accuracy() - large.mean_accuracy()).abs();
    assert!(diff < 0.02, "running mean differs by {diff}");
}

#[test]
fn compare_ranks_configurations_on_shared_resamples() {
    let ds = synthetic(true);
    let models = vec![
        majority(),
        ModelConfig::new("knn", Algorithm::Knn { k: 3 }),
        ModelConfig::new(
            "gb",
            Algorithm::GradientBoosting {
                n_estimators: 20,
                learning_rate: 0.3,
                max_depth: 2,
            },
        ),
    ];
    let plan = ResamplePlan::VFold { folds: 5 };
    let comparison = pipeline().compare_parallel(&models, &ds, &plan, 8).unwrap();

    assert_eq!(comparison.summaries.len(), 3);
    assert_eq!(comparison.summaries.last().unwrap().config_id, "majority");
    for summary in &comparison.summaries {
        assert_eq!(summary.resamples, 5);
    }
    assert!(comparison.best().unwrap().mean_accuracy() > 0.9);

    let json = serde_json::to_value(&comparison).unwrap();
    assert_eq!(json["plan"]["type"], "v_fold");
}

#[test]
fn bootstrap_comparison_assesses_out_of_bag_records() {
    let ds = synthetic(true);
    let p = pipeline();
    let plan = ResamplePlan::Bootstrap { iterations: 6 };
    let knn = ModelConfig::new("knn", Algorithm::Knn { k: 3 });

    let comparison = p
        .compare(&[majority(), knn.clone()], &ds, &plan, 11)
        .unwrap();
    assert_eq!(comparison.summaries.len(), 2);
    for summary in &comparison.summaries {
        assert_eq!(summary.resamples, 6);
    }
    assert_eq!(comparison.best().unwrap().config_id, "knn");

    let resamples = plan.draw(&ds, None, 11).unwrap();
    let results = p.evaluate_resamples(&knn, &ds, &resamples, 11).unwrap();
    assert_eq!(results.len(), 6);
    for (indices, result) in resamples.iter().zip(&results) {
        let training = ds.subset(&indices.analysis).ids();
        assert_eq!(training.len(), 100);
        let distinct: HashSet<_> = training.iter().copied().collect();
        assert!(distinct.len() < 100, "bootstrap draw without repeats");

        let assessed: Vec<_> = result.predictions.iter().map(|p| p.id).collect();
        assert_eq!(assessed, ds.subset(&indices.assessment).ids());
        assert!(assessed.iter().all(|id| !distinct.contains(id)));
    }
}

#[test]
fn config_file_drives_the_run() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[split]
proportion = 0.75
stratify = true

[resampling]
iterations = 4
"#
    )
    .unwrap();

    let config = load_config(Some(file.path()), None).unwrap();
    let ds = synthetic(true);
    let p = pipeline().with_config(config.clone());
    let plan = ResamplePlan::monte_carlo(&config.split, &config.resampling);
    let comparison = p.compare(&[majority()], &ds, &plan, config.split.seed).unwrap();
    let summary = comparison.best().unwrap();
    assert_eq!(summary.resamples, 4);

    // Stratified 75% of 34/33/33 keeps 26 + 25 + 25 for training.
    let result = p.run_once(&majority(), &ds, config.split.seed).unwrap();
    assert_eq!(result.predictions.len(), 24);
}

#[test]
fn delimited_file_round_trip_through_pipeline() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "bill,island,species").unwrap();
    for i in 0..30 {
        let (bill, island, species) = if i % 2 == 0 {
            (46.0 + (i % 5) as f64 * 0.4, "Biscoe", "Gentoo")
        } else {
            (38.0 + (i % 5) as f64 * 0.4, "Dream", "Adelie")
        };
        writeln!(file, "{bill},\"{island}\",{species}").unwrap();
    }
    writeln!(file, "NA,Dream,Adelie").unwrap();

    let ds = load_delimited(file.path(), ',').unwrap();
    assert_eq!(ds.len(), 31);
    let p = Pipeline::new("species", &["bill"], &["island"]);
    let knn = ModelConfig::new("knn", Algorithm::Knn { k: 3 });
    let result = p.run_once(&knn, &ds, 5).unwrap();
    assert_eq!(result.accuracy(), 1.0);

    let cleaned = ds.drop_missing(&["bill"]).unwrap();
    assert_eq!(cleaned.len(), 30);
}

#[test]
fn unseen_category_is_routed_or_rejected_per_policy() {
    let mut rows: Vec<Vec<Value>> = (0..12)
        .map(|i| {
            vec![
                Value::from(i as f64),
                Value::from(SITES[i % 2]),
                Value::from(if i % 2 == 0 { "a" } else { "b" }),
            ]
        })
        .collect();
    rows.push(vec![Value::from(5.5), Value::from("Anvers"), Value::from("a")]);
    let ds = Dataset::new(
        vec!["x1".into(), "site".into(), "label".into()],
        rows,
    )
    .unwrap();
    let indices = SplitIndices {
        analysis: (0..10).collect(),
        assessment: vec![10, 11, 12],
    };
    let base = majority();

    let lenient = Pipeline::new("label", &["x1"], &["site"]);
    let result = lenient.fit_and_evaluate(&base, &ds, &indices, 0).unwrap();
    assert_eq!(result.predictions.len(), 3);

    let mut config = PipelineConfig::default();
    config.preprocess.unseen_category = tabula_ml::preprocess::UnseenCategoryPolicy::Reject;
    let strict = lenient.clone().with_config(config);
    let err = strict.fit_and_evaluate(&base, &ds, &indices, 0).unwrap_err();
    match err {
        PipelineError::UnseenCategory { column, value } => {
            assert_eq!(column, "site");
            assert_eq!(value, "Anvers");
        }
        other => panic!("expected UnseenCategory, got {other:?}"),
    }
}
