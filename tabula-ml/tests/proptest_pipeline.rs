//! Property-based tests for splitting, preprocessing and scoring using proptest.

use proptest::prelude::*;
use std::collections::HashSet;

use tabula_ml::data::split::{split_indices, vfold};
use tabula_ml::data::{Dataset, NumericSummary, Value};
use tabula_ml::eval::{ConfusionMatrix, score_predictions};
use tabula_ml::preprocess::fit_preprocessor;

fn numeric_dataset(values: &[f64]) -> Dataset {
    Dataset::new(
        vec!["x".into()],
        values.iter().map(|v| vec![Value::from(*v)]).collect(),
    )
    .unwrap()
}

fn labels(raw: &[u8]) -> Vec<String> {
    raw.iter().map(|b| format!("c{}", b % 4)).collect()
}

// --- Split properties ---

proptest! {
    #[test]
    fn split_partitions_every_record(
        n in 2usize..300,
        proportion in 0.01f64..0.99,
        seed in any::<u64>(),
    ) {
        let s = split_indices(n, proportion, seed).unwrap();
        prop_assert_eq!(s.analysis.len() + s.assessment.len(), n);
        prop_assert!(!s.analysis.is_empty());
        prop_assert!(!s.assessment.is_empty());

        let train: HashSet<_> = s.analysis.iter().collect();
        prop_assert!(s.assessment.iter().all(|p| !train.contains(p)));
        let all: HashSet<_> = s.analysis.iter().chain(&s.assessment).copied().collect();
        prop_assert_eq!(all.len(), n);
    }

    #[test]
    fn split_is_a_function_of_its_seed(
        n in 2usize..100,
        proportion in 0.1f64..0.9,
        seed in any::<u64>(),
    ) {
        prop_assert_eq!(
            split_indices(n, proportion, seed).unwrap(),
            split_indices(n, proportion, seed).unwrap()
        );
    }

    #[test]
    fn out_of_range_proportion_is_rejected(
        proportion in prop_oneof![-5.0f64..=0.0, 1.0f64..5.0],
    ) {
        prop_assert!(split_indices(10, proportion, 0).is_err());
    }

    #[test]
    fn vfold_assesses_each_record_exactly_once(
        n in 2usize..120,
        folds in 2usize..12,
        seed in any::<u64>(),
    ) {
        prop_assume!(folds <= n);
        let resamples = vfold(n, folds, seed).unwrap();
        let mut seen = vec![0usize; n];
        for r in &resamples {
            prop_assert_eq!(r.analysis.len() + r.assessment.len(), n);
            for &p in &r.assessment {
                seen[p] += 1;
            }
        }
        prop_assert!(seen.iter().all(|&c| c == 1));
    }
}

// --- Preprocessing properties ---

proptest! {
    #[test]
    fn fitted_training_column_is_standardized(
        values in prop::collection::vec(-1000.0f64..1000.0, 3..60),
    ) {
        let summary = NumericSummary::from_values(&values).unwrap();
        prop_assume!(summary.std_dev.unwrap_or(0.0) > 1.0);

        let ds = numeric_dataset(&values);
        let transform = fit_preprocessor(&ds, &["x"], &[]).unwrap();
        let features = transform.transform_features(&ds).unwrap();
        let column: Vec<f64> = features.rows.iter().map(|r| r[0]).collect();
        let scaled = NumericSummary::from_values(&column).unwrap();
        prop_assert!(scaled.mean.abs() < 1e-9);
        prop_assert!((scaled.std_dev.unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn applying_to_unseen_rows_leaves_statistics_untouched(
        training in prop::collection::vec(-100.0f64..100.0, 2..30),
        unseen in prop::collection::vec(-1e6f64..1e6, 1..30),
    ) {
        let transform = fit_preprocessor(&numeric_dataset(&training), &["x"], &[]).unwrap();
        let before = transform.clone();
        transform.apply(&numeric_dataset(&unseen)).unwrap();
        prop_assert_eq!(transform, before);
    }
}

// --- Scoring properties ---

proptest! {
    #[test]
    fn accuracy_is_bounded_and_confusion_totals_match(
        pairs in prop::collection::vec((any::<u8>(), any::<u8>()), 1..80),
    ) {
        let truth = labels(&pairs.iter().map(|p| p.0).collect::<Vec<_>>());
        let predicted = labels(&pairs.iter().map(|p| p.1).collect::<Vec<_>>());
        let ids: Vec<usize> = (0..truth.len()).collect();
        let result = score_predictions("m", &ids, &truth, &predicted).unwrap();

        prop_assert!((0.0..=1.0).contains(&result.accuracy()));
        prop_assert!(result.kappa() <= 1.0 + 1e-12);

        let cm = &result.confusion;
        prop_assert_eq!(cm.truth_totals().iter().sum::<usize>(), truth.len());
        prop_assert_eq!(cm.predicted_totals().iter().sum::<usize>(), truth.len());
        prop_assert_eq!(cm.total(), truth.len());
    }

    #[test]
    fn perfect_predictions_score_one(raw in prop::collection::vec(any::<u8>(), 1..50)) {
        let truth = labels(&raw);
        let cm = ConfusionMatrix::from_pairs(&truth, &truth);
        prop_assert_eq!(cm.accuracy(), 1.0);
        prop_assert_eq!(cm.kappa(), 1.0);
    }
}
