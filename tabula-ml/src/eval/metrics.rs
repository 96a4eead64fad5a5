//! Classification metrics and the per-split evaluation result.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::agreement::kappa;
use crate::data::dataset::{Dataset, RecordId};
use crate::error::PipelineError;
use crate::model::TrainedModel;
use crate::preprocess::FeatureMatrix;

pub const ACCURACY: &str = "accuracy";
pub const KAPPA: &str = "kappa";
pub const MACRO_PRECISION: &str = "macro_precision";
pub const MACRO_RECALL: &str = "macro_recall";
pub const MACRO_F1: &str = "macro_f1";

/// Tally of (true label, predicted label) pairs.
///
/// `counts[i][j]` is the number of records whose true label is `labels[i]` and
/// whose predicted label is `labels[j]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub labels: Vec<String>,
    pub counts: Vec<Vec<usize>>,
}

/// One non-zero cell of a confusion matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionCell {
    pub truth: String,
    pub predicted: String,
    pub count: usize,
}

impl ConfusionMatrix {
    /// Tally aligned truth/prediction pairs. Labels are the sorted union of both.
    pub fn from_pairs(truth: &[String], predicted: &[String]) -> Self {
        let labels: Vec<String> = truth
            .iter()
            .chain(predicted)
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let pos = |l: &String| labels.binary_search(l).unwrap_or_default();
        let mut counts = vec![vec![0; labels.len()]; labels.len()];
        for (t, p) in truth.iter().zip(predicted) {
            counts[pos(t)][pos(p)] += 1;
        }
        Self { labels, counts }
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn correct(&self) -> usize {
        (0..self.labels.len()).map(|i| self.counts[i][i]).sum()
    }

    /// Row sums: records per true label.
    pub fn truth_totals(&self) -> Vec<usize> {
        self.counts.iter().map(|row| row.iter().sum()).collect()
    }

    /// Column sums: records per predicted label.
    pub fn predicted_totals(&self) -> Vec<usize> {
        (0..self.labels.len())
            .map(|j| self.counts.iter().map(|row| row[j]).sum())
            .collect()
    }

    pub fn count(&self, truth: &str, predicted: &str) -> usize {
        let find = |l: &str| self.labels.iter().position(|x| x == l);
        match (find(truth), find(predicted)) {
            (Some(i), Some(j)) => self.counts[i][j],
            _ => 0,
        }
    }

    /// Non-zero cells as a flat list.
    pub fn cells(&self) -> Vec<ConfusionCell> {
        let mut cells = Vec::new();
        for (i, row) in self.counts.iter().enumerate() {
            for (j, &count) in row.iter().enumerate() {
                if count > 0 {
                    cells.push(ConfusionCell {
                        truth: self.labels[i].clone(),
                        predicted: self.labels[j].clone(),
                        count,
                    });
                }
            }
        }
        cells
    }

    /// Fraction of correct predictions, 0.0 when empty.
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.correct() as f64 / total as f64
    }

    /// Cohen's kappa computed from the marginals.
    pub fn kappa(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let n = total as f64;
        let expected: f64 = self
            .truth_totals()
            .iter()
            .zip(self.predicted_totals())
            .map(|(&t, p)| (t as f64 / n) * (p as f64 / n))
            .sum();
        kappa(self.accuracy(), expected)
    }

    /// Macro-averaged precision, recall and F1. Undefined ratios count as 0.
    pub fn macro_scores(&self) -> (f64, f64, f64) {
        let k = self.labels.len();
        if k == 0 {
            return (0.0, 0.0, 0.0);
        }
        let truth = self.truth_totals();
        let predicted = self.predicted_totals();
        let ratio = |a: usize, b: usize| if b == 0 { 0.0 } else { a as f64 / b as f64 };

        let (mut p_sum, mut r_sum, mut f_sum) = (0.0, 0.0, 0.0);
        for i in 0..k {
            let tp = self.counts[i][i];
            let precision = ratio(tp, predicted[i]);
            let recall = ratio(tp, truth[i]);
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            p_sum += precision;
            r_sum += recall;
            f_sum += f1;
        }
        let k = k as f64;
        (p_sum / k, r_sum / k, f_sum / k)
    }
}

/// True and predicted label of one held-out record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: RecordId,
    pub truth: String,
    pub predicted: String,
}

/// Metrics for one (configuration, split) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub config_id: String,
    pub metrics: BTreeMap<String, f64>,
    pub confusion: ConfusionMatrix,
    pub predictions: Vec<Prediction>,
}

impl EvaluationResult {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    pub fn accuracy(&self) -> f64 {
        self.metric(ACCURACY).unwrap_or_default()
    }

    pub fn kappa(&self) -> f64 {
        self.metric(KAPPA).unwrap_or_default()
    }
}

/// Score aligned predictions.
pub fn score_predictions(
    config_id: &str,
    ids: &[RecordId],
    truth: &[String],
    predicted: &[String],
) -> Result<EvaluationResult, PipelineError> {
    if truth.is_empty() {
        return Err(PipelineError::invalid_configuration(
            "cannot evaluate on an empty testing set",
        ));
    }
    if truth.len() != predicted.len() || truth.len() != ids.len() {
        return Err(PipelineError::schema(format!(
            "{} ids, {} true labels and {} predictions",
            ids.len(),
            truth.len(),
            predicted.len()
        )));
    }

    let confusion = ConfusionMatrix::from_pairs(truth, predicted);
    let (precision, recall, f1) = confusion.macro_scores();
    let metrics = BTreeMap::from([
        (ACCURACY.to_string(), confusion.accuracy()),
        (KAPPA.to_string(), confusion.kappa()),
        (MACRO_PRECISION.to_string(), precision),
        (MACRO_RECALL.to_string(), recall),
        (MACRO_F1.to_string(), f1),
    ]);
    let predictions = ids
        .iter()
        .zip(truth.iter().zip(predicted))
        .map(|(&id, (t, p))| Prediction {
            id,
            truth: t.clone(),
            predicted: p.clone(),
        })
        .collect();

    Ok(EvaluationResult {
        config_id: config_id.to_string(),
        metrics,
        confusion,
        predictions,
    })
}

/// Evaluate `model` on a preprocessed testing dataset.
///
/// `testing` must contain the model's feature columns and `label_column`.
pub fn evaluate(
    model: &TrainedModel,
    testing: &Dataset,
    label_column: &str,
) -> Result<EvaluationResult, PipelineError> {
    if testing.is_empty() {
        return Err(PipelineError::invalid_configuration(
            "cannot evaluate on an empty testing set",
        ));
    }
    let features = FeatureMatrix::from_dataset(testing, &model.feature_names)?;
    let truth = testing.labels(label_column)?;
    let predicted = model.predict_all(&features)?;
    let result = score_predictions(&model.config_id, &features.ids, &truth, &predicted)?;
    tracing::debug!(
        config_id = %model.config_id,
        rows = testing.len(),
        accuracy = result.accuracy(),
        kappa = result.kappa(),
        "evaluated model"
    );
    Ok(result)
}
