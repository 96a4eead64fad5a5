//! Resampling plans and metric summaries across resamples.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::{ResamplingConfig, SplitConfig};
use crate::data::dataset::Dataset;
use crate::data::split::{
    SplitIndices, bootstrap, split_indices, stratified_indices, vfold,
};
use crate::error::PipelineError;
use crate::eval::metrics::{ACCURACY, EvaluationResult};
use crate::model::ModelConfig;
use crate::pipeline::Pipeline;
use crate::seed::SeedSequence;

/// How to draw the resamples a configuration is evaluated on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResamplePlan {
    /// Repeated random subsampling.
    MonteCarlo { proportion: f64, iterations: usize },
    VFold { folds: usize },
    /// Draws with replacement, assessed on the out-of-bag records.
    Bootstrap { iterations: usize },
}

impl ResamplePlan {
    pub fn monte_carlo(split: &SplitConfig, resampling: &ResamplingConfig) -> Self {
        Self::MonteCarlo {
            proportion: split.proportion,
            iterations: resampling.iterations,
        }
    }

    pub fn vfold(resampling: &ResamplingConfig) -> Self {
        Self::VFold {
            folds: resampling.folds,
        }
    }

    /// Materialize the resample positions for `dataset`.
    ///
    /// `stratify_by` applies to Monte Carlo draws only.
    pub fn draw(
        &self,
        dataset: &Dataset,
        stratify_by: Option<&str>,
        seed: u64,
    ) -> Result<Vec<SplitIndices>, PipelineError> {
        let seeds = SeedSequence::new(seed);
        match *self {
            Self::MonteCarlo {
                proportion,
                iterations,
            } => {
                if iterations == 0 {
                    return Err(PipelineError::invalid_configuration(
                        "monte carlo resampling needs at least 1 iteration",
                    ));
                }
                (0..iterations)
                    .map(|i| {
                        let s = seeds.child(i).component("split");
                        match stratify_by {
                            Some(label) => stratified_indices(dataset, label, proportion, s),
                            None => split_indices(dataset.len(), proportion, s),
                        }
                    })
                    .collect()
            }
            Self::VFold { folds } => vfold(dataset.len(), folds, seed),
            Self::Bootstrap { iterations } => {
                if iterations == 0 {
                    return Err(PipelineError::invalid_configuration(
                        "bootstrap resampling needs at least 1 iteration",
                    ));
                }
                bootstrap(dataset.len(), iterations, seed)
            }
        }
    }
}

/// Spread of one metric across resamples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: f64,
    /// Sample standard deviation (0.0 for a single resample).
    pub std_dev: f64,
    pub std_error: f64,
    pub min: f64,
    pub max: f64,
}

impl MetricSummary {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std_dev = if values.len() > 1 {
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        } else {
            0.0
        };
        Some(Self {
            mean,
            std_dev,
            std_error: std_dev / n.sqrt(),
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        })
    }
}

/// Per-metric summaries for one configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResampleSummary {
    pub config_id: String,
    pub resamples: usize,
    pub metrics: BTreeMap<String, MetricSummary>,
}

impl ResampleSummary {
    pub fn from_results(config_id: &str, results: &[EvaluationResult]) -> Self {
        let mut values: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for result in results {
            for (name, value) in &result.metrics {
                values.entry(name.as_str()).or_default().push(*value);
            }
        }
        let metrics = values
            .into_iter()
            .filter_map(|(name, v)| MetricSummary::from_values(&v).map(|s| (name.to_string(), s)))
            .collect();
        Self {
            config_id: config_id.to_string(),
            resamples: results.len(),
            metrics,
        }
    }

    pub fn metric(&self, name: &str) -> Option<&MetricSummary> {
        self.metrics.get(name)
    }

    pub fn mean_accuracy(&self) -> f64 {
        self.metric(ACCURACY).map_or(0.0, |m| m.mean)
    }
}

/// Summaries of several configurations evaluated on the same resamples,
/// best mean accuracy first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub plan: ResamplePlan,
    pub summaries: Vec<ResampleSummary>,
}

impl Comparison {
    pub fn new(plan: ResamplePlan, mut summaries: Vec<ResampleSummary>) -> Self {
        summaries.sort_by(|a, b| b.mean_accuracy().total_cmp(&a.mean_accuracy()));
        Self { plan, summaries }
    }

    pub fn best(&self) -> Option<&ResampleSummary> {
        self.summaries.first()
    }
}

/// Lazy, finite, restartable sequence of Monte Carlo evaluations.
///
/// Each call to [`iter`](Self::iter) starts again from iteration 0 and yields the
/// same results. Iteration `i` draws its own split and fits its own transform.
#[derive(Debug, Clone)]
pub struct RepeatedEvaluation<'a> {
    pub(crate) pipeline: &'a Pipeline,
    pub(crate) model: &'a ModelConfig,
    pub(crate) dataset: &'a Dataset,
    pub(crate) proportion: f64,
    pub(crate) iterations: usize,
    pub(crate) seeds: SeedSequence,
}

impl<'a> RepeatedEvaluation<'a> {
    pub fn len(&self) -> usize {
        self.iterations
    }

    pub fn is_empty(&self) -> bool {
        self.iterations == 0
    }

    pub fn iter(&self) -> ResampleIter<'_, 'a> {
        ResampleIter {
            source: self,
            next: 0,
        }
    }

    /// Run iteration `index` alone.
    pub fn nth_result(&self, index: usize) -> Result<EvaluationResult, PipelineError> {
        let seeds = self.seeds.child(index);
        let indices = self
            .pipeline
            .split_indices(self.dataset, self.proportion, seeds.component("split"))?;
        tracing::debug!(
            config_id = %self.model.id,
            iteration = index,
            train_rows = indices.analysis.len(),
            test_rows = indices.assessment.len(),
            "resample iteration"
        );
        self.pipeline
            .fit_and_evaluate(self.model, self.dataset, &indices, seeds.component("model"))
    }

    /// Drain the sequence into a summary, failing on the first failed iteration.
    pub fn summarize(&self) -> Result<ResampleSummary, PipelineError> {
        let results = self.iter().collect::<Result<Vec<_>, _>>()?;
        Ok(ResampleSummary::from_results(&self.model.id, &results))
    }
}

impl<'s, 'a> IntoIterator for &'s RepeatedEvaluation<'a> {
    type Item = Result<EvaluationResult, PipelineError>;
    type IntoIter = ResampleIter<'s, 'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`RepeatedEvaluation`].
#[derive(Debug)]
pub struct ResampleIter<'s, 'a> {
    source: &'s RepeatedEvaluation<'a>,
    next: usize,
}

impl Iterator for ResampleIter<'_, '_> {
    type Item = Result<EvaluationResult, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.source.iterations {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some(self.source.nth_result(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.source.iterations.saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ResampleIter<'_, '_> {}
