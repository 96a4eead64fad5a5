//! The classification evaluation pipeline.
//!
//! dataset -> split -> fit preprocessor on training -> apply to both sides ->
//! train -> predict held-out records -> score. Every stage is a pure function
//! of its inputs and an explicit seed, so runs are reproducible and resamples
//! can be evaluated in any order, or concurrently.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cluster::{ClusterAlgorithm, ClusterAssignment, cluster};
use crate::config::PipelineConfig;
use crate::data::dataset::Dataset;
use crate::data::split::{SplitIndices, split_indices, stratified_indices};
use crate::error::PipelineError;
use crate::eval::metrics::{EvaluationResult, evaluate};
use crate::model::{ModelConfig, TrainedModel, train};
use crate::preprocess::{FeatureMatrix, FittedTransform, Preprocessor};
use crate::resample::{Comparison, RepeatedEvaluation, ResamplePlan, ResampleSummary};
use crate::seed::SeedSequence;

/// Column roles plus the configuration every run uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub label_column: String,
    pub numeric_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
    #[serde(default)]
    pub config: PipelineConfig,
}

/// Artifacts of one training run, kept when the caller wants more than metrics.
#[derive(Debug)]
pub struct FittedRun {
    pub transform: FittedTransform,
    pub model: TrainedModel,
}

impl FittedRun {
    /// Preprocess `dataset` with this run's transform and predict every record.
    pub fn predict(&self, dataset: &Dataset) -> Result<Vec<String>, PipelineError> {
        let features = self.transform.transform_features(dataset)?;
        self.model.predict_all(&features)
    }
}

impl Pipeline {
    pub fn new(label_column: &str, numeric_columns: &[&str], categorical_columns: &[&str]) -> Self {
        Self {
            label_column: label_column.to_string(),
            numeric_columns: numeric_columns.iter().map(|c| c.to_string()).collect(),
            categorical_columns: categorical_columns.iter().map(|c| c.to_string()).collect(),
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    fn preprocessor(&self) -> Preprocessor {
        Preprocessor {
            numeric_columns: self.numeric_columns.clone(),
            categorical_columns: self.categorical_columns.clone(),
            unseen_category: self.config.preprocess.unseen_category,
            missing_values: self.config.preprocess.missing_values,
        }
    }

    fn stratify_by(&self) -> Option<&str> {
        self.config
            .split
            .stratify
            .then_some(self.label_column.as_str())
    }

    /// Split positions, stratified by the label when configured.
    pub fn split_indices(
        &self,
        dataset: &Dataset,
        proportion: f64,
        seed: u64,
    ) -> Result<SplitIndices, PipelineError> {
        match self.stratify_by() {
            Some(label) => stratified_indices(dataset, label, proportion, seed),
            None => split_indices(dataset.len(), proportion, seed),
        }
    }

    /// Fit the preprocessor on `training` and train `model` on the result.
    pub fn fit(
        &self,
        model: &ModelConfig,
        training: &Dataset,
        seed: u64,
    ) -> Result<FittedRun, PipelineError> {
        let transform = self.preprocessor().fit(training)?;
        let transformed = transform.apply(training)?;
        let features = FeatureMatrix::from_dataset(&transformed, &transform.feature_names())?;
        let labels = transformed.labels(&self.label_column)?;
        let model = train(model, &features, &labels, seed)?;
        Ok(FittedRun { transform, model })
    }

    /// One full cycle on a given resample.
    pub fn fit_and_evaluate(
        &self,
        model: &ModelConfig,
        dataset: &Dataset,
        indices: &SplitIndices,
        seed: u64,
    ) -> Result<EvaluationResult, PipelineError> {
        let split = indices.materialize(dataset);
        let run = self.fit(model, &split.training, seed)?;
        let testing = run.transform.apply(&split.testing)?;
        evaluate(&run.model, &testing, &self.label_column)
    }

    /// Split with `seed`, then fit, train and evaluate once.
    pub fn run_once(
        &self,
        model: &ModelConfig,
        dataset: &Dataset,
        seed: u64,
    ) -> Result<EvaluationResult, PipelineError> {
        let seeds = SeedSequence::new(seed);
        let indices =
            self.split_indices(dataset, self.config.split.proportion, seeds.component("split"))?;
        let result = self.fit_and_evaluate(model, dataset, &indices, seeds.component("model"))?;
        tracing::info!(
            config_id = %model.id,
            train_rows = indices.analysis.len(),
            test_rows = indices.assessment.len(),
            accuracy = result.accuracy(),
            "evaluation run complete"
        );
        Ok(result)
    }

    /// Repeated random subsampling: `iterations` independent splits derived from `seed`.
    pub fn repeat_evaluation<'a>(
        &'a self,
        model: &'a ModelConfig,
        dataset: &'a Dataset,
        proportion: f64,
        iterations: usize,
        seed: u64,
    ) -> RepeatedEvaluation<'a> {
        tracing::info!(config_id = %model.id, iterations, proportion, "repeated evaluation");
        RepeatedEvaluation {
            pipeline: self,
            model,
            dataset,
            proportion,
            iterations,
            seeds: SeedSequence::new(seed),
        }
    }

    /// Evaluate `model` on each resample; resample `r` trains with its own derived seed.
    pub fn evaluate_resamples(
        &self,
        model: &ModelConfig,
        dataset: &Dataset,
        resamples: &[SplitIndices],
        seed: u64,
    ) -> Result<Vec<EvaluationResult>, PipelineError> {
        let seeds = SeedSequence::new(seed);
        resamples
            .iter()
            .enumerate()
            .map(|(r, indices)| {
                self.fit_and_evaluate(model, dataset, indices, seeds.child(r).component("model"))
            })
            .collect()
    }

    fn draw(
        &self,
        dataset: &Dataset,
        plan: &ResamplePlan,
        seed: u64,
    ) -> Result<Vec<SplitIndices>, PipelineError> {
        let resamples = plan.draw(dataset, self.stratify_by(), seed)?;
        tracing::info!(resamples = resamples.len(), ?plan, "drew resamples");
        Ok(resamples)
    }

    fn summarize(
        &self,
        model: &ModelConfig,
        dataset: &Dataset,
        resamples: &[SplitIndices],
        seed: u64,
    ) -> Result<ResampleSummary, PipelineError> {
        let results = self.evaluate_resamples(model, dataset, resamples, seed)?;
        let summary = ResampleSummary::from_results(&model.id, &results);
        tracing::info!(
            config_id = %model.id,
            mean_accuracy = summary.mean_accuracy(),
            "configuration summarized"
        );
        Ok(summary)
    }

    /// Preprocess the declared feature columns of the whole dataset and cluster them.
    ///
    /// The label column is never read.
    pub fn cluster(
        &self,
        dataset: &Dataset,
        algorithm: &ClusterAlgorithm,
        seed: u64,
    ) -> Result<ClusterAssignment, PipelineError> {
        let transform = self.preprocessor().fit(dataset)?;
        let features = transform.transform_features(dataset)?;
        cluster(&features, algorithm, seed)
    }

    /// Evaluate every configuration on the same resamples.
    pub fn compare(
        &self,
        models: &[ModelConfig],
        dataset: &Dataset,
        plan: &ResamplePlan,
        seed: u64,
    ) -> Result<Comparison, PipelineError> {
        let resamples = self.draw(dataset, plan, seed)?;
        let summaries = models
            .iter()
            .map(|m| self.summarize(m, dataset, &resamples, seed))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Comparison::new(plan.clone(), summaries))
    }

    /// [`compare`](Self::compare) with configurations evaluated on the rayon pool.
    ///
    /// Jobs share only the read-only dataset and resample positions, so results
    /// match the sequential version exactly.
    pub fn compare_parallel(
        &self,
        models: &[ModelConfig],
        dataset: &Dataset,
        plan: &ResamplePlan,
        seed: u64,
    ) -> Result<Comparison, PipelineError> {
        let resamples = self.draw(dataset, plan, seed)?;
        let summaries = models
            .par_iter()
            .map(|m| self.summarize(m, dataset, &resamples, seed))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Comparison::new(plan.clone(), summaries))
    }
}
