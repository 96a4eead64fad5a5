//! # tabula-ml — Classification evaluation on small tabular datasets
//!
//! Split a dataset, fit preprocessing on the training side only, train one or
//! more model configurations, predict the held-out records and score them.
//! Repeat with fresh splits to see how much the scores move.
//!
//! ## Guarantees
//!
//! 1. **No leakage** — a [`FittedTransform`] only ever sees training records
//! 2. **Reproducibility** — every stochastic step takes an explicit seed
//! 3. **Independence** — resamples and configurations share nothing mutable,
//!    so they can be evaluated in any order or concurrently

// Foundation
pub mod config;
pub mod error;
pub mod seed;

// Data
pub mod data;
pub mod preprocess;

// Models
pub mod cluster;
pub mod model;

// Evaluation
pub mod eval;
pub mod pipeline;
pub mod resample;

// Re-exports
pub use cluster::{ClusterAlgorithm, ClusterAssignment, ContingencyTable, cluster, cross_tabulate};
pub use config::{ConfigOverrides, PipelineConfig, load_config};
pub use data::{Dataset, RecordId, Split, SplitIndices, Value};
pub use error::PipelineError;
pub use eval::{ConfusionMatrix, EvaluationResult, evaluate};
pub use model::{Algorithm, ModelConfig, TrainedModel, train};
pub use pipeline::Pipeline;
pub use preprocess::{FeatureMatrix, FittedTransform, Preprocessor, fit_preprocessor};
pub use resample::{Comparison, ResamplePlan, ResampleSummary};
pub use seed::SeedSequence;
