//! Configuration for the evaluation pipeline.
//!
//! Uses `figment` for layered configuration: defaults -> TOML file -> explicit overrides.
//! Every stochastic step reads its seed from here (or from an explicit argument);
//! nothing falls back to a shared generator.

use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::PipelineError;
use crate::preprocess::{MissingValuePolicy, UnseenCategoryPolicy};

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Train/test split settings.
    #[serde(default)]
    pub split: SplitConfig,
    /// Preprocessing policies.
    #[serde(default)]
    pub preprocess: PreprocessConfig,
    /// Repeated evaluation settings.
    #[serde(default)]
    pub resampling: ResamplingConfig,
}

/// Train/test split configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of records assigned to training, in (0, 1).
    #[serde(default = "default_proportion")]
    pub proportion: f64,
    /// Seed for a single split.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Split each label class separately so class balance is preserved.
    #[serde(default)]
    pub stratify: bool,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            proportion: default_proportion(),
            seed: default_seed(),
            stratify: false,
        }
    }
}

fn default_proportion() -> f64 {
    0.8
}

fn default_seed() -> u64 {
    42
}

/// Preprocessing policies, fixed per deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreprocessConfig {
    #[serde(default)]
    pub unseen_category: UnseenCategoryPolicy,
    #[serde(default)]
    pub missing_values: MissingValuePolicy,
}

/// Resampling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResamplingConfig {
    /// Monte Carlo iterations (and bootstrap draws).
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Number of folds for V-fold cross-validation.
    #[serde(default = "default_folds")]
    pub folds: usize,
    /// Base seed from which every iteration seed is derived.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for ResamplingConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            folds: default_folds(),
            seed: default_seed(),
        }
    }
}

fn default_iterations() -> usize {
    25
}

fn default_folds() -> usize {
    10
}

/// Explicit overrides merged over the file layer. Only the fields set here
/// replace loaded values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    pub split: SplitOverrides,
    pub preprocess: PreprocessOverrides,
    pub resampling: ResamplingOverrides,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proportion: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stratify: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unseen_category: Option<UnseenCategoryPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_values: Option<MissingValuePolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResamplingOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterations: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folds: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl PipelineConfig {
    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let p = self.split.proportion;
        if !(p > 0.0 && p < 1.0) {
            return Err(PipelineError::invalid_configuration(format!(
                "split proportion must be in (0, 1), got {p}"
            )));
        }
        if self.resampling.iterations == 0 {
            return Err(PipelineError::invalid_configuration(
                "resampling iterations must be at least 1",
            ));
        }
        if self.resampling.folds < 2 {
            return Err(PipelineError::invalid_configuration(format!(
                "v-fold cross-validation needs at least 2 folds, got {}",
                self.resampling.folds
            )));
        }
        Ok(())
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides, for the fields they set
/// 2. TOML file at `path`, when it exists
/// 3. Built-in defaults
pub fn load_config(
    path: Option<&Path>,
    overrides: Option<&ConfigOverrides>,
) -> Result<PipelineConfig, PipelineError> {
    let mut figment = Figment::from(Serialized::defaults(PipelineConfig::default()));

    if let Some(path) = path {
        if path.exists() {
            figment = figment.merge(Toml::file(path));
        } else {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
        }
    }

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: PipelineConfig = figment.extract().map_err(Box::new)?;
    config.validate()?;
    Ok(config)
}
