//! Model configurations and the train/predict capability.
//!
//! Algorithms are selected by a tagged [`Algorithm`] value and trained through the
//! [`Learner`] trait; the evaluation pipeline only ever sees the resulting
//! [`TrainedModel`] and its `predict` operations. Tree, forest and k-NN learners
//! are thin adapters over `aprender` estimators.

pub mod baseline;
pub mod boosting;
pub mod forest;
pub mod knn;
pub mod tree;

use aprender::primitives::Matrix;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::PipelineError;
use crate::preprocess::FeatureMatrix;

pub use baseline::MajorityClass;
pub use boosting::GradientBoosting;
pub use forest::RandomForest;
pub use knn::KNearestNeighbors;
pub use tree::DecisionTree;

/// Supported classification algorithms with their hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum Algorithm {
    /// Always predicts the most frequent training label.
    MajorityClass,
    Knn {
        k: usize,
    },
    DecisionTree {
        #[serde(default)]
        max_depth: Option<usize>,
    },
    RandomForest {
        n_trees: usize,
        #[serde(default)]
        max_depth: Option<usize>,
    },
    GradientBoosting {
        n_estimators: usize,
        learning_rate: f64,
        max_depth: usize,
    },
}

impl Algorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MajorityClass => "majority_class",
            Self::Knn { .. } => "knn",
            Self::DecisionTree { .. } => "decision_tree",
            Self::RandomForest { .. } => "random_forest",
            Self::GradientBoosting { .. } => "gradient_boosting",
        }
    }

    /// Reject hyperparameter values no implementation can honor.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let bad = |msg: String| Err(PipelineError::invalid_configuration(msg));
        match *self {
            Self::MajorityClass => Ok(()),
            Self::Knn { k } if k == 0 => bad("knn: k must be at least 1".into()),
            Self::Knn { .. } => Ok(()),
            Self::DecisionTree { max_depth } => check_depth(max_depth),
            Self::RandomForest { n_trees, max_depth } => {
                if n_trees == 0 {
                    return bad("random_forest: n_trees must be at least 1".into());
                }
                check_depth(max_depth)
            }
            Self::GradientBoosting {
                n_estimators,
                learning_rate,
                max_depth,
            } => {
                if n_estimators == 0 {
                    return bad("gradient_boosting: n_estimators must be at least 1".into());
                }
                if !(learning_rate > 0.0 && learning_rate <= 1.0) {
                    return bad(format!(
                        "gradient_boosting: learning_rate must be in (0, 1], got {learning_rate}"
                    ));
                }
                if max_depth == 0 {
                    return bad("gradient_boosting: max_depth must be at least 1".into());
                }
                Ok(())
            }
        }
    }

    fn learner(&self) -> Box<dyn Learner> {
        match *self {
            Self::MajorityClass => Box::new(MajorityClass),
            Self::Knn { k } => Box::new(KNearestNeighbors { k }),
            Self::DecisionTree { max_depth } => Box::new(DecisionTree { max_depth }),
            Self::RandomForest { n_trees, max_depth } => {
                Box::new(RandomForest { n_trees, max_depth })
            }
            Self::GradientBoosting {
                n_estimators,
                learning_rate,
                max_depth,
            } => Box::new(GradientBoosting {
                n_estimators,
                learning_rate,
                max_depth,
            }),
        }
    }
}

fn check_depth(max_depth: Option<usize>) -> Result<(), PipelineError> {
    if max_depth == Some(0) {
        return Err(PipelineError::invalid_configuration(
            "max_depth must be at least 1",
        ));
    }
    Ok(())
}

/// An identified, immutable model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    #[serde(flatten)]
    pub algorithm: Algorithm,
}

impl ModelConfig {
    pub fn new(id: impl Into<String>, algorithm: Algorithm) -> Self {
        Self {
            id: id.into(),
            algorithm,
        }
    }

    /// Hyperparameters as a name → value map, for reporting.
    pub fn hyperparameters(&self) -> BTreeMap<String, f64> {
        let mut params = BTreeMap::new();
        let mut put = |name: &str, value: f64| {
            params.insert(name.to_string(), value);
        };
        match self.algorithm {
            Algorithm::MajorityClass => {}
            Algorithm::Knn { k } => put("k", k as f64),
            Algorithm::DecisionTree { max_depth } => {
                if let Some(d) = max_depth {
                    put("max_depth", d as f64);
                }
            }
            Algorithm::RandomForest { n_trees, max_depth } => {
                put("n_trees", n_trees as f64);
                if let Some(d) = max_depth {
                    put("max_depth", d as f64);
                }
            }
            Algorithm::GradientBoosting {
                n_estimators,
                learning_rate,
                max_depth,
            } => {
                put("n_estimators", n_estimators as f64);
                put("learning_rate", learning_rate);
                put("max_depth", max_depth as f64);
            }
        }
        params
    }
}

/// Fits a predictor from numeric features and encoded class targets.
///
/// `targets[i]` indexes into the `n_classes` sorted training labels, and every
/// class occurs at least once.
pub trait Learner {
    fn fit(
        &self,
        features: &FeatureMatrix,
        targets: &[usize],
        n_classes: usize,
        seed: u64,
    ) -> Result<Box<dyn Predictor>, PipelineError>;
}

/// A fitted predictor over rows laid out like its training features.
pub trait Predictor {
    /// Class index for each row.
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<usize>, PipelineError>;
}

/// Sorted class vocabulary and the encoded targets of a training set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassIndex {
    pub classes: Vec<String>,
}

impl ClassIndex {
    /// Encode `labels` as indices into the sorted distinct labels.
    pub fn encode(labels: &[String]) -> (Self, Vec<usize>) {
        let mut classes: Vec<String> = labels.to_vec();
        classes.sort();
        classes.dedup();
        let targets = labels
            .iter()
            .map(|l| classes.binary_search(l).unwrap_or_default())
            .collect();
        (Self { classes }, targets)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn name(&self, class: usize) -> Option<&str> {
        self.classes.get(class).map(String::as_str)
    }
}

/// Index of the largest count; ties go to the lowest index.
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate().skip(1) {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// Row-major `f32` copy of `rows`, the input shape of `aprender` estimators.
pub(crate) fn to_matrix(rows: &[Vec<f64>], width: usize) -> Result<Matrix<f32>, PipelineError> {
    let data: Vec<f32> = rows
        .iter()
        .flat_map(|row| row.iter().map(|&v| v as f32))
        .collect();
    Matrix::from_vec(rows.len(), width, data).map_err(backend_error)
}

pub(crate) fn backend_error(err: impl fmt::Display) -> PipelineError {
    PipelineError::model(err.to_string())
}

/// Shared precondition for every learner.
pub(crate) fn check_training_set(
    features: &FeatureMatrix,
    labels: &[String],
) -> Result<(), PipelineError> {
    if features.is_empty() {
        return Err(PipelineError::invalid_configuration(
            "cannot train on an empty training set",
        ));
    }
    if features.len() != labels.len() {
        return Err(PipelineError::schema(format!(
            "{} feature rows but {} labels",
            features.len(),
            labels.len()
        )));
    }
    Ok(())
}

/// A predictor bound to the configuration and feature layout it was trained with.
pub struct TrainedModel {
    pub config_id: String,
    pub feature_names: Vec<String>,
    classes: ClassIndex,
    predictor: Box<dyn Predictor>,
}

impl fmt::Debug for TrainedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainedModel")
            .field("config_id", &self.config_id)
            .field("feature_names", &self.feature_names)
            .field("classes", &self.classes.classes)
            .finish_non_exhaustive()
    }
}

impl TrainedModel {
    /// Distinct training labels, sorted.
    pub fn classes(&self) -> &[String] {
        &self.classes.classes
    }

    /// Predict a single feature row, which must match the training width.
    pub fn predict(&self, row: &[f64]) -> Result<&str, PipelineError> {
        if row.len() != self.feature_names.len() {
            return Err(PipelineError::schema(format!(
                "model '{}' expects {} features, got {}",
                self.config_id,
                self.feature_names.len(),
                row.len()
            )));
        }
        let predicted = self.predictor.predict(&[row.to_vec()])?;
        match predicted.first() {
            Some(&class) => self.class_name(class),
            None => Err(PipelineError::model(format!(
                "model '{}' returned no prediction",
                self.config_id
            ))),
        }
    }

    /// Predict every row of `features`, which must share the training layout.
    pub fn predict_all(&self, features: &FeatureMatrix) -> Result<Vec<String>, PipelineError> {
        if features.feature_names != self.feature_names {
            return Err(PipelineError::schema(format!(
                "model '{}' expects features {:?}, got {:?}",
                self.config_id, self.feature_names, features.feature_names
            )));
        }
        if features.is_empty() {
            return Ok(Vec::new());
        }
        let predicted = self.predictor.predict(&features.rows)?;
        if predicted.len() != features.len() {
            return Err(PipelineError::model(format!(
                "model '{}' returned {} predictions for {} rows",
                self.config_id,
                predicted.len(),
                features.len()
            )));
        }
        predicted
            .into_iter()
            .map(|class| self.class_name(class).map(str::to_string))
            .collect()
    }

    fn class_name(&self, class: usize) -> Result<&str, PipelineError> {
        self.classes.name(class).ok_or_else(|| {
            PipelineError::model(format!(
                "model '{}' predicted unknown class {class}",
                self.config_id
            ))
        })
    }
}

/// Train `config` on the given features and labels.
///
/// A training set with a single class always predicts that class, whatever
/// the algorithm.
pub fn train(
    config: &ModelConfig,
    features: &FeatureMatrix,
    labels: &[String],
    seed: u64,
) -> Result<TrainedModel, PipelineError> {
    config.algorithm.validate()?;
    check_training_set(features, labels)?;
    let (classes, targets) = ClassIndex::encode(labels);
    let learner = if classes.len() == 1 {
        Box::new(MajorityClass)
    } else {
        config.algorithm.learner()
    };
    let predictor = learner.fit(features, &targets, classes.len(), seed)?;
    tracing::debug!(
        config_id = %config.id,
        algorithm = config.algorithm.name(),
        rows = features.len(),
        width = features.width(),
        classes = classes.len(),
        "trained model"
    );
    Ok(TrainedModel {
        config_id: config.id.clone(),
        feature_names: features.feature_names.clone(),
        classes,
        predictor,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::preprocess::FeatureMatrix;

    /// Two well-separated blobs per class along a diagonal.
    pub fn blobs(per_class: usize, classes: usize) -> (FeatureMatrix, Vec<String>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for c in 0..classes {
            for i in 0..per_class {
                let jitter = (i as f64 * 0.37).sin() * 0.3;
                rows.push(vec![c as f64 * 5.0 + jitter, c as f64 * -3.0 - jitter]);
                labels.push(format!("class{c}"));
            }
        }
        let n = rows.len();
        (
            FeatureMatrix {
                feature_names: vec!["a".into(), "b".into()],
                ids: (0..n).collect(),
                rows,
            },
            labels,
        )
    }
}
