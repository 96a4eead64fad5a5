//! Single CART classification tree, backed by `aprender`.

use aprender::tree::DecisionTreeClassifier;

use super::{Learner, Predictor, backend_error, to_matrix};
use crate::error::PipelineError;
use crate::preprocess::FeatureMatrix;

/// Gini-impurity tree grown until leaves are pure or `max_depth` is reached.
#[derive(Debug, Clone, Copy)]
pub struct DecisionTree {
    pub max_depth: Option<usize>,
}

struct TreePredictor {
    estimator: DecisionTreeClassifier,
    width: usize,
}

impl Predictor for TreePredictor {
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<usize>, PipelineError> {
        let x = to_matrix(rows, self.width)?;
        Ok(self.estimator.predict(&x))
    }
}

impl Learner for DecisionTree {
    fn fit(
        &self,
        features: &FeatureMatrix,
        targets: &[usize],
        _n_classes: usize,
        _seed: u64,
    ) -> Result<Box<dyn Predictor>, PipelineError> {
        let width = features.width();
        let x = to_matrix(&features.rows, width)?;
        let mut estimator = DecisionTreeClassifier::new();
        if let Some(depth) = self.max_depth {
            estimator = estimator.with_max_depth(depth);
        }
        estimator.fit(&x, targets).map_err(backend_error)?;
        Ok(Box::new(TreePredictor { estimator, width }))
    }
}
