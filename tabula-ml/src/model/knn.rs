//! k-nearest-neighbor classification, backed by `aprender`.

use aprender::classification::KNearestNeighbors as KnnEstimator;

use super::{Learner, Predictor, backend_error, to_matrix};
use crate::error::PipelineError;
use crate::preprocess::FeatureMatrix;

/// Uniform majority vote among the `k` nearest training rows (Euclidean
/// distance). `k` larger than the training set uses every training row.
#[derive(Debug, Clone, Copy)]
pub struct KNearestNeighbors {
    pub k: usize,
}

struct KnnPredictor {
    estimator: KnnEstimator,
    width: usize,
}

impl Predictor for KnnPredictor {
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<usize>, PipelineError> {
        let x = to_matrix(rows, self.width)?;
        self.estimator.predict(&x).map_err(backend_error)
    }
}

impl Learner for KNearestNeighbors {
    fn fit(
        &self,
        features: &FeatureMatrix,
        targets: &[usize],
        _n_classes: usize,
        _seed: u64,
    ) -> Result<Box<dyn Predictor>, PipelineError> {
        let width = features.width();
        let x = to_matrix(&features.rows, width)?;
        let mut estimator = KnnEstimator::new(self.k.min(features.len()));
        estimator.fit(&x, targets).map_err(backend_error)?;
        Ok(Box::new(KnnPredictor { estimator, width }))
    }
}
