//! Random forest classification, backed by `aprender`.

use aprender::tree::RandomForestClassifier;

use super::{Learner, Predictor, backend_error, to_matrix};
use crate::error::PipelineError;
use crate::preprocess::FeatureMatrix;

/// Bagged CART trees voting by majority. The fit seed fixes the bootstrap
/// samples, so equal seeds give equal forests.
#[derive(Debug, Clone, Copy)]
pub struct RandomForest {
    pub n_trees: usize,
    pub max_depth: Option<usize>,
}

struct ForestPredictor {
    estimator: RandomForestClassifier,
    width: usize,
}

impl Predictor for ForestPredictor {
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<usize>, PipelineError> {
        let x = to_matrix(rows, self.width)?;
        Ok(self.estimator.predict(&x))
    }
}

impl Learner for RandomForest {
    fn fit(
        &self,
        features: &FeatureMatrix,
        targets: &[usize],
        _n_classes: usize,
        seed: u64,
    ) -> Result<Box<dyn Predictor>, PipelineError> {
        let width = features.width();
        let x = to_matrix(&features.rows, width)?;
        let mut estimator = RandomForestClassifier::new(self.n_trees).with_random_state(seed);
        if let Some(depth) = self.max_depth {
            estimator = estimator.with_max_depth(depth);
        }
        estimator.fit(&x, targets).map_err(backend_error)?;
        Ok(Box::new(ForestPredictor { estimator, width }))
    }
}

#[cfg(test)]
mod tests {
    use crate::model::test_support::blobs;
    use crate::model::{Algorithm, ModelConfig, TrainedModel, train};
    use crate::preprocess::FeatureMatrix;

    fn forest(
        n_trees: usize,
        features: &FeatureMatrix,
        labels: &[String],
        seed: u64,
    ) -> TrainedModel {
        let config = ModelConfig::new(
            "rf",
            Algorithm::RandomForest {
                n_trees,
                max_depth: None,
            },
        );
        train(&config, features, labels, seed).unwrap()
    }

    #[test]
    fn test_separates_blobs() {
        let (features, labels) = blobs(15, 3);
        let model = forest(25, &features, &labels, 7);
        assert_eq!(model.predict(&[0.0, 0.0]).unwrap(), "class0");
        assert_eq!(model.predict(&[5.0, -3.0]).unwrap(), "class1");
        assert_eq!(model.predict(&[10.0, -6.0]).unwrap(), "class2");
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (features, labels) = blobs(10, 2);
        let a = forest(5, &features, &labels, 3);
        let b = forest(5, &features, &labels, 3);
        for x in [-1.0, 1.0, 2.5, 4.0, 6.0] {
            assert_eq!(a.predict(&[x, -x]).unwrap(), b.predict(&[x, -x]).unwrap());
        }
    }
}
