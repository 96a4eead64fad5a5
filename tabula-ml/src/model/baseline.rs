//! Majority-class baseline.

use super::{Learner, Predictor, argmax};
use crate::error::PipelineError;
use crate::preprocess::FeatureMatrix;

#[derive(Debug, Clone, Copy, Default)]
pub struct MajorityClass;

struct MajorityPredictor {
    class: usize,
}

impl Predictor for MajorityPredictor {
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<usize>, PipelineError> {
        Ok(vec![self.class; rows.len()])
    }
}

impl Learner for MajorityClass {
    fn fit(
        &self,
        _features: &FeatureMatrix,
        targets: &[usize],
        n_classes: usize,
        _seed: u64,
    ) -> Result<Box<dyn Predictor>, PipelineError> {
        let mut counts = vec![0.0; n_classes];
        for &t in targets {
            counts[t] += 1.0;
        }
        Ok(Box::new(MajorityPredictor {
            class: argmax(&counts),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_support::blobs;
    use crate::model::{Algorithm, ModelConfig, train};

    fn majority() -> ModelConfig {
        ModelConfig::new("base", Algorithm::MajorityClass)
    }

    #[test]
    fn test_predicts_most_frequent() {
        let (features, mut labels) = blobs(4, 2);
        labels[0] = "class1".into();
        let model = train(&majority(), &features, &labels, 0).unwrap();
        assert_eq!(model.predict(&[0.0, 0.0]).unwrap(), "class1");
    }

    #[test]
    fn test_tie_goes_to_first_label() {
        let (features, labels) = blobs(4, 3);
        let model = train(&majority(), &features, &labels, 0).unwrap();
        assert_eq!(model.predict(&[100.0, 100.0]).unwrap(), "class0");
    }

    #[test]
    fn test_predicts_one_class_per_row() {
        let (features, _) = blobs(2, 2);
        let predictor = MajorityClass.fit(&features, &[1, 1, 0, 1], 2, 0).unwrap();
        assert_eq!(predictor.predict(&features.rows).unwrap(), vec![1; 4]);
    }
}
