//! Evaluation — confusion matrices, accuracy, agreement beyond chance.

pub mod agreement;
pub mod metrics;

pub use agreement::interpret_kappa;
pub use metrics::{
    ConfusionCell, ConfusionMatrix, EvaluationResult, Prediction, evaluate, score_predictions,
};
