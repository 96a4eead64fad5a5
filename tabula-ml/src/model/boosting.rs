//! Gradient boosted trees for multiclass classification (multinomial deviance).
//!
//! `aprender` boosting covers binary targets only, so the multinomial rounds and
//! their regression trees live here.

use super::{Learner, Predictor, argmax};
use crate::error::PipelineError;
use crate::preprocess::FeatureMatrix;

/// One regression tree per class per round, fit to the softmax residuals.
#[derive(Debug, Clone, Copy)]
pub struct GradientBoosting {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
}

/// Regression tree node. Rows with `row[feature] <= threshold` go left.
#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Arena-allocated regression tree; the root is node 0.
#[derive(Debug, Clone)]
struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    fn value(&self, row: &[f64]) -> f64 {
        let mut i = 0;
        loop {
            match self.nodes[i] {
                Node::Leaf(value) => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => i = if row[feature] <= threshold { left } else { right },
            }
        }
    }

    #[cfg(test)]
    fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf(_)))
            .count()
    }
}

const MIN_GAIN: f64 = 1e-12;

/// Running (sum, sum of squares, count) of residuals.
#[derive(Debug, Clone, Copy, Default)]
struct Moments(f64, f64, f64);

impl Moments {
    fn add(&mut self, y: f64) {
        self.0 += y;
        self.1 += y * y;
        self.2 += 1.0;
    }

    fn remove(&mut self, y: f64) {
        self.0 -= y;
        self.1 -= y * y;
        self.2 -= 1.0;
    }

    /// Sum of squared deviations from the mean.
    fn cost(&self) -> f64 {
        let Moments(sum, sum_sq, n) = *self;
        if n <= 0.0 {
            return 0.0;
        }
        (sum_sq - sum * sum / n).max(0.0)
    }
}

/// Grow a squared-error tree on `residuals` to at most `max_depth` levels.
fn grow<F>(
    rows: &[Vec<f64>],
    residuals: &[f64],
    max_depth: usize,
    leaf_value: F,
) -> RegressionTree
where
    F: Fn(&[usize]) -> f64,
{
    let mut nodes = Vec::new();
    let root: Vec<usize> = (0..rows.len()).collect();
    let mut stack = vec![(root, 0usize, None::<(usize, bool)>)];

    while let Some((samples, depth, parent)) = stack.pop() {
        let idx = nodes.len();
        nodes.push(Node::Leaf(leaf_value(&samples)));
        if let Some((parent_idx, is_left)) = parent {
            if let Node::Split { left, right, .. } = &mut nodes[parent_idx] {
                if is_left {
                    *left = idx;
                } else {
                    *right = idx;
                }
            }
        }
        if depth >= max_depth || samples.len() < 2 {
            continue;
        }
        if let Some((feature, threshold)) = best_split(rows, residuals, &samples) {
            let (left, right): (Vec<usize>, Vec<usize>) = samples
                .into_iter()
                .partition(|&s| rows[s][feature] <= threshold);
            nodes[idx] = Node::Split {
                feature,
                threshold,
                left: usize::MAX,
                right: usize::MAX,
            };
            stack.push((right, depth + 1, Some((idx, false))));
            stack.push((left, depth + 1, Some((idx, true))));
        }
    }

    RegressionTree { nodes }
}

/// Best `(feature, threshold)` by squared-error decrease, if any split improves.
fn best_split(rows: &[Vec<f64>], residuals: &[f64], samples: &[usize]) -> Option<(usize, f64)> {
    let width = rows.first().map_or(0, Vec::len);
    let mut total = Moments::default();
    for &s in samples {
        total.add(residuals[s]);
    }
    let parent_cost = total.cost();
    if parent_cost <= MIN_GAIN {
        return None;
    }

    let mut best: Option<(usize, f64, f64)> = None;
    let mut sorted = samples.to_vec();
    for f in 0..width {
        sorted.sort_by(|a, b| rows[*a][f].total_cmp(&rows[*b][f]));
        let mut left = Moments::default();
        let mut right = total;
        for w in 0..sorted.len() - 1 {
            left.add(residuals[sorted[w]]);
            right.remove(residuals[sorted[w]]);
            let (here, next) = (rows[sorted[w]][f], rows[sorted[w + 1]][f]);
            if here == next {
                continue;
            }
            let cost = left.cost() + right.cost();
            if best.is_none_or(|(_, _, c)| cost < c - MIN_GAIN) {
                best = Some((f, here + (next - here) / 2.0, cost));
            }
        }
    }

    best.filter(|(_, _, cost)| *cost < parent_cost - MIN_GAIN)
        .map(|(f, t, _)| (f, t))
}

struct BoostingPredictor {
    initial: Vec<f64>,
    learning_rate: f64,
    /// `rounds[m][k]` is the tree for class `k` at round `m`.
    rounds: Vec<Vec<RegressionTree>>,
}

impl BoostingPredictor {
    fn scores(&self, row: &[f64]) -> Vec<f64> {
        let mut scores = self.initial.clone();
        for round in &self.rounds {
            for (k, tree) in round.iter().enumerate() {
                scores[k] += self.learning_rate * tree.value(row);
            }
        }
        scores
    }
}

impl Predictor for BoostingPredictor {
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<usize>, PipelineError> {
        Ok(rows.iter().map(|row| argmax(&self.scores(row))).collect())
    }
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = exp.iter().sum();
    exp.into_iter().map(|e| e / total).collect()
}

impl Learner for GradientBoosting {
    fn fit(
        &self,
        features: &FeatureMatrix,
        targets: &[usize],
        n_classes: usize,
        _seed: u64,
    ) -> Result<Box<dyn Predictor>, PipelineError> {
        let k = n_classes;
        let n = features.len();

        let mut priors = vec![0.0; k];
        for &t in targets {
            priors[t] += 1.0;
        }
        let initial: Vec<f64> = priors.iter().map(|c| (c / n as f64).ln()).collect();

        let mut rounds = Vec::new();
        if k > 1 {
            let mut scores: Vec<Vec<f64>> = vec![initial.clone(); n];
            let scale = (k as f64 - 1.0) / k as f64;

            for _ in 0..self.n_estimators {
                let probs: Vec<Vec<f64>> = scores.iter().map(|s| softmax(s)).collect();
                let mut round = Vec::with_capacity(k);
                for class in 0..k {
                    let residuals: Vec<f64> = (0..n)
                        .map(|i| f64::from(u8::from(targets[i] == class)) - probs[i][class])
                        .collect();
                    let tree = grow(&features.rows, &residuals, self.max_depth, |samples| {
                        newton_step(&residuals, samples, scale)
                    });
                    for (i, row) in features.rows.iter().enumerate() {
                        scores[i][class] += self.learning_rate * tree.value(row);
                    }
                    round.push(tree);
                }
                rounds.push(round);
            }
        }

        Ok(Box::new(BoostingPredictor {
            initial,
            learning_rate: self.learning_rate,
            rounds,
        }))
    }
}

/// Leaf value for multinomial deviance: `(K-1)/K * sum(r) / sum(|r|(1-|r|))`.
fn newton_step(residuals: &[f64], samples: &[usize], scale: f64) -> f64 {
    let (num, den) = samples.iter().fold((0.0, 0.0), |(num, den), &i| {
        let r = residuals[i];
        (num + r, den + r.abs() * (1.0 - r.abs()))
    });
    if den.abs() < 1e-12 {
        0.0
    } else {
        scale * num / den
    }
}
