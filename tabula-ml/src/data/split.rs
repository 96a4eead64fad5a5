//! Train/test splits and resampling plans.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::data::dataset::Dataset;
use crate::error::PipelineError;
use crate::seed::SeedSequence;

/// A dataset partitioned into disjoint training and testing sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub training: Dataset,
    pub testing: Dataset,
}

/// Row positions of one resample. `analysis` may repeat positions (bootstrap).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitIndices {
    pub analysis: Vec<usize>,
    pub assessment: Vec<usize>,
}

impl SplitIndices {
    pub fn materialize(&self, dataset: &Dataset) -> Split {
        Split {
            training: dataset.subset(&self.analysis),
            testing: dataset.subset(&self.assessment),
        }
    }
}

fn check_proportion(proportion: f64) -> Result<(), PipelineError> {
    if proportion > 0.0 && proportion < 1.0 {
        Ok(())
    } else {
        Err(PipelineError::invalid_configuration(format!(
            "split proportion must be in (0, 1), got {proportion}"
        )))
    }
}

fn check_size(n: usize) -> Result<(), PipelineError> {
    if n < 2 {
        return Err(PipelineError::invalid_configuration(format!(
            "need at least 2 records to populate both sides of a split, got {n}"
        )));
    }
    Ok(())
}

/// Number of training records for `n` records at `proportion`, leaving both sides non-empty.
fn training_size(n: usize, proportion: f64) -> usize {
    ((n as f64 * proportion).round() as usize).clamp(1, n - 1)
}

/// Random split positions. Each side is returned in original record order.
pub fn split_indices(
    n: usize,
    proportion: f64,
    seed: u64,
) -> Result<SplitIndices, PipelineError> {
    check_proportion(proportion)?;
    check_size(n)?;

    let mut positions: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    positions.shuffle(&mut rng);

    let mut assessment = positions.split_off(training_size(n, proportion));
    positions.sort_unstable();
    assessment.sort_unstable();
    Ok(SplitIndices {
        analysis: positions,
        assessment,
    })
}

/// Split `dataset` at random into training and testing.
pub fn split(dataset: &Dataset, proportion: f64, seed: u64) -> Result<Split, PipelineError> {
    let indices = split_indices(dataset.len(), proportion, seed)?;
    Ok(indices.materialize(dataset))
}

/// Split positions per class of `label_column` so each class keeps its share.
///
/// Singleton classes go to training.
pub fn stratified_indices(
    dataset: &Dataset,
    label_column: &str,
    proportion: f64,
    seed: u64,
) -> Result<SplitIndices, PipelineError> {
    check_proportion(proportion)?;
    check_size(dataset.len())?;

    let labels = dataset.labels(label_column)?;
    let mut strata: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (pos, label) in labels.iter().enumerate() {
        strata.entry(label.as_str()).or_default().push(pos);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut analysis = Vec::with_capacity(dataset.len());
    let mut assessment = Vec::new();
    for (_, mut members) in strata {
        members.shuffle(&mut rng);
        let take = if members.len() == 1 {
            1
        } else {
            training_size(members.len(), proportion)
        };
        assessment.extend(members.split_off(take));
        analysis.extend(members);
    }

    if assessment.is_empty() {
        return Err(PipelineError::invalid_configuration(
            "stratified split left the testing side empty",
        ));
    }
    analysis.sort_unstable();
    assessment.sort_unstable();
    Ok(SplitIndices {
        analysis,
        assessment,
    })
}

/// Stratified counterpart of [`split`].
pub fn split_stratified(
    dataset: &Dataset,
    label_column: &str,
    proportion: f64,
    seed: u64,
) -> Result<Split, PipelineError> {
    let indices = stratified_indices(dataset, label_column, proportion, seed)?;
    Ok(indices.materialize(dataset))
}

/// V-fold cross-validation: every position lands in exactly one assessment fold.
pub fn vfold(n: usize, folds: usize, seed: u64) -> Result<Vec<SplitIndices>, PipelineError> {
    if folds < 2 || folds > n {
        return Err(PipelineError::invalid_configuration(format!(
            "fold count must be in [2, {n}], got {folds}"
        )));
    }
    let mut positions: Vec<usize> = (0..n).collect();
    positions.shuffle(&mut StdRng::seed_from_u64(seed));

    let mut assignments: Vec<Vec<usize>> = vec![Vec::new(); folds];
    for (i, pos) in positions.into_iter().enumerate() {
        assignments[i % folds].push(pos);
    }

    Ok((0..folds)
        .map(|k| {
            let mut assessment = assignments[k].clone();
            assessment.sort_unstable();
            let mut analysis: Vec<usize> = assignments
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != k)
                .flat_map(|(_, fold)| fold.iter().copied())
                .collect();
            analysis.sort_unstable();
            SplitIndices {
                analysis,
                assessment,
            }
        })
        .collect())
}

const MAX_BOOTSTRAP_DRAWS: usize = 100;

/// One bootstrap resample: `n` draws with replacement, out-of-bag positions for assessment.
pub fn bootstrap_indices(n: usize, seed: u64) -> Result<SplitIndices, PipelineError> {
    check_size(n)?;
    let mut rng = StdRng::seed_from_u64(seed);
    for _ in 0..MAX_BOOTSTRAP_DRAWS {
        let mut drawn = vec![false; n];
        let mut analysis: Vec<usize> = (0..n)
            .map(|_| {
                let pos = rng.gen_range(0..n);
                drawn[pos] = true;
                pos
            })
            .collect();
        let assessment: Vec<usize> = (0..n).filter(|&p| !drawn[p]).collect();
        if !assessment.is_empty() {
            analysis.sort_unstable();
            return Ok(SplitIndices {
                analysis,
                assessment,
            });
        }
    }
    Err(PipelineError::invalid_configuration(
        "bootstrap resample produced no out-of-bag records",
    ))
}

/// `iterations` bootstrap resamples with seeds derived from `seed`.
pub fn bootstrap(
    n: usize,
    iterations: usize,
    seed: u64,
) -> Result<Vec<SplitIndices>, PipelineError> {
    let seeds = SeedSequence::new(seed);
    (0..iterations)
        .map(|i| bootstrap_indices(n, seeds.iteration(i)))
        .collect()
}
