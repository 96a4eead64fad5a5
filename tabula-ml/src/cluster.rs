//! Label-free clustering: k-means and HDBSCAN.
//!
//! No ground truth is consumed here. Assignments can be cross-tabulated against
//! withheld labels for a qualitative comparison, never scored.

use aprender::cluster::KMeans;
use aprender::traits::UnsupervisedEstimator;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::data::dataset::RecordId;
use crate::error::PipelineError;
use crate::model::{backend_error, to_matrix};
use crate::preprocess::FeatureMatrix;
use crate::seed::SeedSequence;

/// Clustering algorithm with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum ClusterAlgorithm {
    /// Lloyd's algorithm with k-means++ seeding, best of `n_starts` seeded runs.
    KMeans {
        k: usize,
        #[serde(default = "default_max_iterations")]
        max_iterations: usize,
        #[serde(default = "default_n_starts")]
        n_starts: usize,
    },
    /// Density-based hierarchical clustering with excess-of-mass selection.
    Hdbscan {
        min_cluster_size: usize,
        /// Neighborhood size for core distances, counting the point itself.
        /// Defaults to `min_cluster_size`.
        #[serde(default)]
        min_samples: Option<usize>,
    },
}

fn default_max_iterations() -> usize {
    100
}

fn default_n_starts() -> usize {
    10
}

impl ClusterAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Self::KMeans { .. } => "kmeans",
            Self::Hdbscan { .. } => "hdbscan",
        }
    }

    fn validate(&self, n: usize) -> Result<(), PipelineError> {
        match *self {
            Self::KMeans {
                k,
                max_iterations,
                n_starts,
            } => {
                if k == 0 || k > n {
                    return Err(PipelineError::invalid_configuration(format!(
                        "kmeans: k must be in [1, {n}], got {k}"
                    )));
                }
                if max_iterations == 0 || n_starts == 0 {
                    return Err(PipelineError::invalid_configuration(
                        "kmeans: max_iterations and n_starts must be at least 1",
                    ));
                }
                Ok(())
            }
            Self::Hdbscan {
                min_cluster_size,
                min_samples,
            } => {
                if min_cluster_size < 2 {
                    return Err(PipelineError::invalid_configuration(format!(
                        "hdbscan: min_cluster_size must be at least 2, got {min_cluster_size}"
                    )));
                }
                if min_samples == Some(0) {
                    return Err(PipelineError::invalid_configuration(
                        "hdbscan: min_samples must be at least 1",
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Record id → cluster id, with a membership confidence per record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub ids: Vec<RecordId>,
    /// `None` marks noise.
    pub clusters: Vec<Option<usize>>,
    /// In [0, 1]; 0 for noise.
    pub confidence: Vec<f64>,
}

impl ClusterAssignment {
    pub fn n_clusters(&self) -> usize {
        self.clusters
            .iter()
            .flatten()
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn noise_count(&self) -> usize {
        self.clusters.iter().filter(|c| c.is_none()).count()
    }

    pub fn cluster_of(&self, id: RecordId) -> Option<usize> {
        let pos = self.ids.iter().position(|&i| i == id)?;
        self.clusters[pos]
    }

    /// Record id → cluster, the plain shape handed to reporting.
    pub fn as_map(&self) -> BTreeMap<RecordId, Option<usize>> {
        self.ids
            .iter()
            .copied()
            .zip(self.clusters.iter().copied())
            .collect()
    }
}

/// Cluster `features` without looking at any label.
pub fn cluster(
    features: &FeatureMatrix,
    algorithm: &ClusterAlgorithm,
    seed: u64,
) -> Result<ClusterAssignment, PipelineError> {
    if features.is_empty() {
        return Err(PipelineError::invalid_configuration(
            "cannot cluster an empty feature matrix",
        ));
    }
    algorithm.validate(features.len())?;

    let (clusters, confidence) = match *algorithm {
        ClusterAlgorithm::KMeans {
            k,
            max_iterations,
            n_starts,
        } => {
            let labels = kmeans(&features.rows, k, max_iterations, n_starts, seed)?;
            let confidence = vec![1.0; labels.len()];
            (labels.into_iter().map(Some).collect(), confidence)
        }
        ClusterAlgorithm::Hdbscan {
            min_cluster_size,
            min_samples,
        } => hdbscan(
            &features.rows,
            min_cluster_size,
            min_samples.unwrap_or(min_cluster_size),
        ),
    };

    let assignment = ClusterAssignment {
        ids: features.ids.clone(),
        clusters: relabel_by_first_appearance(&clusters),
        confidence,
    };
    tracing::info!(
        algorithm = algorithm.name(),
        rows = features.len(),
        clusters = assignment.n_clusters(),
        noise = assignment.noise_count(),
        "clustering complete"
    );
    Ok(assignment)
}

/// Renumber clusters 0, 1, … in order of first appearance.
fn relabel_by_first_appearance(clusters: &[Option<usize>]) -> Vec<Option<usize>> {
    let mut mapping = BTreeMap::new();
    clusters
        .iter()
        .map(|c| {
            c.map(|c| {
                let next = mapping.len();
                *mapping.entry(c).or_insert(next)
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// k-means
// ---------------------------------------------------------------------------

/// Best of `n_starts` seeded `aprender` runs by within-cluster sum of squares.
fn kmeans(
    rows: &[Vec<f64>],
    k: usize,
    max_iterations: usize,
    n_starts: usize,
    seed: u64,
) -> Result<Vec<usize>, PipelineError> {
    let width = rows.first().map_or(0, Vec::len);
    let x = to_matrix(rows, width)?;
    let seeds = SeedSequence::new(seed);
    let mut best: Option<(Vec<usize>, f32)> = None;
    for start in 0..n_starts {
        let mut estimator = KMeans::new(k)
            .with_max_iter(max_iterations)
            .with_random_state(seeds.iteration(start));
        estimator.fit(&x).map_err(backend_error)?;
        let inertia = estimator.inertia();
        tracing::debug!(start, inertia, "kmeans start");
        if best.as_ref().is_none_or(|(_, b)| inertia < *b) {
            best = Some((estimator.predict(&x), inertia));
        }
    }
    Ok(best.map(|(labels, _)| labels).unwrap_or_default())
}

// ---------------------------------------------------------------------------
// HDBSCAN
// ---------------------------------------------------------------------------

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Density level of a merge distance. Zero distance maps to the largest finite value.
fn lambda(dist: f64) -> f64 {
    if dist > 0.0 { 1.0 / dist } else { f64::MAX }
}

/// Distance from each point to its `min_samples`-th nearest neighbor, itself included.
fn core_distances(rows: &[Vec<f64>], min_samples: usize) -> Vec<f64> {
    let kth = min_samples.min(rows.len()) - 1;
    rows.iter()
        .map(|a| {
            let mut d: Vec<f64> = rows.iter().map(|b| distance(a, b)).collect();
            d.sort_by(f64::total_cmp);
            d[kth]
        })
        .collect()
}

/// Prim's algorithm over the dense mutual-reachability graph.
fn mutual_reachability_mst(rows: &[Vec<f64>], core: &[f64]) -> Vec<(usize, usize, f64)> {
    let n = rows.len();
    let mut in_tree = vec![false; n];
    let mut best = vec![(f64::INFINITY, 0usize); n];
    let mut edges = Vec::with_capacity(n - 1);
    let mut current = 0;
    in_tree[0] = true;
    for _ in 1..n {
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            let mr = distance(&rows[current], &rows[j])
                .max(core[current])
                .max(core[j]);
            if mr < best[j].0 {
                best[j] = (mr, current);
            }
        }
        let mut next = usize::MAX;
        for j in 0..n {
            if !in_tree[j] && (next == usize::MAX || best[j].0 < best[next].0) {
                next = j;
            }
        }
        in_tree[next] = true;
        edges.push((best[next].1, next, best[next].0));
        current = next;
    }
    edges.sort_by(|a, b| a.2.total_cmp(&b.2));
    edges
}

/// One merge of the single-linkage hierarchy. Node `n + i` is the i-th merge.
struct Merge {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

fn single_linkage(n: usize, edges: &[(usize, usize, f64)]) -> Vec<Merge> {
    fn find(uf: &mut [usize], mut x: usize) -> usize {
        while uf[x] != x {
            uf[x] = uf[uf[x]];
            x = uf[x];
        }
        x
    }

    let mut uf: Vec<usize> = (0..2 * n - 1).collect();
    let mut size = vec![1usize; 2 * n - 1];
    let mut merges = Vec::with_capacity(n - 1);
    for (i, &(a, b, d)) in edges.iter().enumerate() {
        let (ra, rb) = (find(&mut uf, a), find(&mut uf, b));
        let node = n + i;
        uf[ra] = node;
        uf[rb] = node;
        size[node] = size[ra] + size[rb];
        merges.push(Merge {
            left: ra,
            right: rb,
            distance: d,
            size: size[node],
        });
    }
    merges
}

/// Edge of the condensed tree: `child` (a point below `n`, or a cluster label
/// at or above `n`) leaves `parent` at density `lambda`.
struct Condensed {
    parent: usize,
    child: usize,
    lambda: f64,
    size: usize,
}

fn condense(n: usize, merges: &[Merge], min_cluster_size: usize) -> Vec<Condensed> {
    let size_of = |node: usize| if node < n { 1 } else { merges[node - n].size };
    let root = 2 * n - 2;

    let mut order = vec![root];
    let mut i = 0;
    while i < order.len() {
        let m = &merges[order[i] - n];
        order.extend([m.left, m.right].into_iter().filter(|&c| c >= n));
        i += 1;
    }

    let mut label = vec![0usize; 2 * n - 1];
    let mut ignore = vec![false; 2 * n - 1];
    label[root] = n;
    let mut next_label = n + 1;
    let mut tree = Vec::new();

    // Every point under `node` falls out of `parent` at `lambda`.
    let fall_out = |node: usize,
                    parent: usize,
                    lambda: f64,
                    ignore: &mut Vec<bool>,
                    tree: &mut Vec<Condensed>| {
        let mut stack = vec![node];
        while let Some(x) = stack.pop() {
            if x < n {
                tree.push(Condensed {
                    parent,
                    child: x,
                    lambda,
                    size: 1,
                });
            } else {
                ignore[x] = true;
                stack.extend([merges[x - n].left, merges[x - n].right]);
            }
        }
    };

    for node in order {
        if ignore[node] {
            continue;
        }
        let m = &merges[node - n];
        let l = lambda(m.distance);
        let parent = label[node];
        let (left, right) = (m.left, m.right);
        let big_left = size_of(left) >= min_cluster_size;
        let big_right = size_of(right) >= min_cluster_size;
        match (big_left, big_right) {
            (true, true) => {
                for child in [left, right] {
                    label[child] = next_label;
                    next_label += 1;
                    tree.push(Condensed {
                        parent,
                        child: label[child],
                        lambda: l,
                        size: size_of(child),
                    });
                }
            }
            (false, false) => {
                fall_out(left, parent, l, &mut ignore, &mut tree);
                fall_out(right, parent, l, &mut ignore, &mut tree);
            }
            (true, false) => {
                label[left] = parent;
                fall_out(right, parent, l, &mut ignore, &mut tree);
            }
            (false, true) => {
                label[right] = parent;
                fall_out(left, parent, l, &mut ignore, &mut tree);
            }
        }
    }
    tree
}

/// Excess-of-mass selection over the condensed tree; the root is never selected.
/// Returns per-point cluster labels and membership probabilities.
fn extract_clusters(n: usize, tree: &[Condensed]) -> (Vec<Option<usize>>, Vec<f64>) {
    let n_clusters = tree
        .iter()
        .map(|e| e.parent.max(e.child))
        .filter(|&c| c >= n)
        .max()
        .map_or(1, |max| max - n + 1);
    let idx = |c: usize| c - n;

    let mut birth = vec![0.0; n_clusters];
    let mut parent_of = vec![None; n_clusters];
    let mut children = vec![Vec::new(); n_clusters];
    let mut death = vec![0.0f64; n_clusters];
    let mut point_parent = vec![n; n];
    let mut point_lambda = vec![0.0; n];
    for e in tree {
        death[idx(e.parent)] = death[idx(e.parent)].max(e.lambda);
        if e.child >= n {
            birth[idx(e.child)] = e.lambda;
            parent_of[idx(e.child)] = Some(e.parent);
            children[idx(e.parent)].push(e.child);
        } else {
            point_parent[e.child] = e.parent;
            point_lambda[e.child] = e.lambda;
        }
    }

    let mut stability = vec![0.0; n_clusters];
    for e in tree {
        stability[idx(e.parent)] += (e.lambda - birth[idx(e.parent)]) * e.size as f64;
    }

    let mut selected = vec![true; n_clusters];
    selected[0] = false;
    for c in (n + 1..n + n_clusters).rev() {
        let subtree: f64 = children[idx(c)].iter().map(|&ch| stability[idx(ch)]).sum();
        if subtree > stability[idx(c)] {
            selected[idx(c)] = false;
            stability[idx(c)] = subtree;
        } else {
            let mut stack = children[idx(c)].clone();
            while let Some(d) = stack.pop() {
                selected[idx(d)] = false;
                stack.extend(children[idx(d)].iter().copied());
            }
        }
    }

    let mut clusters = vec![None; n];
    let mut confidence = vec![0.0; n];
    for p in 0..n {
        let mut c = point_parent[p];
        while c != n {
            if selected[idx(c)] {
                let max_lambda = death[idx(c)];
                confidence[p] = if max_lambda > 0.0 && max_lambda < f64::MAX {
                    point_lambda[p].min(max_lambda) / max_lambda
                } else {
                    1.0
                };
                clusters[p] = Some(c);
                break;
            }
            match parent_of[idx(c)] {
                Some(up) => c = up,
                None => break,
            }
        }
    }
    (clusters, confidence)
}

fn hdbscan(
    rows: &[Vec<f64>],
    min_cluster_size: usize,
    min_samples: usize,
) -> (Vec<Option<usize>>, Vec<f64>) {
    let n = rows.len();
    if n < 2 {
        return (vec![None; n], vec![0.0; n]);
    }
    let core = core_distances(rows, min_samples);
    let edges = mutual_reachability_mst(rows, &core);
    let merges = single_linkage(n, &edges);
    let tree = condense(n, &merges, min_cluster_size);
    extract_clusters(n, &tree)
}

/// Cluster × label counts. Rows are sorted with noise (`None`) first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContingencyTable {
    pub clusters: Vec<Option<usize>>,
    pub labels: Vec<String>,
    pub counts: Vec<Vec<usize>>,
}

impl ContingencyTable {
    pub fn count(&self, cluster: Option<usize>, label: &str) -> usize {
        let row = self.clusters.iter().position(|c| *c == cluster);
        let col = self.labels.iter().position(|l| l == label);
        match (row, col) {
            (Some(i), Some(j)) => self.counts[i][j],
            _ => 0,
        }
    }

    /// Share of records that carry their cluster's most common label.
    pub fn purity(&self) -> f64 {
        let total: usize = self.counts.iter().flatten().sum();
        if total == 0 {
            return 0.0;
        }
        let dominant: usize = self
            .counts
            .iter()
            .map(|row| row.iter().copied().max().unwrap_or(0))
            .sum();
        dominant as f64 / total as f64
    }
}

/// Cross-tabulate cluster assignments against withheld labels, aligned by position.
pub fn cross_tabulate(
    assignment: &ClusterAssignment,
    labels: &[String],
) -> Result<ContingencyTable, PipelineError> {
    if labels.len() != assignment.clusters.len() {
        return Err(PipelineError::schema(format!(
            "{} cluster assignments but {} labels",
            assignment.clusters.len(),
            labels.len()
        )));
    }
    let clusters: Vec<Option<usize>> = assignment
        .clusters
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let label_set: Vec<String> = labels
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut counts = vec![vec![0; label_set.len()]; clusters.len()];
    for (c, l) in assignment.clusters.iter().zip(labels) {
        let i = clusters.binary_search(c).unwrap_or_default();
        let j = label_set.binary_search(l).unwrap_or_default();
        counts[i][j] += 1;
    }
    Ok(ContingencyTable {
        clusters,
        labels: label_set,
        counts,
    })
}
