//! Batch clustering engine.
//!
//! Density-based clustering (DBSCAN) over pairwise cosine distance,
//! converting a full embedding set into dense person labels scoped to the
//! run. O(n²) time and memory — callers bound scope per group or per run;
//! that is an operational constraint, not an algorithmic one.

use std::collections::{BTreeMap, VecDeque};

use crate::types::Embedding;

/// Default minimum cluster size: a record with no similar neighbor becomes
/// its own singleton person.
pub const DEFAULT_MIN_CLUSTER_SIZE: usize = 1;

/// Parameters for one batch clustering run.
#[derive(Debug, Clone, Copy)]
pub struct ClusterParams {
    /// Cosine similarity threshold τ. Neighborhood radius is eps = 1 − τ.
    /// 0.80 balances precision/recall; 0.85 is strict, 0.70 loose.
    pub threshold: f32,
    /// Minimum neighborhood size (the point itself included) for a core
    /// point. At 1, no record is ever noise.
    pub min_cluster_size: usize,
}

impl ClusterParams {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            min_cluster_size: DEFAULT_MIN_CLUSTER_SIZE,
        }
    }

    /// DBSCAN neighborhood radius in cosine-distance space.
    pub fn eps(&self) -> f32 {
        (1.0 - self.threshold).max(0.0)
    }
}

/// Labeling produced by one run. Labels are dense ids in cluster-discovery
/// order, stable for identical input order and parameters.
#[derive(Debug, Clone)]
pub struct ClusterOutcome {
    /// Per-record label, parallel to the input slice.
    pub labels: Vec<usize>,
    /// Record indices grouped by label, so records sharing a person are
    /// persisted together (one payload write per person, not per face).
    pub clusters: BTreeMap<usize, Vec<usize>>,
}

impl ClusterOutcome {
    pub fn num_clusters(&self) -> usize {
        self.clusters.len()
    }

    pub fn num_records(&self) -> usize {
        self.labels.len()
    }

    fn from_labels(labels: Vec<usize>) -> Self {
        let mut clusters: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (idx, &label) in labels.iter().enumerate() {
            clusters.entry(label).or_default().push(idx);
        }
        Self { labels, clusters }
    }
}

/// Cluster `embeddings` with DBSCAN on precomputed cosine distances.
///
/// Canonical tie rule: points are scanned in input order; a cluster is
/// seeded at the first unvisited core point and expanded breadth-first in
/// ascending point index. A border point reachable from several clusters
/// therefore joins the cluster discovered first. Noise (possible only when
/// `min_cluster_size > 1`) is re-labeled into fresh unique singletons,
/// never merged into one bucket.
pub fn cluster(embeddings: &[Embedding], params: &ClusterParams) -> ClusterOutcome {
    let n = embeddings.len();
    if n == 0 {
        return ClusterOutcome::from_labels(Vec::new());
    }

    let eps = params.eps();
    let min_pts = params.min_cluster_size.max(1);

    // Pairwise cosine distance, clipped to [0, ∞) by Embedding::distance.
    let mut neighbors: Vec<Vec<usize>> = Vec::with_capacity(n);
    for i in 0..n {
        let mut near = Vec::new();
        for j in 0..n {
            if embeddings[i].distance(&embeddings[j]) <= eps {
                near.push(j);
            }
        }
        neighbors.push(near);
    }

    let mut labels: Vec<Option<usize>> = vec![None; n];
    let mut visited = vec![false; n];
    let mut next_label = 0usize;

    for seed in 0..n {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        if neighbors[seed].len() < min_pts {
            // Tentative noise; may still be claimed as a border point.
            continue;
        }

        let label = next_label;
        next_label += 1;
        labels[seed] = Some(label);

        let mut queue: VecDeque<usize> = neighbors[seed].iter().copied().collect();
        while let Some(point) = queue.pop_front() {
            if labels[point].is_none() {
                // Claims tentative noise as a border point too.
                labels[point] = Some(label);
            }
            if visited[point] {
                continue;
            }
            visited[point] = true;
            if neighbors[point].len() >= min_pts {
                queue.extend(neighbors[point].iter().copied());
            }
        }
    }

    // Disambiguate remaining noise into unique singleton persons.
    let mut final_labels = Vec::with_capacity(n);
    for label in labels {
        match label {
            Some(l) => final_labels.push(l),
            None => {
                final_labels.push(next_label);
                next_label += 1;
            }
        }
    }

    let outcome = ClusterOutcome::from_labels(final_labels);
    tracing::debug!(
        records = n,
        clusters = outcome.num_clusters(),
        eps,
        min_pts,
        "batch clustering complete"
    );
    outcome
}
