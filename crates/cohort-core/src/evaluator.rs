//! Clustering quality evaluator.
//!
//! Aggregate quality signals for a completed batch run. Side-effect free;
//! consumers use it for reporting and alerting (flag purity < 0.8 or
//! silhouette < 0.3), never to block a run.

use serde::{Deserialize, Serialize};

use crate::types::Embedding;

/// Quality signals for one labeling of an embedding set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterMetrics {
    pub total_faces: usize,
    pub total_persons: usize,
    pub avg_faces_per_person: f32,
    pub max_faces_per_person: usize,
    pub single_face_persons: usize,
    /// Silhouette coefficient on cosine distance; 0.0 when undefined
    /// (fewer than 2 clusters). Points in singleton clusters contribute 0.
    pub silhouette_score: f32,
    /// Mean intra-cluster pairwise similarity, averaged across clusters.
    /// Singleton clusters contribute 1.0.
    pub avg_cluster_purity: f32,
}

/// Coarse banding of a run by silhouette, for operator-facing summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityBand {
    Good,
    Fair,
    Poor,
}

impl ClusterMetrics {
    pub fn quality_band(&self) -> QualityBand {
        if self.silhouette_score > 0.5 {
            QualityBand::Good
        } else if self.silhouette_score > 0.3 {
            QualityBand::Fair
        } else {
            QualityBand::Poor
        }
    }
}

/// Evaluate a labeling. `labels` is parallel to `embeddings`; an empty
/// input yields zeroed metrics.
pub fn evaluate(embeddings: &[Embedding], labels: &[usize]) -> ClusterMetrics {
    debug_assert_eq!(embeddings.len(), labels.len());
    let n = embeddings.len().min(labels.len());
    if n == 0 {
        return ClusterMetrics::default();
    }

    let mut clusters: std::collections::BTreeMap<usize, Vec<usize>> = Default::default();
    for (idx, &label) in labels.iter().take(n).enumerate() {
        clusters.entry(label).or_default().push(idx);
    }

    let sizes: Vec<usize> = clusters.values().map(Vec::len).collect();
    let max_size = sizes.iter().copied().max().unwrap_or(0);
    let singletons = sizes.iter().filter(|&&s| s == 1).count();
    let avg_size = n as f32 / clusters.len() as f32;

    ClusterMetrics {
        total_faces: n,
        total_persons: clusters.len(),
        avg_faces_per_person: avg_size,
        max_faces_per_person: max_size,
        single_face_persons: singletons,
        silhouette_score: silhouette(embeddings, &clusters, n),
        avg_cluster_purity: purity(embeddings, &clusters),
    }
}

/// Mean silhouette coefficient over all points, on cosine distance.
fn silhouette(
    embeddings: &[Embedding],
    clusters: &std::collections::BTreeMap<usize, Vec<usize>>,
    n: usize,
) -> f32 {
    if clusters.len() < 2 {
        return 0.0;
    }

    let mut total = 0.0f32;
    for (label, members) in clusters {
        for &i in members {
            if members.len() < 2 {
                // Singleton cluster: silhouette defined as 0.
                continue;
            }

            let a: f32 = members
                .iter()
                .filter(|&&j| j != i)
                .map(|&j| embeddings[i].distance(&embeddings[j]))
                .sum::<f32>()
                / (members.len() - 1) as f32;

            let b = clusters
                .iter()
                .filter(|(other, _)| *other != label)
                .map(|(_, others)| {
                    others
                        .iter()
                        .map(|&j| embeddings[i].distance(&embeddings[j]))
                        .sum::<f32>()
                        / others.len() as f32
                })
                .fold(f32::INFINITY, f32::min);

            let denom = a.max(b);
            if denom > 0.0 {
                total += (b - a) / denom;
            }
        }
    }
    total / n as f32
}

/// Mean intra-cluster pairwise similarity, averaged across clusters.
fn purity(
    embeddings: &[Embedding],
    clusters: &std::collections::BTreeMap<usize, Vec<usize>>,
) -> f32 {
    if clusters.is_empty() {
        return 0.0;
    }

    let mut sum = 0.0f32;
    for members in clusters.values() {
        if members.len() < 2 {
            sum += 1.0;
            continue;
        }
        let mut pair_sum = 0.0f32;
        let mut pairs = 0usize;
        for (pos, &i) in members.iter().enumerate() {
            for &j in &members[pos + 1..] {
                pair_sum += embeddings[i].similarity(&embeddings[j]);
                pairs += 1;
            }
        }
        sum += pair_sum / pairs as f32;
    }
    sum / clusters.len() as f32
}
