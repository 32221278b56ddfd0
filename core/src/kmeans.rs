//! Seeded k-means clustering over small dense feature matrices.
//!
//! Seeding is k-means++ driven by a ComponentRng, relocation is plain
//! Lloyd iteration capped at `max_iterations`, and `n_init` independent
//! restarts are run with the lowest-inertia result kept. Ties in the
//! nearest-centroid search go to the lower cluster index, so identical
//! points always terminate with the same assignment.

use crate::{config::ClusteringConfig, rng::ComponentRng};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusteringError {
    #[error("cannot cluster an empty data set")]
    EmptyInput,

    #[error("requested {k} clusters for {n} points")]
    InvalidClusterCount { k: usize, n: usize },

    #[error("row {row} has {found} features, expected {expected}")]
    RaggedInput { row: usize, expected: usize, found: usize },

    #[error("non-finite value in feature row {row}")]
    NonFiniteInput { row: usize },

    #[error("inertia diverged to a non-finite value")]
    NonFiniteInertia,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    pub k:          usize,
    /// Cluster index for each input row.
    pub labels:     Vec<usize>,
    pub centroids:  Vec<Vec<f64>>,
    /// Within-cluster sum of squared distances.
    pub inertia:    f64,
    pub iterations: usize,
}

impl Clustering {
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.k];
        for &label in &self.labels {
            sizes[label] += 1;
        }
        sizes
    }
}

pub fn fit_kmeans(
    points: &[Vec<f64>],
    k: usize,
    config: &ClusteringConfig,
    rng: &mut ComponentRng,
) -> Result<Clustering, ClusteringError> {
    validate(points, k)?;

    let mut best: Option<Clustering> = None;
    for _ in 0..config.n_init.max(1) {
        let candidate = run_once(points, k, config, rng);
        if !candidate.inertia.is_finite() {
            return Err(ClusteringError::NonFiniteInertia);
        }
        let better = best.as_ref().map_or(true, |b| candidate.inertia < b.inertia);
        if better {
            best = Some(candidate);
        }
    }

    best.ok_or(ClusteringError::EmptyInput)
}

fn validate(points: &[Vec<f64>], k: usize) -> Result<(), ClusteringError> {
    let Some(first) = points.first() else {
        return Err(ClusteringError::EmptyInput);
    };
    if k == 0 || k > points.len() {
        return Err(ClusteringError::InvalidClusterCount { k, n: points.len() });
    }
    let dims = first.len();
    for (row, p) in points.iter().enumerate() {
        if p.len() != dims {
            return Err(ClusteringError::RaggedInput { row, expected: dims, found: p.len() });
        }
        if p.iter().any(|v| !v.is_finite()) {
            return Err(ClusteringError::NonFiniteInput { row });
        }
    }
    Ok(())
}

fn run_once(
    points: &[Vec<f64>],
    k: usize,
    config: &ClusteringConfig,
    rng: &mut ComponentRng,
) -> Clustering {
    let mut centroids = seed_plus_plus(points, k, rng);
    let mut labels = vec![0usize; points.len()];
    let mut iterations = 0;

    for _ in 0..config.max_iterations.max(1) {
        iterations += 1;

        for (i, p) in points.iter().enumerate() {
            labels[i] = nearest(p, &centroids).0;
        }

        let mut next = recompute_centroids(points, &labels, &centroids);
        reseed_empty_clusters(points, &labels, &mut next);

        let shift = centroids
            .iter()
            .zip(&next)
            .map(|(a, b)| squared_distance(a, b).sqrt())
            .fold(0.0, f64::max);
        centroids = next;

        if shift <= config.tolerance {
            break;
        }
    }

    // Final assignment against the settled centroids.
    let mut inertia = 0.0;
    for (i, p) in points.iter().enumerate() {
        let (label, dist) = nearest(p, &centroids);
        labels[i] = label;
        inertia += dist;
    }

    Clustering { k, labels, centroids, inertia, iterations }
}

/// k-means++: first centre uniform, the rest sampled proportional to D².
fn seed_plus_plus(points: &[Vec<f64>], k: usize, rng: &mut ComponentRng) -> Vec<Vec<f64>> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.next_index_below(points.len())].clone());

    while centroids.len() < k {
        let weights: Vec<f64> = points.iter().map(|p| nearest(p, &centroids).1).collect();
        let total: f64 = weights.iter().sum();

        let pick = if total > 0.0 {
            let target = rng.next_f64() * total;
            let mut acc = 0.0;
            weights
                .iter()
                .position(|w| {
                    acc += w;
                    acc > target
                })
                .unwrap_or(points.len() - 1)
        } else {
            // every point coincides with a centre already chosen
            rng.next_index_below(points.len())
        };
        centroids.push(points[pick].clone());
    }

    centroids
}

fn recompute_centroids(points: &[Vec<f64>], labels: &[usize], previous: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let dims = points[0].len();
    let mut sums = vec![vec![0.0; dims]; previous.len()];
    let mut counts = vec![0usize; previous.len()];

    for (p, &label) in points.iter().zip(labels) {
        counts[label] += 1;
        for (s, v) in sums[label].iter_mut().zip(p) {
            *s += v;
        }
    }

    sums.into_iter()
        .zip(counts)
        .zip(previous)
        .map(|((sum, count), prev)| {
            if count == 0 {
                prev.clone()
            } else {
                sum.into_iter().map(|s| s / count as f64).collect()
            }
        })
        .collect()
}

/// An empty cluster takes over the point farthest from its own centroid.
fn reseed_empty_clusters(points: &[Vec<f64>], labels: &[usize], centroids: &mut [Vec<f64>]) {
    let mut counts = vec![0usize; centroids.len()];
    for &label in labels {
        counts[label] += 1;
    }

    for cluster in 0..centroids.len() {
        if counts[cluster] > 0 {
            continue;
        }
        let farthest = points
            .iter()
            .enumerate()
            .map(|(i, p)| (i, squared_distance(p, &centroids[labels[i]])))
            .fold((0, -1.0), |acc, cur| if cur.1 > acc.1 { cur } else { acc });
        centroids[cluster] = points[farthest.0].clone();
        counts[cluster] = 1;
    }
}

/// (index, squared distance) of the closest centroid; ties go to the lower index.
fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (i, c) in centroids.iter().enumerate() {
        let d = squared_distance(point, c);
        if d < best.1 {
            best = (i, d);
        }
    }
    best
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}
