//! K-means clustering over flat coordinate samples.
//!
//! Partitions `n` samples of dimension `d` into `k` groups by minimizing the
//! **within-cluster sum of squares**:
//!
//! ```text
//! WCSS = Σₖ Σᵢ∈Cₖ ||xᵢ - μₖ||²
//! ```
//!
//! Used to recover the positions of the individual objects hidden in a
//! merger: the raw pixel/voxel coordinates of the merged detection are split
//! into as many groups as the merger stands for, and each group's mean is one
//! object's center.
//!
//! # Lloyd's Algorithm
//!
//! 1. Initialize k centroids with k-means++
//! 2. **Assign**: each sample → nearest centroid
//! 3. **Update**: each centroid → mean of its samples
//! 4. Repeat until the centroids stop moving
//!
//! The last step of every iteration is an update, so the returned centers are
//! always the means of their final assignment. With `k = 1` this is exactly
//! the sample mean.
//!
//! # Determinism
//!
//! Initialization draws from a seeded RNG (fixed default seed), several
//! initializations are tried and the lowest-WCSS one is kept, and the
//! returned centers are sorted lexicographically, so the same input always
//! gives the same output in the same order.
//!
//! # Empty Clusters
//!
//! A cluster that loses all its samples keeps its previous center.

use ndarray::{Array2, ArrayView1};
use rand::prelude::*;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::{Error, Result};

/// Default seed for centroid initialization.
pub const DEFAULT_SEED: u64 = 42;

/// K-means clustering of flat coordinate samples.
#[derive(Debug, Clone)]
pub struct Kmeans {
    /// Number of clusters.
    k: usize,
    /// Coordinates per sample.
    dim: usize,
    /// Maximum iterations.
    max_iter: usize,
    /// Convergence tolerance on the squared centroid shift.
    tol: f64,
    /// Random seed.
    seed: u64,
    /// Independent initializations; the lowest-WCSS run wins.
    n_init: usize,
}

/// Result of [`Kmeans::fit`].
#[derive(Debug, Clone)]
pub struct KmeansFit {
    /// Cluster label per sample, consistent with the row order of `centers`.
    pub labels: Vec<usize>,
    /// One center per row, sorted lexicographically.
    pub centers: Array2<f32>,
    /// Lloyd iterations performed by the winning run.
    pub iterations: usize,
}

impl Kmeans {
    /// Create a clusterer for `k` clusters of 3-D samples.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            dim: 3,
            max_iter: 100,
            tol: 1e-4,
            seed: DEFAULT_SEED,
            n_init: 10,
        }
    }

    /// Set the number of coordinates per sample.
    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = dim;
        self
    }

    /// Set maximum iterations. Must be at least 1.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set convergence tolerance.
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the number of independent initializations.
    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    /// Number of clusters.
    pub fn n_clusters(&self) -> usize {
        self.k
    }

    /// Cluster `samples` and return the `k * dim` flat center coordinates.
    pub fn centers(&self, samples: &[f32]) -> Result<Vec<f32>> {
        let fit = self.fit(samples)?;
        Ok(fit.centers.iter().copied().collect())
    }

    /// Cluster `samples` and return labels and centers.
    pub fn fit(&self, samples: &[f32]) -> Result<KmeansFit> {
        if self.k == 0 {
            return Err(Error::InvalidParameter {
                name: "k",
                message: "at least one cluster is required",
            });
        }
        if self.max_iter == 0 {
            return Err(Error::InvalidParameter {
                name: "max_iter",
                message: "at least one iteration is required",
            });
        }
        let data = to_matrix(samples, self.dim)?;
        let n = data.nrows();
        if self.k > n {
            return Err(Error::InvalidClusterCount {
                requested: self.k,
                n_items: n,
            });
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best: Option<(f32, Array2<f32>, Vec<usize>, usize)> = None;
        for run in 0..self.n_init.max(1) {
            let (centroids, labels, iterations) = self.lloyd(&data, &mut rng);
            let inertia = inertia(&data, &centroids, &labels);
            log::trace!("kmeans run {run}: inertia {inertia} after {iterations} iterations");
            if best.as_ref().map_or(true, |(b, ..)| inertia < *b) {
                best = Some((inertia, centroids, labels, iterations));
            }
        }
        let (_, centroids, labels, iterations) = best.ok_or(Error::EmptyInput)?;

        let (centers, labels) = sort_centers(centroids, labels);
        Ok(KmeansFit {
            labels,
            centers,
            iterations,
        })
    }

    /// One k-means++ initialization followed by Lloyd iterations.
    fn lloyd(&self, data: &Array2<f32>, rng: &mut StdRng) -> (Array2<f32>, Vec<usize>, usize) {
        let mut centroids = self.init_centroids(data, rng);
        let mut labels = vec![0usize; data.nrows()];
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.max_iter {
            iterations += 1;
            self.assign(data, &centroids, &mut labels);

            let new_centroids = self.update(data, &labels, &centroids);
            let shift: f32 = centroids
                .iter()
                .zip(new_centroids.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum();
            centroids = new_centroids;

            if shift < self.tol as f32 {
                converged = true;
                break;
            }
        }
        if !converged {
            log::warn!(
                "kmeans (k={}) stopped after {} iterations without converging",
                self.k,
                iterations
            );
        }
        (centroids, labels, iterations)
    }

    /// Initialize centroids using k-means++.
    fn init_centroids(&self, data: &Array2<f32>, rng: &mut StdRng) -> Array2<f32> {
        let n = data.nrows();
        let mut centroids = Array2::zeros((self.k, self.dim));

        let first = rng.random_range(0..n);
        centroids.row_mut(0).assign(&data.row(first));

        for i in 1..self.k {
            let distances: Vec<f32> = (0..n)
                .map(|j| {
                    let point = data.row(j);
                    (0..i)
                        .map(|c| squared_distance(&point, &centroids.row(c)))
                        .fold(f32::MAX, f32::min)
                })
                .collect();

            // Sample proportional to squared distance
            let total: f32 = distances.iter().sum();
            let selected = if total == 0.0 {
                rng.random_range(0..n)
            } else {
                let threshold = rng.random::<f32>() * total;
                let mut cumsum = 0.0;
                let mut selected = n - 1;
                for (j, &d) in distances.iter().enumerate() {
                    cumsum += d;
                    if d > 0.0 && cumsum >= threshold {
                        selected = j;
                        break;
                    }
                }
                selected
            };

            centroids.row_mut(i).assign(&data.row(selected));
        }

        centroids
    }

    fn assign(&self, data: &Array2<f32>, centroids: &Array2<f32>, labels: &mut [usize]) {
        #[cfg(feature = "parallel")]
        labels.par_iter_mut().enumerate().for_each(|(i, label)| {
            *label = nearest(&data.row(i), centroids);
        });

        #[cfg(not(feature = "parallel"))]
        for (i, label) in labels.iter_mut().enumerate() {
            *label = nearest(&data.row(i), centroids);
        }
    }

    fn update(&self, data: &Array2<f32>, labels: &[usize], previous: &Array2<f32>) -> Array2<f32> {
        let (mut centers, counts) = sum_by_label(data, labels, self.k);
        for (k, &count) in counts.iter().enumerate() {
            if count > 0 {
                centers.row_mut(k).mapv_inplace(|v| v / count as f32);
            } else {
                centers.row_mut(k).assign(&previous.row(k));
            }
        }
        centers
    }
}

/// View a flat sample array as an `n x dim` matrix.
pub fn to_matrix(samples: &[f32], dim: usize) -> Result<Array2<f32>> {
    if dim == 0 {
        return Err(Error::InvalidParameter {
            name: "dim",
            message: "dimension must be positive",
        });
    }
    if samples.is_empty() {
        return Err(Error::EmptyInput);
    }
    if samples.len() % dim != 0 {
        return Err(Error::DimensionMismatch {
            expected: dim,
            found: samples.len(),
        });
    }
    Array2::from_shape_vec((samples.len() / dim, dim), samples.to_vec())
        .map_err(|_| Error::DimensionMismatch {
            expected: dim,
            found: samples.len(),
        })
}

/// Mean of the samples carrying each label.
///
/// Clusters without samples get an all-zero center.
pub fn centers_from_labels(data: &Array2<f32>, labels: &[usize], k: usize) -> Result<Array2<f32>> {
    if labels.len() != data.nrows() {
        return Err(Error::DimensionMismatch {
            expected: data.nrows(),
            found: labels.len(),
        });
    }
    if let Some(&bad) = labels.iter().find(|&&l| l >= k) {
        return Err(Error::InvalidClusterCount {
            requested: bad + 1,
            n_items: k,
        });
    }
    let (mut centers, counts) = sum_by_label(data, labels, k);
    for (c, &count) in counts.iter().enumerate() {
        if count > 0 {
            centers.row_mut(c).mapv_inplace(|v| v / count as f32);
        }
    }
    Ok(centers)
}

fn sum_by_label(data: &Array2<f32>, labels: &[usize], k: usize) -> (Array2<f32>, Vec<usize>) {
    let mut sums = Array2::zeros((k, data.ncols()));
    let mut counts = vec![0usize; k];
    for (i, &label) in labels.iter().enumerate() {
        let mut row = sums.row_mut(label);
        row += &data.row(i);
        counts[label] += 1;
    }
    (sums, counts)
}

fn nearest(point: &ArrayView1<'_, f32>, centroids: &Array2<f32>) -> usize {
    let mut best_cluster = 0;
    let mut best_dist = f32::MAX;
    for (k, centroid) in centroids.rows().into_iter().enumerate() {
        let dist = squared_distance(point, &centroid);
        if dist < best_dist {
            best_dist = dist;
            best_cluster = k;
        }
    }
    best_cluster
}

fn inertia(data: &Array2<f32>, centroids: &Array2<f32>, labels: &[usize]) -> f32 {
    labels
        .iter()
        .enumerate()
        .map(|(i, &l)| squared_distance(&data.row(i), &centroids.row(l)))
        .sum()
}

fn squared_distance(a: &ArrayView1<'_, f32>, b: &ArrayView1<'_, f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Sort centers lexicographically and relabel samples to match.
fn sort_centers(centers: Array2<f32>, labels: Vec<usize>) -> (Array2<f32>, Vec<usize>) {
    let mut order: Vec<usize> = (0..centers.nrows()).collect();
    order.sort_by(|&a, &b| {
        centers
            .row(a)
            .iter()
            .zip(centers.row(b).iter())
            .map(|(x, y)| x.total_cmp(y))
            .find(|o| o.is_ne())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let mut rank = vec![0usize; order.len()];
    let mut sorted = Array2::zeros(centers.raw_dim());
    for (new, &old) in order.iter().enumerate() {
        rank[old] = new;
        sorted.row_mut(new).assign(&centers.row(old));
    }
    let labels = labels.into_iter().map(|l| rank[l]).collect();
    (sorted, labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn splits_two_groups_2d() {
        let samples = [0.0, 0.0, 0.0, 2.0, 4.0, 0.0, 4.0, 2.0];
        let centers = Kmeans::new(2).with_dim(2).centers(&samples).unwrap();
        assert_eq!(centers.len(), 4);
        assert!(approx(centers[0], 0.0) && approx(centers[1], 1.0));
        assert!(approx(centers[2], 4.0) && approx(centers[3], 1.0));
    }

    #[test]
    fn single_cluster_is_the_mean() {
        let samples = [1.0, 2.0, 3.0, 3.0, 4.0, 5.0, 8.0, 0.0, 1.0];
        let centers = Kmeans::new(1).centers(&samples).unwrap();
        assert!(approx(centers[0], 4.0));
        assert!(approx(centers[1], 2.0));
        assert!(approx(centers[2], 3.0));
    }

    #[test]
    fn labels_follow_sorted_centers() {
        let samples = [10.0, 10.0, 10.1, 10.1, 0.0, 0.0, 0.1, 0.1];
        let fit = Kmeans::new(2).with_dim(2).fit(&samples).unwrap();
        assert_eq!(fit.labels, vec![1, 1, 0, 0]);
        assert!(fit.centers[[0, 0]] < fit.centers[[1, 0]]);
    }

    #[test]
    fn k_equals_n() {
        let samples = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
        let fit = Kmeans::new(3).with_dim(2).fit(&samples).unwrap();
        let unique: std::collections::HashSet<_> = fit.labels.iter().collect();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn deterministic_with_seed() {
        let samples: Vec<f32> = (0..60).map(|i| ((i * 7) % 13) as f32).collect();
        let a = Kmeans::new(4).with_seed(7).centers(&samples).unwrap();
        let b = Kmeans::new(4).with_seed(7).centers(&samples).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn duplicate_points_do_not_crash() {
        let samples = [1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        let centers = Kmeans::new(3).with_dim(2).centers(&samples).unwrap();
        assert_eq!(centers.len(), 6);
        assert!(centers.iter().all(|&c| approx(c, 1.0)));
    }

    #[test]
    fn rejects_ragged_samples() {
        let err = Kmeans::new(1).centers(&[1.0, 2.0, 3.0, 4.0]).unwrap_err();
        assert_eq!(
            err,
            Error::DimensionMismatch {
                expected: 3,
                found: 4
            }
        );
    }

    #[test]
    fn rejects_too_many_clusters() {
        let err = Kmeans::new(3).with_dim(2).centers(&[0.0, 0.0, 1.0, 1.0]).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidClusterCount {
                requested: 3,
                n_items: 2
            }
        );
    }

    #[test]
    fn rejects_empty_and_zero_k() {
        assert_eq!(Kmeans::new(1).centers(&[]), Err(Error::EmptyInput));
        assert!(matches!(
            Kmeans::new(0).centers(&[1.0, 2.0, 3.0]),
            Err(Error::InvalidParameter { name: "k", .. })
        ));
    }

    #[test]
    fn zero_iterations_rejected() {
        let samples = [1.0, 2.0, 3.0, 3.0, 4.0, 5.0];
        assert!(matches!(
            Kmeans::new(1).with_max_iter(0).centers(&samples),
            Err(Error::InvalidParameter { name: "max_iter", .. })
        ));
        // a single step already yields the mean
        let centers = Kmeans::new(1).with_max_iter(1).centers(&samples).unwrap();
        assert!(approx(centers[0], 2.0) && approx(centers[1], 3.0) && approx(centers[2], 4.0));
    }

    #[test]
    fn centers_from_labels_averages() {
        let data = to_matrix(&[0.0, 0.0, 2.0, 2.0, 5.0, 5.0], 2).unwrap();
        let centers = centers_from_labels(&data, &[0, 0, 2], 3).unwrap();
        assert!(approx(centers[[0, 0]], 1.0));
        assert!(approx(centers[[1, 0]], 0.0));
        assert!(approx(centers[[2, 1]], 5.0));
        assert!(centers_from_labels(&data, &[0, 1], 2).is_err());
    }
}
