//! Landmark coarsening of a built weight matrix.
//!
//! Observations are clustered in the diffusion embedding of `W`; each cluster
//! is a landmark. Transitions between observations and landmarks aggregate
//! the rows of `W` per cluster, so high-degree observations weigh more in
//! their landmark's transitions.
//!
//! **DETERMINISTIC**: the subspace iteration and k-means are both seeded.

use log::{debug, info, warn};
use smartcore::cluster::kmeans::{KMeans, KMeansParameters};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::data::dense_from_rows;
use crate::error::{GraphError, Result};
use crate::matrix::Affinity;
use crate::spectral::{diffusion_embedding, diffusion_subspace};

/// Lloyd iterations for the landmark k-means.
const KMEANS_MAX_ITER: usize = 100;

#[derive(Clone, Debug)]
pub struct Landmarks {
    n_landmark: usize,
    n_svd: usize,
    seed: u64,
    clusters: Vec<usize>,
    /// N x L, rows sum to one.
    transitions: Affinity,
    /// L x N, rows sum to one.
    pmn: Affinity,
    /// L x L, rows sum to one.
    landmark_op: Affinity,
}

impl Landmarks {
    /// Coarsen `weights` into at most `n_landmark` landmarks.
    pub fn build(weights: &Affinity, n_landmark: usize, n_svd: usize, seed: u64) -> Result<Self> {
        let (n, c) = weights.shape();
        if n != c {
            return Err(GraphError::NotSquare { rows: n, cols: c });
        }
        if n_landmark == 0 || n_svd == 0 {
            return Err(GraphError::Config(
                "n_landmark and n_svd must be at least 1".to_string(),
            ));
        }
        info!(
            "Building {} landmarks over {} points with n_svd={}, seed={}",
            n_landmark, n, n_svd, seed
        );

        let basis = diffusion_subspace(weights, n_svd, seed);
        let embedding = diffusion_embedding(weights, &basis);
        let assignments = kmeans(&embedding, n_landmark, seed)?;
        let clusters = relabel_contiguous(&assignments);
        let n_clusters = clusters.iter().copied().max().map(|m| m + 1).unwrap_or(0);
        if n_clusters < n_landmark {
            warn!(
                "k-means produced {} non-empty clusters out of {} requested",
                n_clusters, n_landmark
            );
        }

        let pmn_raw = aggregate_rows(weights, &clusters, n_clusters);
        let pnm_raw = transpose_rows(&pmn_raw, n);
        let pmn = Affinity::from_rows(&pmn_raw, n, false).row_normalised();
        let transitions = Affinity::from_rows(&pnm_raw, n_clusters, false).row_normalised();

        let mut op = vec![vec![0.0; n_clusters]; n_clusters];
        for (ci, row) in op.iter_mut().enumerate() {
            for (j, v) in pmn.row(ci) {
                for (cj, u) in transitions.row(j) {
                    row[cj] += v * u;
                }
            }
        }
        let landmark_op = Affinity::from_dense_rows(&op);
        debug!(
            "Landmark operator {}x{}, transitions nnz {}",
            n_clusters,
            n_clusters,
            transitions.nnz()
        );

        Ok(Self {
            n_landmark,
            n_svd,
            seed,
            clusters,
            transitions,
            pmn,
            landmark_op,
        })
    }

    /// Requested number of landmarks.
    pub fn n_landmark(&self) -> usize {
        self.n_landmark
    }

    /// Landmarks actually produced (empty clusters are dropped).
    pub fn n_clusters(&self) -> usize {
        self.landmark_op.shape().0
    }

    pub fn n_svd(&self) -> usize {
        self.n_svd
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Landmark of every observation.
    pub fn clusters(&self) -> &[usize] {
        &self.clusters
    }

    /// Observation-to-landmark transitions (N x L).
    pub fn transitions(&self) -> &Affinity {
        &self.transitions
    }

    /// Landmark-to-observation transitions (L x N).
    pub fn landmark_to_points(&self) -> &Affinity {
        &self.pmn
    }

    pub fn landmark_op(&self) -> &Affinity {
        &self.landmark_op
    }

    /// Sum the columns of an M x N kernel per landmark and normalise rows (M x L).
    pub fn aggregate(&self, kernel: &Affinity) -> Affinity {
        let l = self.n_clusters();
        let rows: Vec<Vec<(usize, f64)>> = kernel
            .rows()
            .into_iter()
            .map(|row| {
                let mut acc = vec![0.0; l];
                for (j, v) in row {
                    acc[self.clusters[j]] += v;
                }
                acc.into_iter().enumerate().filter(|&(_, v)| v != 0.0).collect()
            })
            .collect();
        Affinity::from_rows(&rows, l, false).row_normalised()
    }
}

fn kmeans(rows: &[Vec<f64>], k: usize, seed: u64) -> Result<Vec<usize>> {
    let (n, f) = (rows.len(), rows.first().map(|r| r.len()).unwrap_or(0));
    let k = k.min(n);
    let x: DenseMatrix<f64> = dense_from_rows(rows, f);
    let params = KMeansParameters {
        k,
        max_iter: KMEANS_MAX_ITER,
        seed: Some(seed),
    };
    let km: KMeans<f64, usize, DenseMatrix<f64>, Vec<usize>> = KMeans::fit(&x, params)?;
    Ok(km.predict(&x)?)
}

/// Map cluster ids onto `0..L`, keeping their order.
fn relabel_contiguous(assignments: &[usize]) -> Vec<usize> {
    let mut ids: Vec<usize> = assignments.to_vec();
    ids.sort_unstable();
    ids.dedup();
    assignments
        .iter()
        .map(|a| ids.binary_search(a).unwrap_or(0))
        .collect()
}

/// `out[c] = Σ_{i in c} W[i, :]` as sorted sparse rows (L x N).
fn aggregate_rows(weights: &Affinity, clusters: &[usize], l: usize) -> Vec<Vec<(usize, f64)>> {
    let mut out: Vec<Vec<(usize, f64)>> = vec![Vec::new(); l];
    for (i, &c) in clusters.iter().enumerate() {
        out[c].extend(weights.row(i).into_iter().filter(|&(_, v)| v != 0.0));
    }
    for row in out.iter_mut() {
        row.sort_unstable_by_key(|&(j, _)| j);
        let mut merged: Vec<(usize, f64)> = Vec::with_capacity(row.len());
        for &(j, v) in row.iter() {
            match merged.last_mut() {
                Some(last) if last.0 == j => last.1 += v,
                _ => merged.push((j, v)),
            }
        }
        *row = merged;
    }
    out
}

fn transpose_rows(rows: &[Vec<(usize, f64)>], ncols: usize) -> Vec<Vec<(usize, f64)>> {
    let mut out = vec![Vec::new(); ncols];
    for (i, row) in rows.iter().enumerate() {
        for &(j, v) in row {
            out[j].push((i, v));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relabel_contiguous() {
        assert_eq!(relabel_contiguous(&[4, 1, 4, 7]), vec![1, 0, 1, 2]);
    }

    #[test]
    fn test_aggregate_rows_sums_members() {
        let w = Affinity::from_rows(
            &[
                vec![(1, 1.0), (2, 2.0)],
                vec![(0, 1.0)],
                vec![(0, 2.0)],
            ],
            3,
            false,
        );
        let agg = aggregate_rows(&w, &[0, 1, 1], 2);
        assert_eq!(agg[0], vec![(1, 1.0), (2, 2.0)]);
        assert_eq!(agg[1], vec![(0, 3.0)]);
        assert_eq!(transpose_rows(&agg, 3)[0], vec![(1, 3.0)]);
    }
}
