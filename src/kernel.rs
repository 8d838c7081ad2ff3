//! Adaptive-bandwidth kernel construction.
//!
//! For each query the bandwidth ε is the distance to its k-th nearest reference
//! point (the point itself counts when queries and references coincide). With
//! no decay the kernel is binary over the ε-ball; with decay `a` the entries are
//! `exp(-(d/ε)^a)`, dropped below the threshold.

use log::{debug, info, trace};

use crate::error::{Diagnostic, GraphError, Result};
use crate::matrix::Affinity;
use crate::metric::Metric;
use crate::neighbors::NeighborSearch;

/// How candidates for each kernel row are collected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NeighborhoodMode {
    /// Only reference points inside the radius where the kernel reaches the threshold.
    Adaptive,
    /// Every reference point is scored, then thresholded.
    Full,
}

/// Kernel configuration shared by graph construction and extension.
#[derive(Clone, Debug, PartialEq)]
pub struct KernelBuilder {
    knn: usize,
    decay: Option<f64>,
    metric: Metric,
    thresh: f64,
    mode: NeighborhoodMode,
}

impl KernelBuilder {
    pub fn new(knn: usize, decay: Option<f64>, metric: Metric, thresh: f64) -> Result<Self> {
        if knn == 0 {
            return Err(GraphError::Config("knn must be at least 1".to_string()));
        }
        if let Some(a) = decay {
            if !(a.is_finite() && a > 0.0) {
                return Err(GraphError::Config(format!(
                    "decay must be a positive number, got {a}"
                )));
            }
        }
        if !(thresh.is_finite() && thresh >= 0.0) {
            return Err(GraphError::Config(format!(
                "thresh must be a nonnegative number, got {thresh}"
            )));
        }
        if decay.is_none() && thresh > 0.0 {
            return Err(GraphError::Config(format!(
                "thresh={thresh} has no effect on a binary kernel, set a decay or thresh=0"
            )));
        }
        Ok(Self {
            knn,
            decay,
            metric,
            thresh,
            mode: NeighborhoodMode::Adaptive,
        })
    }

    pub fn with_mode(mut self, mode: NeighborhoodMode) -> Self {
        self.mode = mode;
        self
    }

    /// Same configuration with another neighbor count.
    pub fn with_knn(&self, knn: usize) -> Self {
        Self {
            knn: knn.max(1),
            ..self.clone()
        }
    }

    pub fn knn(&self) -> usize {
        self.knn
    }

    pub fn decay(&self) -> Option<f64> {
        self.decay
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn thresh(&self) -> f64 {
        self.thresh
    }

    pub fn mode(&self) -> NeighborhoodMode {
        self.mode
    }

    /// A decaying kernel without threshold keeps every entry.
    pub fn dense_output(&self) -> bool {
        self.decay.is_some() && self.thresh == 0.0
    }

    /// Kernel value at distance `d` for bandwidth `eps`.
    ///
    /// A zero bandwidth gives 1 at distance 0 and 0 everywhere else.
    pub fn value(&self, d: f64, eps: f64) -> f64 {
        match self.decay {
            None => {
                if d <= eps {
                    1.0
                } else {
                    0.0
                }
            }
            Some(a) => {
                if eps > 0.0 {
                    (-(d / eps).powf(a)).exp()
                } else if d == 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Distance at which the decaying kernel falls to the threshold.
    fn search_radius(&self, eps: f64) -> f64 {
        match self.decay {
            None => eps,
            Some(_) if self.thresh == 0.0 => f64::INFINITY,
            Some(_) if self.thresh >= 1.0 => 0.0,
            Some(a) => eps * (-self.thresh.ln()).powf(1.0 / a),
        }
    }

    /// Kernel from `queries` to the reference set behind `search`, M×N.
    ///
    /// `self_graph` marks queries that are the reference set itself; only then
    /// are duplicate observations looked for.
    pub fn build(
        &self,
        search: &dyn NeighborSearch,
        queries: &[Vec<f64>],
        self_graph: bool,
    ) -> Result<(Affinity, Vec<Diagnostic>)> {
        let n = search.n_points();
        if n == 0 {
            return Err(GraphError::EmptyData("empty reference set".to_string()));
        }
        if let Some(q) = queries.iter().find(|q| q.len() != search.dim()) {
            return Err(GraphError::DimensionMismatch {
                expected: search.dim().to_string(),
                found: q.len(),
            });
        }
        info!(
            "Building kernel: {} queries x {} references, knn={}, decay={:?}, thresh={}, metric={}",
            queries.len(),
            n,
            self.knn,
            self.decay,
            self.thresh,
            self.metric
        );
        let mut diagnostics = Vec::new();
        let k = self.knn.min(n);
        if k < self.knn {
            diagnostics.push(
                Diagnostic::KnnClamped {
                    requested: self.knn,
                    used: k,
                }
                .emit(),
            );
        }

        let search_k = if self_graph { k.max(2).min(n) } else { k };
        let nearest = search.knn_batch(queries, search_k);
        let eps: Vec<f64> = nearest
            .iter()
            .map(|row| row.get(k - 1).map(|&(_, d)| d).unwrap_or(0.0))
            .collect();
        trace!("Bandwidths computed for {} queries", eps.len());

        if self_graph {
            let duplicates = nearest
                .iter()
                .filter(|row| row.len() >= 2 && row[1].1 == 0.0)
                .count();
            if duplicates > 0 {
                diagnostics.push(Diagnostic::DuplicateObservations { count: duplicates }.emit());
            }
        }

        let candidates = match (self.decay, self.mode) {
            (Some(_), NeighborhoodMode::Full) => search.knn_batch(queries, n),
            _ if self.dense_output() => search.knn_batch(queries, n),
            _ => {
                let radii: Vec<f64> = eps.iter().map(|&e| self.search_radius(e)).collect();
                search.radius_batch(queries, &radii)
            }
        };

        let rows: Vec<Vec<(usize, f64)>> = candidates
            .into_iter()
            .zip(eps.iter())
            .map(|(row, &e)| self.score_row(row, e))
            .collect();

        let (kernel, empty) = self.assemble(rows, n);
        if empty > 0 {
            diagnostics.push(Diagnostic::EmptyKernelRows { count: empty }.emit());
        }
        debug!(
            "Kernel built: shape {:?}, nnz {}, {}",
            kernel.shape(),
            kernel.nnz(),
            if kernel.is_sparse() { "sparse" } else { "dense" }
        );
        Ok((kernel, diagnostics))
    }

    /// Kernel from rows of a precomputed distance matrix.
    pub fn build_from_distances(
        &self,
        distances: &[Vec<f64>],
    ) -> Result<(Affinity, Vec<Diagnostic>)> {
        let n = distances.first().map(|r| r.len()).unwrap_or(0);
        if n == 0 {
            return Err(GraphError::EmptyData("empty distance matrix".to_string()));
        }
        info!(
            "Building kernel from precomputed distances: {}x{}, knn={}, decay={:?}",
            distances.len(),
            n,
            self.knn,
            self.decay
        );
        let mut diagnostics = Vec::new();
        let k = self.knn.min(n);
        if k < self.knn {
            diagnostics.push(
                Diagnostic::KnnClamped {
                    requested: self.knn,
                    used: k,
                }
                .emit(),
            );
        }

        let mut duplicates = 0;
        let rows: Vec<Vec<(usize, f64)>> = distances
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let mut sorted = row.clone();
                sorted.sort_by(|a, b| a.total_cmp(b));
                if row.iter().enumerate().any(|(j, &d)| j != i && d == 0.0) {
                    duplicates += 1;
                }
                let eps = sorted[k - 1];
                let all: Vec<(usize, f64)> = row.iter().copied().enumerate().collect();
                self.score_row(all, eps)
            })
            .collect();
        if duplicates > 0 {
            diagnostics.push(Diagnostic::DuplicateObservations { count: duplicates }.emit());
        }

        let (kernel, empty) = self.assemble(rows, n);
        if empty > 0 {
            diagnostics.push(Diagnostic::EmptyKernelRows { count: empty }.emit());
        }
        Ok((kernel, diagnostics))
    }

    /// Turn `(index, distance)` candidates into thresholded, column-sorted kernel entries.
    fn score_row(&self, candidates: Vec<(usize, f64)>, eps: f64) -> Vec<(usize, f64)> {
        let mut row: Vec<(usize, f64)> = candidates
            .into_iter()
            .map(|(j, d)| (j, self.value(d, eps)))
            .filter(|&(_, v)| v > 0.0 && v >= self.thresh)
            .collect();
        row.sort_unstable_by_key(|&(j, _)| j);
        row
    }

    fn assemble(&self, rows: Vec<Vec<(usize, f64)>>, ncols: usize) -> (Affinity, usize) {
        let empty = rows.iter().filter(|r| r.is_empty()).count();
        (Affinity::from_rows(&rows, ncols, self.dense_output()), empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbors::BruteForceSearch;
    use approx::assert_relative_eq;

    fn line(n: usize) -> Vec<Vec<f64>> {
        (0..n).map(|i| vec![i as f64]).collect()
    }

    #[test]
    fn test_binary_with_thresh_is_rejected() {
        let err = KernelBuilder::new(3, None, Metric::Euclidean, 1e-4).unwrap_err();
        assert!(err.is_configuration());
        assert!(KernelBuilder::new(0, Some(10.0), Metric::Euclidean, 1e-4).is_err());
    }

    #[test]
    fn test_binary_kernel_counts_self() {
        let points = line(5);
        let search = BruteForceSearch::new(points.clone(), Metric::Euclidean, 1);
        let kb = KernelBuilder::new(2, None, Metric::Euclidean, 0.0).unwrap();
        let (k, diags) = kb.build(&search, &points, true).unwrap();
        assert!(k.is_sparse());
        assert!(diags.is_empty());
        // k=2 including self gives ε=1, so both line neighbours are within reach
        assert_eq!(k.row(2), vec![(1, 1.0), (2, 1.0), (3, 1.0)]);
        assert_eq!(k.row(0), vec![(0, 1.0), (1, 1.0)]);
    }

    #[test]
    fn test_decay_kernel_values() {
        let points = line(6);
        let search = BruteForceSearch::new(points.clone(), Metric::Euclidean, 1);
        let kb = KernelBuilder::new(3, Some(2.0), Metric::Euclidean, 0.0).unwrap();
        let (k, _) = kb.build(&search, &points, true).unwrap();
        assert!(!k.is_sparse());
        // row 0: ε = 2
        assert_relative_eq!(k.get(0, 0), 1.0);
        assert_relative_eq!(k.get(0, 2), (-1.0f64).exp());
        assert_relative_eq!(k.get(0, 4), (-4.0f64).exp());
    }

    #[test]
    fn test_threshold_drops_small_entries() {
        let points = line(20);
        let search = BruteForceSearch::new(points.clone(), Metric::Euclidean, 1);
        let t = 1e-3;
        let kb = KernelBuilder::new(3, Some(2.0), Metric::Euclidean, t).unwrap();
        let (k, _) = kb.build(&search, &points, true).unwrap();
        assert!(k.is_sparse());
        for i in 0..20 {
            for (_, v) in k.row(i) {
                assert!(v >= t);
            }
        }
        let full = kb.clone().with_mode(NeighborhoodMode::Full);
        let (kf, _) = full.build(&search, &points, true).unwrap();
        assert!(k.max_abs_diff(&kf) < 1e-12);
    }

    #[test]
    fn test_zero_bandwidth_stays_finite() {
        let points = vec![vec![0.0], vec![0.0], vec![0.0], vec![5.0]];
        let search = BruteForceSearch::new(points.clone(), Metric::Euclidean, 1);
        let kb = KernelBuilder::new(2, Some(10.0), Metric::Euclidean, 0.0).unwrap();
        let (k, diags) = kb.build(&search, &points, true).unwrap();
        assert!(diags
            .iter()
            .any(|d| matches!(d, Diagnostic::DuplicateObservations { count: 3 })));
        for row in k.to_dense_rows() {
            assert!(row.iter().all(|v| v.is_finite()));
        }
        assert_eq!(k.get(0, 1), 1.0);
        assert_eq!(k.get(0, 3), 0.0);
    }

    #[test]
    fn test_precomputed_matches_feature_kernel() {
        let points = line(7);
        let search = BruteForceSearch::new(points.clone(), Metric::Euclidean, 1);
        let kb = KernelBuilder::new(3, Some(5.0), Metric::Euclidean, 1e-4).unwrap();
        let (from_features, _) = kb.build(&search, &points, true).unwrap();
        let dist: Vec<Vec<f64>> = points
            .iter()
            .map(|p| points.iter().map(|q| Metric::Euclidean.distance(p, q)).collect())
            .collect();
        let (from_distances, _) = kb.build_from_distances(&dist).unwrap();
        assert!(from_features.max_abs_diff(&from_distances) < 1e-12);
    }

    #[test]
    fn test_knn_clamped_to_reference_size() {
        let points = line(3);
        let search = BruteForceSearch::new(points.clone(), Metric::Euclidean, 1);
        let kb = KernelBuilder::new(10, None, Metric::Euclidean, 0.0).unwrap();
        let (k, diags) = kb.build(&search, &points, true).unwrap();
        assert_eq!(k.nnz(), 9);
        assert!(diags
            .iter()
            .any(|d| matches!(d, Diagnostic::KnnClamped { requested: 10, used: 3 })));
    }
}
