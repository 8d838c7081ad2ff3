//! Graph-object view over a built weight matrix.
//!
//! Consumers that expect a generic spectral-graph object get node degrees,
//! the combinatorial Laplacian `L = D - W` and the symmetric normalized
//! Laplacian `I - D^-1/2 W D^-1/2`, both sparse CSR and built from `W` alone.

use log::{debug, info, warn};
use sprs::{CsMat, TriMat};

use crate::matrix::Affinity;

/// Laplacians of a symmetric weight matrix.
#[derive(Debug, Clone)]
pub struct GraphLaplacian {
    /// Combinatorial Laplacian `D - W`.
    pub matrix: CsMat<f64>,
    pub nnodes: usize,
    degrees: Vec<f64>,
}

impl GraphLaplacian {
    /// `L = D - W`; the diagonal of `W` is ignored.
    pub fn from_weights(weights: &Affinity) -> Self {
        let (n, _) = weights.shape();
        info!("Building graph Laplacian for {} nodes", n);
        let rows: Vec<Vec<(usize, f64)>> = (0..n)
            .map(|i| {
                weights
                    .row(i)
                    .into_iter()
                    .filter(|&(j, w)| j != i && w != 0.0)
                    .collect()
            })
            .collect();
        let degrees: Vec<f64> = rows
            .iter()
            .map(|row| row.iter().map(|&(_, w)| w).sum())
            .collect();

        let mut triplets = TriMat::new((n, n));
        for (i, row) in rows.iter().enumerate() {
            if degrees[i] != 0.0 {
                triplets.add_triplet(i, i, degrees[i]);
            }
            for &(j, w) in row {
                triplets.add_triplet(i, j, -w);
            }
        }
        let matrix: CsMat<f64> = triplets.to_csr();
        debug!("Laplacian nnz {}", matrix.nnz());

        Self {
            matrix,
            nnodes: n,
            degrees,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nnodes, self.nnodes)
    }

    /// Entry `L[i, j]`; panics outside the matrix.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        assert!(
            i < self.nnodes && j < self.nnodes,
            "({i}, {j}) outside a {n}x{n} Laplacian",
            n = self.nnodes
        );
        self.matrix.get(i, j).copied().unwrap_or(0.0)
    }

    /// Weighted degree of every node.
    pub fn degrees(&self) -> &[f64] {
        &self.degrees
    }

    /// `L x`
    pub fn multiply_vector(&self, x: &[f64]) -> Vec<f64> {
        assert_eq!(x.len(), self.nnodes, "vector length must match the node count");
        self.matrix
            .outer_iterator()
            .map(|row| row.iter().map(|(j, &v)| v * x[j]).sum())
            .collect()
    }

    /// Symmetric normalized Laplacian `I - D^-1/2 W D^-1/2`.
    ///
    /// Isolated nodes get an all-zero row and column.
    pub fn normalized(&self) -> CsMat<f64> {
        let inv_sqrt: Vec<f64> = self
            .degrees
            .iter()
            .map(|&d| if d > 0.0 { 1.0 / d.sqrt() } else { 0.0 })
            .collect();
        let mut triplets = TriMat::new((self.nnodes, self.nnodes));
        for (i, row) in self.matrix.outer_iterator().enumerate() {
            for (j, &v) in row.iter() {
                let scaled = if i == j {
                    if self.degrees[i] > 0.0 {
                        1.0
                    } else {
                        0.0
                    }
                } else {
                    v * inv_sqrt[i] * inv_sqrt[j]
                };
                if scaled != 0.0 {
                    triplets.add_triplet(i, j, scaled);
                }
            }
        }
        triplets.to_csr()
    }

    /// Largest `|L[i,j] - L[j,i]|` over stored entries.
    fn max_asymmetry(&self) -> f64 {
        self.matrix
            .outer_iterator()
            .enumerate()
            .flat_map(|(i, row)| {
                row.iter()
                    .map(|(j, &v)| (v - self.get(j, i)).abs())
                    .collect::<Vec<_>>()
            })
            .fold(0.0, f64::max)
    }

    pub fn is_symmetric(&self, tolerance: f64) -> bool {
        self.max_asymmetry() <= tolerance
    }

    /// Zero row sums, nonnegative diagonal and symmetry within `tolerance`.
    pub fn verify_properties(&self, tolerance: f64) -> LaplacianValidation {
        let max_row_sum_error = self
            .matrix
            .outer_iterator()
            .map(|row| row.iter().map(|(_, &v)| v).sum::<f64>().abs())
            .fold(0.0, f64::max);
        let negative_diagonal = (0..self.nnodes).filter(|&i| self.get(i, i) < 0.0).count();
        let max_asymmetry = self.max_asymmetry();
        let validation = LaplacianValidation {
            is_valid: max_row_sum_error <= tolerance
                && negative_diagonal == 0
                && max_asymmetry <= tolerance,
            max_row_sum_error,
            max_asymmetry,
            negative_diagonal,
        };
        if !validation.is_valid {
            warn!("Laplacian check failed: {:?}", validation);
        }
        validation
    }

    /// Degree summary of the graph.
    pub fn statistics(&self) -> LaplacianStats {
        let (min_degree, max_degree) = self
            .degrees
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &d| {
                (lo.min(d), hi.max(d))
            });
        let mean_degree = if self.nnodes == 0 {
            0.0
        } else {
            self.degrees.iter().sum::<f64>() / self.nnodes as f64
        };
        LaplacianStats {
            nnodes: self.nnodes,
            edges: self
                .matrix
                .outer_iterator()
                .enumerate()
                .map(|(i, row)| row.iter().filter(|&(j, _)| j > i).count())
                .sum(),
            min_degree,
            max_degree,
            mean_degree,
            isolated: self.degrees.iter().filter(|&&d| d == 0.0).count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaplacianValidation {
    pub is_valid: bool,
    pub max_row_sum_error: f64,
    pub max_asymmetry: f64,
    /// Nodes whose diagonal entry is negative.
    pub negative_diagonal: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaplacianStats {
    pub nnodes: usize,
    /// Entries above the diagonal.
    pub edges: usize,
    pub min_degree: f64,
    pub max_degree: f64,
    pub mean_degree: f64,
    /// Nodes with zero degree.
    pub isolated: usize,
}
