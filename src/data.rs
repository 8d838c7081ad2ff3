//! Input datasets: dense or sparse feature matrices, or precomputed relations.
//!
//! Both storages are row-major with one observation per row. Data is
//! validated once (non-empty, finite, square when precomputed) and never
//! mutated after a graph has been built from it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::arrays::{Array, Array2};
use smartcore::linalg::basic::matrix::DenseMatrix;
use sprs::CsMat;

use crate::error::{GraphError, Result};

/// Which relation a precomputed square matrix holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precomputed {
    /// Pairwise distances, turned into a kernel with the alpha-decay function.
    Distance,
    /// Affinities used as the kernel, thresholded.
    Affinity,
    /// Adjacency used as the kernel as-is.
    Adjacency,
}

impl Precomputed {
    pub fn name(&self) -> &'static str {
        match self {
            Precomputed::Distance => "distance",
            Precomputed::Affinity => "affinity",
            Precomputed::Adjacency => "adjacency",
        }
    }
}

impl fmt::Display for Precomputed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Precomputed {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "distance" => Ok(Precomputed::Distance),
            "affinity" => Ok(Precomputed::Affinity),
            "adjacency" => Ok(Precomputed::Adjacency),
            _ => Err(GraphError::UnknownName {
                kind: "precomputed kind",
                name: s.to_string(),
                expected: "['distance', 'affinity', 'adjacency']",
            }),
        }
    }
}

/// A dataset: N observations as rows.
#[derive(Clone, Debug)]
pub enum Data {
    Dense(DenseMatrix<f64>),
    Sparse(CsMat<f64>),
}

impl Data {
    /// Build a dense dataset from row vectors.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let n = rows.len();
        if n == 0 {
            return Err(GraphError::EmptyData("no observations".to_string()));
        }
        let f = rows[0].len();
        if f == 0 {
            return Err(GraphError::EmptyData("observations have no features".to_string()));
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != f) {
            return Err(GraphError::LengthMismatch {
                what: "observation",
                expected: f,
                found: bad.len(),
            });
        }
        Ok(Data::Dense(DenseMatrix::from_iterator(
            rows.iter().flatten().copied(),
            n,
            f,
            0,
        )))
    }

    /// (observations, features)
    pub fn shape(&self) -> (usize, usize) {
        match self {
            Data::Dense(m) => m.shape(),
            Data::Sparse(m) => (m.rows(), m.cols()),
        }
    }

    pub fn n_samples(&self) -> usize {
        self.shape().0
    }

    pub fn n_features(&self) -> usize {
        self.shape().1
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, Data::Sparse(_))
    }

    /// Reject empty inputs and any NaN/Inf entry, reporting where it sits.
    pub fn validate(&self) -> Result<()> {
        let (n, f) = self.shape();
        if n == 0 || f == 0 {
            return Err(GraphError::EmptyData(format!("data has shape {n}x{f}")));
        }
        match self {
            Data::Dense(m) => {
                for i in 0..n {
                    for j in 0..f {
                        let v = *m.get((i, j));
                        if !v.is_finite() {
                            return Err(GraphError::NonFinite {
                                row: i,
                                col: j,
                                value: v,
                            });
                        }
                    }
                }
            }
            Data::Sparse(m) => {
                for (i, row) in m.outer_iterator().enumerate() {
                    for (j, &v) in row.iter() {
                        if !v.is_finite() {
                            return Err(GraphError::NonFinite {
                                row: i,
                                col: j,
                                value: v,
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Precomputed relations must be square, finite and nonnegative.
    pub fn validate_precomputed(&self, kind: Precomputed) -> Result<()> {
        let (n, f) = self.shape();
        if n != f {
            return Err(GraphError::NotSquare { rows: n, cols: f });
        }
        self.validate()?;
        for (i, row) in self.to_rows().iter().enumerate() {
            if let Some((j, &v)) = row.iter().enumerate().find(|(_, v)| **v < 0.0) {
                return Err(GraphError::NegativeEntry {
                    kind: kind.name(),
                    row: i,
                    col: j,
                    value: v,
                });
            }
        }
        Ok(())
    }

    /// Densify into row vectors.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        match self {
            Data::Dense(m) => dense_rows(m),
            Data::Sparse(m) => {
                let mut out = vec![vec![0.0; m.cols()]; m.rows()];
                for (i, row) in m.outer_iterator().enumerate() {
                    for (j, &v) in row.iter() {
                        out[i][j] = v;
                    }
                }
                out
            }
        }
    }

    pub fn to_dense(&self) -> DenseMatrix<f64> {
        match self {
            Data::Dense(m) => m.clone(),
            Data::Sparse(_) => {
                let (n, f) = self.shape();
                DenseMatrix::from_iterator(self.to_rows().into_iter().flatten(), n, f, 0)
            }
        }
    }
}

/// Row vectors of a dense matrix.
pub fn dense_rows(m: &DenseMatrix<f64>) -> Vec<Vec<f64>> {
    let (n, _) = m.shape();
    (0..n)
        .map(|i| m.get_row(i).iterator(0).copied().collect())
        .collect()
}

/// Dense matrix from row vectors of equal length `ncols`.
pub fn dense_from_rows(rows: &[Vec<f64>], ncols: usize) -> DenseMatrix<f64> {
    DenseMatrix::from_iterator(rows.iter().flatten().copied(), rows.len(), ncols, 0)
}
