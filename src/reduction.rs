//! # Dimensionality reduction ahead of neighbor search
//!
//! The graph is built on a reduced representation (`data_nu`) when `n_pca` is
//! set. Three reducers are available:
//!
//! * **PCA** (smartcore) for dense input, centred;
//! * **truncated SVD** (smartcore) for sparse input, no centring so sparsity
//!   patterns are not densified by a mean shift before projection;
//! * **Gaussian random projection**, seeded, with the Johnson–Lindenstrauss
//!   scaling `1/sqrt(r)`. Cheap on wide data and reproducible from the seed
//!   alone, so no projection matrix is stored.
//!
//! The fitted reducer is kept by the graph so new points can be mapped into
//! the same space before extension.

use std::fmt;
use std::str::FromStr;

use log::{debug, info};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smartcore::decomposition::pca::{PCAParameters, PCA};
use smartcore::decomposition::svd::{SVDParameters, SVD};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::data::{dense_from_rows, dense_rows, Data};
use crate::error::{Diagnostic, GraphError, Result};

/// Which reducer to fit when `n_pca` is set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReductionMethod {
    /// PCA for dense input, SVD for sparse input.
    #[default]
    Auto,
    Pca,
    Svd,
    RandomProjection,
}

impl ReductionMethod {
    pub fn name(&self) -> &'static str {
        match self {
            ReductionMethod::Auto => "auto",
            ReductionMethod::Pca => "pca",
            ReductionMethod::Svd => "svd",
            ReductionMethod::RandomProjection => "random_projection",
        }
    }
}

impl fmt::Display for ReductionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ReductionMethod {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(ReductionMethod::Auto),
            "pca" => Ok(ReductionMethod::Pca),
            "svd" => Ok(ReductionMethod::Svd),
            "random_projection" | "random" => Ok(ReductionMethod::RandomProjection),
            _ => Err(GraphError::UnknownName {
                kind: "reduction method",
                name: s.to_string(),
                expected: "['auto', 'pca', 'svd', 'random_projection']",
            }),
        }
    }
}

/// Seeded Gaussian projection regenerated on every call instead of stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImplicitProjection {
    pub(crate) original_dim: usize,
    pub(crate) reduced_dim: usize,
    pub(crate) seed: u64,
}

impl ImplicitProjection {
    pub fn new(original_dim: usize, reduced_dim: usize, seed: u64) -> Self {
        Self {
            original_dim,
            reduced_dim,
            seed,
        }
    }

    pub fn project(&self, query: &[f64]) -> Vec<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let scale = 1.0 / (self.reduced_dim as f64).sqrt();
        let mut result = vec![0.0; self.reduced_dim];
        // the same sample order for every query keeps the matrix implicit
        for &x in query.iter().take(self.original_dim) {
            for r in result.iter_mut() {
                let sample: f64 = StandardNormal.sample(&mut rng);
                *r += x * sample * scale;
            }
        }
        result
    }

    pub fn project_rows(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        debug!(
            "Projecting {} rows {} -> {} dims",
            rows.len(),
            self.original_dim,
            self.reduced_dim
        );
        rows.par_iter().map(|row| self.project(row)).collect()
    }
}

/// A fitted reducer.
pub enum Reducer {
    /// No reduction: `data_nu` is the (densified) input.
    Identity { n_features: usize },
    Pca {
        model: PCA<f64, DenseMatrix<f64>>,
        n_features: usize,
        n_components: usize,
    },
    Svd {
        model: SVD<f64, DenseMatrix<f64>>,
        n_features: usize,
        n_components: usize,
    },
    RandomProjection(ImplicitProjection),
}

impl fmt::Debug for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Reducer::{}({} -> {})",
            self.name(),
            self.n_features(),
            self.n_components()
        )
    }
}

impl Reducer {
    /// Fit on `data` and return the reducer with the reduced representation.
    ///
    /// `n_pca` not smaller than the number of features skips the reduction
    /// with a diagnostic.
    pub fn fit(
        data: &Data,
        n_pca: Option<usize>,
        method: ReductionMethod,
        seed: u64,
    ) -> Result<(Self, Vec<Vec<f64>>, Vec<Diagnostic>)> {
        let (n, f) = data.shape();
        let mut diagnostics = Vec::new();
        let d = match n_pca {
            None => {
                debug!("No reduction requested, using {} features", f);
                return Ok((Reducer::Identity { n_features: f }, data.to_rows(), diagnostics));
            }
            Some(0) => {
                return Err(GraphError::Config("n_pca must be at least 1".to_string()));
            }
            Some(d) if d >= f => {
                diagnostics.push(
                    Diagnostic::ReductionSkipped {
                        n_pca: d,
                        n_features: f,
                    }
                    .emit(),
                );
                return Ok((Reducer::Identity { n_features: f }, data.to_rows(), diagnostics));
            }
            Some(d) => d,
        };

        let method = match method {
            ReductionMethod::Auto if data.is_sparse() => ReductionMethod::Svd,
            ReductionMethod::Auto => ReductionMethod::Pca,
            m => m,
        };
        info!("Reducing {}x{} data to {} dims with {}", n, f, d, method);

        let reducer = match method {
            ReductionMethod::Pca => {
                let model = PCA::fit(&data.to_dense(), PCAParameters::default().with_n_components(d))?;
                Reducer::Pca {
                    model,
                    n_features: f,
                    n_components: d,
                }
            }
            ReductionMethod::Svd => {
                let model = SVD::fit(&data.to_dense(), SVDParameters::default().with_n_components(d))?;
                Reducer::Svd {
                    model,
                    n_features: f,
                    n_components: d,
                }
            }
            ReductionMethod::RandomProjection | ReductionMethod::Auto => {
                Reducer::RandomProjection(ImplicitProjection::new(f, d, seed))
            }
        };
        let reduced = reducer.transform(&data.to_rows())?;
        debug!("Reduced representation: {} x {}", reduced.len(), d);
        Ok((reducer, reduced, diagnostics))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Reducer::Identity { .. } => "identity",
            Reducer::Pca { .. } => "pca",
            Reducer::Svd { .. } => "svd",
            Reducer::RandomProjection(_) => "random_projection",
        }
    }

    /// Input dimensionality.
    pub fn n_features(&self) -> usize {
        match self {
            Reducer::Identity { n_features }
            | Reducer::Pca { n_features, .. }
            | Reducer::Svd { n_features, .. } => *n_features,
            Reducer::RandomProjection(p) => p.original_dim,
        }
    }

    /// Output dimensionality.
    pub fn n_components(&self) -> usize {
        match self {
            Reducer::Identity { n_features } => *n_features,
            Reducer::Pca { n_components, .. } | Reducer::Svd { n_components, .. } => {
                *n_components
            }
            Reducer::RandomProjection(p) => p.reduced_dim,
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Reducer::Identity { .. })
    }

    /// Map rows from the input space to the reduced space.
    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        let f = self.n_features();
        if let Some(bad) = rows.iter().find(|r| r.len() != f) {
            return Err(GraphError::DimensionMismatch {
                expected: f.to_string(),
                found: bad.len(),
            });
        }
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        match self {
            Reducer::Identity { .. } => Ok(rows.to_vec()),
            Reducer::Pca { model, .. } => {
                Ok(dense_rows(&model.transform(&dense_from_rows(rows, f))?))
            }
            Reducer::Svd { model, .. } => {
                Ok(dense_rows(&model.transform(&dense_from_rows(rows, f))?))
            }
            Reducer::RandomProjection(p) => Ok(p.project_rows(rows)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn wide_rows() -> Vec<Vec<f64>> {
        (0..12)
            .map(|i| (0..8).map(|j| ((i * 8 + j) as f64 * 0.13).sin()).collect())
            .collect()
    }

    #[test]
    fn test_projection_is_seeded() {
        let a = ImplicitProjection::new(8, 3, 42);
        let b = ImplicitProjection::new(8, 3, 42);
        let c = ImplicitProjection::new(8, 3, 43);
        let row = wide_rows().remove(1);
        assert_eq!(a.project(&row), b.project(&row));
        assert_ne!(a.project(&row), c.project(&row));
    }

    #[test]
    fn test_projection_is_linear() {
        let p = ImplicitProjection::new(8, 4, 7);
        let rows = wide_rows();
        let sum: Vec<f64> = rows[0].iter().zip(&rows[1]).map(|(a, b)| a + b).collect();
        let lhs = p.project(&sum);
        let rhs: Vec<f64> = p
            .project(&rows[0])
            .iter()
            .zip(p.project(&rows[1]))
            .map(|(a, b)| a + b)
            .collect();
        for (x, y) in lhs.iter().zip(&rhs) {
            assert_relative_eq!(*x, *y, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_skip_when_n_pca_too_large() {
        let data = Data::from_rows(&wide_rows()).unwrap();
        let (reducer, reduced, diags) =
            Reducer::fit(&data, Some(8), ReductionMethod::Auto, 1).unwrap();
        assert!(reducer.is_identity());
        assert_eq!(reduced, wide_rows());
        assert_eq!(
            diags,
            vec![Diagnostic::ReductionSkipped {
                n_pca: 8,
                n_features: 8
            }]
        );
    }

    #[test]
    fn test_pca_transform_matches_fit() {
        let data = Data::from_rows(&wide_rows()).unwrap();
        let (reducer, reduced, _) =
            Reducer::fit(&data, Some(3), ReductionMethod::Pca, 1).unwrap();
        assert_eq!(reducer.n_components(), 3);
        assert_eq!(reduced[0].len(), 3);
        let again = reducer.transform(&wide_rows()).unwrap();
        for (a, b) in reduced.iter().flatten().zip(again.iter().flatten()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-9);
        }
        assert!(reducer.transform(&[vec![0.0; 5]]).unwrap_err().is_data());
    }
}
