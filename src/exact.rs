//! Exact graph: every pair is scored, or the relation is given up front.

use log::{debug, info};

use crate::data::Precomputed;
use crate::error::{Diagnostic, GraphError, Result};
use crate::graph::DataGraph;
use crate::kernel::{KernelBuilder, NeighborhoodMode};
use crate::matrix::Affinity;
use crate::neighbors::{BruteForceSearch, NeighborSearch};
use crate::params::{GraphType, ParamMap, ParamValue};
use crate::symmetrize::Symmetrizer;

#[derive(Debug)]
pub struct ExactGraph {
    /// Features, or the rows of the precomputed relation.
    data_nu: Vec<Vec<f64>>,
    precomputed: Option<Precomputed>,
    search: Option<BruteForceSearch>,
    kernel_builder: KernelBuilder,
    symmetrizer: Symmetrizer,
    kernel: Affinity,
    weights: Affinity,
    diagnostics: Vec<Diagnostic>,
}

impl ExactGraph {
    /// Score every pair of feature vectors.
    pub fn from_features(
        data_nu: Vec<Vec<f64>>,
        kernel_builder: KernelBuilder,
        symmetrizer: Symmetrizer,
        n_jobs: i32,
    ) -> Result<Self> {
        if kernel_builder.decay().is_none() {
            return Err(GraphError::Incompatible(
                "the exact graph on features needs a decay, use graphtype='knn' for a binary kernel"
                    .to_string(),
            ));
        }
        let kernel_builder = kernel_builder.with_mode(NeighborhoodMode::Full);
        info!(
            "Building exact graph on {} points, knn={}, decay={:?}",
            data_nu.len(),
            kernel_builder.knn(),
            kernel_builder.decay()
        );
        let search = BruteForceSearch::new(data_nu.clone(), kernel_builder.metric(), n_jobs);
        let (kernel, diagnostics) = kernel_builder.build(&search, &data_nu, true)?;
        let weights = symmetrizer.apply(&kernel, None)?;
        debug!("exact graph ready: weights nnz {}", weights.nnz());
        Ok(Self {
            data_nu,
            precomputed: None,
            search: Some(search),
            kernel_builder,
            symmetrizer,
            kernel,
            weights,
            diagnostics,
        })
    }

    /// Use a square relation: distances go through the kernel, affinities are
    /// thresholded, adjacencies are taken as they are.
    pub fn from_precomputed(
        relation: Vec<Vec<f64>>,
        kind: Precomputed,
        kernel_builder: KernelBuilder,
        symmetrizer: Symmetrizer,
    ) -> Result<Self> {
        let n = relation.len();
        if let Some(bad) = relation.iter().find(|r| r.len() != n) {
            return Err(GraphError::NotSquare {
                rows: n,
                cols: bad.len(),
            });
        }
        info!("Building exact graph from precomputed {} ({}x{})", kind, n, n);
        let dense = kernel_builder.thresh() == 0.0;
        let (kernel, diagnostics) = match kind {
            Precomputed::Distance => kernel_builder.build_from_distances(&relation)?,
            Precomputed::Affinity => {
                let t = kernel_builder.thresh();
                let rows: Vec<Vec<(usize, f64)>> = relation
                    .iter()
                    .map(|r| {
                        r.iter()
                            .copied()
                            .enumerate()
                            .filter(|&(_, v)| v > 0.0 && v >= t)
                            .collect()
                    })
                    .collect();
                (Affinity::from_rows(&rows, n, dense), Vec::new())
            }
            Precomputed::Adjacency => (Affinity::from_dense_rows(&relation), Vec::new()),
        };
        let weights = symmetrizer.apply(&kernel, None)?;
        debug!("exact graph ready: weights nnz {}", weights.nnz());
        Ok(Self {
            data_nu: relation,
            precomputed: Some(kind),
            search: None,
            kernel_builder,
            symmetrizer,
            kernel,
            weights,
            diagnostics,
        })
    }

    pub fn precomputed(&self) -> Option<Precomputed> {
        self.precomputed
    }
}

impl DataGraph for ExactGraph {
    fn kind(&self) -> GraphType {
        GraphType::Exact
    }

    fn kernel(&self) -> &Affinity {
        &self.kernel
    }

    fn weights(&self) -> &Affinity {
        &self.weights
    }

    fn data_nu(&self) -> &[Vec<f64>] {
        &self.data_nu
    }

    fn kernel_builder(&self) -> &KernelBuilder {
        &self.kernel_builder
    }

    fn symmetrizer(&self) -> &Symmetrizer {
        &self.symmetrizer
    }

    fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    fn build_kernel_to_data(&self, y_nu: &[Vec<f64>]) -> Result<Affinity> {
        match (&self.search, self.precomputed) {
            (Some(search), None) => {
                let (kernel, _) = self.kernel_builder.build(search, y_nu, false)?;
                Ok(kernel)
            }
            (_, kind) => Err(GraphError::Interpolation(format!(
                "cannot extend a graph built from a precomputed {}, it has no feature space",
                kind.map(|k| k.name()).unwrap_or("relation")
            ))),
        }
    }

    fn set_n_jobs(&mut self, n_jobs: i32) {
        if let Some(search) = self.search.as_mut() {
            search.set_n_jobs(n_jobs);
        }
    }

    fn params(&self, out: &mut ParamMap) {
        self.kernel_params(out);
        out.insert(
            "precomputed".to_string(),
            self.precomputed
                .map(|k| ParamValue::Str(k.name().to_string()))
                .unwrap_or(ParamValue::None),
        );
    }
}
