//! k-nearest-neighbor graph over the reduced representation.

use log::{debug, info};

use crate::error::{Diagnostic, GraphError, Result};
use crate::graph::DataGraph;
use crate::kernel::KernelBuilder;
use crate::matrix::Affinity;
use crate::neighbors::{BruteForceSearch, NeighborSearch};
use crate::params::GraphType;
use crate::symmetrize::Symmetrizer;

#[derive(Debug)]
pub struct KnnGraph {
    data_nu: Vec<Vec<f64>>,
    search: BruteForceSearch,
    kernel_builder: KernelBuilder,
    symmetrizer: Symmetrizer,
    kernel: Affinity,
    weights: Affinity,
    diagnostics: Vec<Diagnostic>,
}

impl KnnGraph {
    pub fn build(
        data_nu: Vec<Vec<f64>>,
        kernel_builder: KernelBuilder,
        symmetrizer: Symmetrizer,
        n_jobs: i32,
    ) -> Result<Self> {
        if kernel_builder.dense_output() {
            return Err(GraphError::Incompatible(
                "a decaying kernel with thresh=0 is dense, use graphtype='exact' or thresh > 0"
                    .to_string(),
            ));
        }
        info!(
            "Building knn graph on {} points, knn={}",
            data_nu.len(),
            kernel_builder.knn()
        );
        let search = BruteForceSearch::new(data_nu.clone(), kernel_builder.metric(), n_jobs);
        let (kernel, diagnostics) = kernel_builder.build(&search, &data_nu, true)?;
        let weights = symmetrizer.apply(&kernel, None)?;
        debug!(
            "knn graph ready: kernel nnz {}, weights nnz {}",
            kernel.nnz(),
            weights.nnz()
        );
        Ok(Self {
            data_nu,
            search,
            kernel_builder,
            symmetrizer,
            kernel,
            weights,
            diagnostics,
        })
    }

    pub fn search(&self) -> &BruteForceSearch {
        &self.search
    }
}

impl DataGraph for KnnGraph {
    fn kind(&self) -> GraphType {
        GraphType::Knn
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
        let (kernel, _) = self.kernel_builder.build(&self.search, y_nu, false)?;
        Ok(kernel)
    }

    fn set_n_jobs(&mut self, n_jobs: i32) {
        self.search.set_n_jobs(n_jobs);
    }
}
