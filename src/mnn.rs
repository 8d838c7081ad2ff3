//! Batch-corrected (mutual nearest neighbor) graph.
//!
//! Every ordered pair of batches `(i, j)` gets its own kernel block with batch
//! `j` as the reference set and batch `i` as the queries. Within-batch blocks
//! are scaled by `beta`; cross-batch blocks use a neighbor count adapted to the
//! size of the reference batch. Blocks are written back at the observations'
//! original positions, so the assembled kernel does not depend on how the label
//! values are spelled, then symmetrized over the whole graph.

use log::{debug, info, trace};

use crate::batch::{AdaptiveK, BatchLabels};
use crate::error::{Diagnostic, GraphError, Result};
use crate::graph::DataGraph;
use crate::kernel::KernelBuilder;
use crate::matrix::Affinity;
use crate::neighbors::{BruteForceSearch, WorkerPool};
use crate::params::{GraphType, ParamMap, ParamValue};
use crate::symmetrize::Symmetrizer;

#[derive(Debug)]
pub struct MnnGraph {
    data_nu: Vec<Vec<f64>>,
    labels: BatchLabels,
    members: Vec<Vec<usize>>,
    sizes: Vec<usize>,
    searches: Vec<BruteForceSearch>,
    kernel_builder: KernelBuilder,
    symmetrizer: Symmetrizer,
    beta: f64,
    adaptive_k: AdaptiveK,
    kernel: Affinity,
    weights: Affinity,
    diagnostics: Vec<Diagnostic>,
}

impl MnnGraph {
    pub fn build(
        data_nu: Vec<Vec<f64>>,
        labels: BatchLabels,
        kernel_builder: KernelBuilder,
        symmetrizer: Symmetrizer,
        beta: f64,
        adaptive_k: AdaptiveK,
        n_jobs: i32,
    ) -> Result<Self> {
        let n = data_nu.len();
        labels.check_len(n)?;
        if labels.n_batches() < 2 {
            return Err(GraphError::Config(format!(
                "batch correction needs at least two distinct sample labels, got {}",
                labels.n_batches()
            )));
        }
        if !(0.0..=1.0).contains(&beta) {
            return Err(GraphError::Config(format!("beta must be in [0, 1], got {beta}")));
        }
        let members = labels.members();
        let sizes = labels.sizes();
        info!(
            "Building mnn graph: {} points in {} batches {:?}, knn={}, beta={}, adaptive_k={}",
            n,
            labels.n_batches(),
            sizes,
            kernel_builder.knn(),
            beta,
            adaptive_k
        );

        let batch_points: Vec<Vec<Vec<f64>>> = members
            .iter()
            .map(|m| m.iter().map(|&i| data_nu[i].clone()).collect())
            .collect();
        let workers = WorkerPool::new(n_jobs);
        let searches: Vec<BruteForceSearch> = batch_points
            .iter()
            .map(|pts| {
                BruteForceSearch::with_pool(pts.clone(), kernel_builder.metric(), workers.clone())
            })
            .collect();

        let blocks = Blocks {
            searches: &searches,
            members: &members,
            sizes: &sizes,
            kernel_builder: &kernel_builder,
            beta,
            adaptive_k,
        };
        let mut rows: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        let mut diagnostics = Vec::new();
        for (bi, queries) in batch_points.iter().enumerate() {
            let (block_rows, block_diags) = blocks.score(queries, Some(bi), true)?;
            diagnostics.extend(block_diags);
            for (r, row) in block_rows.into_iter().enumerate() {
                rows[members[bi][r]] = row;
            }
        }

        let kernel = Affinity::from_rows(&rows, n, kernel_builder.dense_output());
        let weights = symmetrizer.apply(&kernel, Some(labels.codes()))?;
        debug!(
            "mnn graph ready: kernel nnz {}, weights nnz {}",
            kernel.nnz(),
            weights.nnz()
        );
        Ok(Self {
            data_nu,
            labels,
            members,
            sizes,
            searches,
            kernel_builder,
            symmetrizer,
            beta,
            adaptive_k,
            kernel,
            weights,
            diagnostics,
        })
    }

    fn blocks(&self) -> Blocks<'_> {
        Blocks {
            searches: &self.searches,
            members: &self.members,
            sizes: &self.sizes,
            kernel_builder: &self.kernel_builder,
            beta: self.beta,
            adaptive_k: self.adaptive_k,
        }
    }

    /// Kernel from new points with known batches to the stored data (M x N).
    ///
    /// Every point is scored the way observations of its batch were during
    /// construction: `beta` and the base k against its own batch, the adapted
    /// k against the others. Extending the stored data with its own codes
    /// reproduces the stored kernel.
    pub fn build_kernel_to_batches(&self, y_nu: &[Vec<f64>], codes: &[usize]) -> Result<Affinity> {
        if codes.len() != y_nu.len() {
            return Err(GraphError::LengthMismatch {
                what: "sample_idx",
                expected: y_nu.len(),
                found: codes.len(),
            });
        }
        if let Some(&bad) = codes.iter().find(|&&c| c >= self.labels.n_batches()) {
            return Err(GraphError::Config(format!(
                "batch code {bad} out of range for {} batches",
                self.labels.n_batches()
            )));
        }
        let blocks = self.blocks();
        let mut rows: Vec<Vec<(usize, f64)>> = vec![Vec::new(); y_nu.len()];
        for bi in 0..self.labels.n_batches() {
            let positions: Vec<usize> = (0..codes.len()).filter(|&r| codes[r] == bi).collect();
            if positions.is_empty() {
                continue;
            }
            let queries: Vec<Vec<f64>> = positions.iter().map(|&r| y_nu[r].clone()).collect();
            let (block_rows, _) = blocks.score(&queries, Some(bi), false)?;
            for (&r, row) in positions.iter().zip(block_rows) {
                rows[r] = row;
            }
        }
        Ok(Affinity::from_rows(
            &rows,
            self.data_nu.len(),
            self.kernel_builder.dense_output(),
        ))
    }

    pub fn labels(&self) -> &BatchLabels {
        &self.labels
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn adaptive_k(&self) -> AdaptiveK {
        self.adaptive_k
    }
}

impl DataGraph for MnnGraph {
    fn kind(&self) -> GraphType {
        GraphType::Mnn
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

    /// New points carry no batch: each batch scores them with the base k and
    /// no `beta`. Use [`MnnGraph::build_kernel_to_batches`] when the batches
    /// of the new points are known.
    fn build_kernel_to_data(&self, y_nu: &[Vec<f64>]) -> Result<Affinity> {
        let (rows, _) = self.blocks().score(y_nu, None, false)?;
        Ok(Affinity::from_rows(
            &rows,
            self.data_nu.len(),
            self.kernel_builder.dense_output(),
        ))
    }

    fn set_n_jobs(&mut self, n_jobs: i32) {
        let workers = WorkerPool::new(n_jobs);
        for search in self.searches.iter_mut() {
            search.set_pool(workers.clone());
        }
    }

    fn params(&self, out: &mut ParamMap) {
        self.kernel_params(out);
        out.insert("beta".to_string(), ParamValue::Float(self.beta));
        out.insert(
            "adaptive_k".to_string(),
            ParamValue::Str(self.adaptive_k.name().to_string()),
        );
    }
}

/// Per-batch search state shared by construction and extension.
struct Blocks<'a> {
    searches: &'a [BruteForceSearch],
    members: &'a [Vec<usize>],
    sizes: &'a [usize],
    kernel_builder: &'a KernelBuilder,
    beta: f64,
    adaptive_k: AdaptiveK,
}

impl Blocks<'_> {
    /// Kernel configuration and scale of block `(query batch, reference batch)`.
    fn config(&self, bi: Option<usize>, bj: usize) -> (KernelBuilder, f64) {
        match bi {
            Some(bi) if bi == bj => (self.kernel_builder.clone(), self.beta),
            Some(_) => {
                let k = self
                    .adaptive_k
                    .neighbors(self.kernel_builder.knn(), self.sizes[bj], self.sizes);
                (self.kernel_builder.with_knn(k), 1.0)
            }
            None => (self.kernel_builder.clone(), 1.0),
        }
    }

    /// Rows of `queries` (all from batch `bi`, or batchless) against every
    /// reference batch, with global column indices in ascending order.
    fn score(
        &self,
        queries: &[Vec<f64>],
        bi: Option<usize>,
        self_graph: bool,
    ) -> Result<(Vec<Vec<(usize, f64)>>, Vec<Diagnostic>)> {
        let mut rows: Vec<Vec<(usize, f64)>> = vec![Vec::new(); queries.len()];
        let mut diagnostics = Vec::new();
        for (bj, search) in self.searches.iter().enumerate() {
            let (kb, scale) = self.config(bi, bj);
            trace!("Block ({:?}, {}) with knn={}", bi, bj, kb.knn());
            let (block, block_diags) = kb.build(search, queries, self_graph && bi == Some(bj))?;
            diagnostics.extend(block_diags);
            for (r, entries) in block.rows().into_iter().enumerate() {
                rows[r].extend(
                    entries
                        .into_iter()
                        .map(|(c, v)| (self.members[bj][c], v * scale)),
                );
            }
        }
        for row in rows.iter_mut() {
            row.sort_unstable_by_key(|&(j, _)| j);
        }
        Ok((rows, diagnostics))
    }
}
