use crate::batch::{AdaptiveK, BatchLabels};
use crate::data::{Data, Precomputed};
use crate::error::{Diagnostic, GraphError, Result};
use crate::exact::ExactGraph;
use crate::graph::{landmark_layer, BaseGraph, Graph};
use crate::kernel::KernelBuilder;
use crate::knn::KnnGraph;
use crate::laplacian::GraphLaplacian;
use crate::metric::Metric;
use crate::mnn::MnnGraph;
use crate::params::{GraphParams, GraphType};
use crate::reduction::{ReductionMethod, Reducer};
use crate::selector::resolve_strategy;
use crate::symmetrize::{Gamma, Symmetrization, Symmetrizer};

use log::{debug, info, trace};

/// Sparse inputs wider than this warn when no reduction is requested.
const SPARSE_WARN_FEATURES: usize = 50;

#[derive(Clone, Debug)]
pub struct GraphBuilder {
    params: GraphParams,
    // Sample labels as given; dropped later if they hold a single value
    labels: Option<BatchLabels>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        debug!("Creating GraphBuilder with default parameters");
        Self {
            params: GraphParams::default(),
            labels: None,
        }
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        info!("Initializing new GraphBuilder");
        Self::default()
    }

    pub(crate) fn from_parts(params: GraphParams, labels: Option<BatchLabels>) -> Self {
        Self { params, labels }
    }

    // -------------------- Reduction --------------------

    /// Reduce to `n_pca` dimensions before building. `None` keeps every feature.
    pub fn with_n_pca(mut self, n_pca: Option<usize>) -> Self {
        info!("Setting n_pca: {:?}", n_pca);
        self.params.n_pca = n_pca;
        self
    }

    pub fn with_reduction(mut self, method: ReductionMethod) -> Self {
        info!("Setting reduction method: {}", method);
        self.params.reduction = method;
        self
    }

    // -------------------- Kernel --------------------

    pub fn with_knn(mut self, knn: usize) -> Self {
        info!("Setting knn: {}", knn);
        self.params.knn = knn;
        self
    }

    /// Decay exponent `a`; `None` builds a binary kernel.
    pub fn with_decay(mut self, decay: Option<f64>) -> Self {
        info!("Setting decay: {:?}", decay);
        self.params.decay = decay;
        self
    }

    pub fn with_distance(mut self, distance: Metric) -> Self {
        info!("Setting distance: {}", distance.name());
        self.params.distance = distance;
        self
    }

    /// Smallest kernel value kept. 0 keeps every pair.
    pub fn with_thresh(mut self, thresh: f64) -> Self {
        info!("Setting thresh: {:e}", thresh);
        self.params.thresh = Some(thresh);
        self
    }

    pub fn with_kernel_symm(mut self, policy: Symmetrization) -> Self {
        info!("Setting kernel symmetrization: {}", policy);
        self.params.kernel_symm = policy;
        self
    }

    pub fn with_gamma(mut self, gamma: Gamma) -> Self {
        info!("Setting gamma: {:?}", gamma);
        self.params.gamma = Some(gamma);
        self
    }

    // -------------------- Batch correction --------------------

    /// One label per observation. Two or more distinct labels enable batch
    /// correction.
    pub fn with_sample_labels<T: Ord + Clone + std::fmt::Debug>(mut self, labels: &[T]) -> Self {
        let labels = BatchLabels::new(labels);
        info!(
            "Setting sample labels: {} observations in {} batches",
            labels.len(),
            labels.n_batches()
        );
        self.labels = Some(labels);
        self
    }

    pub fn with_beta(mut self, beta: f64) -> Self {
        info!("Setting beta: {}", beta);
        self.params.beta = beta;
        self
    }

    pub fn with_adaptive_k(mut self, adaptive_k: AdaptiveK) -> Self {
        info!("Setting adaptive_k: {}", adaptive_k);
        self.params.adaptive_k = adaptive_k;
        self
    }

    // -------------------- Layers --------------------

    pub fn with_n_landmark(mut self, n_landmark: Option<usize>) -> Self {
        info!("Setting n_landmark: {:?}", n_landmark);
        self.params.n_landmark = n_landmark;
        self
    }

    /// Dimensions of the diffusion subspace used to place landmarks.
    pub fn with_n_svd(mut self, n_svd: usize) -> Self {
        info!("Setting n_svd: {}", n_svd);
        self.params.n_svd = n_svd;
        self
    }

    /// Also expose the graph as a Laplacian.
    pub fn with_graph_view(mut self, graph_view: bool) -> Self {
        info!("Setting graph view: {}", graph_view);
        self.params.graph_view = graph_view;
        self
    }

    // -------------------- Execution --------------------

    /// Worker threads; negative values count back from the available cores.
    pub fn with_n_jobs(mut self, n_jobs: i32) -> Self {
        info!("Setting n_jobs: {}", n_jobs);
        self.params.n_jobs = n_jobs;
        self
    }

    pub fn with_random_state(mut self, seed: Option<u64>) -> Self {
        info!("Setting random state: {:?}", seed);
        self.params.random_state = seed;
        self
    }

    pub fn with_verbose(mut self, verbose: u8) -> Self {
        self.params.verbose = verbose;
        self
    }

    pub fn with_graph_type(mut self, graph_type: GraphType) -> Self {
        info!("Setting graph type: {}", graph_type);
        self.params.graph_type = graph_type;
        self
    }

    /// Treat the input as a square relation instead of features.
    pub fn with_precomputed(mut self, precomputed: Option<Precomputed>) -> Self {
        info!("Setting precomputed: {:?}", precomputed);
        self.params.precomputed = precomputed;
        self
    }

    /// Replace every option at once; labels are kept.
    pub fn with_params(mut self, params: GraphParams) -> Self {
        debug!("Replacing parameter snapshot");
        self.params = params;
        self
    }

    pub fn params(&self) -> &GraphParams {
        &self.params
    }

    // -------------------- Build --------------------

    pub fn build(self, data: Data) -> Result<Graph> {
        let (n, f) = data.shape();
        info!("Building graph from {}x{} data", n, f);
        let params = self.params;

        match params.precomputed {
            Some(kind) => data.validate_precomputed(kind)?,
            None => data.validate()?,
        }
        if let Some(labels) = &self.labels {
            labels.check_len(n)?;
        }

        let resolution = resolve_strategy(&params, self.labels.as_ref())?;
        let strategy = resolution.strategy;
        info!("{}", strategy.description());
        let mut diagnostics = resolution.diagnostics;

        if data.is_sparse()
            && params.n_pca.is_none()
            && params.precomputed.is_none()
            && f > SPARSE_WARN_FEATURES
        {
            diagnostics.push(Diagnostic::SparseWithoutReduction { n_features: f }.emit());
        }

        let kernel_builder = KernelBuilder::new(
            params.knn,
            params.decay,
            params.distance,
            params.effective_thresh(),
        )?;
        let batch_labels = self.labels.as_ref().filter(|_| resolution.use_labels);
        let (symmetrizer, symm_diags) = Symmetrizer::new(
            params.kernel_symm,
            params.gamma.clone(),
            batch_labels.map(|l| l.n_batches()),
        )?;
        diagnostics.extend(symm_diags);

        // Stage 1: representation
        let (reducer, data_nu) = match params.precomputed {
            Some(_) => (Reducer::Identity { n_features: f }, data.to_rows()),
            None => {
                let (reducer, reduced, reduce_diags) =
                    Reducer::fit(&data, params.n_pca, params.reduction, params.seed())?;
                diagnostics.extend(reduce_diags);
                (reducer, reduced)
            }
        };
        trace!("Representation ready: {} ({} dims)", reducer.name(), reducer.n_components());

        // Stage 2: base graph
        let base = match (strategy.base, params.precomputed) {
            (GraphType::Mnn, _) => {
                let labels = batch_labels.cloned().ok_or_else(|| {
                    GraphError::Config(
                        "mnn graph requires sample labels".to_string(),
                    )
                })?;
                BaseGraph::Mnn(MnnGraph::build(
                    data_nu,
                    labels,
                    kernel_builder,
                    symmetrizer,
                    params.beta,
                    params.adaptive_k,
                    params.n_jobs,
                )?)
            }
            (GraphType::Exact, Some(kind)) => BaseGraph::Exact(ExactGraph::from_precomputed(
                data_nu,
                kind,
                kernel_builder,
                symmetrizer,
            )?),
            (GraphType::Exact, None) => BaseGraph::Exact(ExactGraph::from_features(
                data_nu,
                kernel_builder,
                symmetrizer,
                params.n_jobs,
            )?),
            _ => BaseGraph::Knn(KnnGraph::build(
                data_nu,
                kernel_builder,
                symmetrizer,
                params.n_jobs,
            )?),
        };
        diagnostics.extend(base.as_data_graph().diagnostics().iter().cloned());
        debug!(
            "Base graph ready: weights nnz {}",
            base.as_data_graph().weights().nnz()
        );

        // Stage 3: optional layers
        let (landmarks, landmark_diags) = landmark_layer(base.as_data_graph().weights(), &params)?;
        diagnostics.extend(landmark_diags);
        let laplacian = strategy
            .graph_view
            .then(|| GraphLaplacian::from_weights(base.as_data_graph().weights()));

        let mut strategy = strategy;
        strategy.landmarks = landmarks.is_some();
        info!(
            "Graph built: {} observations, {} diagnostics",
            n,
            diagnostics.len()
        );

        Ok(Graph {
            strategy,
            base,
            reducer,
            data,
            labels: self.labels,
            landmarks,
            laplacian,
            params,
            diagnostics,
        })
    }
}
