//! The built graph: base variant, optional layers, parameter snapshot.

use log::{debug, info};

use crate::batch::BatchLabels;
use crate::builder::GraphBuilder;
use crate::data::Data;
use crate::error::{Diagnostic, GraphError, Result};
use crate::exact::ExactGraph;
use crate::kernel::KernelBuilder;
use crate::knn::KnnGraph;
use crate::landmark::Landmarks;
use crate::laplacian::GraphLaplacian;
use crate::matrix::Affinity;
use crate::mnn::MnnGraph;
use crate::params::{GraphParams, GraphType, ParamMap, ParamUpdate, ParamValue};
use crate::reduction::Reducer;
use crate::selector::Strategy;
use crate::symmetrize::Symmetrizer;

/// Capabilities shared by the base graph variants.
pub trait DataGraph {
    fn kind(&self) -> GraphType;

    /// Directional kernel K (N x N).
    fn kernel(&self) -> &Affinity;

    /// Symmetrized weights W with a zero diagonal.
    fn weights(&self) -> &Affinity;

    /// Representation the kernel was computed on.
    fn data_nu(&self) -> &[Vec<f64>];

    fn kernel_builder(&self) -> &KernelBuilder;

    fn symmetrizer(&self) -> &Symmetrizer;

    fn diagnostics(&self) -> &[Diagnostic];

    /// Kernel from points already in the reduced space to the stored data (M x N).
    fn build_kernel_to_data(&self, y_nu: &[Vec<f64>]) -> Result<Affinity>;

    fn set_n_jobs(&mut self, n_jobs: i32);

    /// Options shared by every kernel-based variant.
    fn kernel_params(&self, out: &mut ParamMap) {
        let kb = self.kernel_builder();
        out.insert("knn".to_string(), ParamValue::Int(kb.knn() as i64));
        out.insert("decay".to_string(), kb.decay().into());
        out.insert(
            "distance".to_string(),
            ParamValue::Str(kb.metric().name().to_string()),
        );
        out.insert("thresh".to_string(), ParamValue::Float(kb.thresh()));
        out.insert(
            "kernel_symm".to_string(),
            ParamValue::Str(self.symmetrizer().policy().name().to_string()),
        );
        out.insert("gamma".to_string(), self.symmetrizer().gamma().into());
    }

    /// Variant-specific options.
    fn params(&self, out: &mut ParamMap) {
        self.kernel_params(out);
    }
}

#[derive(Debug)]
pub enum BaseGraph {
    Knn(KnnGraph),
    Mnn(MnnGraph),
    Exact(ExactGraph),
}

impl BaseGraph {
    pub fn as_data_graph(&self) -> &dyn DataGraph {
        match self {
            BaseGraph::Knn(g) => g,
            BaseGraph::Mnn(g) => g,
            BaseGraph::Exact(g) => g,
        }
    }

    pub fn as_data_graph_mut(&mut self) -> &mut dyn DataGraph {
        match self {
            BaseGraph::Knn(g) => g,
            BaseGraph::Mnn(g) => g,
            BaseGraph::Exact(g) => g,
        }
    }
}

/// A graph built from one dataset.
#[derive(Debug)]
pub struct Graph {
    pub(crate) strategy: Strategy,
    pub(crate) base: BaseGraph,
    pub(crate) reducer: Reducer,
    pub(crate) data: Data,
    /// Labels as given, kept for rebuilds even when they were dropped.
    pub(crate) labels: Option<BatchLabels>,
    pub(crate) landmarks: Option<Landmarks>,
    pub(crate) laplacian: Option<GraphLaplacian>,
    pub(crate) params: GraphParams,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

impl Graph {
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn kind(&self) -> GraphType {
        self.strategy.base
    }

    pub fn base(&self) -> &BaseGraph {
        &self.base
    }

    pub fn n_samples(&self) -> usize {
        self.data.n_samples()
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn reducer(&self) -> &Reducer {
        &self.reducer
    }

    pub fn data_nu(&self) -> &[Vec<f64>] {
        self.base.as_data_graph().data_nu()
    }

    pub fn kernel(&self) -> &Affinity {
        self.base.as_data_graph().kernel()
    }

    pub fn weights(&self) -> &Affinity {
        self.base.as_data_graph().weights()
    }

    /// Row sums of W.
    pub fn degrees(&self) -> Vec<f64> {
        self.weights().row_sums()
    }

    pub fn landmarks(&self) -> Option<&Landmarks> {
        self.landmarks.as_ref()
    }

    pub fn laplacian(&self) -> Option<&GraphLaplacian> {
        self.laplacian.as_ref()
    }

    /// Labels as given to the builder.
    pub fn sample_labels(&self) -> Option<&BatchLabels> {
        self.labels.as_ref()
    }

    /// Every warning raised while building, in order.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn params(&self) -> &GraphParams {
        &self.params
    }

    /// Flat view of the options that apply to this graph.
    pub fn get_params(&self) -> ParamMap {
        let mut out = ParamMap::new();
        self.base.as_data_graph().params(&mut out);
        out.insert("n_pca".to_string(), self.params.n_pca.into());
        out.insert(
            "random_state".to_string(),
            self.params
                .random_state
                .map(|s| ParamValue::Int(s as i64))
                .unwrap_or(ParamValue::None),
        );
        out.insert("n_jobs".to_string(), ParamValue::Int(self.params.n_jobs as i64));
        out.insert("verbose".to_string(), ParamValue::Int(self.params.verbose as i64));
        if self.strategy.landmarks {
            out.insert("n_landmark".to_string(), self.params.n_landmark.into());
            out.insert(
                "n_svd".to_string(),
                ParamValue::Int(self.params.n_svd as i64),
            );
        }
        out
    }

    /// Apply options that leave the kernel untouched.
    ///
    /// `n_jobs`, `random_state` and `verbose` are stored in place; landmark
    /// options rebuild only the landmark layer; `graph_view` adds or drops the
    /// Laplacian view. Any option that would change the kernel is rejected
    /// unless it equals the current value; use [`Graph::rebuild`] for those.
    pub fn set_params(&mut self, update: &ParamUpdate) -> Result<()> {
        if let Some(name) = self.params.topology_change(update) {
            return Err(GraphError::InPlaceUpdate(name));
        }
        let next = self.params.updated(update);
        next.validate()?;

        let landmark_layer = if self.params.landmark_change(update) {
            Some(self.build_landmarks(&next)?)
        } else {
            None
        };

        if next.n_jobs != self.params.n_jobs {
            debug!("n_jobs {} -> {}", self.params.n_jobs, next.n_jobs);
            self.base.as_data_graph_mut().set_n_jobs(next.n_jobs);
        }
        if let Some((landmarks, diagnostics)) = landmark_layer {
            debug!("Landmark layer rebuilt");
            self.diagnostics.extend(diagnostics);
            self.landmarks = landmarks;
            self.strategy.landmarks = self.landmarks.is_some();
        }
        if next.graph_view != self.params.graph_view {
            self.laplacian = next
                .graph_view
                .then(|| GraphLaplacian::from_weights(self.weights()));
            self.strategy.graph_view = next.graph_view;
        }
        info!("Parameters updated in place");
        self.params = next;
        Ok(())
    }

    /// Build a new graph from the same data with `update` applied.
    pub fn rebuild(&self, update: &ParamUpdate) -> Result<Graph> {
        let params = self.params.updated(update);
        info!("Rebuilding graph from {} observations", self.n_samples());
        GraphBuilder::from_parts(params, self.labels.clone()).build(self.data.clone())
    }

    /// Landmark layer for `params`, or `None` when not requested or skipped.
    pub(crate) fn build_landmarks(
        &self,
        params: &GraphParams,
    ) -> Result<(Option<Landmarks>, Vec<Diagnostic>)> {
        landmark_layer(self.weights(), params)
    }
}

/// Landmark layer over `weights` for `params`.
pub(crate) fn landmark_layer(
    weights: &Affinity,
    params: &GraphParams,
) -> Result<(Option<Landmarks>, Vec<Diagnostic>)> {
    let n = weights.shape().0;
    match params.n_landmark {
        None => Ok((None, Vec::new())),
        Some(l) if l >= n => Ok((
            None,
            vec![Diagnostic::LandmarksSkipped {
                n_landmark: l,
                n_samples: n,
            }
            .emit()],
        )),
        Some(l) => Ok((
            Some(Landmarks::build(weights, l, params.n_svd, params.seed())?),
            Vec::new(),
        )),
    }
}
