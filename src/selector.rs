//! Resolve a parameter snapshot into one construction strategy.
//!
//! Decision order:
//!   1) an explicit `graph_type` is honoured
//!   2) sample labels select the batch-corrected graph
//!   3) no precomputed relation and (no decay or a positive threshold) select knn
//!   4) otherwise the exact graph
//!
//! Landmarks and the graph-object view are independent layers on top.

use std::fmt;

use log::debug;

use crate::batch::BatchLabels;
use crate::error::{Diagnostic, GraphError, Result};
use crate::params::{GraphParams, GraphType};
use crate::symmetrize::{Gamma, Symmetrization};

/// A resolved base strategy plus its optional layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Strategy {
    /// Never `GraphType::Auto`.
    pub base: GraphType,
    pub landmarks: bool,
    pub graph_view: bool,
}

impl Strategy {
    /// "Building knn graph with landmarks and graph view"
    pub fn description(&self) -> String {
        let mut msg = format!("Building {} graph", self.base);
        if self.landmarks {
            msg.push_str(" with landmarks");
        }
        if self.graph_view {
            msg.push_str(if self.landmarks {
                " and graph view"
            } else {
                " with graph view"
            });
        }
        msg
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

/// Outcome of strategy resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolution {
    pub strategy: Strategy,
    /// False when the labels were dropped for having a single value.
    pub use_labels: bool,
    pub diagnostics: Vec<Diagnostic>,
}

/// Pick the strategy for `params` and reject incompatible options before any
/// computation happens.
pub fn resolve_strategy(params: &GraphParams, labels: Option<&BatchLabels>) -> Result<Resolution> {
    params.validate()?;
    let mut diagnostics = Vec::new();
    let mut graph_type = params.graph_type;
    let mut use_labels = labels.is_some();

    if let Some(labels) = labels {
        if labels.n_batches() == 1 {
            diagnostics.push(
                Diagnostic::SingleBatch {
                    label: labels.names()[0].clone(),
                }
                .emit(),
            );
            use_labels = false;
            if graph_type == GraphType::Mnn {
                graph_type = GraphType::Auto;
            }
        }
    }

    let thresh = params.effective_thresh();
    let base = match graph_type {
        GraphType::Auto if use_labels => GraphType::Mnn,
        GraphType::Auto if params.precomputed.is_none() && (params.decay.is_none() || thresh > 0.0) => {
            GraphType::Knn
        }
        GraphType::Auto => GraphType::Exact,
        explicit => explicit,
    };

    match base {
        GraphType::Knn => {
            if params.precomputed.is_some() {
                return Err(GraphError::Incompatible(
                    "knn graph does not support precomputed values, use graphtype='exact' \
                     or precomputed=None"
                        .to_string(),
                ));
            }
            if use_labels {
                return Err(GraphError::Incompatible(
                    "knn graph does not support batch correction, use graphtype='mnn' \
                     or sample_idx=None"
                        .to_string(),
                ));
            }
            if params.decay.is_some() && thresh == 0.0 {
                return Err(GraphError::Incompatible(
                    "knn graph needs thresh > 0 with a decaying kernel, use graphtype='exact' \
                     for a dense kernel"
                        .to_string(),
                ));
            }
        }
        GraphType::Mnn => {
            if params.precomputed.is_some() {
                return Err(GraphError::Incompatible(
                    "mnn graph does not support precomputed values, use graphtype='exact' \
                     and sample_idx=None or precomputed=None"
                        .to_string(),
                ));
            }
            if !use_labels {
                return Err(GraphError::Config(
                    "mnn graph requires sample_idx with at least two distinct labels".to_string(),
                ));
            }
        }
        GraphType::Exact => {
            if use_labels {
                return Err(GraphError::Incompatible(
                    "exact graph does not support batch correction, use graphtype='mnn' \
                     or sample_idx=None"
                        .to_string(),
                ));
            }
            if params.precomputed.is_none() && params.decay.is_none() {
                return Err(GraphError::Incompatible(
                    "exact graph on features needs a decay, use graphtype='knn' for a \
                     binary kernel"
                        .to_string(),
                ));
            }
        }
        GraphType::Auto => unreachable!("auto is resolved above"),
    }

    if params.precomputed.is_some() && params.n_pca.is_some() {
        return Err(GraphError::Incompatible(
            "only one of precomputed and n_pca can be set".to_string(),
        ));
    }
    if params.kernel_symm == Symmetrization::Gamma
        && matches!(params.gamma, Some(Gamma::Matrix(_)))
        && !use_labels
    {
        return Err(GraphError::Incompatible(
            "a gamma matrix requires batch correction, use a scalar gamma".to_string(),
        ));
    }

    let strategy = Strategy {
        base,
        landmarks: params.n_landmark.is_some(),
        graph_view: params.graph_view,
    };
    debug!("{}", strategy.description());
    Ok(Resolution {
        strategy,
        use_labels,
        diagnostics,
    })
}
