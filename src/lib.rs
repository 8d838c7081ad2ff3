//! # diffgraph
//!
//! Adaptive-bandwidth affinity graphs for manifold learning and diffusion.
//!
//! Feature vectors (or a precomputed square relation) become a symmetric
//! weight matrix `W` under one of three strategies:
//!
//! - **knn**: sparse k-nearest-neighbor kernel with an adaptive bandwidth
//! - **mnn**: batch-corrected kernel assembled block by block across labelled partitions
//! - **exact**: every pair scored, or a precomputed distance/affinity/adjacency
//!
//! On top of the base graph sit two optional layers: landmark coarsening and a
//! Laplacian view. Built graphs extend to new points and interpolate signals.
//!
//! ```ignore
//! use diffgraph::{Data, GraphBuilder};
//!
//! let graph = GraphBuilder::new()
//!     .with_knn(5)
//!     .with_decay(Some(10.0))
//!     .with_n_landmark(Some(50))
//!     .build(Data::from_rows(&rows)?)?;
//! let w = graph.weights();
//! ```

pub mod batch;
pub mod builder;
pub mod data;
pub mod error;
pub mod exact;
pub mod extension;
pub mod graph;
pub mod kernel;
pub mod knn;
pub mod landmark;
pub mod laplacian;
pub mod matrix;
pub mod metric;
pub mod mnn;
pub mod neighbors;
pub mod params;
pub mod reduction;
pub mod selector;
pub mod spectral;
pub mod symmetrize;

pub use batch::{AdaptiveK, BatchLabels};
pub use builder::GraphBuilder;
pub use data::{Data, Precomputed};
pub use error::{Diagnostic, GraphError, Result};
pub use graph::{BaseGraph, DataGraph, Graph};
pub use matrix::Affinity;
pub use metric::Metric;
pub use params::{GraphParams, GraphType, ParamMap, ParamUpdate, ParamValue};
pub use reduction::ReductionMethod;
pub use selector::Strategy;
pub use symmetrize::{Gamma, Symmetrization};

#[cfg(test)]
mod tests;
