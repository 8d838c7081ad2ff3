//! Errors and non-fatal diagnostics raised while building a graph.
//!
//! Errors abort construction: no partial graph is ever returned. Diagnostics
//! are recoverable conditions (duplicate points, a single batch label, ...)
//! where construction proceeds under a documented fallback; they are returned
//! alongside the graph and also logged through `log::warn!`.

use std::fmt;

use log::warn;
use thiserror::Error;

/// Errors that can occur while configuring, building or querying a graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    /// Invalid option value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A metric, graph type, symmetrization or precomputed kind name that is not recognised.
    #[error("unsupported {kind} '{name}', expected one of {expected}")]
    UnknownName {
        kind: &'static str,
        name: String,
        expected: &'static str,
    },

    /// Two or more options that cannot be combined.
    #[error("incompatible options: {0}")]
    Incompatible(String),

    /// A gamma matrix whose shape does not match the number of batches.
    #[error("gamma matrix has shape {rows}x{cols}, expected {expected}x{expected}")]
    GammaShape {
        rows: usize,
        cols: usize,
        expected: usize,
    },

    /// A parameter that changes the kernel was passed to `set_params`.
    #[error("cannot update `{0}` in place: it changes the graph, use `rebuild` instead")]
    InPlaceUpdate(&'static str),

    /// Interpolation or extension requested without its prerequisites.
    #[error("interpolation unavailable: {0}")]
    Interpolation(String),

    /// Input with no observations or no features.
    #[error("empty input: {0}")]
    EmptyData(String),

    /// A vector (labels, signal, ...) with the wrong number of entries.
    #[error("{what} has length {found}, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    /// NaN or infinite value in the input.
    #[error("non-finite value {value} at row {row}, column {col}")]
    NonFinite { row: usize, col: usize, value: f64 },

    /// A precomputed relation that is not square.
    #[error("precomputed matrix must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    /// A negative entry in a precomputed distance, affinity or adjacency.
    #[error("precomputed {kind} must be nonnegative, found {value} at ({row}, {col})")]
    NegativeEntry {
        kind: &'static str,
        row: usize,
        col: usize,
        value: f64,
    },

    /// Query points whose dimensionality matches neither the raw nor the reduced data.
    #[error("dimension mismatch: expected {expected} features, found {found}")]
    DimensionMismatch { expected: String, found: usize },

    /// Failure reported by a numerical collaborator (PCA, SVD, k-means).
    #[error("numerical routine failed: {0}")]
    Numeric(String),
}

impl GraphError {
    /// Invalid or incompatible options, detected before any computation.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            GraphError::Config(_)
                | GraphError::UnknownName { .. }
                | GraphError::Incompatible(_)
                | GraphError::GammaShape { .. }
                | GraphError::InPlaceUpdate(_)
                | GraphError::Interpolation(_)
        )
    }

    /// Problems with the data itself (shape, length, non-finite values).
    pub fn is_data(&self) -> bool {
        matches!(
            self,
            GraphError::EmptyData(_)
                | GraphError::LengthMismatch { .. }
                | GraphError::NonFinite { .. }
                | GraphError::NotSquare { .. }
                | GraphError::NegativeEntry { .. }
                | GraphError::DimensionMismatch { .. }
        )
    }
}

impl From<smartcore::error::Failed> for GraphError {
    fn from(e: smartcore::error::Failed) -> Self {
        GraphError::Numeric(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;

/// Recoverable conditions observed during construction.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// Observations with another observation at distance exactly zero.
    DuplicateObservations { count: usize },
    /// Batch labels with a single distinct value; the graph was built without batch correction.
    SingleBatch { label: String },
    /// Sparse input used without dimensionality reduction.
    SparseWithoutReduction { n_features: usize },
    /// Kernel rows with no entry above the threshold.
    EmptyKernelRows { count: usize },
    /// Neighbor count larger than the reference set.
    KnnClamped { requested: usize, used: usize },
    /// `gamma` symmetrization requested without a gamma value.
    GammaDefaulted { gamma: f64 },
    /// Gamma given together with a policy that does not use it.
    GammaUnused { policy: String },
    /// Reduction dimension not smaller than the data dimension.
    ReductionSkipped { n_pca: usize, n_features: usize },
    /// Landmark count not smaller than the number of observations.
    LandmarksSkipped { n_landmark: usize, n_samples: usize },
}

impl Diagnostic {
    /// Log the diagnostic and hand it back, so call sites can push and log in one go.
    pub fn emit(self) -> Self {
        warn!("{}", self);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::DuplicateObservations { count } => write!(
                f,
                "detected zero distance between samples: {count} observations have duplicates, \
                 consider removing duplicates before building the graph"
            ),
            Diagnostic::SingleBatch { label } => write!(
                f,
                "only one unique sample label ({label}), building the graph without batch correction"
            ),
            Diagnostic::SparseWithoutReduction { n_features } => write!(
                f,
                "building a graph on sparse data with {n_features} features and no reduction is \
                 expensive, consider setting n_pca"
            ),
            Diagnostic::EmptyKernelRows { count } => write!(
                f,
                "{count} kernel rows are empty after thresholding"
            ),
            Diagnostic::KnnClamped { requested, used } => write!(
                f,
                "knn={requested} exceeds the number of reference points, using knn={used}"
            ),
            Diagnostic::GammaDefaulted { gamma } => write!(
                f,
                "kernel_symm is gamma but no gamma was given, defaulting to gamma={gamma}"
            ),
            Diagnostic::GammaUnused { policy } => write!(
                f,
                "gamma is only used with kernel_symm=gamma, ignoring it for kernel_symm={policy}"
            ),
            Diagnostic::ReductionSkipped { n_pca, n_features } => write!(
                f,
                "cannot reduce {n_features} features to n_pca={n_pca}, using the original data"
            ),
            Diagnostic::LandmarksSkipped {
                n_landmark,
                n_samples,
            } => write!(
                f,
                "n_landmark={n_landmark} is not smaller than the {n_samples} observations, \
                 no landmarks computed"
            ),
        }
    }
}
