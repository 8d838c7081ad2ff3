//! Out-of-sample extension and signal interpolation.

use log::{debug, info};

use std::fmt;

use crate::error::{GraphError, Result};
use crate::graph::{BaseGraph, Graph};
use crate::matrix::Affinity;

impl Graph {
    /// Bring new points into the space the kernel was computed on.
    ///
    /// Rows as wide as the input are transformed; rows already as wide as the
    /// reduced representation pass through.
    pub fn to_reduced(&self, y: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        if let Some(kind) = self.params.precomputed {
            return Err(GraphError::Interpolation(format!(
                "cannot extend a graph built from a precomputed {kind}"
            )));
        }
        let width = match y.first() {
            Some(row) => row.len(),
            None => return Ok(Vec::new()),
        };
        if let Some(bad) = y.iter().find(|r| r.len() != width) {
            return Err(GraphError::DimensionMismatch {
                expected: width.to_string(),
                found: bad.len(),
            });
        }
        let (f, d) = (self.reducer.n_features(), self.reducer.n_components());
        if width == f {
            self.reducer.transform(y)
        } else if width == d {
            debug!("Points already in the reduced space ({} dims)", d);
            Ok(y.to_vec())
        } else {
            Err(GraphError::DimensionMismatch {
                expected: format!("{f} or {d}"),
                found: width,
            })
        }
    }

    /// Kernel from new points to the stored observations (M x N).
    pub fn build_kernel_to_data(&self, y: &[Vec<f64>]) -> Result<Affinity> {
        let y_nu = self.to_reduced(y)?;
        info!(
            "Scoring {} new points against {} observations",
            y_nu.len(),
            self.n_samples()
        );
        self.base.as_data_graph().build_kernel_to_data(&y_nu)
    }

    /// Kernel from new points with known sample labels to the stored
    /// observations (M x N), scored per batch as during construction.
    ///
    /// Only batch-corrected graphs have batches; every label must be one seen
    /// at build time.
    pub fn build_kernel_to_batches<T: fmt::Debug>(
        &self,
        y: &[Vec<f64>],
        labels: &[T],
    ) -> Result<Affinity> {
        let mnn = match &self.base {
            BaseGraph::Mnn(g) => g,
            _ => {
                return Err(GraphError::Interpolation(format!(
                    "sample labels for new points need an mnn graph, this is {}",
                    self.kind()
                )))
            }
        };
        if labels.len() != y.len() {
            return Err(GraphError::LengthMismatch {
                what: "sample_idx",
                expected: y.len(),
                found: labels.len(),
            });
        }
        let codes = labels
            .iter()
            .map(|l| {
                mnn.labels().code_of(l).ok_or_else(|| {
                    GraphError::Config(format!("sample label {l:?} was not seen at build time"))
                })
            })
            .collect::<Result<Vec<usize>>>()?;
        let y_nu = self.to_reduced(y)?;
        debug!("Scoring {} labelled points against their batches", y_nu.len());
        mnn.build_kernel_to_batches(&y_nu, &codes)
    }

    /// Row-stochastic transitions from new points into the graph.
    ///
    /// M x N, or M x L on a landmark graph.
    pub fn extend_to_data(&self, y: &[Vec<f64>]) -> Result<Affinity> {
        let kernel = self.build_kernel_to_data(y)?;
        Ok(match &self.landmarks {
            Some(landmarks) => landmarks.aggregate(&kernel),
            None => kernel.row_normalised(),
        })
    }

    /// Carry a signal defined on the graph over to new points.
    ///
    /// `transitions` wins over `y` when both are given. On a landmark graph a
    /// signal with one row per landmark goes through the landmark transitions;
    /// one row per observation goes through the observation-level kernel.
    pub fn interpolate(
        &self,
        signal: &[Vec<f64>],
        y: Option<&[Vec<f64>]>,
        transitions: Option<&Affinity>,
    ) -> Result<Vec<Vec<f64>>> {
        if let Some(t) = transitions {
            let (_, cols) = t.shape();
            if cols != signal.len() {
                return Err(GraphError::Interpolation(format!(
                    "transitions have {} columns but the signal has {} rows",
                    cols,
                    signal.len()
                )));
            }
            return Ok(t.mul_dense(signal));
        }
        let y = y.ok_or_else(|| {
            GraphError::Interpolation("either y or transitions must be given".to_string())
        })?;

        let n = self.n_samples();
        let t = match &self.landmarks {
            Some(landmarks) if signal.len() == landmarks.n_clusters() => {
                landmarks.aggregate(&self.build_kernel_to_data(y)?)
            }
            _ if signal.len() == n => self.build_kernel_to_data(y)?.row_normalised(),
            Some(landmarks) => {
                return Err(GraphError::Interpolation(format!(
                    "signal has {} rows, expected {} landmarks or {} observations",
                    signal.len(),
                    landmarks.n_clusters(),
                    n
                )))
            }
            None => {
                return Err(GraphError::Interpolation(format!(
                    "signal has {} rows, expected {} observations",
                    signal.len(),
                    n
                )))
            }
        };
        debug!("Interpolating {} signal columns", signal.first().map_or(0, |r| r.len()));
        Ok(t.mul_dense(signal))
    }
}
