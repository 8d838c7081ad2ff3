//! Combine a directional kernel with its transpose into a weight matrix.

use std::fmt;
use std::str::FromStr;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{Diagnostic, GraphError, Result};
use crate::matrix::Affinity;

/// Default γ when the gamma policy is requested without a value.
pub const DEFAULT_GAMMA: f64 = 0.5;

/// Symmetrization policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Symmetrization {
    /// `(K + Kᵀ) / 2`
    #[default]
    Additive,
    /// `K ∘ Kᵀ`
    Multiplicative,
    /// `γ·min(K, Kᵀ) + (1 − γ)·max(K, Kᵀ)`
    Gamma,
    /// `K` unchanged
    None,
}

impl Symmetrization {
    pub fn name(&self) -> &'static str {
        match self {
            Symmetrization::Additive => "+",
            Symmetrization::Multiplicative => "*",
            Symmetrization::Gamma => "gamma",
            Symmetrization::None => "none",
        }
    }
}

impl fmt::Display for Symmetrization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Symmetrization {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "+" | "additive" => Ok(Symmetrization::Additive),
            "*" | "multiplicative" => Ok(Symmetrization::Multiplicative),
            "gamma" | "mnn" => Ok(Symmetrization::Gamma),
            "none" => Ok(Symmetrization::None),
            _ => Err(GraphError::UnknownName {
                kind: "kernel_symm",
                name: s.to_string(),
                expected: "['+', '*', 'gamma', 'none']",
            }),
        }
    }
}

/// Blend factor for the gamma policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Gamma {
    Scalar(f64),
    /// Always rejected on validation: a vector has no unambiguous broadcast.
    Vector(Vec<f64>),
    /// One value per ordered batch pair, in canonical batch order.
    Matrix(Vec<Vec<f64>>),
}

impl Gamma {
    /// Check shape and range against the number of batches (if any).
    pub fn validate(&self, n_batches: Option<usize>) -> Result<()> {
        match self {
            Gamma::Scalar(g) => check_unit(*g),
            Gamma::Vector(v) => Err(GraphError::Config(format!(
                "gamma given as a vector of length {}, expected a scalar or a square matrix \
                 with one entry per pair of batches",
                v.len()
            ))),
            Gamma::Matrix(rows) => {
                let m = n_batches.ok_or_else(|| {
                    GraphError::Incompatible(
                        "a gamma matrix requires sample labels, use a scalar gamma".to_string(),
                    )
                })?;
                let cols = rows.first().map(|r| r.len()).unwrap_or(0);
                if rows.len() != m || rows.iter().any(|r| r.len() != m) {
                    return Err(GraphError::GammaShape {
                        rows: rows.len(),
                        cols,
                        expected: m,
                    });
                }
                for (i, row) in rows.iter().enumerate() {
                    for (j, &g) in row.iter().enumerate() {
                        check_unit(g)?;
                        if g != rows[j][i] {
                            return Err(GraphError::Config(format!(
                                "gamma matrix must be symmetric, gamma[{i}][{j}]={g} but \
                                 gamma[{j}][{i}]={}",
                                rows[j][i]
                            )));
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

fn check_unit(g: f64) -> Result<()> {
    if (0.0..=1.0).contains(&g) {
        Ok(())
    } else {
        Err(GraphError::Config(format!("gamma must be in [0, 1], got {g}")))
    }
}

/// A validated symmetrization policy with its γ.
#[derive(Clone, Debug, PartialEq)]
pub struct Symmetrizer {
    policy: Symmetrization,
    gamma: Option<Gamma>,
}

impl Symmetrizer {
    /// Validate `policy` with `gamma`.
    ///
    /// The gamma policy without a γ falls back to [`DEFAULT_GAMMA`]; a γ with
    /// any other policy is dropped. Both cases are reported as diagnostics.
    pub fn new(
        policy: Symmetrization,
        gamma: Option<Gamma>,
        n_batches: Option<usize>,
    ) -> Result<(Self, Vec<Diagnostic>)> {
        let mut diagnostics = Vec::new();
        let gamma = match (policy, gamma) {
            (Symmetrization::Gamma, None) => {
                diagnostics.push(
                    Diagnostic::GammaDefaulted {
                        gamma: DEFAULT_GAMMA,
                    }
                    .emit(),
                );
                Some(Gamma::Scalar(DEFAULT_GAMMA))
            }
            (Symmetrization::Gamma, Some(g)) => {
                g.validate(n_batches)?;
                Some(g)
            }
            (other, Some(_)) => {
                diagnostics.push(
                    Diagnostic::GammaUnused {
                        policy: other.name().to_string(),
                    }
                    .emit(),
                );
                None
            }
            (_, None) => None,
        };
        Ok((Self { policy, gamma }, diagnostics))
    }

    pub fn policy(&self) -> Symmetrization {
        self.policy
    }

    pub fn gamma(&self) -> Option<&Gamma> {
        self.gamma.as_ref()
    }

    /// `W = f(K, Kᵀ)` with a zero diagonal.
    ///
    /// `batches` holds the canonical batch code of every observation and is
    /// required for a matrix γ.
    pub fn apply(&self, kernel: &Affinity, batches: Option<&[usize]>) -> Result<Affinity> {
        let (n, c) = kernel.shape();
        if n != c {
            return Err(GraphError::NotSquare { rows: n, cols: c });
        }
        info!("Symmetrizing {}x{} kernel with policy '{}'", n, n, self.policy);
        let w = match self.policy {
            Symmetrization::Additive => kernel.zip_with_transpose(|_, _, a, b| (a + b) / 2.0),
            Symmetrization::Multiplicative => kernel.zip_with_transpose(|_, _, a, b| a * b),
            Symmetrization::None => kernel.clone(),
            Symmetrization::Gamma => match &self.gamma {
                Some(Gamma::Matrix(g)) => {
                    let codes = batches.ok_or_else(|| {
                        GraphError::Incompatible(
                            "a gamma matrix requires sample labels".to_string(),
                        )
                    })?;
                    if codes.len() != n {
                        return Err(GraphError::LengthMismatch {
                            what: "batch codes",
                            expected: n,
                            found: codes.len(),
                        });
                    }
                    kernel.zip_with_transpose(|i, j, a, b| {
                        blend(g[codes[i]][codes[j]], a, b)
                    })
                }
                Some(Gamma::Scalar(g)) => {
                    let g = *g;
                    kernel.zip_with_transpose(|_, _, a, b| blend(g, a, b))
                }
                Some(Gamma::Vector(_)) | None => {
                    return Err(GraphError::Config(
                        "gamma symmetrization needs a scalar or matrix gamma".to_string(),
                    ))
                }
            },
        };
        let w = w.with_zero_diagonal();
        debug!("Weight matrix nnz {}", w.nnz());
        Ok(w)
    }
}

#[inline]
fn blend(g: f64, a: f64, b: f64) -> f64 {
    g * a.min(b) + (1.0 - g) * a.max(b)
}
