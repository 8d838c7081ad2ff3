//! Batch labels and the cross-batch neighbor-count policies.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};

/// Per-observation batch labels, canonicalised to codes `0..m` in sorted label order.
///
/// Two label vectors that induce the same partition in the same relative order
/// produce identical codes whatever their value type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchLabels {
    codes: Vec<usize>,
    names: Vec<String>,
}

impl BatchLabels {
    pub fn new<T: Ord + Clone + fmt::Debug>(labels: &[T]) -> Self {
        let mut distinct: BTreeMap<T, usize> = BTreeMap::new();
        for l in labels {
            distinct.entry(l.clone()).or_insert(0);
        }
        let mut names = Vec::with_capacity(distinct.len());
        for (code, (label, slot)) in distinct.iter_mut().enumerate() {
            *slot = code;
            names.push(format!("{label:?}"));
        }
        let codes = labels.iter().map(|l| distinct[l]).collect();
        Self { codes, names }
    }

    /// Canonical code of every observation.
    pub fn codes(&self) -> &[usize] {
        &self.codes
    }

    /// Original labels, rendered, indexed by code.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Code of a label value, matched by its rendered form.
    pub fn code_of<T: fmt::Debug>(&self, label: &T) -> Option<usize> {
        let name = format!("{label:?}");
        self.names.iter().position(|n| *n == name)
    }

    pub fn n_batches(&self) -> usize {
        self.names.len()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Observation indices of each batch, ascending, in code order.
    pub fn members(&self) -> Vec<Vec<usize>> {
        let mut members = vec![Vec::new(); self.n_batches()];
        for (i, &c) in self.codes.iter().enumerate() {
            members[c].push(i);
        }
        members
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.members().iter().map(|m| m.len()).collect()
    }

    pub fn check_len(&self, n_samples: usize) -> Result<()> {
        if self.len() != n_samples {
            return Err(GraphError::LengthMismatch {
                what: "sample_idx",
                expected: n_samples,
                found: self.len(),
            });
        }
        Ok(())
    }
}

/// Scaling of the neighbor count used against each reference batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdaptiveK {
    /// Fixed k.
    None,
    /// The smallest batch gets k.
    Min,
    /// A batch of mean size gets k.
    Mean,
    /// Square root of the mean-relative size.
    #[default]
    Sqrt,
}

impl AdaptiveK {
    pub fn name(&self) -> &'static str {
        match self {
            AdaptiveK::None => "none",
            AdaptiveK::Min => "min",
            AdaptiveK::Mean => "mean",
            AdaptiveK::Sqrt => "sqrt",
        }
    }

    /// Weight of a reference batch with `n_j` points among batches of `sizes`.
    pub fn weight(&self, n_j: usize, sizes: &[usize]) -> f64 {
        match self {
            AdaptiveK::None => 1.0,
            AdaptiveK::Min => min_ratio(n_j, sizes),
            AdaptiveK::Mean => mean_ratio(n_j, sizes),
            AdaptiveK::Sqrt => mean_ratio(n_j, sizes).sqrt(),
        }
    }

    /// `round(k · w_j)` clamped to `[1, n_j]`.
    pub fn neighbors(&self, k: usize, n_j: usize, sizes: &[usize]) -> usize {
        let scaled = (k as f64 * self.weight(n_j, sizes)).round() as usize;
        scaled.clamp(1, n_j.max(1))
    }
}

fn min_ratio(n_j: usize, sizes: &[usize]) -> f64 {
    let min = sizes.iter().copied().min().unwrap_or(n_j).max(1);
    n_j as f64 / min as f64
}

fn mean_ratio(n_j: usize, sizes: &[usize]) -> f64 {
    if sizes.is_empty() {
        return 1.0;
    }
    let mean = sizes.iter().sum::<usize>() as f64 / sizes.len() as f64;
    if mean > 0.0 {
        n_j as f64 / mean
    } else {
        1.0
    }
}

impl fmt::Display for AdaptiveK {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AdaptiveK {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(AdaptiveK::None),
            "min" => Ok(AdaptiveK::Min),
            "mean" => Ok(AdaptiveK::Mean),
            "sqrt" => Ok(AdaptiveK::Sqrt),
            _ => Err(GraphError::UnknownName {
                kind: "adaptive_k",
                name: s.to_string(),
                expected: "['none', 'min', 'mean', 'sqrt']",
            }),
        }
    }
}
