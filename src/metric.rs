//! Distance metrics used by neighbor search and the kernel builder.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    #[default]
    Euclidean,
    SqEuclidean,
    /// L1, also accepted as "cityblock"
    Manhattan,
    Chebyshev,
    /// 1 - cosine similarity; zero vectors are at distance 1 from everything
    Cosine,
    Canberra,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Euclidean => "euclidean",
            Metric::SqEuclidean => "sqeuclidean",
            Metric::Manhattan => "manhattan",
            Metric::Chebyshev => "chebyshev",
            Metric::Cosine => "cosine",
            Metric::Canberra => "canberra",
        }
    }

    #[inline]
    pub fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        debug_assert_eq!(a.len(), b.len(), "Dimension mismatch");
        match self {
            Metric::Euclidean => sq_euclidean(a, b).sqrt(),
            Metric::SqEuclidean => sq_euclidean(a, b),
            Metric::Manhattan => a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum(),
            Metric::Chebyshev => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y).abs())
                .fold(0.0, f64::max),
            Metric::Cosine => {
                let denom = norm(a) * norm(b);
                if denom > 0.0 {
                    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                    (1.0 - dot / denom).max(0.0)
                } else {
                    1.0
                }
            }
            Metric::Canberra => a
                .iter()
                .zip(b)
                .map(|(x, y)| {
                    let den = x.abs() + y.abs();
                    if den > 0.0 {
                        (x - y).abs() / den
                    } else {
                        0.0
                    }
                })
                .sum(),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "euclidean" | "l2" => Ok(Metric::Euclidean),
            "sqeuclidean" => Ok(Metric::SqEuclidean),
            "manhattan" | "cityblock" | "l1" => Ok(Metric::Manhattan),
            "chebyshev" => Ok(Metric::Chebyshev),
            "cosine" => Ok(Metric::Cosine),
            "canberra" => Ok(Metric::Canberra),
            _ => Err(GraphError::UnknownName {
                kind: "distance metric",
                name: s.to_string(),
                expected: "['euclidean', 'sqeuclidean', 'manhattan', 'chebyshev', 'cosine', 'canberra']",
            }),
        }
    }
}

/// Euclidean norm without allocating.
#[inline]
pub fn norm(a: &[f64]) -> f64 {
    a.iter().map(|&x| x * x).sum::<f64>().sqrt()
}

#[inline]
fn sq_euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}
