//! Construction parameters, their flat export and the update path.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::batch::AdaptiveK;
use crate::data::Precomputed;
use crate::error::{GraphError, Result};
use crate::metric::Metric;
use crate::reduction::ReductionMethod;
use crate::symmetrize::{Gamma, Symmetrization, DEFAULT_GAMMA};

/// Threshold used with a decaying kernel when none is given.
pub const DEFAULT_THRESH: f64 = 1e-4;

/// Seed used when `random_state` is not set.
pub const DEFAULT_SEED: u64 = 128;

/// Base construction strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraphType {
    #[default]
    Auto,
    Knn,
    Mnn,
    Exact,
}

impl GraphType {
    pub fn name(&self) -> &'static str {
        match self {
            GraphType::Auto => "auto",
            GraphType::Knn => "knn",
            GraphType::Mnn => "mnn",
            GraphType::Exact => "exact",
        }
    }
}

impl fmt::Display for GraphType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GraphType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(GraphType::Auto),
            "knn" => Ok(GraphType::Knn),
            "mnn" => Ok(GraphType::Mnn),
            "exact" => Ok(GraphType::Exact),
            _ => Err(GraphError::UnknownName {
                kind: "graphtype",
                name: s.to_string(),
                expected: "['knn', 'mnn', 'exact', 'auto']",
            }),
        }
    }
}

/// Snapshot of every construction option.
#[derive(Debug, Clone)]
pub struct GraphParams {
    pub n_pca: Option<usize>,
    pub reduction: ReductionMethod,
    /// Neighbors used for the bandwidth, self included.
    pub knn: usize,
    pub decay: Option<f64>,
    pub distance: Metric,
    /// `None` resolves to [`DEFAULT_THRESH`] with decay and 0 without.
    pub thresh: Option<f64>,
    pub kernel_symm: Symmetrization,
    pub gamma: Option<Gamma>,
    /// Factor applied to within-batch kernel blocks.
    pub beta: f64,
    pub adaptive_k: AdaptiveK,
    pub n_landmark: Option<usize>,
    pub n_svd: usize,
    pub n_jobs: i32,
    pub random_state: Option<u64>,
    pub verbose: u8,
    pub graph_type: GraphType,
    pub precomputed: Option<Precomputed>,
    pub graph_view: bool,
}

impl Default for GraphParams {
    fn default() -> Self {
        Self {
            n_pca: None,
            reduction: ReductionMethod::Auto,
            knn: 5,
            decay: Some(10.0),
            distance: Metric::Euclidean,
            thresh: None,
            kernel_symm: Symmetrization::Additive,
            gamma: None,
            beta: 1.0,
            adaptive_k: AdaptiveK::Sqrt,
            n_landmark: None,
            n_svd: 100,
            n_jobs: 1,
            random_state: None,
            verbose: 0,
            graph_type: GraphType::Auto,
            precomputed: None,
            graph_view: false,
        }
    }
}

fn option_eq(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => approx::relative_eq!(a, b),
        _ => false,
    }
}

fn gamma_eq(a: &Option<Gamma>, b: &Option<Gamma>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(Gamma::Scalar(a)), Some(Gamma::Scalar(b))) => approx::relative_eq!(*a, *b),
        (Some(Gamma::Vector(a)), Some(Gamma::Vector(b))) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| approx::relative_eq!(*x, *y))
        }
        (Some(Gamma::Matrix(a)), Some(Gamma::Matrix(b))) => {
            a.len() == b.len()
                && a.iter().zip(b).all(|(ra, rb)| {
                    ra.len() == rb.len()
                        && ra.iter().zip(rb).all(|(x, y)| approx::relative_eq!(*x, *y))
                })
        }
        _ => false,
    }
}

// floats compared with relative tolerance, everything else exactly
impl PartialEq for GraphParams {
    fn eq(&self, other: &Self) -> bool {
        self.n_pca == other.n_pca
            && self.reduction == other.reduction
            && self.knn == other.knn
            && option_eq(self.decay, other.decay)
            && self.distance == other.distance
            && approx::relative_eq!(self.effective_thresh(), other.effective_thresh())
            && self.kernel_symm == other.kernel_symm
            && gamma_eq(&self.effective_gamma(), &other.effective_gamma())
            && approx::relative_eq!(self.beta, other.beta)
            && self.adaptive_k == other.adaptive_k
            && self.n_landmark == other.n_landmark
            && self.n_svd == other.n_svd
            && self.n_jobs == other.n_jobs
            && self.random_state == other.random_state
            && self.verbose == other.verbose
            && self.graph_type == other.graph_type
            && self.precomputed == other.precomputed
            && self.graph_view == other.graph_view
    }
}

impl GraphParams {
    /// Threshold after applying the decay-dependent default.
    pub fn effective_thresh(&self) -> f64 {
        match (self.thresh, self.decay) {
            (Some(t), _) => t,
            (None, Some(_)) => DEFAULT_THRESH,
            (None, None) => 0.0,
        }
    }

    /// γ the symmetrizer actually uses: the default under the gamma policy
    /// when none is given, nothing under any other policy.
    pub fn effective_gamma(&self) -> Option<Gamma> {
        match (self.kernel_symm, &self.gamma) {
            (Symmetrization::Gamma, None) => Some(Gamma::Scalar(DEFAULT_GAMMA)),
            (Symmetrization::Gamma, Some(g)) => Some(g.clone()),
            _ => None,
        }
    }

    pub fn seed(&self) -> u64 {
        self.random_state.unwrap_or(DEFAULT_SEED)
    }

    /// Range checks on individual options.
    pub fn validate(&self) -> Result<()> {
        if self.knn == 0 {
            return Err(GraphError::Config("knn must be at least 1".to_string()));
        }
        if let Some(a) = self.decay {
            if !(a.is_finite() && a > 0.0) {
                return Err(GraphError::Config(format!(
                    "decay must be a positive number or None, got {a}"
                )));
            }
        }
        let t = self.effective_thresh();
        if !(t.is_finite() && t >= 0.0) {
            return Err(GraphError::Config(format!("thresh must be nonnegative, got {t}")));
        }
        if !(0.0..=1.0).contains(&self.beta) {
            return Err(GraphError::Config(format!(
                "beta must be in [0, 1], got {}",
                self.beta
            )));
        }
        if self.n_pca == Some(0) {
            return Err(GraphError::Config("n_pca must be at least 1".to_string()));
        }
        if self.n_landmark == Some(0) {
            return Err(GraphError::Config("n_landmark must be at least 1".to_string()));
        }
        if self.n_svd == 0 {
            return Err(GraphError::Config("n_svd must be at least 1".to_string()));
        }
        Ok(())
    }

    /// New snapshot with `update` applied.
    pub fn updated(&self, update: &ParamUpdate) -> GraphParams {
        let mut p = self.clone();
        if let Some(v) = update.n_pca {
            p.n_pca = v;
        }
        if let Some(v) = update.knn {
            p.knn = v;
        }
        if let Some(v) = update.decay {
            p.decay = v;
        }
        if let Some(v) = update.distance {
            p.distance = v;
        }
        if let Some(v) = update.thresh {
            p.thresh = Some(v);
        }
        if let Some(v) = update.kernel_symm {
            p.kernel_symm = v;
        }
        if let Some(v) = &update.gamma {
            p.gamma = v.clone();
        }
        if let Some(v) = update.beta {
            p.beta = v;
        }
        if let Some(v) = update.adaptive_k {
            p.adaptive_k = v;
        }
        if let Some(v) = update.n_landmark {
            p.n_landmark = v;
        }
        if let Some(v) = update.n_svd {
            p.n_svd = v;
        }
        if let Some(v) = update.n_jobs {
            p.n_jobs = v;
        }
        if let Some(v) = update.random_state {
            p.random_state = v;
        }
        if let Some(v) = update.verbose {
            p.verbose = v;
        }
        if let Some(v) = update.graph_view {
            p.graph_view = v;
        }
        if let Some(v) = update.graph_type {
            p.graph_type = v;
        }
        if let Some(v) = update.precomputed {
            p.precomputed = v;
        }
        if let Some(v) = update.reduction {
            p.reduction = v;
        }
        p
    }

    /// First option in `update` that would change the kernel or its topology.
    ///
    /// Setting an option to its current value is not a change.
    pub fn topology_change(&self, update: &ParamUpdate) -> Option<&'static str> {
        if matches!(update.n_pca, Some(v) if v != self.n_pca) {
            return Some("n_pca");
        }
        if matches!(update.knn, Some(v) if v != self.knn) {
            return Some("knn");
        }
        if matches!(update.decay, Some(v) if !option_eq(v, self.decay)) {
            return Some("decay");
        }
        if matches!(update.distance, Some(v) if v != self.distance) {
            return Some("distance");
        }
        if matches!(update.thresh, Some(v) if !approx::relative_eq!(v, self.effective_thresh())) {
            return Some("thresh");
        }
        if matches!(update.kernel_symm, Some(v) if v != self.kernel_symm) {
            return Some("kernel_symm");
        }
        if let Some(v) = &update.gamma {
            let requested = GraphParams {
                gamma: v.clone(),
                ..self.clone()
            };
            if !gamma_eq(&requested.effective_gamma(), &self.effective_gamma()) {
                return Some("gamma");
            }
        }
        if matches!(update.beta, Some(v) if !approx::relative_eq!(v, self.beta)) {
            return Some("beta");
        }
        if matches!(update.adaptive_k, Some(v) if v != self.adaptive_k) {
            return Some("adaptive_k");
        }
        if matches!(update.graph_type, Some(v) if v != self.graph_type) {
            return Some("graph_type");
        }
        if matches!(update.precomputed, Some(v) if v != self.precomputed) {
            return Some("precomputed");
        }
        if matches!(update.reduction, Some(v) if v != self.reduction) {
            return Some("reduction");
        }
        None
    }

    /// Whether `update` touches the landmark layer.
    pub fn landmark_change(&self, update: &ParamUpdate) -> bool {
        matches!(update.n_landmark, Some(v) if v != self.n_landmark)
            || matches!(update.n_svd, Some(v) if v != self.n_svd)
    }
}

/// A value in the flat parameter export.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    None,
    Int(i64),
    Float(f64),
    Str(String),
    Matrix(Vec<Vec<f64>>),
}

impl From<Option<usize>> for ParamValue {
    fn from(v: Option<usize>) -> Self {
        v.map(|x| ParamValue::Int(x as i64)).unwrap_or(ParamValue::None)
    }
}

impl From<Option<f64>> for ParamValue {
    fn from(v: Option<f64>) -> Self {
        v.map(ParamValue::Float).unwrap_or(ParamValue::None)
    }
}

impl From<Option<&Gamma>> for ParamValue {
    fn from(v: Option<&Gamma>) -> Self {
        match v {
            None => ParamValue::None,
            Some(Gamma::Scalar(g)) => ParamValue::Float(*g),
            Some(Gamma::Vector(g)) => ParamValue::Matrix(vec![g.clone()]),
            Some(Gamma::Matrix(g)) => ParamValue::Matrix(g.clone()),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::None => write!(f, "None"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Str(v) => write!(f, "'{v}'"),
            ParamValue::Matrix(v) => write!(f, "{v:?}"),
        }
    }
}

pub type ParamMap = BTreeMap<String, ParamValue>;

/// Requested changes; `None` fields are left alone.
///
/// Double options set a nullable parameter: `decay: Some(None)` asks for a
/// binary kernel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParamUpdate {
    pub n_pca: Option<Option<usize>>,
    pub knn: Option<usize>,
    pub decay: Option<Option<f64>>,
    pub distance: Option<Metric>,
    pub thresh: Option<f64>,
    pub kernel_symm: Option<Symmetrization>,
    pub gamma: Option<Option<Gamma>>,
    pub beta: Option<f64>,
    pub adaptive_k: Option<AdaptiveK>,
    pub n_landmark: Option<Option<usize>>,
    pub n_svd: Option<usize>,
    pub n_jobs: Option<i32>,
    pub random_state: Option<Option<u64>>,
    pub verbose: Option<u8>,
    pub graph_view: Option<bool>,
    pub graph_type: Option<GraphType>,
    pub precomputed: Option<Option<Precomputed>>,
    pub reduction: Option<ReductionMethod>,
}

fn int_param(key: &str, value: &ParamValue) -> Result<i64> {
    match value {
        ParamValue::Int(v) => Ok(*v),
        other => Err(GraphError::Config(format!("`{key}` expects an integer, got {other}"))),
    }
}

fn opt_int_param(key: &str, value: &ParamValue) -> Result<Option<i64>> {
    match value {
        ParamValue::None => Ok(None),
        other => int_param(key, other).map(Some),
    }
}

fn float_param(key: &str, value: &ParamValue) -> Result<f64> {
    match value {
        ParamValue::Float(v) => Ok(*v),
        ParamValue::Int(v) => Ok(*v as f64),
        other => Err(GraphError::Config(format!("`{key}` expects a number, got {other}"))),
    }
}

fn str_param<'a>(key: &str, value: &'a ParamValue) -> Result<&'a str> {
    match value {
        ParamValue::Str(v) => Ok(v),
        other => Err(GraphError::Config(format!("`{key}` expects a name, got {other}"))),
    }
}

fn count_param<T: TryFrom<i64>>(key: &str, v: i64) -> Result<T> {
    T::try_from(v).map_err(|_| GraphError::Config(format!("`{key}` out of range: {v}")))
}

/// Parse a flat export back into an update, so that values read with
/// `get_params` can be passed straight to `set_params` or `rebuild`.
impl TryFrom<&ParamMap> for ParamUpdate {
    type Error = GraphError;

    fn try_from(map: &ParamMap) -> Result<Self> {
        let mut u = ParamUpdate::default();
        for (key, value) in map {
            match key.as_str() {
                "n_pca" => {
                    u.n_pca = Some(
                        opt_int_param(key, value)?
                            .map(|v| count_param(key, v))
                            .transpose()?,
                    )
                }
                "knn" => u.knn = Some(count_param(key, int_param(key, value)?)?),
                "decay" => {
                    u.decay = Some(match value {
                        ParamValue::None => None,
                        v => Some(float_param(key, v)?),
                    })
                }
                "distance" => u.distance = Some(str_param(key, value)?.parse()?),
                "thresh" => u.thresh = Some(float_param(key, value)?),
                "kernel_symm" => u.kernel_symm = Some(str_param(key, value)?.parse()?),
                "gamma" => {
                    u.gamma = Some(match value {
                        ParamValue::None => None,
                        ParamValue::Matrix(m) => Some(Gamma::Matrix(m.clone())),
                        v => Some(Gamma::Scalar(float_param(key, v)?)),
                    })
                }
                "beta" => u.beta = Some(float_param(key, value)?),
                "adaptive_k" => u.adaptive_k = Some(str_param(key, value)?.parse()?),
                "n_landmark" => {
                    u.n_landmark = Some(
                        opt_int_param(key, value)?
                            .map(|v| count_param(key, v))
                            .transpose()?,
                    )
                }
                "n_svd" => u.n_svd = Some(count_param(key, int_param(key, value)?)?),
                "n_jobs" => u.n_jobs = Some(count_param(key, int_param(key, value)?)?),
                "random_state" => {
                    u.random_state = Some(
                        opt_int_param(key, value)?
                            .map(|v| count_param(key, v))
                            .transpose()?,
                    )
                }
                "verbose" => u.verbose = Some(count_param(key, int_param(key, value)?)?),
                "graph_type" => u.graph_type = Some(str_param(key, value)?.parse()?),
                "precomputed" => {
                    u.precomputed = Some(match value {
                        ParamValue::None => None,
                        v => Some(str_param(key, v)?.parse()?),
                    })
                }
                "reduction" => u.reduction = Some(str_param(key, value)?.parse()?),
                other => {
                    return Err(GraphError::UnknownName {
                        kind: "parameter",
                        name: other.to_string(),
                        expected: "the keys returned by get_params",
                    })
                }
            }
        }
        Ok(u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_thresh_follows_decay() {
        let p = GraphParams::default();
        assert_eq!(p.effective_thresh(), DEFAULT_THRESH);
        let binary = GraphParams {
            decay: None,
            ..Default::default()
        };
        assert_eq!(binary.effective_thresh(), 0.0);
    }

    #[test]
    fn test_same_value_is_not_a_change() {
        let p = GraphParams::default();
        let same = ParamUpdate {
            knn: Some(p.knn),
            decay: Some(p.decay),
            thresh: Some(p.effective_thresh()),
            distance: Some(p.distance),
            beta: Some(p.beta),
            adaptive_k: Some(p.adaptive_k),
            ..Default::default()
        };
        assert_eq!(p.topology_change(&same), None);
        let knn = ParamUpdate {
            knn: Some(15),
            ..Default::default()
        };
        assert_eq!(p.topology_change(&knn), Some("knn"));
        assert_eq!(p.updated(&knn).knn, 15);
    }

    #[test]
    fn test_params_approx_eq() {
        let a = GraphParams {
            decay: Some(10.0),
            ..Default::default()
        };
        let b = GraphParams {
            decay: Some(10.0 + 1e-14),
            ..Default::default()
        };
        assert_eq!(a, b);
        assert_ne!(
            a,
            GraphParams {
                knn: 6,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_effective_gamma_is_not_a_change() {
        let defaulted = GraphParams {
            kernel_symm: Symmetrization::Gamma,
            ..Default::default()
        };
        let same = ParamUpdate {
            gamma: Some(Some(Gamma::Scalar(DEFAULT_GAMMA))),
            ..Default::default()
        };
        assert_eq!(defaulted.topology_change(&same), None);
        assert_eq!(defaulted.updated(&same), defaulted);
        let other = ParamUpdate {
            gamma: Some(Some(Gamma::Scalar(0.2))),
            ..Default::default()
        };
        assert_eq!(defaulted.topology_change(&other), Some("gamma"));

        // unused under the additive policy
        let unused = GraphParams {
            gamma: Some(Gamma::Scalar(0.9)),
            ..Default::default()
        };
        let cleared = ParamUpdate {
            gamma: Some(None),
            ..Default::default()
        };
        assert_eq!(unused.topology_change(&cleared), None);
    }

    #[test]
    fn test_update_from_flat_map() {
        let mut map = ParamMap::new();
        map.insert("knn".to_string(), ParamValue::Int(7));
        map.insert("decay".to_string(), ParamValue::None);
        map.insert("distance".to_string(), ParamValue::Str("manhattan".to_string()));
        map.insert("gamma".to_string(), ParamValue::Float(0.3));
        map.insert("precomputed".to_string(), ParamValue::Str("adjacency".to_string()));
        let u = ParamUpdate::try_from(&map).unwrap();
        assert_eq!(u.knn, Some(7));
        assert_eq!(u.decay, Some(None));
        assert_eq!(u.distance, Some(Metric::Manhattan));
        assert_eq!(u.gamma, Some(Some(Gamma::Scalar(0.3))));
        assert_eq!(u.precomputed, Some(Some(Precomputed::Adjacency)));

        map.insert("k".to_string(), ParamValue::Int(3));
        assert!(ParamUpdate::try_from(&map).unwrap_err().is_configuration());
        map.remove("k");
        map.insert("knn".to_string(), ParamValue::Int(-1));
        assert!(ParamUpdate::try_from(&map).is_err());
    }

    #[test]
    fn test_strategy_options_force_rebuild() {
        let p = GraphParams::default();
        let exact = ParamUpdate {
            graph_type: Some(GraphType::Exact),
            ..Default::default()
        };
        assert_eq!(p.topology_change(&exact), Some("graph_type"));
        assert_eq!(p.updated(&exact).graph_type, GraphType::Exact);
        let svd = ParamUpdate {
            reduction: Some(ReductionMethod::Svd),
            ..Default::default()
        };
        assert_eq!(p.topology_change(&svd), Some("reduction"));
    }

    #[test]
    fn test_graph_type_names() {
        assert_eq!("MNN".parse::<GraphType>().unwrap(), GraphType::Mnn);
        let err = "traditional".parse::<GraphType>().unwrap_err();
        assert!(err.is_configuration());
    }
}
