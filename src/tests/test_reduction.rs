use log::info;

use crate::builder::GraphBuilder;
use crate::data::Data;
use crate::error::Diagnostic;
use crate::reduction::{ReductionMethod, Reducer};
use crate::tests::test_helpers::{sparse_data, swiss_roll};

// ============================================================================
// Reduction inside graph construction
// ============================================================================

fn wide(n: usize, seed: u64) -> Vec<Vec<f64>> {
    // swiss roll padded with smooth nuisance features
    swiss_roll(n, 0.3, seed)
        .into_iter()
        .enumerate()
        .map(|(i, mut r)| {
            r.extend((0..7).map(|j| ((i * 7 + j) as f64 * 0.21).sin() * 0.1));
            r
        })
        .collect()
}

#[test]
fn test_pca_reduces_representation() {
    crate::tests::init();
    let rows = wide(60, 81);
    let graph = GraphBuilder::new()
        .with_n_pca(Some(3))
        .build(Data::from_rows(&rows).unwrap())
        .unwrap();
    assert_eq!(graph.reducer().name(), "pca");
    assert_eq!(graph.reducer().n_features(), 10);
    assert_eq!(graph.reducer().n_components(), 3);
    assert!(graph.data_nu().iter().all(|r| r.len() == 3));
    info!("✓ {:?}", graph.reducer());
}

#[test]
fn test_sparse_input_uses_svd() {
    crate::tests::init();
    let data = sparse_data(40, 30, 0.2, 82);
    let graph = GraphBuilder::new().with_n_pca(Some(5)).build(data).unwrap();
    assert_eq!(graph.reducer().name(), "svd");
    assert_eq!(graph.data_nu()[0].len(), 5);
    assert!(!graph
        .diagnostics()
        .iter()
        .any(|d| matches!(d, Diagnostic::SparseWithoutReduction { .. })));
}

#[test]
fn test_random_projection_follows_seed() {
    crate::tests::init();
    let rows = wide(40, 83);
    let build = |seed: u64| {
        GraphBuilder::new()
            .with_n_pca(Some(4))
            .with_reduction(ReductionMethod::RandomProjection)
            .with_random_state(Some(seed))
            .build(Data::from_rows(&rows).unwrap())
            .unwrap()
    };
    let a = build(1);
    let b = build(1);
    let c = build(2);
    assert_eq!(a.reducer().name(), "random_projection");
    assert_eq!(a.data_nu(), b.data_nu());
    assert_ne!(a.data_nu(), c.data_nu());
    assert_eq!(a.weights().max_abs_diff(b.weights()), 0.0);
}

#[test]
fn test_n_pca_too_large_skips_reduction() {
    crate::tests::init();
    let rows = swiss_roll(30, 0.3, 84);
    let graph = GraphBuilder::new()
        .with_n_pca(Some(3))
        .build(Data::from_rows(&rows).unwrap())
        .unwrap();
    assert!(graph.reducer().is_identity());
    assert!(graph.diagnostics().contains(&Diagnostic::ReductionSkipped {
        n_pca: 3,
        n_features: 3
    }));
    assert_eq!(graph.data_nu(), &rows[..]);
}

#[test]
fn test_reduction_method_names() {
    assert_eq!(
        "pca".parse::<ReductionMethod>().unwrap(),
        ReductionMethod::Pca
    );
    assert!("umap".parse::<ReductionMethod>().unwrap_err().is_configuration());
    let data = Data::from_rows(&wide(20, 85)).unwrap();
    let (reducer, _, _) = Reducer::fit(&data, Some(2), ReductionMethod::Svd, 0).unwrap();
    assert!(matches!(reducer, Reducer::Svd { n_components: 2, .. }));
}
