use std::collections::BTreeSet;

use log::info;

use crate::builder::GraphBuilder;
use crate::data::{Data, Precomputed};
use crate::error::GraphError;
use crate::graph::Graph;
use crate::metric::Metric;
use crate::params::{GraphType, ParamUpdate, ParamValue};
use crate::symmetrize::{Gamma, Symmetrization};
use crate::tests::test_helpers::{pairwise, swiss_roll};

fn knn_graph(rows: &[Vec<f64>]) -> Graph {
    GraphBuilder::new()
        .with_knn(5)
        .with_random_state(Some(3))
        .build(Data::from_rows(rows).unwrap())
        .unwrap()
}

fn keys(graph: &Graph) -> BTreeSet<String> {
    graph.get_params().into_keys().collect()
}

fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

const KERNEL_KEYS: [&str; 10] = [
    "knn",
    "decay",
    "distance",
    "thresh",
    "kernel_symm",
    "gamma",
    "n_pca",
    "random_state",
    "n_jobs",
    "verbose",
];

#[test]
fn test_knn_update_rejected_in_place() {
    crate::tests::init();
    info!("Test: set_params refuses to change knn");

    let rows = swiss_roll(40, 0.5, 61);
    let mut graph = knn_graph(&rows);
    let before = graph.weights().clone();
    let err = graph
        .set_params(&ParamUpdate {
            knn: Some(10),
            ..Default::default()
        })
        .unwrap_err();
    assert_eq!(err, GraphError::InPlaceUpdate("knn"));
    assert!(err.is_configuration());
    assert_eq!(graph.params().knn, 5);
    assert_eq!(graph.weights().max_abs_diff(&before), 0.0);

    for update in [
        ParamUpdate {
            decay: Some(None),
            ..Default::default()
        },
        ParamUpdate {
            distance: Some(Metric::Manhattan),
            ..Default::default()
        },
        ParamUpdate {
            n_pca: Some(Some(2)),
            ..Default::default()
        },
        ParamUpdate {
            thresh: Some(1e-2),
            ..Default::default()
        },
    ] {
        assert!(matches!(
            graph.set_params(&update),
            Err(GraphError::InPlaceUpdate(_))
        ));
    }
}

#[test]
fn test_same_values_accepted() {
    crate::tests::init();
    let rows = swiss_roll(30, 0.5, 62);
    let mut graph = knn_graph(&rows);
    graph
        .set_params(&ParamUpdate {
            knn: Some(5),
            decay: Some(Some(10.0)),
            thresh: Some(1e-4),
            distance: Some(Metric::Euclidean),
            ..Default::default()
        })
        .unwrap();
}

#[test]
fn test_metadata_updates_in_place() {
    crate::tests::init();
    let rows = swiss_roll(30, 0.5, 63);
    let mut graph = knn_graph(&rows);
    let before = graph.weights().clone();
    graph
        .set_params(&ParamUpdate {
            n_jobs: Some(-1),
            random_state: Some(Some(99)),
            verbose: Some(2),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(graph.params().n_jobs, -1);
    assert_eq!(graph.params().random_state, Some(99));
    assert_eq!(graph.get_params()["verbose"], ParamValue::Int(2));
    assert_eq!(graph.weights().max_abs_diff(&before), 0.0);
}

#[test]
fn test_invalid_update_leaves_graph_alone() {
    crate::tests::init();
    let rows = swiss_roll(30, 0.5, 64);
    let mut graph = knn_graph(&rows);
    let err = graph
        .set_params(&ParamUpdate {
            n_jobs: Some(4),
            n_svd: Some(0),
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(err, GraphError::Config(_)));
    assert_eq!(graph.params().n_jobs, 1);
}

#[test]
fn test_graph_view_toggles() {
    crate::tests::init();
    let rows = swiss_roll(30, 0.5, 65);
    let mut graph = knn_graph(&rows);
    assert!(graph.laplacian().is_none());
    graph
        .set_params(&ParamUpdate {
            graph_view: Some(true),
            ..Default::default()
        })
        .unwrap();
    assert!(graph.strategy().graph_view);
    assert_eq!(graph.laplacian().unwrap().nnodes, 30);
    graph
        .set_params(&ParamUpdate {
            graph_view: Some(false),
            ..Default::default()
        })
        .unwrap();
    assert!(graph.laplacian().is_none());
}

#[test]
fn test_rebuild_matches_fresh_build() {
    crate::tests::init();
    info!("Test: rebuild with a new knn equals a fresh build");

    let rows = swiss_roll(50, 0.5, 66);
    let graph = knn_graph(&rows);
    let rebuilt = graph
        .rebuild(&ParamUpdate {
            knn: Some(10),
            ..Default::default()
        })
        .unwrap();
    let fresh = GraphBuilder::new()
        .with_knn(10)
        .with_random_state(Some(3))
        .build(Data::from_rows(&rows).unwrap())
        .unwrap();

    assert_eq!(rebuilt.params(), fresh.params());
    assert_eq!(rebuilt.weights().max_abs_diff(fresh.weights()), 0.0);
    assert_eq!(rebuilt.get_params(), fresh.get_params());
    // the original is untouched
    assert_eq!(graph.params().knn, 5);
}

#[test]
fn test_rebuild_keeps_labels() {
    crate::tests::init();
    let rows = swiss_roll(40, 0.5, 67);
    let labels: Vec<u8> = (0..40).map(|i| (i % 2) as u8).collect();
    let graph = GraphBuilder::new()
        .with_sample_labels(&labels)
        .build(Data::from_rows(&rows).unwrap())
        .unwrap();
    let rebuilt = graph
        .rebuild(&ParamUpdate {
            beta: Some(0.5),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(rebuilt.kind(), graph.kind());
    assert_eq!(rebuilt.sample_labels(), graph.sample_labels());
    assert_eq!(rebuilt.get_params()["beta"], ParamValue::Float(0.5));
}

#[test]
fn test_param_keys_per_variant() {
    crate::tests::init();
    info!("Test: get_params returns the variant's key set");

    let rows = swiss_roll(30, 0.5, 68);
    let knn = knn_graph(&rows);
    assert_eq!(keys(&knn), set(&KERNEL_KEYS));
    let params = knn.get_params();
    assert_eq!(params["knn"], ParamValue::Int(5));
    assert_eq!(params["decay"], ParamValue::Float(10.0));
    assert_eq!(params["distance"], ParamValue::Str("euclidean".to_string()));
    assert_eq!(params["kernel_symm"], ParamValue::Str("+".to_string()));
    assert_eq!(params["gamma"], ParamValue::None);
    assert_eq!(params["n_pca"], ParamValue::None);

    let labels: Vec<u8> = (0..30).map(|i| (i % 2) as u8).collect();
    let mnn = GraphBuilder::new()
        .with_sample_labels(&labels)
        .build(Data::from_rows(&rows).unwrap())
        .unwrap();
    let mut expected = set(&KERNEL_KEYS);
    expected.extend(set(&["beta", "adaptive_k"]));
    assert_eq!(keys(&mnn), expected);

    let exact = GraphBuilder::new()
        .with_precomputed(Some(Precomputed::Distance))
        .build(Data::from_rows(&pairwise(&rows, Metric::Euclidean)).unwrap())
        .unwrap();
    let mut expected = set(&KERNEL_KEYS);
    expected.insert("precomputed".to_string());
    assert_eq!(keys(&exact), expected);
    assert_eq!(
        exact.get_params()["precomputed"],
        ParamValue::Str("distance".to_string())
    );
}

#[test]
fn test_exported_params_round_trip() {
    crate::tests::init();
    info!("Test: every get_params export is accepted back by set_params");

    let rows = swiss_roll(40, 0.5, 69);
    let labels: Vec<u8> = (0..40).map(|i| (i % 2) as u8).collect();
    let graphs = vec![
        knn_graph(&rows),
        // gamma policy without gamma: the default 0.5 is exported
        GraphBuilder::new()
            .with_kernel_symm(Symmetrization::Gamma)
            .build(Data::from_rows(&rows).unwrap())
            .unwrap(),
        // gamma under the additive policy is unused and exported as None
        GraphBuilder::new()
            .with_gamma(Gamma::Scalar(0.9))
            .build(Data::from_rows(&rows).unwrap())
            .unwrap(),
        GraphBuilder::new()
            .with_sample_labels(&labels)
            .with_kernel_symm(Symmetrization::Gamma)
            .with_gamma(Gamma::Matrix(vec![vec![1.0, 0.8], vec![0.8, 1.0]]))
            .build(Data::from_rows(&rows).unwrap())
            .unwrap(),
        GraphBuilder::new()
            .with_precomputed(Some(Precomputed::Distance))
            .build(Data::from_rows(&pairwise(&rows, Metric::Euclidean)).unwrap())
            .unwrap(),
        GraphBuilder::new()
            .with_n_landmark(Some(4))
            .with_n_svd(4)
            .build(Data::from_rows(&rows).unwrap())
            .unwrap(),
    ];

    for mut graph in graphs {
        let exported = graph.get_params();
        let update = ParamUpdate::try_from(&exported).unwrap();
        let before = graph.weights().clone();
        graph
            .set_params(&update)
            .unwrap_or_else(|e| panic!("{:?} rejected its own params: {e}", graph.kind()));
        assert_eq!(graph.get_params(), exported);
        assert_eq!(graph.weights().max_abs_diff(&before), 0.0);
    }
}

#[test]
fn test_rebuild_with_new_graph_type() {
    crate::tests::init();
    let rows = swiss_roll(30, 0.5, 70);
    let mut graph = knn_graph(&rows);
    let update = ParamUpdate {
        graph_type: Some(GraphType::Exact),
        ..Default::default()
    };
    assert_eq!(
        graph.set_params(&update).unwrap_err(),
        GraphError::InPlaceUpdate("graph_type")
    );
    let rebuilt = graph.rebuild(&update).unwrap();
    assert_eq!(rebuilt.kind(), GraphType::Exact);
    assert!(rebuilt.weights().is_symmetric(1e-12));
}
