use log::info;

use crate::batch::AdaptiveK;
use crate::builder::GraphBuilder;
use crate::data::Data;
use crate::error::{Diagnostic, GraphError};
use crate::params::GraphType;
use crate::symmetrize::{Gamma, Symmetrization};
use crate::tests::test_helpers::{decay_kernel, max_diff, swiss_roll};

/// Two interleaved batches of a swiss roll, the second shifted.
fn two_batch_roll(n: usize, seed: u64) -> (Vec<Vec<f64>>, Vec<usize>) {
    let mut rows = swiss_roll(n, 0.5, seed);
    let labels: Vec<usize> = (0..n).map(|i| i % 2).collect();
    for (row, &l) in rows.iter_mut().zip(&labels) {
        if l == 1 {
            row[0] += 2.0;
        }
    }
    (rows, labels)
}

/// Block-wise kernel assembled outside the graph: K[i, j] for i in batch a,
/// j in batch b uses batch b as the reference set.
fn block_kernel(rows: &[Vec<f64>], labels: &[usize], k: usize, a: f64, t: f64) -> Vec<Vec<f64>> {
    let n = rows.len();
    let mut out = vec![vec![0.0; n]; n];
    for bj in 0..2 {
        let members: Vec<usize> = (0..n).filter(|&i| labels[i] == bj).collect();
        let refs: Vec<Vec<f64>> = members.iter().map(|&i| rows[i].clone()).collect();
        let block = decay_kernel(rows, &refs, k, a, t);
        for i in 0..n {
            for (c, &j) in members.iter().enumerate() {
                out[i][j] = block[i][c];
            }
        }
    }
    out
}

fn blend(g: f64, a: f64, b: f64) -> f64 {
    g * a.min(b) + (1.0 - g) * a.max(b)
}

#[test]
fn test_scalar_gamma_matches_block_assembly() {
    crate::tests::init();
    info!("Test: two-batch graph with scalar gamma 0.5");

    let (rows, labels) = two_batch_roll(80, 11);
    let graph = GraphBuilder::new()
        .with_knn(5)
        .with_decay(Some(10.0))
        .with_kernel_symm(Symmetrization::Gamma)
        .with_gamma(Gamma::Scalar(0.5))
        .with_adaptive_k(AdaptiveK::None)
        .with_sample_labels(&labels)
        .build(Data::from_rows(&rows).unwrap())
        .unwrap();
    assert_eq!(graph.kind(), GraphType::Mnn);

    let k = block_kernel(&rows, &labels, 5, 10.0, 1e-4);
    assert!(max_diff(&k, graph.kernel()) < 1e-12);

    let n = rows.len();
    let mut w = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            if i != j {
                w[i][j] = (k[i][j].min(k[j][i]) + k[i][j].max(k[j][i])) / 2.0;
            }
        }
    }
    assert!(max_diff(&w, graph.weights()) < 1e-12);
    info!("✓ weights nnz {}", graph.weights().nnz());
}

#[test]
fn test_gamma_matrix_matches_block_weights() {
    crate::tests::init();
    info!("Test: 2x2 gamma matrix with off-diagonal 0.8");

    let (rows, labels) = two_batch_roll(60, 12);
    let gamma = vec![vec![1.0, 0.8], vec![0.8, 1.0]];
    let graph = GraphBuilder::new()
        .with_knn(4)
        .with_decay(Some(5.0))
        .with_thresh(0.0)
        .with_graph_type(GraphType::Mnn)
        .with_kernel_symm(Symmetrization::Gamma)
        .with_gamma(Gamma::Matrix(gamma.clone()))
        .with_adaptive_k(AdaptiveK::None)
        .with_sample_labels(&labels)
        .build(Data::from_rows(&rows).unwrap())
        .unwrap();
    assert!(!graph.kernel().is_sparse());

    let k = block_kernel(&rows, &labels, 4, 5.0, 0.0);
    let n = rows.len();
    let mut w = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            if i != j {
                w[i][j] = blend(gamma[labels[i]][labels[j]], k[i][j], k[j][i]);
            }
        }
    }
    assert!(max_diff(&w, graph.weights()) < 1e-12);
    assert!(graph.weights().is_symmetric(1e-12));
}

#[test]
fn test_label_values_do_not_matter() {
    crate::tests::init();
    let (rows, labels) = two_batch_roll(50, 13);
    let build = |b: GraphBuilder| b.build(Data::from_rows(&rows).unwrap()).unwrap();

    let base = build(GraphBuilder::new().with_sample_labels(&labels));
    let shifted: Vec<usize> = labels.iter().map(|l| l + 1).collect();
    let named: Vec<&str> = labels.iter().map(|&l| if l == 0 { "ctrl" } else { "treated" }).collect();
    let other_shift = build(GraphBuilder::new().with_sample_labels(&shifted));
    let other_named = build(GraphBuilder::new().with_sample_labels(&named));

    assert_eq!(base.weights().max_abs_diff(other_shift.weights()), 0.0);
    assert_eq!(base.weights().max_abs_diff(other_named.weights()), 0.0);
}

#[test]
fn test_single_label_falls_back() {
    crate::tests::init();
    info!("Test: a single batch label builds the plain graph");

    let rows = swiss_roll(40, 0.5, 14);
    let labels = vec!["only"; rows.len()];
    let with_labels = GraphBuilder::new()
        .with_sample_labels(&labels)
        .build(Data::from_rows(&rows).unwrap())
        .unwrap();
    let without = GraphBuilder::new()
        .build(Data::from_rows(&rows).unwrap())
        .unwrap();

    assert!(with_labels.diagnostics().contains(&Diagnostic::SingleBatch {
        label: "\"only\"".to_string()
    }));
    assert_eq!(with_labels.kind(), without.kind());
    assert_eq!(with_labels.weights().max_abs_diff(without.weights()), 0.0);
}

#[test]
fn test_explicit_mnn_with_single_label_falls_back() {
    crate::tests::init();
    let rows = swiss_roll(30, 0.5, 15);
    let graph = GraphBuilder::new()
        .with_graph_type(GraphType::Mnn)
        .with_sample_labels(&vec![3u8; rows.len()])
        .build(Data::from_rows(&rows).unwrap())
        .unwrap();
    assert_eq!(graph.kind(), GraphType::Knn);
}

#[test]
fn test_beta_scales_within_batch_blocks() {
    crate::tests::init();
    let (rows, labels) = two_batch_roll(40, 16);
    let build = |beta: f64| {
        GraphBuilder::new()
            .with_beta(beta)
            .with_adaptive_k(AdaptiveK::None)
            .with_sample_labels(&labels)
            .build(Data::from_rows(&rows).unwrap())
            .unwrap()
    };
    let full = build(1.0);
    let half = build(0.5);
    for i in 0..rows.len() {
        for j in 0..rows.len() {
            let scale = if labels[i] == labels[j] { 0.5 } else { 1.0 };
            approx::assert_abs_diff_eq!(
                half.kernel().get(i, j),
                scale * full.kernel().get(i, j),
                epsilon = 1e-15
            );
        }
    }
}

#[test]
fn test_adaptive_k_changes_cross_blocks_only() {
    crate::tests::init();
    // batch 0 holds three times as many points as batch 1
    let rows = swiss_roll(80, 0.5, 17);
    let labels: Vec<usize> = (0..80).map(|i| usize::from(i % 4 == 0)).collect();
    let build = |policy: AdaptiveK| {
        GraphBuilder::new()
            .with_adaptive_k(policy)
            .with_sample_labels(&labels)
            .build(Data::from_rows(&rows).unwrap())
            .unwrap()
    };
    let fixed = build(AdaptiveK::None);
    let scaled = build(AdaptiveK::Mean);
    for i in 0..80 {
        for j in 0..80 {
            if labels[i] == labels[j] {
                assert_eq!(fixed.kernel().get(i, j), scaled.kernel().get(i, j));
            }
        }
    }
    assert!(fixed.kernel().max_abs_diff(scaled.kernel()) > 0.0);
}

#[test]
fn test_gamma_validation() {
    crate::tests::init();
    let (rows, labels) = two_batch_roll(30, 18);
    let build = |gamma: Gamma, labelled: bool| {
        let mut b = GraphBuilder::new()
            .with_kernel_symm(Symmetrization::Gamma)
            .with_gamma(gamma);
        if labelled {
            b = b.with_sample_labels(&labels);
        }
        b.build(Data::from_rows(&rows).unwrap())
    };

    let wrong_shape = build(Gamma::Matrix(vec![vec![1.0; 3]; 3]), true).unwrap_err();
    assert!(matches!(
        wrong_shape,
        GraphError::GammaShape {
            rows: 3,
            cols: 3,
            expected: 2
        }
    ));
    assert!(build(Gamma::Scalar(1.5), true).unwrap_err().is_configuration());
    assert!(build(Gamma::Vector(vec![0.5, 0.5]), true)
        .unwrap_err()
        .is_configuration());
    let asymmetric = vec![vec![1.0, 0.2], vec![0.8, 1.0]];
    assert!(build(Gamma::Matrix(asymmetric), true).is_err());

    let unlabelled = build(Gamma::Matrix(vec![vec![1.0, 0.8], vec![0.8, 1.0]]), false).unwrap_err();
    assert!(matches!(unlabelled, GraphError::Incompatible(_)));
}

#[test]
fn test_gamma_without_value_defaults() {
    crate::tests::init();
    let (rows, labels) = two_batch_roll(30, 19);
    let graph = GraphBuilder::new()
        .with_kernel_symm(Symmetrization::Gamma)
        .with_sample_labels(&labels)
        .build(Data::from_rows(&rows).unwrap())
        .unwrap();
    assert!(graph
        .diagnostics()
        .contains(&Diagnostic::GammaDefaulted { gamma: 0.5 }));
}

#[test]
fn test_label_length_mismatch() {
    crate::tests::init();
    let rows = swiss_roll(20, 0.5, 20);
    let err = GraphBuilder::new()
        .with_sample_labels(&vec![0usize; 19])
        .build(Data::from_rows(&rows).unwrap())
        .unwrap_err();
    assert!(err.is_data());
    assert!(matches!(
        err,
        GraphError::LengthMismatch {
            expected: 20,
            found: 19,
            ..
        }
    ));
}

#[test]
fn test_labelled_extension_reproduces_kernel() {
    crate::tests::init();
    info!("Test: extending the data with its own labels gives back K");

    // uneven batches under the default sqrt policy, within-batch blocks halved
    let rows = swiss_roll(80, 0.5, 31);
    let labels: Vec<&str> = (0..80).map(|i| if i % 4 == 0 { "small" } else { "large" }).collect();
    let graph = GraphBuilder::new()
        .with_beta(0.5)
        .with_sample_labels(&labels)
        .build(Data::from_rows(&rows).unwrap())
        .unwrap();
    assert_eq!(graph.kind(), GraphType::Mnn);

    let labelled = graph.build_kernel_to_batches(&rows, &labels).unwrap();
    assert!(labelled.max_abs_diff(graph.kernel()) < 1e-15);

    // batchless points: base k everywhere and no beta
    let batchless = graph.build_kernel_to_data(&rows).unwrap();
    assert!(batchless.max_abs_diff(graph.kernel()) > 0.0);
    for i in 0..80 {
        for j in 0..80 {
            if labels[i] == labels[j] {
                let expected = 0.5 * batchless.get(i, j);
                assert!((graph.kernel().get(i, j) - expected).abs() < 1e-15);
            }
        }
    }
}

#[test]
fn test_labelled_extension_errors() {
    crate::tests::init();
    let (rows, labels) = two_batch_roll(30, 32);
    let graph = GraphBuilder::new()
        .with_sample_labels(&labels)
        .build(Data::from_rows(&rows).unwrap())
        .unwrap();
    let err = graph.build_kernel_to_batches(&rows[..2], &[0usize, 7]).unwrap_err();
    assert!(err.is_configuration());
    let err = graph.build_kernel_to_batches(&rows[..2], &[0usize]).unwrap_err();
    assert!(matches!(err, GraphError::LengthMismatch { expected: 2, found: 1, .. }));

    let knn = GraphBuilder::new()
        .build(Data::from_rows(&rows).unwrap())
        .unwrap();
    let err = knn.build_kernel_to_batches(&rows[..2], &[0usize, 1]).unwrap_err();
    assert!(matches!(err, GraphError::Interpolation(_)));
}
