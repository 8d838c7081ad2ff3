//! Leading subspace of the diffusion affinity by randomized block power iteration.

use log::{debug, trace};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::matrix::Affinity;

/// Power iterations applied to the random start block.
pub const POWER_ITERATIONS: usize = 12;

/// Orthonormal basis (as columns) of the top `n_components` subspace of
/// `D^{-1/2} W D^{-1/2}`. Zero-degree nodes contribute zero rows.
///
/// Deterministic for a given `seed` and `weights`.
pub fn diffusion_subspace(weights: &Affinity, n_components: usize, seed: u64) -> Vec<Vec<f64>> {
    let n = weights.shape().0;
    let p = n_components.min(n).max(1);
    let inv_sqrt: Vec<f64> = weights
        .row_sums()
        .into_iter()
        .map(|d| if d > 0.0 { 1.0 / d.sqrt() } else { 0.0 })
        .collect();
    debug!(
        "Randomized subspace iteration: n={}, components={}, iterations={}",
        n, p, POWER_ITERATIONS
    );

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut basis: Vec<Vec<f64>> = (0..p)
        .map(|_| (0..n).map(|_| StandardNormal.sample(&mut rng)).collect())
        .collect();
    orthonormalize(&mut basis);

    for it in 0..POWER_ITERATIONS {
        basis = basis
            .iter()
            .map(|q| {
                let scaled: Vec<f64> = q.iter().zip(&inv_sqrt).map(|(x, s)| x * s).collect();
                weights
                    .mul_vec(&scaled)
                    .into_iter()
                    .zip(&inv_sqrt)
                    .map(|(x, s)| x * s)
                    .collect()
            })
            .collect();
        orthonormalize(&mut basis);
        trace!("power iteration {} done", it);
    }
    basis
}

/// Rows of `D^{-1} W Q` for a column basis `Q`: the diffusion embedding.
pub fn diffusion_embedding(weights: &Affinity, basis: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = weights.shape().0;
    let inv_deg: Vec<f64> = weights
        .row_sums()
        .into_iter()
        .map(|d| if d > 0.0 { 1.0 / d } else { 0.0 })
        .collect();
    let columns: Vec<Vec<f64>> = basis
        .iter()
        .map(|q| {
            weights
                .mul_vec(q)
                .into_iter()
                .zip(&inv_deg)
                .map(|(x, s)| x * s)
                .collect()
        })
        .collect();
    (0..n)
        .map(|i| columns.iter().map(|c| c[i]).collect())
        .collect()
}

/// Modified Gram-Schmidt on column vectors; degenerate columns become zero.
pub fn orthonormalize(columns: &mut [Vec<f64>]) {
    for j in 0..columns.len() {
        let (done, rest) = columns.split_at_mut(j);
        let col = &mut rest[0];
        for prev in done.iter() {
            let dot: f64 = prev.iter().zip(col.iter()).map(|(a, b)| a * b).sum();
            for (c, p) in col.iter_mut().zip(prev) {
                *c -= dot * p;
            }
        }
        let norm = col.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > 1e-12 {
            col.iter_mut().for_each(|x| *x /= norm);
        } else {
            col.iter_mut().for_each(|x| *x = 0.0);
        }
    }
}
