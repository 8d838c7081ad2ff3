//! Nearest-neighbor search over a fixed reference set.
//!
//! The kernel builder only needs two queries, k-nearest and fixed-radius,
//! both returning `(index, distance)` pairs nearest first. `BruteForceSearch`
//! answers them exactly; it is the one place where the crate runs work in
//! parallel, on a rayon pool sized by `n_jobs`.

use std::cmp::Ordering;
use std::sync::Arc;

use log::{debug, trace, warn};
use rayon::prelude::*;
use rayon::ThreadPool;

use crate::metric::Metric;

/// Neighbor search over a reference set.
///
/// Batched queries take one radius per query so the caller can use per-point
/// adaptive bandwidths.
pub trait NeighborSearch: Send + Sync {
    /// Number of reference points.
    fn n_points(&self) -> usize;

    /// Dimensionality of the reference points.
    fn dim(&self) -> usize;

    fn metric(&self) -> Metric;

    /// The `k` nearest reference points for each query, nearest first.
    fn knn_batch(&self, queries: &[Vec<f64>], k: usize) -> Vec<Vec<(usize, f64)>>;

    /// Every reference point within `radii[q]` of query `q` (inclusive), nearest first.
    fn radius_batch(&self, queries: &[Vec<f64>], radii: &[f64]) -> Vec<Vec<(usize, f64)>>;

    /// Change the worker count for future queries.
    fn set_n_jobs(&mut self, n_jobs: i32);
}

/// Number of worker threads for an `n_jobs` setting.
///
/// `1` is serial, `-1` all CPUs, `-2` all but one, and so on.
pub fn resolve_n_jobs(n_jobs: i32) -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1) as i64;
    let n = if n_jobs < 0 {
        cpus + 1 + n_jobs as i64
    } else {
        n_jobs as i64
    };
    n.max(1) as usize
}

/// Worker pool for an `n_jobs` setting, built once and shared by clones.
///
/// `None` inside means serial, or the global rayon pool when a dedicated pool
/// could not be created.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    n_jobs: i32,
    threads: usize,
    pool: Option<Arc<ThreadPool>>,
}

impl WorkerPool {
    pub fn new(n_jobs: i32) -> Self {
        let threads = resolve_n_jobs(n_jobs);
        let pool = if threads > 1 {
            match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
                Ok(pool) => Some(Arc::new(pool)),
                Err(e) => {
                    warn!("Could not build a {threads}-thread pool ({e}), using the global pool");
                    None
                }
            }
        } else {
            None
        };
        debug!("Worker pool: n_jobs={} -> {} threads", n_jobs, threads);
        Self {
            n_jobs,
            threads,
            pool,
        }
    }

    pub fn n_jobs(&self) -> i32 {
        self.n_jobs
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Map `f` over `0..n`, in parallel when the pool has more than one thread.
    fn map<F>(&self, n: usize, f: F) -> Vec<Vec<(usize, f64)>>
    where
        F: Fn(usize) -> Vec<(usize, f64)> + Send + Sync,
    {
        if self.threads == 1 || n < 2 {
            return (0..n).map(f).collect();
        }
        trace!("Running {} queries on {} threads", n, self.threads);
        match &self.pool {
            Some(pool) => pool.install(|| (0..n).into_par_iter().map(&f).collect()),
            None => (0..n).into_par_iter().map(&f).collect(),
        }
    }
}

/// Exact search by scanning every reference point.
#[derive(Clone, Debug)]
pub struct BruteForceSearch {
    points: Vec<Vec<f64>>,
    metric: Metric,
    workers: WorkerPool,
}

impl BruteForceSearch {
    pub fn new(points: Vec<Vec<f64>>, metric: Metric, n_jobs: i32) -> Self {
        Self::with_pool(points, metric, WorkerPool::new(n_jobs))
    }

    /// Search that runs on an existing pool.
    pub fn with_pool(points: Vec<Vec<f64>>, metric: Metric, workers: WorkerPool) -> Self {
        debug!(
            "Building brute-force search over {} points, metric={}, n_jobs={}",
            points.len(),
            metric,
            workers.n_jobs()
        );
        Self {
            points,
            metric,
            workers,
        }
    }

    pub fn set_pool(&mut self, workers: WorkerPool) {
        self.workers = workers;
    }

    pub fn n_jobs(&self) -> i32 {
        self.workers.n_jobs()
    }

    /// All distances from `query`, sorted ascending with index as tie-break.
    fn sorted_distances(&self, query: &[f64]) -> Vec<(usize, f64)> {
        let mut all: Vec<(usize, f64)> = self
            .points
            .iter()
            .enumerate()
            .map(|(j, p)| (j, self.metric.distance(query, p)))
            .collect();
        all.sort_unstable_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        all
    }

}

impl NeighborSearch for BruteForceSearch {
    fn n_points(&self) -> usize {
        self.points.len()
    }

    fn dim(&self) -> usize {
        self.points.first().map(|p| p.len()).unwrap_or(0)
    }

    fn metric(&self) -> Metric {
        self.metric
    }

    fn knn_batch(&self, queries: &[Vec<f64>], k: usize) -> Vec<Vec<(usize, f64)>> {
        let k = k.min(self.points.len());
        self.workers.map(queries.len(), |q| {
            let mut all = self.sorted_distances(&queries[q]);
            all.truncate(k);
            all
        })
    }

    fn radius_batch(&self, queries: &[Vec<f64>], radii: &[f64]) -> Vec<Vec<(usize, f64)>> {
        assert_eq!(queries.len(), radii.len(), "one radius per query");
        self.workers.map(queries.len(), |q| {
            let r = radii[q];
            self.sorted_distances(&queries[q])
                .into_iter()
                .take_while(|&(_, d)| d <= r)
                .collect()
        })
    }

    fn set_n_jobs(&mut self, n_jobs: i32) {
        debug!("Neighbor search n_jobs: {} -> {}", self.n_jobs(), n_jobs);
        self.workers = WorkerPool::new(n_jobs);
    }
}
