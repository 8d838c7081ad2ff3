//! Affinity storage: dense when every entry is kept, sparse CSR otherwise.
//!
//! Kernels built with a zero threshold keep every entry and are stored
//! densely; thresholded kernels only store entries above the threshold.
//! Both storages expose the same row-oriented view so the symmetrizer,
//! landmark operator and extension code never branch on the representation
//! except when assembling a result.

use smartcore::linalg::basic::arrays::{Array, Array2, MutArray};
use smartcore::linalg::basic::matrix::DenseMatrix;
use sprs::{CsMat, TriMat};

use log::trace;

#[derive(Clone, Debug)]
pub enum Affinity {
    Dense(DenseMatrix<f64>),
    Sparse(CsMat<f64>),
}

impl Affinity {
    /// Assemble from per-row `(column, value)` lists.
    ///
    /// Dense output keeps explicit zeros; sparse output drops them. Repeated
    /// columns in a row are summed.
    pub fn from_rows(rows: &[Vec<(usize, f64)>], ncols: usize, dense: bool) -> Self {
        let nrows = rows.len();
        if dense {
            let mut m = DenseMatrix::<f64>::zeros(nrows, ncols);
            for (i, row) in rows.iter().enumerate() {
                for &(j, v) in row {
                    let cur = *m.get((i, j));
                    m.set((i, j), cur + v);
                }
            }
            Affinity::Dense(m)
        } else {
            let mut triplets = TriMat::new((nrows, ncols));
            for (i, row) in rows.iter().enumerate() {
                for &(j, v) in row {
                    if v != 0.0 {
                        triplets.add_triplet(i, j, v);
                    }
                }
            }
            Affinity::Sparse(triplets.to_csr())
        }
    }

    /// Dense affinity from row vectors.
    pub fn from_dense_rows(rows: &[Vec<f64>]) -> Self {
        let nrows = rows.len();
        let ncols = rows.first().map(|r| r.len()).unwrap_or(0);
        Affinity::Dense(DenseMatrix::from_iterator(
            rows.iter().flatten().copied(),
            nrows,
            ncols,
            0,
        ))
    }

    pub fn shape(&self) -> (usize, usize) {
        match self {
            Affinity::Dense(m) => m.shape(),
            Affinity::Sparse(m) => (m.rows(), m.cols()),
        }
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, Affinity::Sparse(_))
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        match self {
            Affinity::Dense(m) => *m.get((i, j)),
            Affinity::Sparse(m) => m.get(i, j).copied().unwrap_or(0.0),
        }
    }

    /// Entries of row `i` as `(column, value)`, ascending column.
    ///
    /// Dense rows include zero entries.
    pub fn row(&self, i: usize) -> Vec<(usize, f64)> {
        match self {
            Affinity::Dense(m) => {
                let (_, ncols) = m.shape();
                (0..ncols).map(|j| (j, *m.get((i, j)))).collect()
            }
            Affinity::Sparse(m) => match m.outer_view(i) {
                Some(row) => row.iter().map(|(j, &v)| (j, v)).collect(),
                None => Vec::new(),
            },
        }
    }

    /// All rows, see [`Affinity::row`].
    pub fn rows(&self) -> Vec<Vec<(usize, f64)>> {
        (0..self.shape().0).map(|i| self.row(i)).collect()
    }

    /// Number of nonzero entries.
    pub fn nnz(&self) -> usize {
        match self {
            Affinity::Dense(m) => {
                let (r, c) = m.shape();
                let mut count = 0;
                for i in 0..r {
                    for j in 0..c {
                        if *m.get((i, j)) != 0.0 {
                            count += 1;
                        }
                    }
                }
                count
            }
            Affinity::Sparse(m) => m.data().iter().filter(|&&v| v != 0.0).count(),
        }
    }

    /// Row sums (degrees for a square affinity).
    pub fn row_sums(&self) -> Vec<f64> {
        (0..self.shape().0)
            .map(|i| self.row(i).iter().map(|&(_, v)| v).sum())
            .collect()
    }

    pub fn to_dense_rows(&self) -> Vec<Vec<f64>> {
        let (r, c) = self.shape();
        let mut out = vec![vec![0.0; c]; r];
        for (i, row) in self.rows().into_iter().enumerate() {
            for (j, v) in row {
                out[i][j] = v;
            }
        }
        out
    }

    /// Rows of the transpose.
    fn transposed_rows(&self) -> Vec<Vec<(usize, f64)>> {
        let (r, c) = self.shape();
        let mut out = vec![Vec::new(); c];
        for i in 0..r {
            for (j, v) in self.row(i) {
                out[j].push((i, v));
            }
        }
        out
    }

    /// Combine the matrix with its transpose entry by entry.
    ///
    /// `f(i, j, a, b)` receives `a = M[i,j]` and `b = M[j,i]`. Sparse inputs
    /// visit the union of both patterns only, so `f(i, j, 0, 0)` must be 0.
    pub fn zip_with_transpose<F>(&self, f: F) -> Affinity
    where
        F: Fn(usize, usize, f64, f64) -> f64,
    {
        let (n, c) = self.shape();
        assert_eq!(n, c, "zip_with_transpose needs a square matrix, got {n}x{c}");
        trace!("Combining {n}x{n} affinity with its transpose");
        match self {
            Affinity::Dense(m) => {
                let mut out = DenseMatrix::<f64>::zeros(n, n);
                for i in 0..n {
                    for j in 0..n {
                        out.set((i, j), f(i, j, *m.get((i, j)), *m.get((j, i))));
                    }
                }
                Affinity::Dense(out)
            }
            Affinity::Sparse(_) => {
                let rows = self.rows();
                let trows = self.transposed_rows();
                let mut triplets = TriMat::new((n, n));
                for i in 0..n {
                    for (j, a, b) in merge_sorted(&rows[i], &trows[i]) {
                        let v = f(i, j, a, b);
                        if v != 0.0 {
                            triplets.add_triplet(i, j, v);
                        }
                    }
                }
                Affinity::Sparse(triplets.to_csr())
            }
        }
    }

    /// Same matrix with every diagonal entry set to zero.
    pub fn with_zero_diagonal(self) -> Affinity {
        match self {
            Affinity::Dense(mut m) => {
                let (r, c) = m.shape();
                for i in 0..r.min(c) {
                    m.set((i, i), 0.0);
                }
                Affinity::Dense(m)
            }
            Affinity::Sparse(m) => {
                let mut triplets = TriMat::new((m.rows(), m.cols()));
                for (i, row) in m.outer_iterator().enumerate() {
                    for (j, &v) in row.iter() {
                        if i != j && v != 0.0 {
                            triplets.add_triplet(i, j, v);
                        }
                    }
                }
                Affinity::Sparse(triplets.to_csr())
            }
        }
    }

    /// Multiply every entry by `s`.
    pub fn scaled(&self, s: f64) -> Affinity {
        let (_, c) = self.shape();
        let rows: Vec<Vec<(usize, f64)>> = self
            .rows()
            .into_iter()
            .map(|r| r.into_iter().map(|(j, v)| (j, v * s)).collect())
            .collect();
        Affinity::from_rows(&rows, c, !self.is_sparse())
    }

    /// Rows rescaled to sum to one; all-zero rows stay zero.
    pub fn row_normalised(&self) -> Affinity {
        let (_, c) = self.shape();
        let rows: Vec<Vec<(usize, f64)>> = self
            .rows()
            .into_iter()
            .map(|r| {
                let s: f64 = r.iter().map(|&(_, v)| v).sum();
                if s > 0.0 {
                    r.into_iter().map(|(j, v)| (j, v / s)).collect()
                } else {
                    r
                }
            })
            .collect();
        Affinity::from_rows(&rows, c, !self.is_sparse())
    }

    /// `y = M x`
    pub fn mul_vec(&self, x: &[f64]) -> Vec<f64> {
        assert_eq!(x.len(), self.shape().1, "vector length must match columns");
        (0..self.shape().0)
            .map(|i| self.row(i).iter().map(|&(j, v)| v * x[j]).sum())
            .collect()
    }

    /// `M · B` for a dense right-hand side given as rows (shape cols × p).
    pub fn mul_dense(&self, b: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let (r, c) = self.shape();
        assert_eq!(b.len(), c, "right-hand side must have {c} rows, got {}", b.len());
        let p = b.first().map(|row| row.len()).unwrap_or(0);
        let mut out = vec![vec![0.0; p]; r];
        for (i, out_row) in out.iter_mut().enumerate() {
            for (j, v) in self.row(i) {
                if v == 0.0 {
                    continue;
                }
                for (o, &bv) in out_row.iter_mut().zip(b[j].iter()) {
                    *o += v * bv;
                }
            }
        }
        out
    }

    /// Largest `|M[i,j] - M[j,i]|`.
    pub fn max_asymmetry(&self) -> f64 {
        let (n, c) = self.shape();
        if n != c {
            return f64::INFINITY;
        }
        let rows = self.rows();
        let trows = self.transposed_rows();
        let mut worst: f64 = 0.0;
        for i in 0..n {
            for (_, a, b) in merge_sorted(&rows[i], &trows[i]) {
                worst = worst.max((a - b).abs());
            }
        }
        worst
    }

    pub fn is_symmetric(&self, tolerance: f64) -> bool {
        self.max_asymmetry() <= tolerance
    }

    /// Largest entry-wise difference with another matrix of the same shape.
    pub fn max_abs_diff(&self, other: &Affinity) -> f64 {
        assert_eq!(self.shape(), other.shape(), "shape mismatch");
        let mut worst: f64 = 0.0;
        for i in 0..self.shape().0 {
            for (_, a, b) in merge_sorted(&self.row(i), &other.row(i)) {
                worst = worst.max((a - b).abs());
            }
        }
        worst
    }
}

/// Merge two column-sorted rows into `(column, a, b)` with 0 for missing sides.
fn merge_sorted(a: &[(usize, f64)], b: &[(usize, f64)]) -> Vec<(usize, f64, f64)> {
    let mut out = Vec::with_capacity(a.len().max(b.len()));
    let (mut p, mut q) = (0, 0);
    while p < a.len() || q < b.len() {
        match (a.get(p), b.get(q)) {
            (Some(&(ja, va)), Some(&(jb, vb))) if ja == jb => {
                out.push((ja, va, vb));
                p += 1;
                q += 1;
            }
            (Some(&(ja, va)), Some(&(jb, _))) if ja < jb => {
                out.push((ja, va, 0.0));
                p += 1;
            }
            (Some(_), Some(&(jb, vb))) => {
                out.push((jb, 0.0, vb));
                q += 1;
            }
            (Some(&(ja, va)), None) => {
                out.push((ja, va, 0.0));
                p += 1;
            }
            (None, Some(&(jb, vb))) => {
                out.push((jb, 0.0, vb));
                q += 1;
            }
            (None, None) => break,
        }
    }
    out
}
