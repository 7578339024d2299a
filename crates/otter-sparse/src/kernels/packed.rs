use nalgebra::DMatrix;

use crate::error::{Result, ensure_len, ensure_square};

/// Symmetric `n x n` matrix storing only the upper triangle (diagonal included), row by row.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedSymmetric {
    n: usize,
    data: Vec<f64>,
}

impl PackedSymmetric {
    pub fn zeros(n: usize) -> Self {
        Self {
            n,
            data: vec![0.0; n * (n + 1) / 2],
        }
    }

    /// Wraps an existing packed buffer of length `n (n + 1) / 2`.
    pub fn from_packed(n: usize, data: Vec<f64>) -> Result<Self> {
        ensure_len("packed matrix", n * (n + 1) / 2, data.len())?;
        Ok(Self { n, data })
    }

    /// Packs the upper triangle of `m`.
    pub fn from_dense(m: &DMatrix<f64>) -> Result<Self> {
        ensure_square(m.nrows(), m.ncols())?;
        let n = m.nrows();
        let mut out = Self::zeros(n);
        for i in 0..n {
            for j in i..n {
                out.set(i, j, m[(i, j)]);
            }
        }
        Ok(out)
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    #[inline]
    fn slot(&self, i: usize, j: usize) -> usize {
        let (i, j) = if i <= j { (i, j) } else { (j, i) };
        i * self.n - i * (i + 1) / 2 + j
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[self.slot(i, j)]
    }

    pub fn set(&mut self, i: usize, j: usize, v: f64) {
        let s = self.slot(i, j);
        self.data[s] = v;
    }

    pub fn add_to(&mut self, i: usize, j: usize, v: f64) {
        let s = self.slot(i, j);
        self.data[s] += v;
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Row `i` of the upper triangle: entries `(i, i..n)`.
    pub fn upper_row(&self, i: usize) -> &[f64] {
        let start = self.slot(i, i);
        &self.data[start..start + self.n - i]
    }

    pub fn upper_row_mut(&mut self, i: usize) -> &mut [f64] {
        let start = self.slot(i, i);
        let len = self.n - i;
        &mut self.data[start..start + len]
    }

    /// `out = self * x`; `out` is overwritten.
    pub fn mat_vec(&self, x: &[f64], out: &mut [f64]) {
        out.fill(0.0);
        for i in 0..self.n {
            let row = self.upper_row(i);
            out[i] += row[0] * x[i];
            for (k, &a) in row.iter().enumerate().skip(1) {
                let j = i + k;
                out[i] += a * x[j];
                out[j] += a * x[i];
            }
        }
    }

    pub fn to_dense(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.n, self.n, |i, j| self.get(i, j))
    }
}
