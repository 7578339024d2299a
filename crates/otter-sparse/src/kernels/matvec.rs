use nalgebra::DMatrix;

use super::packed::PackedSymmetric;
use crate::matrix::SparseMatrix;

/// A square linear operator applied to dense vectors.
pub trait MatVec {
    fn dim(&self) -> usize;

    /// `out = A x`; `out` is overwritten.
    fn apply(&self, x: &[f64], out: &mut [f64]);
}

impl MatVec for SparseMatrix<f64> {
    fn dim(&self) -> usize {
        self.nrows()
    }

    fn apply(&self, x: &[f64], out: &mut [f64]) {
        self.multiply_vector_into(x, out, false);
    }
}

impl MatVec for DMatrix<f64> {
    fn dim(&self) -> usize {
        self.nrows()
    }

    fn apply(&self, x: &[f64], out: &mut [f64]) {
        for (i, o) in out.iter_mut().enumerate() {
            *o = self.row(i).iter().zip(x).map(|(a, b)| a * b).sum();
        }
    }
}

impl MatVec for PackedSymmetric {
    fn dim(&self) -> usize {
        PackedSymmetric::dim(self)
    }

    fn apply(&self, x: &[f64], out: &mut [f64]) {
        self.mat_vec(x, out);
    }
}

impl<M: MatVec + ?Sized> MatVec for &M {
    fn dim(&self) -> usize {
        (**self).dim()
    }

    fn apply(&self, x: &[f64], out: &mut [f64]) {
        (**self).apply(x, out);
    }
}

/// Implicit operator backed by a closure.
pub struct FnMatVec<F> {
    dim: usize,
    f: F,
}

impl<F: Fn(&[f64], &mut [f64])> FnMatVec<F> {
    pub fn new(dim: usize, f: F) -> Self {
        Self { dim, f }
    }
}

impl<F: Fn(&[f64], &mut [f64])> MatVec for FnMatVec<F> {
    fn dim(&self) -> usize {
        self.dim
    }

    fn apply(&self, x: &[f64], out: &mut [f64]) {
        (self.f)(x, out);
    }
}
