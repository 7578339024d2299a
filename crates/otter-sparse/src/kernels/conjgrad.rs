use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::matvec::MatVec;
use super::packed::PackedSymmetric;
use super::vector::{axpy, inner_product, max_abs, orthog1};
use crate::error::{Result, ensure_len};
use crate::matrix::SparseMatrix;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CgOptions {
    /// Stop once `max |r_i|` falls to this value.
    pub tol: f64,
    pub max_iterations: usize,
    /// Keep every iterate orthogonal to the all-ones vector, the null space of a Laplacian.
    pub orthogonalize: bool,
}

impl Default for CgOptions {
    fn default() -> Self {
        Self {
            tol: 1e-3,
            max_iterations: 200,
            orthogonalize: true,
        }
    }
}

impl CgOptions {
    pub fn new(tol: f64, max_iterations: usize) -> Self {
        Self {
            tol,
            max_iterations,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CgOutcome {
    pub iterations: usize,
    /// `max |b - A x|` at exit.
    pub residual: f64,
    /// The search direction collapsed (`pᵀAp == 0` or `rᵀr == 0`) before the tolerance was met.
    pub degenerate: bool,
}

impl CgOutcome {
    pub fn converged(&self, tol: f64) -> bool {
        !self.degenerate && self.residual <= tol
    }
}

/// Solves `A x = b` starting from the contents of `x`.
pub fn conjugate_gradient<A: MatVec + ?Sized>(
    a: &A,
    x: &mut [f64],
    b: &[f64],
    opts: &CgOptions,
) -> Result<CgOutcome> {
    let n = a.dim();
    ensure_len("solution vector", n, x.len())?;
    ensure_len("right-hand side", n, b.len())?;

    let mut rhs = b.to_vec();
    if opts.orthogonalize {
        orthog1(&mut rhs);
        orthog1(x);
    }
    let mut ap = vec![0.0; n];
    a.apply(x, &mut ap);
    let mut r: Vec<f64> = rhs.iter().zip(&ap).map(|(b, ax)| b - ax).collect();
    if opts.orthogonalize {
        orthog1(&mut r);
    }
    let mut p = r.clone();
    let mut r_r = inner_product(&r, &r);

    let mut iterations = 0;
    let mut degenerate = false;
    while iterations < opts.max_iterations && max_abs(&r) > opts.tol {
        a.apply(&p, &mut ap);
        if opts.orthogonalize {
            orthog1(&mut ap);
        }
        let p_ap = inner_product(&p, &ap);
        if p_ap == 0.0 || r_r == 0.0 {
            degenerate = true;
            break;
        }
        let alpha = r_r / p_ap;
        axpy(alpha, &p, x);
        axpy(-alpha, &ap, &mut r);
        let r_r_new = inner_product(&r, &r);
        let beta = r_r_new / r_r;
        r_r = r_r_new;
        for (pi, ri) in p.iter_mut().zip(&r) {
            *pi = ri + beta * *pi;
        }
        iterations += 1;
    }

    let residual = max_abs(&r);
    if degenerate {
        debug!(iterations, residual, "conjugate gradient hit a degenerate direction");
    } else {
        trace!(iterations, residual, "conjugate gradient finished");
    }
    Ok(CgOutcome {
        iterations,
        residual,
        degenerate,
    })
}

pub fn conjugate_gradient_sparse(
    a: &SparseMatrix<f64>,
    x: &mut [f64],
    b: &[f64],
    opts: &CgOptions,
) -> Result<CgOutcome> {
    crate::error::ensure_square(a.nrows(), a.ncols())?;
    conjugate_gradient(a, x, b, opts)
}

pub fn conjugate_gradient_dense(
    a: &DMatrix<f64>,
    x: &mut [f64],
    b: &[f64],
    opts: &CgOptions,
) -> Result<CgOutcome> {
    crate::error::ensure_square(a.nrows(), a.ncols())?;
    conjugate_gradient(a, x, b, opts)
}

pub fn conjugate_gradient_packed(
    a: &PackedSymmetric,
    x: &mut [f64],
    b: &[f64],
    opts: &CgOptions,
) -> Result<CgOutcome> {
    conjugate_gradient(a, x, b, opts)
}

/// Solves one system per coordinate axis. `x` and `b` are row-major `n x dim`.
///
/// Returns the outcome of the worst axis.
pub fn conjugate_gradient_kd<A: MatVec + ?Sized>(
    a: &A,
    x: &mut [f64],
    b: &[f64],
    dim: usize,
    opts: &CgOptions,
) -> Result<CgOutcome> {
    let n = a.dim();
    ensure_len("coordinates", n * dim, x.len())?;
    ensure_len("right-hand side", n * dim, b.len())?;
    let mut worst = CgOutcome {
        iterations: 0,
        residual: 0.0,
        degenerate: false,
    };
    let mut xk = vec![0.0; n];
    let mut bk = vec![0.0; n];
    for k in 0..dim {
        for i in 0..n {
            xk[i] = x[i * dim + k];
            bk[i] = b[i * dim + k];
        }
        let out = conjugate_gradient(a, &mut xk, &bk, opts)?;
        for i in 0..n {
            x[i * dim + k] = xk[i];
        }
        worst.iterations = worst.iterations.max(out.iterations);
        worst.residual = worst.residual.max(out.residual);
        worst.degenerate |= out.degenerate;
    }
    Ok(worst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solves_a_small_spd_system_without_orthogonalization() {
        let a = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let mut x = vec![0.0; 2];
        let opts = CgOptions {
            tol: 1e-10,
            max_iterations: 10,
            orthogonalize: false,
        };
        let out = conjugate_gradient_dense(&a, &mut x, &[1.0, 2.0], &opts).unwrap();
        assert!(out.converged(1e-10));
        assert!((x[0] - 1.0 / 11.0).abs() < 1e-9);
        assert!((x[1] - 7.0 / 11.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_mismatched_vectors() {
        let a = DMatrix::<f64>::identity(3, 3);
        let mut x = vec![0.0; 2];
        assert!(conjugate_gradient_dense(&a, &mut x, &[1.0; 3], &CgOptions::default()).is_err());
    }
}
