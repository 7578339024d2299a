use crate::error::{Error, Result, ensure_len};
use crate::matrix::SparseMatrix;
use crate::scalar::Scalar;

const NO_SLOT: usize = usize::MAX;

fn mismatch<T: Scalar, U: Scalar>(
    op: &'static str,
    a: &SparseMatrix<T>,
    b: &SparseMatrix<U>,
) -> Error {
    Error::DimensionMismatch {
        op,
        left: (a.nrows(), a.ncols()),
        right: (b.nrows(), b.ncols()),
    }
}

impl<T: Scalar> SparseMatrix<T> {
    /// Entrywise sum. Positions present in both operands are merged through a per-row mask.
    pub fn add(&self, b: &Self) -> Result<Self> {
        if self.nrows() != b.nrows() || self.ncols() != b.ncols() {
            return Err(mismatch("add", self, b));
        }
        let (ia, ja, a) = (self.row_ptr(), self.col_indices(), self.values());
        let (ib, jb, bv) = (b.row_ptr(), b.col_indices(), b.values());

        let mut mask = vec![NO_SLOT; self.ncols()];
        let mut ic = Vec::with_capacity(self.nrows() + 1);
        let mut jc = Vec::with_capacity(self.nnz() + b.nnz());
        let mut c = Vec::with_capacity(self.nnz() + b.nnz());
        ic.push(0);
        for i in 0..self.nrows() {
            let row_start = jc.len();
            for k in ia[i]..ia[i + 1] {
                mask[ja[k]] = jc.len();
                jc.push(ja[k]);
                c.push(a[k]);
            }
            for k in ib[i]..ib[i + 1] {
                let slot = mask[jb[k]];
                if slot == NO_SLOT || slot < row_start {
                    jc.push(jb[k]);
                    c.push(bv[k]);
                } else {
                    c[slot] = c[slot].add(bv[k]);
                }
            }
            ic.push(jc.len());
        }
        Ok(Self::from_parts_unchecked(
            self.nrows(),
            self.ncols(),
            ic,
            jc,
            c,
        ))
    }

    /// Sparse product `self * b` accumulated row by row through a column mask.
    pub fn multiply(&self, b: &Self) -> Result<Self> {
        if self.ncols() != b.nrows() {
            return Err(mismatch("multiply", self, b));
        }
        let (ia, ja, a) = (self.row_ptr(), self.col_indices(), self.values());
        let (ib, jb, bv) = (b.row_ptr(), b.col_indices(), b.values());

        let mut mask = vec![NO_SLOT; b.ncols()];
        let mut ic = Vec::with_capacity(self.nrows() + 1);
        let mut jc = Vec::new();
        let mut c: Vec<T> = Vec::new();
        ic.push(0);
        for i in 0..self.nrows() {
            let row_start = jc.len();
            for k in ia[i]..ia[i + 1] {
                let r = ja[k];
                for l in ib[r]..ib[r + 1] {
                    let j = jb[l];
                    let v = a[k].mul(bv[l]);
                    let slot = mask[j];
                    if slot == NO_SLOT || slot < row_start {
                        mask[j] = jc.len();
                        jc.push(j);
                        c.push(v);
                    } else {
                        c[slot] = c[slot].add(v);
                    }
                }
            }
            ic.push(jc.len());
        }
        Ok(Self::from_parts_unchecked(
            self.nrows(),
            b.ncols(),
            ic,
            jc,
            c,
        ))
    }

    /// Fused triple product `self * b * c` without materializing `self * b`.
    pub fn multiply3(&self, b: &Self, c: &Self) -> Result<Self> {
        if self.ncols() != b.nrows() {
            return Err(mismatch("multiply3", self, b));
        }
        if b.ncols() != c.nrows() {
            return Err(mismatch("multiply3", b, c));
        }
        let (ia, ja, a) = (self.row_ptr(), self.col_indices(), self.values());
        let (ib, jb, bv) = (b.row_ptr(), b.col_indices(), b.values());
        let (icc, jcc, cv) = (c.row_ptr(), c.col_indices(), c.values());

        let mut mask = vec![NO_SLOT; c.ncols()];
        let mut id = Vec::with_capacity(self.nrows() + 1);
        let mut jd = Vec::new();
        let mut d: Vec<T> = Vec::new();
        id.push(0);
        for i in 0..self.nrows() {
            let row_start = jd.len();
            for k in ia[i]..ia[i + 1] {
                let r = ja[k];
                for l in ib[r]..ib[r + 1] {
                    let s = jb[l];
                    let ab = a[k].mul(bv[l]);
                    for t in icc[s]..icc[s + 1] {
                        let j = jcc[t];
                        let v = ab.mul(cv[t]);
                        let slot = mask[j];
                        if slot == NO_SLOT || slot < row_start {
                            mask[j] = jd.len();
                            jd.push(j);
                            d.push(v);
                        } else {
                            d[slot] = d[slot].add(v);
                        }
                    }
                }
            }
            id.push(jd.len());
        }
        Ok(Self::from_parts_unchecked(
            self.nrows(),
            c.ncols(),
            id,
            jd,
            d,
        ))
    }

    /// `A v` (or `Aᵀ v` when `transposed`), reading entries through [`Scalar::to_real`].
    pub fn multiply_vector(&self, v: &[f64], transposed: bool) -> Result<Vec<f64>> {
        let (inner, outer) = if transposed {
            (self.nrows(), self.ncols())
        } else {
            (self.ncols(), self.nrows())
        };
        ensure_len("vector", inner, v.len())?;
        let mut out = vec![0.0; outer];
        self.multiply_vector_into(v, &mut out, transposed);
        Ok(out)
    }

    /// Unchecked kernel behind [`Self::multiply_vector`]; `out` is overwritten.
    pub(crate) fn multiply_vector_into(&self, v: &[f64], out: &mut [f64], transposed: bool) {
        let (ia, ja, a) = (self.row_ptr(), self.col_indices(), self.values());
        if transposed {
            out.fill(0.0);
            for i in 0..self.nrows() {
                for k in ia[i]..ia[i + 1] {
                    out[ja[k]] += a[k].to_real() * v[i];
                }
            }
        } else {
            for i in 0..self.nrows() {
                let mut sum = 0.0;
                for k in ia[i]..ia[i + 1] {
                    sum += a[k].to_real() * v[ja[k]];
                }
                out[i] = sum;
            }
        }
    }

    /// Row sums, or column sums when `transposed`: the product with an all-ones vector.
    pub fn multiply_ones(&self, transposed: bool) -> Vec<f64> {
        let len = if transposed { self.nrows() } else { self.ncols() };
        let ones = vec![1.0; len];
        let mut out = vec![0.0; if transposed { self.ncols() } else { self.nrows() }];
        self.multiply_vector_into(&ones, &mut out, transposed);
        out
    }

    /// Sparse times dense.
    ///
    /// With `v_transposed == false`, `v` is row-major `len x dim`; otherwise it is row-major
    /// `dim x len`. `len` is `ncols` for `A` and `nrows` for `Aᵀ`. The result is row-major
    /// `out_rows x dim`, or `dim x out_rows` when `res_transposed` is set.
    pub fn multiply_dense(
        &self,
        a_transposed: bool,
        v: &[f64],
        v_transposed: bool,
        dim: usize,
        res_transposed: bool,
    ) -> Result<Vec<f64>> {
        let (inner, outer) = if a_transposed {
            (self.nrows(), self.ncols())
        } else {
            (self.ncols(), self.nrows())
        };
        ensure_len("dense operand", inner * dim, v.len())?;
        let (ia, ja, a) = (self.row_ptr(), self.col_indices(), self.values());

        if !v_transposed {
            let mut u = vec![0.0; outer * dim];
            for i in 0..self.nrows() {
                for k in ia[i]..ia[i + 1] {
                    let w = a[k].to_real();
                    let (dst, src) = if a_transposed { (ja[k], i) } else { (i, ja[k]) };
                    for d in 0..dim {
                        u[dst * dim + d] += w * v[src * dim + d];
                    }
                }
            }
            return Ok(if res_transposed {
                dense_transpose(&u, outer, dim)
            } else {
                u
            });
        }

        // One column of the result per row of `v`.
        let mut u = vec![0.0; outer * dim];
        for d in 0..dim {
            self.multiply_vector_into(
                &v[d * inner..(d + 1) * inner],
                &mut u[d * outer..(d + 1) * outer],
                a_transposed,
            );
        }
        Ok(if res_transposed {
            u
        } else {
            dense_transpose(&u, dim, outer)
        })
    }

    pub fn multiply_by_scalar(&mut self, s: f64) {
        for v in self.values_mut() {
            *v = v.scale(s);
        }
    }

    /// Scales row `i` by `v[i]` (or column `j` by `v[j]`).
    pub fn scale_by_vector(&mut self, v: &[f64], apply_to_row: bool) -> Result<()> {
        let expected = if apply_to_row { self.nrows() } else { self.ncols() };
        ensure_len("scaling vector", expected, v.len())?;
        let ia = self.row_ptr().to_vec();
        let ja = self.col_indices().to_vec();
        let values = self.values_mut();
        for i in 0..ia.len() - 1 {
            for k in ia[i]..ia[i + 1] {
                let s = if apply_to_row { v[i] } else { v[ja[k]] };
                values[k] = values[k].scale(s);
            }
        }
        Ok(())
    }
}

/// Transposes a row-major `rows x cols` dense block.
pub fn dense_transpose(v: &[f64], rows: usize, cols: usize) -> Vec<f64> {
    let mut out = vec![0.0; rows * cols];
    for i in 0..rows {
        for j in 0..cols {
            out[j * rows + i] = v[i * cols + j];
        }
    }
    out
}
