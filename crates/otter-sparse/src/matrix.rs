use std::cell::Cell;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result, ensure_len};
use crate::scalar::{MatrixKind, Pattern, Scalar, SumRepeated};

/// Absolute tolerance used when checking numeric symmetry.
pub const SYMMETRY_EPSILON: f64 = 1e-7;

const SYMMETRIC: u8 = 1;
const PATTERN_SYMMETRIC: u8 = 1 << 1;
const UNDIRECTED: u8 = 1 << 2;

const NO_SLOT: usize = usize::MAX;

/// Sparse matrix in compressed-row form.
///
/// Row `i` occupies `col_indices()[row_ptr()[i]..row_ptr()[i + 1]]`; column order inside a row
/// is whatever the producing operation left behind. The symmetry bits are a cache: every
/// operation that changes the structure clears them.
#[derive(Debug, Clone)]
pub struct SparseMatrix<T: Scalar = f64> {
    rows: usize,
    cols: usize,
    ia: Vec<usize>,
    ja: Vec<usize>,
    values: Vec<T>,
    flags: Cell<u8>,
}

/// Coordinate (triplet) form. Entries may repeat; they are folded on conversion.
#[derive(Debug, Clone)]
pub struct CoordinateMatrix<T: Scalar = f64> {
    rows: usize,
    cols: usize,
    irn: Vec<usize>,
    jcn: Vec<usize>,
    values: Vec<T>,
}

impl<T: Scalar> CoordinateMatrix<T> {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::with_capacity(rows, cols, 0)
    }

    pub fn with_capacity(rows: usize, cols: usize, nz: usize) -> Self {
        Self {
            rows,
            cols,
            irn: Vec::with_capacity(nz),
            jcn: Vec::with_capacity(nz),
            values: Vec::with_capacity(nz),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.irn.len()
    }

    pub fn is_empty(&self) -> bool {
        self.irn.is_empty()
    }

    pub fn push(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        if row >= self.rows || col >= self.cols {
            return Err(Error::IndexOutOfRange {
                row,
                col,
                rows: self.rows,
                cols: self.cols,
            });
        }
        self.irn.push(row);
        self.jcn.push(col);
        self.values.push(value);
        Ok(())
    }

    pub fn extend<I>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (usize, usize, T)>,
    {
        for (i, j, v) in entries {
            self.push(i, j, v)?;
        }
        Ok(())
    }

    pub fn entries(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        self.irn
            .iter()
            .zip(&self.jcn)
            .zip(&self.values)
            .map(|((&i, &j), &v)| (i, j, v))
    }

    pub fn into_csr(self, policy: SumRepeated) -> Result<SparseMatrix<T>> {
        SparseMatrix::from_coordinate_arrays(
            self.rows,
            self.cols,
            &self.irn,
            &self.jcn,
            &self.values,
            policy,
        )
    }
}

impl<T: Scalar> SparseMatrix<T> {
    /// An `rows x cols` matrix without entries.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            ia: vec![0; rows + 1],
            ja: Vec::new(),
            values: Vec::new(),
            flags: Cell::new(0),
        }
    }

    pub fn identity(n: usize) -> Self {
        let out = Self {
            rows: n,
            cols: n,
            ia: (0..=n).collect(),
            ja: (0..n).collect(),
            values: vec![T::one(); n],
            flags: Cell::new(0),
        };
        out.set_symmetric();
        out
    }

    pub(crate) fn from_parts_unchecked(
        rows: usize,
        cols: usize,
        ia: Vec<usize>,
        ja: Vec<usize>,
        values: Vec<T>,
    ) -> Self {
        Self {
            rows,
            cols,
            ia,
            ja,
            values,
            flags: Cell::new(0),
        }
    }

    /// Builds a matrix from raw CSR arrays, validating every invariant.
    pub fn from_csr_parts(
        rows: usize,
        cols: usize,
        ia: Vec<usize>,
        ja: Vec<usize>,
        values: Vec<T>,
    ) -> Result<Self> {
        ensure_len("row pointer", rows + 1, ia.len())?;
        ensure_len("values", ja.len(), values.len())?;
        if ia[0] != 0 || ia[rows] != ja.len() {
            return Err(Error::InvalidArgument {
                reason: format!(
                    "row pointer must start at 0 and end at {}, got {}..{}",
                    ja.len(),
                    ia[0],
                    ia[rows]
                ),
            });
        }
        for i in 0..rows {
            if ia[i] > ia[i + 1] {
                return Err(Error::InvalidArgument {
                    reason: format!("row pointer decreases at row {i}"),
                });
            }
            for &j in &ja[ia[i]..ia[i + 1]] {
                if j >= cols {
                    return Err(Error::IndexOutOfRange {
                        row: i,
                        col: j,
                        rows,
                        cols,
                    });
                }
            }
        }
        Ok(Self::from_parts_unchecked(rows, cols, ia, ja, values))
    }

    /// Converts unordered triples to CSR with a two-pass counting sort, then folds repeated
    /// positions according to `policy`.
    pub fn from_coordinate_arrays(
        rows: usize,
        cols: usize,
        irn: &[usize],
        jcn: &[usize],
        vals: &[T],
        policy: SumRepeated,
    ) -> Result<Self> {
        let nz = irn.len();
        ensure_len("column indices", nz, jcn.len())?;
        ensure_len("values", nz, vals.len())?;

        let mut ia = vec![0usize; rows + 1];
        for (&i, &j) in irn.iter().zip(jcn) {
            if i >= rows || j >= cols {
                return Err(Error::IndexOutOfRange {
                    row: i,
                    col: j,
                    rows,
                    cols,
                });
            }
            ia[i + 1] += 1;
        }
        for i in 0..rows {
            ia[i + 1] += ia[i];
        }

        let mut next = ia.clone();
        let mut ja = vec![0usize; nz];
        let mut values = vec![T::zero(); nz];
        for k in 0..nz {
            let slot = next[irn[k]];
            ja[slot] = jcn[k];
            values[slot] = vals[k];
            next[irn[k]] += 1;
        }

        let mut out = Self::from_parts_unchecked(rows, cols, ia, ja, values);
        out.sum_repeat_entries(policy);
        Ok(out)
    }

    /// Dense row-major `data` to CSR; every position becomes an entry, zeros included.
    pub fn from_dense(rows: usize, cols: usize, data: &[T]) -> Result<Self> {
        ensure_len("dense data", rows * cols, data.len())?;
        let ia = (0..=rows).map(|i| i * cols).collect();
        let ja = (0..rows).flat_map(|_| 0..cols).collect();
        Ok(Self::from_parts_unchecked(rows, cols, ia, ja, data.to_vec()))
    }

    pub fn nrows(&self) -> usize {
        self.rows
    }

    pub fn ncols(&self) -> usize {
        self.cols
    }

    pub fn nnz(&self) -> usize {
        self.ja.len()
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    pub fn row_ptr(&self) -> &[usize] {
        &self.ia
    }

    pub fn col_indices(&self) -> &[usize] {
        &self.ja
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Mutable access to the values. Structure is unchanged but the symmetry cache is dropped.
    pub fn values_mut(&mut self) -> &mut [T] {
        self.flags.set(self.flags.get() & !SYMMETRIC);
        &mut self.values
    }

    pub fn row_indices(&self, i: usize) -> &[usize] {
        &self.ja[self.ia[i]..self.ia[i + 1]]
    }

    pub fn row_values(&self, i: usize) -> &[T] {
        &self.values[self.ia[i]..self.ia[i + 1]]
    }

    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, T)> + '_ {
        self.row_indices(i)
            .iter()
            .copied()
            .zip(self.row_values(i).iter().copied())
    }

    /// Number of stored entries in row `i`.
    pub fn degree(&self, i: usize) -> usize {
        self.ia[i + 1] - self.ia[i]
    }

    pub fn get(&self, i: usize, j: usize) -> Option<T> {
        if i >= self.rows {
            return None;
        }
        self.row(i).find(|&(c, _)| c == j).map(|(_, v)| v)
    }

    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        (0..self.rows).flat_map(move |i| self.row(i).map(move |(j, v)| (i, j, v)))
    }

    pub fn to_coordinate(&self) -> CoordinateMatrix<T> {
        let mut out = CoordinateMatrix::with_capacity(self.rows, self.cols, self.nnz());
        for (i, j, v) in self.triplets() {
            out.irn.push(i);
            out.jcn.push(j);
            out.values.push(v);
        }
        out
    }

    pub fn map_values<U: Scalar>(&self, f: impl Fn(T) -> U) -> SparseMatrix<U> {
        let out = SparseMatrix::from_parts_unchecked(
            self.rows,
            self.cols,
            self.ia.clone(),
            self.ja.clone(),
            self.values.iter().map(|&v| f(v)).collect(),
        );
        out.flags.set(self.flags.get() & (PATTERN_SYMMETRIC | UNDIRECTED));
        out
    }

    pub fn to_pattern(&self) -> SparseMatrix<Pattern> {
        self.map_values(|_| Pattern)
    }

    pub fn to_real(&self) -> SparseMatrix<f64> {
        self.map_values(Scalar::to_real)
    }

    pub fn known_symmetric(&self) -> bool {
        self.flags.get() & SYMMETRIC != 0
    }

    pub fn known_pattern_symmetric(&self) -> bool {
        self.flags.get() & PATTERN_SYMMETRIC != 0
    }

    pub fn is_undirected(&self) -> bool {
        self.flags.get() & UNDIRECTED != 0
    }

    pub fn set_symmetric(&self) {
        self.flags
            .set(self.flags.get() | SYMMETRIC | PATTERN_SYMMETRIC);
    }

    pub fn set_pattern_symmetric(&self) {
        self.flags.set(self.flags.get() | PATTERN_SYMMETRIC);
    }

    pub fn set_undirected(&self) {
        self.flags.set(self.flags.get() | UNDIRECTED);
    }

    pub(crate) fn clear_flags(&self) {
        self.flags.set(0);
    }

    /// Transpose by counting sort on column occurrence.
    pub fn transpose(&self) -> Self {
        let (m, n) = (self.rows, self.cols);
        let mut ib = vec![0usize; n + 1];
        for &j in &self.ja {
            ib[j + 1] += 1;
        }
        for j in 0..n {
            ib[j + 1] += ib[j];
        }
        let mut next = ib.clone();
        let mut jb = vec![0usize; self.nnz()];
        let mut b = vec![T::zero(); self.nnz()];
        for i in 0..m {
            for k in self.ia[i]..self.ia[i + 1] {
                let j = self.ja[k];
                jb[next[j]] = i;
                b[next[j]] = self.values[k];
                next[j] += 1;
            }
        }
        let out = Self::from_parts_unchecked(n, m, ib, jb, b);
        out.flags.set(self.flags.get());
        out
    }

    /// Compares the matrix with its transpose and caches a positive answer.
    /// Assumes no repeated entries.
    pub fn is_symmetric(&self, pattern_only: bool) -> bool {
        if self.known_symmetric() {
            return true;
        }
        if pattern_only && self.known_pattern_symmetric() {
            return true;
        }
        if self.rows != self.cols {
            return false;
        }

        let b = self.transpose();
        if self.ia != b.ia {
            return false;
        }
        let mut mask = vec![NO_SLOT; self.rows];
        for i in 0..self.rows {
            let start = self.ia[i];
            for k in start..self.ia[i + 1] {
                mask[self.ja[k]] = k;
            }
            for k in b.ia[i]..b.ia[i + 1] {
                let slot = mask[b.ja[k]];
                if slot == NO_SLOT || slot < start {
                    return false;
                }
                if !pattern_only && !b.values[k].near(self.values[slot], SYMMETRY_EPSILON) {
                    return false;
                }
            }
        }

        if pattern_only {
            self.set_pattern_symmetric();
        } else {
            self.set_symmetric();
        }
        true
    }

    /// `A + Aᵀ`, or a copy when `A` is already (pattern-)symmetric.
    pub fn symmetrize(&self, pattern_only: bool) -> Result<Self> {
        if self.is_symmetric(pattern_only) {
            return Ok(self.clone());
        }
        let out = self.add(&self.transpose())?;
        out.set_symmetric();
        Ok(out)
    }

    pub fn symmetrize_nodiag(&self, pattern_only: bool) -> Result<Self> {
        let mut out = self.symmetrize(pattern_only)?;
        out.remove_diagonal();
        Ok(out)
    }

    /// Folds repeated `(row, col)` positions in place.
    pub fn sum_repeat_entries(&mut self, policy: SumRepeated) {
        if policy == SumRepeated::None {
            return;
        }
        let partial = T::KIND == MatrixKind::Complex
            && matches!(policy, SumRepeated::RealPart | SumRepeated::ImaginaryPart);

        let mut nz = 0usize;
        let mut start = self.ia[0];
        if partial {
            let mut slots: FxHashMap<(usize, i64), usize> = FxHashMap::default();
            for i in 0..self.rows {
                slots.clear();
                let end = self.ia[i + 1];
                for k in start..end {
                    let key = (self.ja[k], self.values[k].repeat_key(policy));
                    match slots.get(&key) {
                        Some(&slot) => {
                            self.values[slot] =
                                self.values[slot].merge_repeated(self.values[k], policy);
                        }
                        None => {
                            self.ja[nz] = self.ja[k];
                            self.values[nz] = self.values[k];
                            slots.insert(key, nz);
                            nz += 1;
                        }
                    }
                }
                start = end;
                self.ia[i + 1] = nz;
            }
        } else {
            let mut mask = vec![NO_SLOT; self.cols];
            for i in 0..self.rows {
                let row_start = nz;
                let end = self.ia[i + 1];
                for k in start..end {
                    let j = self.ja[k];
                    let slot = mask[j];
                    if slot == NO_SLOT || slot < row_start {
                        self.ja[nz] = j;
                        self.values[nz] = self.values[k];
                        mask[j] = nz;
                        nz += 1;
                    } else {
                        self.values[slot] = self.values[slot].merge_repeated(self.values[k], policy);
                    }
                }
                start = end;
                self.ia[i + 1] = nz;
            }
        }
        self.ja.truncate(nz);
        self.values.truncate(nz);
        self.clear_flags();
    }
}
