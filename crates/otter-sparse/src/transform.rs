//! Structural edits: diagonal/triangle removal, submatrices, cropping and row normalization.

use crate::error::{Error, Result, ensure_square};
use crate::matrix::SparseMatrix;
use crate::scalar::{Pattern, Scalar};

impl<T: Scalar> SparseMatrix<T> {
    /// Rebuilds the matrix keeping the entries for which `keep(row, col, value)` holds.
    fn retain_entries(&mut self, mut keep: impl FnMut(usize, usize, T) -> bool) {
        let rows = self.nrows();
        let cols = self.ncols();
        let mut ia = Vec::with_capacity(rows + 1);
        let mut ja = Vec::with_capacity(self.nnz());
        let mut values = Vec::with_capacity(self.nnz());
        ia.push(0);
        for i in 0..rows {
            for (j, v) in self.row(i) {
                if keep(i, j, v) {
                    ja.push(j);
                    values.push(v);
                }
            }
            ia.push(ja.len());
        }
        *self = Self::from_parts_unchecked(rows, cols, ia, ja, values);
    }

    pub fn has_diagonal(&self) -> bool {
        (0..self.nrows()).any(|i| self.row_indices(i).contains(&i))
    }

    /// Drops `A[i][i]` entries. Symmetry is preserved.
    pub fn remove_diagonal(&mut self) {
        let sym = self.known_symmetric();
        let pattern_sym = self.known_pattern_symmetric();
        let undirected = self.is_undirected();
        self.retain_entries(|i, j, _| i != j);
        if sym {
            self.set_symmetric();
        } else if pattern_sym {
            self.set_pattern_symmetric();
        }
        if undirected {
            self.set_undirected();
        }
    }

    /// Keeps the strictly lower triangle.
    pub fn remove_upper(&mut self) {
        self.retain_entries(|i, j, _| j < i);
    }

    /// Sorts column indices inside every row (transpose twice).
    pub fn sort(&self) -> Self {
        let out = self.transpose().transpose();
        out.clear_flags();
        out
    }

    /// Symmetrized strictly-lower storage of an undirected graph.
    pub fn make_undirected(&self) -> Result<Self> {
        let mut out = self.symmetrize(false)?;
        out.remove_upper();
        out.set_undirected();
        Ok(out)
    }

    /// Rows `rindices` and columns `cindices` (in the given order); `None` keeps all.
    pub fn get_submatrix(
        &self,
        rindices: Option<&[usize]>,
        cindices: Option<&[usize]>,
    ) -> Result<Self> {
        let all_rows: Vec<usize>;
        let rows = match rindices {
            Some(r) => r,
            None => {
                all_rows = (0..self.nrows()).collect();
                &all_rows
            }
        };
        let mut cmap: Vec<Option<usize>> = vec![None; self.ncols()];
        let ncols = match cindices {
            Some(c) => {
                for (new, &old) in c.iter().enumerate() {
                    if old >= self.ncols() {
                        return Err(Error::IndexOutOfRange {
                            row: 0,
                            col: old,
                            rows: self.nrows(),
                            cols: self.ncols(),
                        });
                    }
                    cmap[old] = Some(new);
                }
                c.len()
            }
            None => {
                for (j, slot) in cmap.iter_mut().enumerate() {
                    *slot = Some(j);
                }
                self.ncols()
            }
        };

        let mut ia = Vec::with_capacity(rows.len() + 1);
        let mut ja = Vec::new();
        let mut values = Vec::new();
        ia.push(0);
        for &old in rows {
            if old >= self.nrows() {
                return Err(Error::IndexOutOfRange {
                    row: old,
                    col: 0,
                    rows: self.nrows(),
                    cols: self.ncols(),
                });
            }
            for (j, v) in self.row(old) {
                if let Some(new_j) = cmap[j] {
                    ja.push(new_j);
                    values.push(v);
                }
            }
            ia.push(ja.len());
        }
        Ok(Self::from_parts_unchecked(rows.len(), ncols, ia, ja, values))
    }

    /// Removes columns without entries. The second value maps new column ids to old ones.
    pub fn delete_empty_columns(&self) -> (Self, Vec<usize>) {
        let mut used = vec![false; self.ncols()];
        for &j in self.col_indices() {
            used[j] = true;
        }
        let kept: Vec<usize> = (0..self.ncols()).filter(|&j| used[j]).collect();
        let mut remap = vec![0usize; self.ncols()];
        for (new, &old) in kept.iter().enumerate() {
            remap[old] = new;
        }
        let ja = self.col_indices().iter().map(|&j| remap[j]).collect();
        let out = Self::from_parts_unchecked(
            self.nrows(),
            kept.len(),
            self.row_ptr().to_vec(),
            ja,
            self.values().to_vec(),
        );
        (out, kept)
    }

    /// Pattern of the missing off-diagonal pairs of the symmetrized graph.
    pub fn complement(&self) -> Result<SparseMatrix<Pattern>> {
        ensure_square(self.nrows(), self.ncols())?;
        let n = self.nrows();
        let sym = self.to_pattern().symmetrize(true)?;
        let mut mask = vec![usize::MAX; n];
        let mut ia = Vec::with_capacity(n + 1);
        let mut ja = Vec::new();
        ia.push(0);
        for i in 0..n {
            mask[i] = i;
            for &j in sym.row_indices(i) {
                mask[j] = i;
            }
            for j in 0..n {
                if mask[j] != i {
                    ja.push(j);
                }
            }
            ia.push(ja.len());
        }
        let values = vec![Pattern; ja.len()];
        let out = SparseMatrix::from_parts_unchecked(n, n, ia, ja, values);
        out.set_symmetric();
        Ok(out)
    }

    /// Drops entries whose magnitude is at most `epsilon`.
    pub fn crop(&mut self, epsilon: f64) {
        self.retain_entries(|_, _, v| v.edge_length() > epsilon);
    }

    pub fn apply_fun(&mut self, f: impl Fn(T) -> T) {
        for v in self.values_mut() {
            *v = f(*v);
        }
    }

    /// Divides every entry by the number of entries in its row.
    pub fn divide_row_by_degree(&mut self) {
        let ia = self.row_ptr().to_vec();
        let values = self.values_mut();
        for i in 0..ia.len() - 1 {
            let deg = ia[i + 1] - ia[i];
            if deg == 0 {
                continue;
            }
            let s = 1.0 / deg as f64;
            for v in &mut values[ia[i]..ia[i + 1]] {
                *v = v.scale(s);
            }
        }
    }

    /// Scales each row to sum to one; rows summing to zero are left alone.
    pub fn normalize_to_rowsum1(&mut self) {
        let ia = self.row_ptr().to_vec();
        let values = self.values_mut();
        for i in 0..ia.len() - 1 {
            let row = &mut values[ia[i]..ia[i + 1]];
            let sum: f64 = row.iter().map(|v| v.to_real()).sum();
            if sum != 0.0 {
                for v in row {
                    *v = v.scale(1.0 / sum);
                }
            }
        }
    }

    /// Divides each row by its largest magnitude.
    pub fn normalize_by_row(&mut self) {
        let ia = self.row_ptr().to_vec();
        let values = self.values_mut();
        for i in 0..ia.len() - 1 {
            let row = &mut values[ia[i]..ia[i + 1]];
            let max = row.iter().map(|v| v.edge_length()).fold(0.0, f64::max);
            if max > 0.0 {
                for v in row {
                    *v = v.scale(1.0 / max);
                }
            }
        }
    }

    /// Unit-weight symmetric adjacency without self loops, whatever the entry type.
    pub fn to_real_adjacency_symmetrized(&self) -> Result<SparseMatrix<f64>> {
        ensure_square(self.nrows(), self.ncols())?;
        let mut pattern = self.to_pattern().symmetrize(true)?;
        pattern.remove_diagonal();
        let out = pattern.map_values(|_| 1.0);
        out.set_symmetric();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scalar::SumRepeated;

    #[test]
    fn complement_of_a_path_is_the_missing_pairs() {
        let a = SparseMatrix::from_coordinate_arrays(
            3,
            3,
            &[0, 1],
            &[1, 2],
            &[1.0, 1.0],
            SumRepeated::All,
        )
        .unwrap();
        let c = a.complement().unwrap();
        let pairs: Vec<(usize, usize)> = c.triplets().map(|(i, j, _)| (i, j)).collect();
        assert_eq!(pairs, vec![(0, 2), (2, 0)]);
    }

    #[test]
    fn delete_empty_columns_reports_the_kept_ids() {
        let a = SparseMatrix::from_coordinate_arrays(
            2,
            4,
            &[0, 1],
            &[3, 1],
            &[5.0, 6.0],
            SumRepeated::All,
        )
        .unwrap();
        let (b, kept) = a.delete_empty_columns();
        assert_eq!(kept, vec![1, 3]);
        assert_eq!(b.ncols(), 2);
        assert_eq!(b.get(0, 1), Some(5.0));
        assert_eq!(b.get(1, 0), Some(6.0));
    }

    #[test]
    fn row_normalizations() {
        let mut a = SparseMatrix::from_coordinate_arrays(
            1,
            3,
            &[0, 0, 0],
            &[0, 1, 2],
            &[1.0, -4.0, 3.0],
            SumRepeated::All,
        )
        .unwrap();
        let mut b = a.clone();
        a.normalize_by_row();
        assert_eq!(a.values(), &[0.25, -1.0, 0.75]);
        b.divide_row_by_degree();
        assert_eq!(b.values(), &[1.0 / 3.0, -4.0 / 3.0, 1.0]);
    }
}
