//! Per-vertex adjacency lists in the self-first convention used by the stress solvers.

use crate::error::{Error, Result};
use crate::matrix::SparseMatrix;
use crate::scalar::Scalar;

/// One vertex: `edges[0]` is the vertex itself, `edges[1..]` its neighbours.
///
/// The optional arrays run parallel to `edges`; their slot `0` is unused. `ewgts` holds edge
/// lengths, `eweights` edge multiplicities, and `edists` the edge direction seen from this
/// vertex (`1.0` when it is the head, `-1.0` when it is the tail, `0.0` for undirected edges).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VertexData {
    pub edges: Vec<usize>,
    pub ewgts: Option<Vec<f64>>,
    pub eweights: Option<Vec<f64>>,
    pub edists: Option<Vec<f64>>,
}

impl VertexData {
    pub fn nedges(&self) -> usize {
        self.edges.len()
    }

    pub fn neighbors(&self) -> &[usize] {
        &self.edges[1..]
    }

    /// Length of the edge in slot `k` (1 when the graph is unweighted).
    pub fn length(&self, k: usize) -> f64 {
        self.ewgts.as_ref().map_or(1.0, |w| w[k])
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VtxGraph {
    vertices: Vec<VertexData>,
    weighted: bool,
}

impl VtxGraph {
    /// Wraps prebuilt vertices after checking the self-first convention and array lengths.
    pub fn new(vertices: Vec<VertexData>) -> Result<Self> {
        let n = vertices.len();
        let weighted = vertices.first().is_some_and(|v| v.ewgts.is_some());
        for (i, v) in vertices.iter().enumerate() {
            if v.edges.first() != Some(&i) {
                return Err(Error::InvalidArgument {
                    reason: format!("vertex {i} does not list itself first"),
                });
            }
            if let Some(&bad) = v.edges.iter().find(|&&j| j >= n) {
                return Err(Error::IndexOutOfRange {
                    row: i,
                    col: bad,
                    rows: n,
                    cols: n,
                });
            }
            for (what, arr) in [
                ("ewgts", &v.ewgts),
                ("eweights", &v.eweights),
                ("edists", &v.edists),
            ] {
                if let Some(a) = arr {
                    crate::error::ensure_len(what, v.edges.len(), a.len())?;
                }
            }
            if v.ewgts.is_some() != weighted {
                return Err(Error::InvalidArgument {
                    reason: "edge lengths must be given for every vertex or none".to_string(),
                });
            }
        }
        Ok(Self { vertices, weighted })
    }

    /// Undirected graph from an edge list. Loops are dropped; a repeated pair keeps the
    /// longest length and accumulates its multiplicity.
    pub fn from_edges(n: usize, edges: &[(usize, usize)], lengths: Option<&[f64]>) -> Result<Self> {
        Self::build(n, edges, lengths, false)
    }

    /// Like [`VtxGraph::from_edges`] with each pair read as `(tail, head)` and recorded in
    /// `edists`. A repeated pair keeps the direction it was first seen with.
    pub fn from_directed_edges(
        n: usize,
        edges: &[(usize, usize)],
        lengths: Option<&[f64]>,
    ) -> Result<Self> {
        Self::build(n, edges, lengths, true)
    }

    fn build(
        n: usize,
        edges: &[(usize, usize)],
        lengths: Option<&[f64]>,
        directed: bool,
    ) -> Result<Self> {
        if let Some(l) = lengths {
            crate::error::ensure_len("edge lengths", edges.len(), l.len())?;
        }
        let mut vertices: Vec<VertexData> = (0..n)
            .map(|i| VertexData {
                edges: vec![i],
                ewgts: lengths.map(|_| vec![0.0]),
                eweights: Some(vec![0.0]),
                edists: directed.then(|| vec![0.0]),
            })
            .collect();

        for (e, &(u, v)) in edges.iter().enumerate() {
            if u >= n || v >= n {
                return Err(Error::IndexOutOfRange {
                    row: u,
                    col: v,
                    rows: n,
                    cols: n,
                });
            }
            if u == v {
                continue;
            }
            let len = lengths.map_or(1.0, |l| l[e]);
            for (a, b, dir) in [(u, v, -1.0), (v, u, 1.0)] {
                let vx = &mut vertices[a];
                match vx.edges.iter().position(|&x| x == b) {
                    Some(slot) => {
                        if let Some(w) = vx.ewgts.as_mut() {
                            w[slot] = w[slot].max(len);
                        }
                        if let Some(m) = vx.eweights.as_mut() {
                            m[slot] += 1.0;
                        }
                    }
                    None => {
                        vx.edges.push(b);
                        if let Some(w) = vx.ewgts.as_mut() {
                            w.push(len);
                        }
                        if let Some(m) = vx.eweights.as_mut() {
                            m.push(1.0);
                        }
                        if let Some(d) = vx.edists.as_mut() {
                            d.push(dir);
                        }
                    }
                }
            }
        }
        Ok(Self {
            vertices,
            weighted: lengths.is_some(),
        })
    }

    /// Adjacency of the symmetrized matrix pattern, with `|a_ij|` as lengths when `weighted`.
    pub fn from_matrix<T: Scalar>(a: &SparseMatrix<T>, weighted: bool) -> Result<Self> {
        let symmetric = a.is_symmetric(false);
        let sym = a.symmetrize(false)?;
        let n = sym.nrows();
        let mut vertices = Vec::with_capacity(n);
        for i in 0..n {
            let mut edges = vec![i];
            let mut ewgts = vec![0.0];
            for (j, v) in sym.row(i) {
                if j == i {
                    continue;
                }
                edges.push(j);
                // A + Aᵀ doubled the entries present in both directions.
                let both = !symmetric && a.get(i, j).is_some() && a.get(j, i).is_some();
                ewgts.push(if both {
                    v.edge_length() / 2.0
                } else {
                    v.edge_length()
                });
            }
            let eweights = vec![1.0; edges.len()];
            vertices.push(VertexData {
                edges,
                ewgts: weighted.then_some(ewgts),
                eweights: Some(eweights),
                edists: None,
            });
        }
        Ok(Self { vertices, weighted })
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn is_weighted(&self) -> bool {
        self.weighted
    }

    pub fn has_directions(&self) -> bool {
        self.vertices
            .iter()
            .any(|v| v.edists.as_ref().is_some_and(|d| d[1..].iter().any(|&x| x != 0.0)))
    }

    pub fn vertex(&self, i: usize) -> &VertexData {
        &self.vertices[i]
    }

    pub fn vertices(&self) -> &[VertexData] {
        &self.vertices
    }

    pub fn edge_count(&self) -> usize {
        self.vertices.iter().map(|v| v.nedges() - 1).sum::<usize>() / 2
    }

    /// Replaces every edge length (`None` makes the graph unweighted).
    pub fn set_lengths(&mut self, lengths: Option<Vec<Vec<f64>>>) -> Result<()> {
        match lengths {
            None => {
                for v in &mut self.vertices {
                    v.ewgts = None;
                }
                self.weighted = false;
            }
            Some(all) => {
                crate::error::ensure_len("length lists", self.vertices.len(), all.len())?;
                for (v, w) in self.vertices.iter_mut().zip(&all) {
                    crate::error::ensure_len("edge lengths", v.edges.len(), w.len())?;
                }
                for (v, w) in self.vertices.iter_mut().zip(all) {
                    v.ewgts = Some(w);
                }
                self.weighted = true;
            }
        }
        Ok(())
    }

    /// CSR adjacency holding the edge lengths, without the self entries.
    pub fn to_matrix(&self) -> SparseMatrix<f64> {
        let n = self.len();
        let mut ia = Vec::with_capacity(n + 1);
        let mut ja = Vec::new();
        let mut values = Vec::new();
        ia.push(0);
        for v in &self.vertices {
            for k in 1..v.nedges() {
                ja.push(v.edges[k]);
                values.push(v.length(k));
            }
            ia.push(ja.len());
        }
        SparseMatrix::from_parts_unchecked(n, n, ia, ja, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scalar::SumRepeated;

    #[test]
    fn repeated_edges_keep_the_longest_length() {
        let g = VtxGraph::from_edges(3, &[(0, 1), (1, 0), (1, 2)], Some(&[1.0, 3.0, 2.0])).unwrap();
        let v1 = g.vertex(1);
        assert_eq!(v1.edges, vec![1, 0, 2]);
        assert_eq!(v1.ewgts.as_deref(), Some(&[0.0, 3.0, 2.0][..]));
        assert_eq!(v1.eweights.as_deref(), Some(&[0.0, 2.0, 1.0][..]));
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn directions_are_recorded_from_both_ends() {
        let g = VtxGraph::from_directed_edges(2, &[(0, 1)], None).unwrap();
        assert_eq!(g.vertex(0).edists.as_deref(), Some(&[0.0, -1.0][..]));
        assert_eq!(g.vertex(1).edists.as_deref(), Some(&[0.0, 1.0][..]));
        assert!(g.has_directions());
    }

    #[test]
    fn matrix_lengths_survive_symmetrization() {
        let a = SparseMatrix::from_coordinate_arrays(
            2,
            2,
            &[0, 1],
            &[1, 0],
            &[2.5, 2.5],
            SumRepeated::All,
        )
        .unwrap();
        let g = VtxGraph::from_matrix(&a, true).unwrap();
        assert_eq!(g.vertex(0).length(1), 2.5);
    }

    #[test]
    fn nonsymmetric_matrix_averages_two_way_entries() {
        // 0 <-> 1 stored both ways (3 and 5), 1 -> 2 stored once.
        let a = SparseMatrix::from_coordinate_arrays(
            3,
            3,
            &[0, 1, 1],
            &[1, 0, 2],
            &[3.0, 5.0, 1.5],
            SumRepeated::All,
        )
        .unwrap();
        let g = VtxGraph::from_matrix(&a, true).unwrap();
        let v1 = g.vertex(1);
        let at = |j: usize| v1.edges.iter().position(|&e| e == j).unwrap();
        assert_eq!(v1.length(at(0)), 4.0);
        assert_eq!(v1.length(at(2)), 1.5);
        assert_eq!(g.vertex(2).length(1), 1.5);
    }

    #[test]
    fn long_directed_path_builds_in_one_pass() {
        let n = 100_000;
        let irn: Vec<usize> = (0..n - 1).collect();
        let jcn: Vec<usize> = (1..n).collect();
        let val = vec![2.0; n - 1];
        let a = SparseMatrix::from_coordinate_arrays(n, n, &irn, &jcn, &val, SumRepeated::All)
            .unwrap();
        let g = VtxGraph::from_matrix(&a, true).unwrap();
        assert_eq!(g.len(), n);
        assert_eq!(g.edge_count(), n - 1);
        assert_eq!(g.vertex(n / 2).nedges(), 3);
        assert!(g.vertices().iter().all(|v| v.ewgts.as_ref().unwrap()[1..].iter().all(|&w| w == 2.0)));
    }
}
