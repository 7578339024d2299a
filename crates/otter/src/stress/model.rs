//! Target distances `d_ij` for stress majorization.

use nalgebra::DMatrix;
use otter_sparse::VtxGraph;
use otter_sparse::kernels::PackedSymmetric;
use otter_sparse::paths::{compute_apsp_artificial_weights, compute_apsp_packed};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// How the ideal distance between two nodes is derived from the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceModel {
    /// Graph-theoretic shortest paths (BFS, or Dijkstra over the edge lengths).
    #[default]
    ShortestPath,
    /// Effective resistance with every edge a resistor of its length.
    Circuit,
    /// Shortest paths over edge lengths that push apart nodes with few common neighbours.
    Subset,
    /// Shortest paths, except that adjacent nodes sit exactly at their edge length.
    Mds,
}

/// Packed all-pairs target distances for `graph` under `model`.
///
/// A disconnected graph has no circuit model; it falls back to shortest paths.
pub fn distance_matrix(graph: &VtxGraph, model: DistanceModel) -> Result<PackedSymmetric> {
    let dij = match model {
        DistanceModel::ShortestPath => None,
        DistanceModel::Subset => Some(PackedSymmetric::from_dense(
            &compute_apsp_artificial_weights(graph)?,
        )?),
        DistanceModel::Circuit => {
            let d = circuit_model(graph);
            if d.is_none() {
                warn!("graph is disconnected, so the circuit model is undefined; using shortest paths");
            }
            d
        }
        DistanceModel::Mds => mds_model(graph),
    };
    Ok(match dij {
        Some(d) => d,
        None => compute_apsp_packed(graph),
    })
}

/// Effective resistances: with `G` the conductance Laplacian and `G⁺` the inverse of its
/// leading `(n-1) x (n-1)` block (padded with a zero row and column),
/// `d_ij = G⁺_ii + G⁺_jj - 2 G⁺_ij`.
///
/// Returns `None` when the block is singular, which happens exactly when the graph is
/// disconnected.
pub fn circuit_model(graph: &VtxGraph) -> Option<PackedSymmetric> {
    let n = graph.len();
    if n < 2 {
        return Some(PackedSymmetric::zeros(n));
    }
    let mut g = DMatrix::<f64>::zeros(n, n);
    for i in 0..n {
        let v = graph.vertex(i);
        for (k, &j) in v.edges.iter().enumerate().skip(1) {
            let conductance = 1.0 / v.length(k);
            g[(i, j)] = -conductance;
            g[(j, i)] = -conductance;
        }
    }
    for i in 0..n {
        let row_sum: f64 = (0..n).filter(|&j| j != i).map(|j| g[(i, j)]).sum();
        g[(i, i)] = -row_sum;
    }

    let block_inv = g.view((0, 0), (n - 1, n - 1)).into_owned().try_inverse()?;
    let inv = |i: usize, j: usize| {
        if i < n - 1 && j < n - 1 {
            block_inv[(i, j)]
        } else {
            0.0
        }
    };

    let mut d = PackedSymmetric::zeros(n);
    for i in 0..n {
        for j in i + 1..n {
            d.set(i, j, inv(i, i) + inv(j, j) - 2.0 * inv(i, j));
        }
    }
    Some(d)
}

/// Weighted shortest paths with every edge entry replaced by the edge's own length.
///
/// Returns `None` for a graph without edge lengths.
pub fn mds_model(graph: &VtxGraph) -> Option<PackedSymmetric> {
    if !graph.is_weighted() {
        return None;
    }
    let mut d = compute_apsp_packed(graph);
    let mut delta = 0.0;
    for i in 0..graph.len() {
        let v = graph.vertex(i);
        for (k, &j) in v.edges.iter().enumerate().skip(1) {
            if j < i {
                continue;
            }
            delta += (d.get(i, j) - v.length(k)).abs();
            d.set(i, j, v.length(k));
        }
    }
    debug!(delta, "mds model");
    Some(d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_resistances_add_up() {
        let g = VtxGraph::from_edges(3, &[(0, 1), (1, 2)], None).unwrap();
        let d = circuit_model(&g).unwrap();
        assert!((d.get(0, 1) - 1.0).abs() < 1e-12);
        assert!((d.get(0, 2) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn parallel_paths_lower_the_resistance() {
        // Two disjoint routes of length two between 0 and 2.
        let g = VtxGraph::from_edges(4, &[(0, 1), (1, 2), (0, 3), (3, 2)], None).unwrap();
        let d = circuit_model(&g).unwrap();
        assert!((d.get(0, 2) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn disconnected_circuit_falls_back_to_shortest_paths() {
        let g = VtxGraph::from_edges(4, &[(0, 1), (2, 3)], None).unwrap();
        assert!(circuit_model(&g).is_none());
        let d = distance_matrix(&g, DistanceModel::Circuit).unwrap();
        assert_eq!(d, compute_apsp_packed(&g));
    }

    #[test]
    fn mds_keeps_edge_lengths_on_edges() {
        let lengths = [1.0, 1.0, 5.0];
        let g = VtxGraph::from_edges(3, &[(0, 1), (1, 2), (0, 2)], Some(&lengths)).unwrap();
        let d = mds_model(&g).unwrap();
        assert_eq!(d.get(0, 2), 5.0);
        assert_eq!(d.get(0, 1), 1.0);
        assert!(mds_model(&VtxGraph::from_edges(2, &[(0, 1)], None).unwrap()).is_none());
    }
}
