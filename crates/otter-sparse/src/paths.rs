//! Single-source and all-pairs shortest paths over a [`VtxGraph`].

use std::collections::VecDeque;

use nalgebra::DMatrix;

use crate::distance::{Distance, resolve_unreachable};
use crate::error::Result;
use crate::kernels::PackedSymmetric;
use crate::vtx::VtxGraph;

/// Breadth-first distances from `source`.
///
/// With edge lengths, a node's distance is fixed the first time it is reached; the traversal
/// order stays breadth-first.
pub fn bfs(graph: &VtxGraph, source: usize) -> Vec<Distance> {
    let n = graph.len();
    let mut dist = vec![Distance::Unreachable; n];
    let mut queue = VecDeque::with_capacity(n);
    dist[source] = Distance::Finite(0.0);
    queue.push_back(source);
    while let Some(v) = queue.pop_front() {
        let base = dist[v].unwrap_or(0.0);
        let vx = graph.vertex(v);
        for k in 1..vx.nedges() {
            let u = vx.edges[k];
            if !dist[u].is_reachable() {
                dist[u] = Distance::Finite(base + vx.length(k));
                queue.push_back(u);
            }
        }
    }
    dist
}

/// Nodes at most `bound` hops from `source`, with their hop counts, in visiting order.
pub fn bfs_bounded(graph: &VtxGraph, source: usize, bound: usize) -> Vec<(usize, usize)> {
    let mut hops: Vec<Option<usize>> = vec![None; graph.len()];
    let mut queue = VecDeque::new();
    let mut visited = Vec::new();
    hops[source] = Some(0);
    queue.push_back(source);
    while let Some(v) = queue.pop_front() {
        let h = hops[v].unwrap_or(0);
        if h > bound {
            break;
        }
        visited.push((v, h));
        for &u in graph.vertex(v).neighbors() {
            if hops[u].is_none() {
                hops[u] = Some(h + 1);
                queue.push_back(u);
            }
        }
    }
    visited
}

/// Binary min-heap of vertices keyed by an external distance array; `index[v]` is the slot
/// of `v`, so a key can be lowered in `O(log n)`.
struct IndexHeap {
    data: Vec<usize>,
    index: Vec<usize>,
}

impl IndexHeap {
    fn new(start: usize, dist: &[f64]) -> Self {
        let n = dist.len();
        let data: Vec<usize> = (0..n).filter(|&i| i != start).collect();
        let mut index = vec![usize::MAX; n];
        for (slot, &v) in data.iter().enumerate() {
            index[v] = slot;
        }
        let mut heap = Self { data, index };
        for i in (0..heap.data.len() / 2 + 1).rev() {
            heap.heapify(i, dist);
        }
        heap
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.data.swap(a, b);
        self.index[self.data[a]] = a;
        self.index[self.data[b]] = b;
    }

    fn heapify(&mut self, mut i: usize, dist: &[f64]) {
        loop {
            let (l, r) = (2 * i + 1, 2 * i + 2);
            let mut best = i;
            if l < self.data.len() && dist[self.data[l]] < dist[self.data[best]] {
                best = l;
            }
            if r < self.data.len() && dist[self.data[r]] < dist[self.data[best]] {
                best = r;
            }
            if best == i {
                return;
            }
            self.swap(best, i);
            i = best;
        }
    }

    fn extract_min(&mut self, dist: &[f64]) -> Option<usize> {
        if self.data.is_empty() {
            return None;
        }
        let top = self.data.swap_remove(0);
        self.index[top] = usize::MAX;
        if let Some(&first) = self.data.first() {
            self.index[first] = 0;
            self.heapify(0, dist);
        }
        Some(top)
    }

    /// Lowers the key of `v` to `new_dist` if that improves it.
    fn increase_key(&mut self, v: usize, new_dist: f64, dist: &mut [f64]) {
        if dist[v] <= new_dist {
            return;
        }
        dist[v] = new_dist;
        let mut i = self.index[v];
        if i == usize::MAX {
            return;
        }
        while i > 0 {
            let parent = (i - 1) / 2;
            if dist[self.data[parent]] <= new_dist {
                break;
            }
            self.swap(i, parent);
            i = parent;
        }
    }
}

fn dijkstra_raw(graph: &VtxGraph, source: usize, region: Option<(&[bool], usize)>) -> Vec<f64> {
    let n = graph.len();
    let mut dist = vec![f64::INFINITY; n];
    dist[source] = 0.0;
    let vs = graph.vertex(source);
    for k in 1..vs.nedges() {
        dist[vs.edges[k]] = dist[vs.edges[k]].min(vs.length(k));
    }
    let mut heap = IndexHeap::new(source, &dist);
    let settle = |v: usize, dist: &mut Vec<f64>, heap: &mut IndexHeap| {
        let d = dist[v];
        let vx = graph.vertex(v);
        for k in 1..vx.nedges() {
            heap.increase_key(vx.edges[k], d + vx.length(k), dist);
        }
    };

    let mut found = 0;
    if let Some((inside, _)) = region {
        if inside[source] {
            found += 1;
        }
    }
    while let Some(v) = heap.extract_min(&dist) {
        if let Some((inside, total)) = region {
            if found >= total {
                break;
            }
            if inside[v] {
                found += 1;
            }
        }
        if dist[v] == f64::INFINITY {
            break;
        }
        settle(v, &mut dist, &mut heap);
    }
    dist
}

/// Dijkstra from `source` using edge lengths (unit lengths when the graph has none).
pub fn dijkstra(graph: &VtxGraph, source: usize) -> Vec<Distance> {
    dijkstra_raw(graph, source, None)
        .into_iter()
        .map(|d| {
            if d.is_finite() {
                Distance::Finite(d)
            } else {
                Distance::Unreachable
            }
        })
        .collect()
}

/// Weighted distances to the nodes within `bound` unweighted hops of `source`.
///
/// The search stops once every node of that region is settled.
pub fn dijkstra_bounded(graph: &VtxGraph, source: usize, bound: usize) -> Vec<(usize, f64)> {
    let region = bfs_bounded(graph, source, bound);
    let mut inside = vec![false; graph.len()];
    for &(v, _) in &region {
        inside[v] = true;
    }
    let dist = dijkstra_raw(graph, source, Some((&inside, region.len())));
    region.into_iter().map(|(v, _)| (v, dist[v])).collect()
}

fn single_source(graph: &VtxGraph, source: usize) -> Vec<f64> {
    let d = if graph.is_weighted() {
        dijkstra(graph, source)
    } else {
        bfs(graph, source)
    };
    resolve_unreachable(&d)
}

/// Dense all-pairs distances: BFS for unweighted graphs, Dijkstra otherwise. Unreachable
/// pairs get the farthest reached distance plus the unreachable penalty.
pub fn compute_apsp(graph: &VtxGraph) -> DMatrix<f64> {
    let n = graph.len();
    let mut out = DMatrix::zeros(n, n);
    for i in 0..n {
        for (j, d) in single_source(graph, i).into_iter().enumerate() {
            out[(i, j)] = d;
        }
    }
    out
}

/// Upper-triangular packed all-pairs distances.
pub fn compute_apsp_packed(graph: &VtxGraph) -> PackedSymmetric {
    let n = graph.len();
    let mut out = PackedSymmetric::zeros(n);
    for i in 0..n {
        let row = single_source(graph, i);
        for (j, &d) in row.iter().enumerate().skip(i) {
            out.set(i, j, d);
        }
    }
    out
}

/// Edge lengths that push apart high-degree nodes and dense regions:
/// `deg(i) + deg(j) - 2 * |N(i) ∩ N(j)|`, never below an existing length.
pub fn artificial_weights(graph: &VtxGraph) -> Vec<Vec<f64>> {
    let n = graph.len();
    let mut mark = vec![false; n];
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let vi = graph.vertex(i);
        for &j in vi.neighbors() {
            mark[j] = true;
        }
        let deg_i = vi.nedges() - 1;
        let mut w = vec![0.0; vi.nedges()];
        for k in 1..vi.nedges() {
            let j = vi.edges[k];
            let vj = graph.vertex(j);
            let common = vj.neighbors().iter().filter(|&&u| mark[u]).count();
            let deg_j = vj.nedges() - 1;
            let artificial = (deg_i + deg_j) as f64 - 2.0 * common as f64;
            w[k] = if graph.is_weighted() {
                artificial.max(vi.length(k))
            } else {
                artificial
            };
        }
        for &j in vi.neighbors() {
            mark[j] = false;
        }
        out.push(w);
    }
    out
}

/// All-pairs distances under [`artificial_weights`].
pub fn compute_apsp_artificial_weights(graph: &VtxGraph) -> Result<DMatrix<f64>> {
    let mut reweighted = graph.clone();
    reweighted.set_lengths(Some(artificial_weights(graph)))?;
    Ok(compute_apsp(&reweighted))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_extracts_in_distance_order() {
        let dist = [0.0, 5.0, 1.0, 3.0, 2.0];
        let mut heap = IndexHeap::new(0, &dist);
        let mut dist = dist.to_vec();
        heap.increase_key(1, 0.5, &mut dist);
        let order: Vec<usize> = std::iter::from_fn(|| heap.extract_min(&dist)).collect();
        assert_eq!(order, vec![1, 2, 4, 3]);
    }

    #[test]
    fn triangle_weights_count_shared_neighbours() {
        let g = VtxGraph::from_edges(3, &[(0, 1), (1, 2), (0, 2)], None).unwrap();
        let w = artificial_weights(&g);
        // deg 2 + deg 2 - 2 * one shared neighbour
        assert_eq!(w[0][1..], [2.0, 2.0]);
    }

    #[test]
    fn bounded_search_stays_in_the_region() {
        let g = VtxGraph::from_edges(5, &[(0, 1), (1, 2), (2, 3), (3, 4)], None).unwrap();
        let region = bfs_bounded(&g, 0, 2);
        assert_eq!(region, vec![(0, 0), (1, 1), (2, 2)]);
        let d = dijkstra_bounded(&g, 0, 2);
        assert_eq!(d, vec![(0, 0.0), (1, 1.0), (2, 2.0)]);
    }
}
