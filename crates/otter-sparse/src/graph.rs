//! Graph queries on a square matrix read as an adjacency structure.
//!
//! Row `i` lists the neighbours of node `i`; diagonal entries are ignored. Weighted queries
//! use [`Scalar::edge_length`] as the edge length.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tracing::{debug, trace};

use crate::distance::Distance;
use crate::error::{Error, Result, ensure_square};
use crate::matrix::SparseMatrix;
use crate::scalar::{Pattern, Scalar, SumRepeated};

const MACHINE_ACCURACY: f64 = 1e-16;
const PAGE_RANK_MAX_ITERATIONS: usize = 10_000;
const AGGRESSIVE_RETRIES: usize = 5;

/// Breadth-first levels around a root: `level(0) == [root]`, `level(k)` holds the nodes `k`
/// hops away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelSets {
    ptr: Vec<usize>,
    nodes: Vec<usize>,
}

impl LevelSets {
    pub fn len(&self) -> usize {
        self.ptr.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn level(&self, l: usize) -> &[usize] {
        &self.nodes[self.ptr[l]..self.ptr[l + 1]]
    }

    pub fn last_level(&self) -> &[usize] {
        self.level(self.len() - 1)
    }

    /// Every reached node in visiting order.
    pub fn nodes(&self) -> &[usize] {
        &self.nodes
    }

    pub fn level_ptr(&self) -> &[usize] {
        &self.ptr
    }

    pub fn levels(&self) -> impl Iterator<Item = (usize, &[usize])> + '_ {
        (0..self.len()).map(|l| (l, self.level(l)))
    }
}

/// Disjoint groups of nodes stored back to back: group `k` is `members[ptr[k]..ptr[k + 1]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    ptr: Vec<usize>,
    members: Vec<usize>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.ptr.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn group(&self, k: usize) -> &[usize] {
        &self.members[self.ptr[k]..self.ptr[k + 1]]
    }

    pub fn groups(&self) -> impl Iterator<Item = &[usize]> + '_ {
        (0..self.len()).map(|k| self.group(k))
    }

    pub fn group_ptr(&self) -> &[usize] {
        &self.ptr
    }

    pub fn members(&self) -> &[usize] {
        &self.members
    }

    /// Group id of every node.
    pub fn membership(&self, n: usize) -> Vec<usize> {
        let mut out = vec![0; n];
        for (k, g) in self.groups().enumerate() {
            for &i in g {
                out[i] = k;
            }
        }
        out
    }
}

/// Single-source shortest paths.
#[derive(Debug, Clone, PartialEq)]
pub struct ShortestPaths {
    pub dist: Vec<Distance>,
    /// Settled nodes in non-decreasing distance order.
    pub order: Vec<usize>,
    /// Distance of the last settled node.
    pub farthest: f64,
    /// Whether every admissible node was reached.
    pub complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PseudoDiameter {
    pub length: f64,
    pub ends: (usize, usize),
    pub connected: bool,
}

/// Farthest-first centers and the distance of every node to each of them.
#[derive(Debug, Clone, PartialEq)]
pub struct KCenters {
    pub centers: Vec<usize>,
    /// Row-major `k x n`: `dist[c * n + i]` is the distance of node `i` to center `c`.
    pub dist: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct HeapItem {
    dist: f64,
    node: usize,
}

impl Eq for HeapItem {}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Scalar> SparseMatrix<T> {
    fn check_node(&self, node: usize) -> Result<()> {
        ensure_square(self.nrows(), self.ncols())?;
        if node >= self.nrows() {
            return Err(Error::IndexOutOfRange {
                row: node,
                col: node,
                rows: self.nrows(),
                cols: self.ncols(),
            });
        }
        Ok(())
    }

    /// `mask[i] == 0` marks unvisited nodes; visited ones get their level plus one.
    pub(crate) fn level_sets_with_mask(
        &self,
        root: usize,
        khops: Option<usize>,
        mask: &mut [usize],
    ) -> LevelSets {
        let mut ptr = vec![0, 1];
        let mut nodes = vec![root];
        mask[root] = 1;
        let (mut sta, mut sto) = (0, 1);
        let mut nlevel = 1;
        while sto > sta && khops.is_none_or(|k| nlevel <= k) {
            for idx in sta..sto {
                let ii = nodes[idx];
                for &j in self.row_indices(ii) {
                    if j != ii && mask[j] == 0 {
                        nodes.push(j);
                        mask[j] = nlevel + 1;
                    }
                }
            }
            nlevel += 1;
            ptr.push(nodes.len());
            sta = sto;
            sto = nodes.len();
        }
        if ptr[ptr.len() - 1] == ptr[ptr.len() - 2] {
            ptr.pop();
        }
        LevelSets { ptr, nodes }
    }

    /// Level sets from `root`, stopping after `khops` levels when given.
    pub fn level_sets(&self, root: usize, khops: Option<usize>) -> Result<LevelSets> {
        self.check_node(root)?;
        let mut mask = vec![0; self.nrows()];
        Ok(self.level_sets_with_mask(root, khops, &mut mask))
    }

    fn pattern_symmetric(&self) -> Result<Cow<'_, Self>> {
        if self.is_symmetric(true) {
            Ok(Cow::Borrowed(self))
        } else {
            Ok(Cow::Owned(self.symmetrize(true)?))
        }
    }

    fn numerically_symmetric(&self) -> Result<Cow<'_, Self>> {
        if self.is_symmetric(false) {
            Ok(Cow::Borrowed(self))
        } else {
            Ok(Cow::Owned(self.symmetrize(false)?))
        }
    }

    /// Components of the graph with edge directions ignored.
    pub fn weakly_connected_components(&self) -> Result<Partition> {
        ensure_square(self.nrows(), self.ncols())?;
        let n = self.nrows();
        let pattern = self.to_pattern();
        let a = pattern.pattern_symmetric()?;
        let mut mask = vec![0; n];
        let mut ptr = vec![0];
        let mut members = Vec::with_capacity(n);
        for i in 0..n {
            if mask[i] != 0 {
                continue;
            }
            let ls = a.level_sets_with_mask(i, None, &mut mask);
            members.extend_from_slice(ls.nodes());
            ptr.push(members.len());
        }
        Ok(Partition { ptr, members })
    }

    pub fn connected(&self) -> Result<bool> {
        ensure_square(self.nrows(), self.ncols())?;
        if self.nrows() == 0 {
            return Ok(true);
        }
        let pattern = self.to_pattern();
        let a = pattern.pattern_symmetric()?;
        let mut mask = vec![0; self.nrows()];
        Ok(a.level_sets_with_mask(0, None, &mut mask).nodes().len() == self.nrows())
    }

    /// The subgraph induced by the largest weak component, with its node ids.
    pub fn largest_component(&self) -> Result<(Self, Vec<usize>)> {
        let comps = self.weakly_connected_components()?;
        let Some(best) = comps.groups().max_by_key(|g| g.len()) else {
            return Ok((self.clone(), Vec::new()));
        };
        if best.len() == self.nrows() {
            return Ok((self.clone(), (0..self.nrows()).collect()));
        }
        let ids = best.to_vec();
        let sub = self.get_submatrix(Some(&ids), Some(&ids))?;
        Ok((sub, ids))
    }

    fn dijkstra_filtered(&self, root: usize, allowed: Option<&[bool]>) -> ShortestPaths {
        let n = self.nrows();
        let admissible = |j: usize| allowed.is_none_or(|a| a[j]);
        let mut dist = vec![Distance::Unreachable; n];
        let mut settled = vec![false; n];
        let mut order = Vec::with_capacity(n);
        let mut farthest = 0.0;
        let mut heap = BinaryHeap::new();

        dist[root] = Distance::Finite(0.0);
        heap.push(HeapItem {
            dist: 0.0,
            node: root,
        });
        while let Some(HeapItem { dist: d, node: i }) = heap.pop() {
            if settled[i] {
                continue;
            }
            settled[i] = true;
            order.push(i);
            farthest = d;
            for (j, w) in self.row(i) {
                if j == i || settled[j] || !admissible(j) {
                    continue;
                }
                let nd = d + w.edge_length();
                if dist[j].finite().is_none_or(|old| nd < old) {
                    dist[j] = Distance::Finite(nd);
                    heap.push(HeapItem { dist: nd, node: j });
                }
            }
        }

        let expected = match allowed {
            Some(a) => a.iter().filter(|&&x| x).count(),
            None => n,
        };
        ShortestPaths {
            dist,
            complete: order.len() >= expected,
            order,
            farthest,
        }
    }

    /// Dijkstra from `root` with `|a_ij|` as edge length (1 for pattern entries).
    pub fn dijkstra(&self, root: usize) -> Result<ShortestPaths> {
        self.check_node(root)?;
        Ok(self.dijkstra_filtered(root, None))
    }

    /// Dijkstra restricted to the nodes flagged in `allowed`.
    pub fn dijkstra_within(&self, root: usize, allowed: &[bool]) -> Result<ShortestPaths> {
        self.check_node(root)?;
        crate::error::ensure_len("allowed mask", self.nrows(), allowed.len())?;
        Ok(self.dijkstra_filtered(root, Some(allowed)))
    }

    /// Repeated Dijkstra sweeps from the farthest node while the eccentricity grows.
    pub fn pseudo_diameter_weighted(&self, root: usize, aggressive: bool) -> Result<PseudoDiameter> {
        self.check_node(root)?;
        let a = self.numerically_symmetric()?;
        let (mut best, order) = weighted_sweep(&*a, root);
        if !best.connected || !aggressive {
            return Ok(best);
        }
        let start = order.len().saturating_sub(AGGRESSIVE_RETRIES + 1);
        for &r in &order[start..order.len() - 1] {
            let (candidate, _) = weighted_sweep(&*a, r);
            trace!(root = r, length = candidate.length, "diameter retry");
            if candidate.length > best.length {
                best = candidate;
            }
        }
        Ok(best)
    }

    /// Hop-count pseudo diameter by repeated level-set sweeps.
    pub fn pseudo_diameter_unweighted(
        &self,
        root: usize,
        aggressive: bool,
    ) -> Result<PseudoDiameter> {
        self.check_node(root)?;
        let pattern = self.to_pattern();
        let a = pattern.pattern_symmetric()?;
        let (mut best, last_level) = unweighted_sweep(&*a, root);
        if !aggressive {
            return Ok(best);
        }
        for &r in last_level.iter().take(AGGRESSIVE_RETRIES) {
            let (candidate, _) = unweighted_sweep(&*a, r);
            if candidate.length > best.length {
                best = candidate;
            }
        }
        Ok(best)
    }

    pub fn pseudo_diameter(&self, weighted: bool) -> Result<PseudoDiameter> {
        if weighted {
            self.pseudo_diameter_weighted(0, false)
        } else {
            self.pseudo_diameter_unweighted(0, false)
        }
    }

    /// Farthest-first traversal selecting `k` centers, starting from one end of a pseudo
    /// diameter through `root`. Returns `None` when the graph is disconnected.
    ///
    /// With `centering`, each node's distances are shifted so they sum to zero over the centers.
    pub fn k_centers(
        &self,
        k: usize,
        weighted: bool,
        root: usize,
        centering: bool,
    ) -> Result<Option<KCenters>> {
        self.check_node(root)?;
        let n = self.nrows();
        if k == 0 || k > n {
            return Err(Error::InvalidArgument {
                reason: format!("cannot pick {k} centers from {n} nodes"),
            });
        }
        let a = self.numerically_symmetric()?;
        let diameter = if weighted {
            a.pseudo_diameter_weighted(root, false)?
        } else {
            a.pseudo_diameter_unweighted(root, false)?
        };
        if !diameter.connected {
            debug!(n, "k-centers skipped: graph is disconnected");
            return Ok(None);
        }

        let mut centers = Vec::with_capacity(k);
        let mut dist = vec![0.0; k * n];
        let mut dist_min = vec![f64::INFINITY; n];
        let mut dist_sum = vec![0.0; n];
        let mut center = diameter.ends.0;
        for c in 0..k {
            centers.push(center);
            let row = &mut dist[c * n..(c + 1) * n];
            if weighted {
                let sp = a.dijkstra_filtered(center, None);
                for (slot, d) in row.iter_mut().zip(&sp.dist) {
                    *slot = d.unwrap_or(0.0);
                }
            } else {
                let ls = a.level_sets(center, None)?;
                for (l, level) in ls.levels() {
                    for &i in level {
                        row[i] = l as f64;
                    }
                }
            }
            for i in 0..n {
                dist_min[i] = dist_min[i].min(row[i]);
                dist_sum[i] += row[i];
            }

            let (mut dmax, mut dsum) = (dist_min[0], dist_sum[0]);
            center = 0;
            for i in 0..n {
                if dmax < dist_min[i] || (dmax == dist_min[i] && dsum < dist_sum[i]) {
                    dmax = dist_min[i];
                    dsum = dist_sum[i];
                    center = i;
                }
            }
        }

        if centering {
            for c in 0..k {
                for i in 0..n {
                    dist[c * n + i] -= dist_sum[i] / k as f64;
                }
            }
        }
        Ok(Some(KCenters { centers, dist }))
    }

    /// Dense row-major all-pairs distances.
    pub fn distance_matrix(&self, weighted: bool) -> Result<Vec<Distance>> {
        ensure_square(self.nrows(), self.ncols())?;
        let n = self.nrows();
        let mut out = vec![Distance::Unreachable; n * n];
        let mut mask = vec![0; n];
        for i in 0..n {
            let row = &mut out[i * n..(i + 1) * n];
            if weighted {
                row.copy_from_slice(&self.dijkstra_filtered(i, None).dist);
            } else {
                mask.fill(0);
                let ls = self.level_sets_with_mask(i, None, &mut mask);
                for (l, level) in ls.levels() {
                    for &j in level {
                        row[j] = Distance::Finite(l as f64);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Sparse symmetric matrix of the distances between nodes at most `khops` hops apart.
    pub fn distance_matrix_khops(&self, khops: usize, weighted: bool) -> Result<SparseMatrix<f64>> {
        ensure_square(self.nrows(), self.ncols())?;
        let n = self.nrows();
        let a = self.numerically_symmetric()?;
        let mut irn = Vec::new();
        let mut jcn = Vec::new();
        let mut vals = Vec::new();
        let mut mask = vec![0; n];
        let mut allowed = vec![false; n];
        for k in 0..n {
            let ls = a.level_sets_with_mask(k, Some(khops), &mut mask);
            if weighted {
                for &i in ls.nodes() {
                    allowed[i] = true;
                }
                let sp = a.dijkstra_filtered(k, Some(&allowed));
                for &i in ls.nodes() {
                    if i == k {
                        continue;
                    }
                    if let Some(d) = sp.dist[i].finite() {
                        irn.push(k);
                        jcn.push(i);
                        vals.push(d);
                    }
                    allowed[i] = false;
                }
                allowed[k] = false;
            } else {
                for (l, level) in ls.levels().skip(1) {
                    for &i in level {
                        irn.push(k);
                        jcn.push(i);
                        vals.push(l as f64);
                    }
                }
            }
            for &i in ls.nodes() {
                mask[i] = 0;
            }
        }
        let d = SparseMatrix::from_coordinate_arrays(n, n, &irn, &jcn, &vals, SumRepeated::All)?;
        d.symmetrize(false)
    }

    /// Symmetric sparse matrix holding the distances from every node to `k` centers.
    /// Returns `None` for disconnected graphs.
    pub fn distance_matrix_k_centers(
        &self,
        k: usize,
        weighted: bool,
    ) -> Result<Option<SparseMatrix<f64>>> {
        let n = self.nrows();
        let Some(kc) = self.k_centers(k, weighted, 0, false)? else {
            return Ok(None);
        };
        let mut is_center = vec![None; n];
        for (c, &center) in kc.centers.iter().enumerate() {
            is_center[center].get_or_insert(c);
        }
        let mut irn = Vec::with_capacity(2 * k * n);
        let mut jcn = Vec::with_capacity(2 * k * n);
        let mut vals = Vec::with_capacity(2 * k * n);
        for (c, &center) in kc.centers.iter().enumerate() {
            if is_center[center] != Some(c) {
                continue;
            }
            for j in 0..n {
                // Center pairs are emitted once, by the earlier center.
                if j == center || is_center[j].is_some_and(|other| other < c) {
                    continue;
                }
                let d = kc.dist[c * n + j];
                irn.extend([center, j]);
                jcn.extend([j, center]);
                vals.extend([d, d]);
            }
        }
        let out = SparseMatrix::from_coordinate_arrays(n, n, &irn, &jcn, &vals, SumRepeated::All)?;
        out.set_symmetric();
        Ok(Some(out))
    }

    /// Stationary distribution of a random surfer following out-edges (weighted by `|a_ij|`
    /// when `weighted`) and teleporting with probability `teleport`.
    pub fn page_rank(&self, teleport: f64, weighted: bool, epsilon: f64) -> Result<Vec<f64>> {
        ensure_square(self.nrows(), self.ncols())?;
        if !(0.0..=1.0).contains(&teleport) {
            return Err(Error::InvalidArgument {
                reason: format!("teleport probability {teleport} outside [0, 1]"),
            });
        }
        let n = self.nrows();
        if n == 0 {
            return Ok(Vec::new());
        }
        let weight = |v: T| if weighted { v.edge_length() } else { 1.0 };

        let mut diag = vec![0.0; n];
        for (i, d) in diag.iter_mut().enumerate() {
            *d = self
                .row(i)
                .filter(|&(j, _)| j != i)
                .map(|(_, v)| weight(v))
                .sum::<f64>();
            *d = 1.0 / (*d).max(MACHINE_ACCURACY);
        }

        let mut x = vec![1.0 / n as f64; n];
        let mut y = vec![0.0; n];
        for iter in 1..=PAGE_RANK_MAX_ITERATIONS {
            y.fill(0.0);
            for i in 0..n {
                for (j, v) in self.row(i) {
                    if j != i {
                        y[j] += weight(v) * x[i] * diag[i];
                    }
                }
            }
            let mut res = 0.0;
            for i in 0..n {
                y[i] = (1.0 - teleport) * y[i] + teleport / n as f64;
                res += (x[i] - y[i]).abs();
            }
            std::mem::swap(&mut x, &mut y);
            trace!(iter, res, "page rank");
            if res <= epsilon {
                break;
            }
        }
        Ok(x)
    }

    /// Groups columns with identical row patterns (graph modules).
    pub fn decompose_to_supervariables(&self) -> Partition {
        let n = self.ncols();
        if n == 0 {
            return Partition {
                ptr: vec![0],
                members: Vec::new(),
            };
        }
        let mut group = vec![0usize; n];
        let mut count = vec![0usize; n + 1];
        let mut seen_in_row = vec![usize::MAX; n + 1];
        let mut newmap = vec![0usize; n + 1];
        count[0] = n;
        let mut ngroups = 1;

        for i in 0..self.nrows() {
            let cols = self.row_indices(i);
            for &j in cols {
                count[group[j]] -= 1;
            }
            for &j in cols {
                let g = group[j];
                if seen_in_row[g] != i {
                    seen_in_row[g] = i;
                    if count[g] == 0 {
                        count[g] = 1;
                        newmap[g] = g;
                    } else {
                        newmap[g] = ngroups;
                        count[ngroups] = 1;
                        group[j] = ngroups;
                        ngroups += 1;
                    }
                } else {
                    group[j] = newmap[g];
                    count[newmap[g]] += 1;
                }
            }
        }

        let mut ptr = vec![0usize; ngroups + 1];
        for g in 0..ngroups {
            ptr[g + 1] = ptr[g] + count[g];
        }
        let mut next = ptr.clone();
        let mut members = vec![0usize; n];
        for (j, &g) in group.iter().enumerate() {
            members[next[g]] = j;
            next[g] += 1;
        }
        Partition { ptr, members }
    }
}

fn weighted_sweep<T: Scalar>(a: &SparseMatrix<T>, root: usize) -> (PseudoDiameter, Vec<usize>) {
    let mut root = root;
    let mut best = PseudoDiameter {
        length: -1.0,
        ends: (root, root),
        connected: true,
    };
    let mut order = vec![root];
    loop {
        let sp = a.dijkstra_filtered(root, None);
        let far = *sp.order.last().unwrap_or(&root);
        if !sp.complete {
            best.connected = false;
            best.length = sp.farthest;
            best.ends = (root, far);
            return (best, sp.order);
        }
        if sp.farthest <= best.length {
            return (best, order);
        }
        best.length = sp.farthest;
        best.ends = (root, far);
        order = sp.order;
        root = far;
    }
}

fn unweighted_sweep(a: &SparseMatrix<Pattern>, root: usize) -> (PseudoDiameter, Vec<usize>) {
    let n = a.nrows();
    let mut mask = vec![0; n];
    let mut ls = a.level_sets_with_mask(root, None, &mut mask);
    let connected = ls.nodes().len() == n;
    let mut ends = (root, *ls.last_level().last().unwrap_or(&root));
    loop {
        let far = ends.1;
        mask.fill(0);
        let next = a.level_sets_with_mask(far, None, &mut mask);
        if next.len() <= ls.len() {
            break;
        }
        ends = (far, *next.last_level().last().unwrap_or(&far));
        ls = next;
    }
    let diameter = PseudoDiameter {
        length: (ls.len() - 1) as f64,
        ends,
        connected,
    };
    (diameter, ls.last_level().to_vec())
}
