//! Stress majorization with the vertical axis constrained to a level hierarchy (DiG-CoLa).
//!
//! Directed edges first get "ideal" y coordinates from a least-squares fit in which every edge
//! wants its tail one unit above its head. Sorting by those coordinates and cutting at large
//! gaps gives the levels. During majorization the y axis is solved by a block
//! Gauss-Seidel method that keeps every level above the previous one.

use nalgebra::DMatrix;
use otter_sparse::kernels::{CgOptions, FnMatVec, PackedSymmetric, conjugate_gradient, vector};
use otter_sparse::{VtxGraph, XorShift64Star, quicksort_place};
use tracing::{debug, trace};

use super::{
    StressOptions, StressReport, StressSystem, distance_matrix, init_layout, pinned_mask,
    scale_down, solve_axis, stress_majorization_kd_mkernel, write_back,
};
use crate::context::LayoutContext;
use crate::error::{Error, Result, ensure_coords};

/// Block sweeps of the constrained solve per majorization step. Each sweep sorts the nodes and
/// moves whole blocks, so a few suffice before the next majorization step.
const LOCAL_ITERATIONS: usize = 15;
/// Gaps below this never separate levels.
pub(super) const LEVELS_ABS_TOL: f64 = 1e-2;
/// Gaps below this fraction of the average gap never separate levels.
pub(super) const LEVELS_REL_TOL: f64 = 1e-1;
const HIERARCHY_CG_TOL: f64 = 1e-3;
/// A block move smaller than this counts as converged.
const QUAD_PROG_TOL: f64 = 1e-2;

/// Nodes grouped into levels of increasing y.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Hierarchy {
    /// Nodes sorted by level, and by position within a level.
    pub ordering: Vec<usize>,
    /// Indices into `ordering` at which a new level starts.
    pub boundaries: Vec<usize>,
}

impl Hierarchy {
    pub fn num_levels(&self) -> usize {
        if self.ordering.is_empty() {
            0
        } else {
            self.boundaries.len() + 1
        }
    }

    /// The nodes of level `l`, in ordering order.
    pub fn level(&self, l: usize) -> &[usize] {
        let start = if l == 0 { 0 } else { self.boundaries[l - 1] };
        let end = self
            .boundaries
            .get(l)
            .copied()
            .unwrap_or(self.ordering.len());
        &self.ordering[start..end]
    }

    /// Level index of every node.
    pub fn levels_by_node(&self) -> Vec<usize> {
        let mut lev = vec![0; self.ordering.len()];
        for l in 0..self.num_levels() {
            for &node in self.level(l) {
                lev[node] = l;
            }
        }
        lev
    }

    /// End (exclusive) of level `level` in `ordering`.
    fn level_end(&self, level: usize) -> usize {
        self.boundaries
            .get(level)
            .copied()
            .unwrap_or(self.ordering.len())
    }
}

/// Least-squares y coordinates for a directed graph: solves `L y = -b` where `L` is the
/// unit-weight Laplacian and `b_i` sums the signed lengths of the edges at `i` (positive where
/// `i` is the head). The result puts tails above heads and is centred.
pub fn compute_y_coords(
    ctx: &mut LayoutContext,
    graph: &VtxGraph,
    max_iterations: usize,
) -> Result<Vec<f64>> {
    let n = graph.len();
    let rhs: Vec<f64> = graph
        .vertices()
        .iter()
        .map(|v| match &v.edists {
            Some(ed) => -(1..v.nedges()).map(|k| v.length(k) * ed[k]).sum::<f64>(),
            None => 0.0,
        })
        .collect();

    let mut y = vec![0.0; n];
    ctx.fill_uniform(&mut y);
    vector::orthog1(&mut y);

    let lap = FnMatVec::new(n, |x: &[f64], out: &mut [f64]| {
        for (i, v) in graph.vertices().iter().enumerate() {
            let neighbours: f64 = v.neighbors().iter().map(|&j| x[j]).sum();
            out[i] = (v.nedges() - 1) as f64 * x[i] - neighbours;
        }
    });
    let outcome = conjugate_gradient(
        &lap,
        &mut y,
        &rhs,
        &CgOptions::new(HIERARCHY_CG_TOL, max_iterations),
    )?;
    trace!(iterations = outcome.iterations, residual = outcome.residual, "y coordinates");
    Ok(y)
}

/// Splits the nodes into levels by y coordinate.
///
/// Consecutive nodes (in y order) start a new level when their gap exceeds
/// `max(abs_tol, relative_tol * spread / (n - 1))`. Without `given` y coordinates they come from
/// [`compute_y_coords`].
pub fn compute_hierarchy(
    ctx: &mut LayoutContext,
    graph: &VtxGraph,
    abs_tol: f64,
    relative_tol: f64,
    given: Option<&[f64]>,
) -> Result<Hierarchy> {
    let n = graph.len();
    let y = match given {
        Some(y) => {
            ensure_coords(n, 1, y)?;
            y.to_vec()
        }
        None => compute_y_coords(ctx, graph, n)?,
    };
    let mut ordering: Vec<usize> = (0..n).collect();
    if n < 2 {
        return Ok(Hierarchy {
            ordering,
            boundaries: Vec::new(),
        });
    }
    quicksort_place(&y, &mut ordering, ctx.rng());

    let spread = y[ordering[n - 1]] - y[ordering[0]];
    let tol = abs_tol.max(relative_tol * spread / (n - 1) as f64);
    let boundaries = (1..n)
        .filter(|&i| y[ordering[i]] - y[ordering[i - 1]] > tol)
        .collect();
    Ok(Hierarchy {
        ordering,
        boundaries,
    })
}

/// Moves the prefix and suffix desired places so the prefix does not end up after the
/// suffix.
fn limit_order(prefix: f64, suffix: f64, cur: f64) -> (f64, f64) {
    if suffix >= prefix {
        return (prefix, suffix);
    }
    if suffix < cur {
        let prefix = prefix.min(cur);
        (prefix, prefix)
    } else if prefix > cur {
        (suffix, suffix)
    } else {
        (prefix, suffix)
    }
}

/// Block solver for `min yᵀ L y - 2 bᵀ y` subject to the level ordering.
///
/// Nodes whose constraints are active form blocks that move together; each sweep splits a
/// block where moving the two halves apart lowers the objective the most.
#[derive(Debug, Clone)]
pub struct ConstrainedMajorization {
    lap: DMatrix<f64>,
    hierarchy: Hierarchy,
    lev: Vec<usize>,
    desired: Vec<f64>,
    prefix: Vec<f64>,
    suffix: Vec<f64>,
    gap: Vec<f64>,
    block: Vec<usize>,
}

impl ConstrainedMajorization {
    /// `lap` is the weighted Laplacian of the stress function.
    pub fn new(lap: &PackedSymmetric, hierarchy: Hierarchy) -> Result<Self> {
        let n = lap.dim();
        if hierarchy.ordering.len() != n {
            return Err(otter_sparse::Error::LengthMismatch {
                what: "hierarchy ordering",
                expected: n,
                actual: hierarchy.ordering.len(),
            }
            .into());
        }
        let lev = hierarchy.levels_by_node();
        Ok(Self {
            lap: lap.to_dense(),
            hierarchy,
            lev,
            desired: vec![0.0; n],
            prefix: vec![0.0; n],
            suffix: vec![0.0; n],
            gap: vec![0.0; n],
            block: Vec::with_capacity(n),
        })
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    /// Sorts each level by `place` and lifts every level to at least `levels_gap` above the
    /// top of the previous one.
    fn ensure_monotonic_ordering(
        &mut self,
        rng: &mut XorShift64Star,
        place: &mut [f64],
        levels_gap: f64,
    ) {
        for level in 0..self.hierarchy.num_levels() {
            let start = if level == 0 {
                0
            } else {
                self.hierarchy.boundaries[level - 1]
            };
            let end = self.hierarchy.level_end(level);
            let lower_bound = if start > 0 {
                place[self.hierarchy.ordering[start - 1]] + levels_gap
            } else {
                f64::NEG_INFINITY
            };
            quicksort_place(place, &mut self.hierarchy.ordering[start..end], rng);
            for &node in &self.hierarchy.ordering[start..end] {
                if place[node] < lower_bound {
                    place[node] = lower_bound;
                }
            }
        }
    }

    /// Runs up to `max_iterations` block sweeps on `place` and returns the number performed.
    ///
    /// `b` is the right-hand side `L_X y` of the current majorization step.
    pub fn solve_with_gaps(
        &mut self,
        rng: &mut XorShift64Star,
        b: &[f64],
        place: &mut [f64],
        max_iterations: usize,
        levels_gap: f64,
    ) -> Result<usize> {
        let n = self.lap.nrows();
        for (what, len) in [("right-hand side", b.len()), ("placement", place.len())] {
            if len != n {
                return Err(otter_sparse::Error::LengthMismatch {
                    what,
                    expected: n,
                    actual: len,
                }
                .into());
            }
        }
        if max_iterations == 0 || n == 0 {
            return Ok(0);
        }
        self.ensure_monotonic_ordering(rng, place, levels_gap);

        let num_levels = self.hierarchy.boundaries.len();
        let mut counter = 0;
        let mut converged = false;
        while counter < max_iterations && !converged {
            converged = true;
            let mut lower_bound = f64::NEG_INFINITY;
            let mut left = 0;
            while left < n {
                let ordering = &mut self.hierarchy.ordering;
                let lev = &self.lev;

                // Block of nodes held together by active constraints.
                let cur_place = place[ordering[left]];
                let mut target = cur_place;
                self.gap[ordering[left]] = 0.0;
                let mut right = left + 1;
                while right < n {
                    if lev[ordering[right]] > lev[ordering[right - 1]] {
                        target += levels_gap;
                    }
                    let node = ordering[right];
                    if (place[node] - target).abs() > 1e-9 {
                        break;
                    }
                    self.gap[node] = place[node] - cur_place;
                    right += 1;
                }

                // Where each node would put the block's reference point on its own.
                for &node in &ordering[left..right] {
                    let diag = self.lap[(node, node)];
                    self.desired[node] = if diag > 0.0 {
                        let off: f64 = (0..n)
                            .filter(|&j| j != node)
                            .map(|j| self.lap[(node, j)] * place[j])
                            .sum();
                        (b[node] - off) / diag - self.gap[node]
                    } else {
                        cur_place
                    };
                }

                // Group by level; within a level, nodes pulled down come first.
                self.block.clear();
                let mut i = left;
                while i < right {
                    let level = lev[ordering[i]];
                    let next = if level == num_levels {
                        right
                    } else {
                        right.min(self.hierarchy.boundaries[level])
                    };
                    for wanted in [
                        std::cmp::Ordering::Less,
                        std::cmp::Ordering::Equal,
                        std::cmp::Ordering::Greater,
                    ] {
                        for &node in &ordering[i..next] {
                            if self.desired[node].total_cmp(&cur_place) == wanted {
                                self.block.push(node);
                            }
                        }
                    }
                    i = next;
                }
                let block_len = self.block.len();

                accumulate_desired(
                    &self.lap,
                    &self.block,
                    &self.desired,
                    cur_place,
                    false,
                    &mut self.prefix,
                );
                accumulate_desired(
                    &self.lap,
                    &self.block,
                    &self.desired,
                    cur_place,
                    true,
                    &mut self.suffix,
                );
                if block_len == n {
                    // The whole graph is one block; its optimum is undetermined.
                    self.prefix[n - 1] = cur_place;
                    self.suffix[0] = cur_place;
                }

                let mut best = None;
                let mut max_movement = 0.0;
                for i in 0..block_len {
                    let suffix = self.suffix[i];
                    let prefix = if i > 0 { self.prefix[i - 1] } else { suffix };
                    let (prefix, suffix) = limit_order(prefix, suffix, cur_place);
                    let movement = (block_len - i) as f64 * (suffix - cur_place).abs()
                        + i as f64 * (prefix - cur_place).abs();
                    if movement > max_movement {
                        max_movement = movement;
                        best = Some(i);
                    }
                }

                let last = self.block[block_len - 1];
                let new_level_after = right < n && lev[ordering[right]] > lev[ordering[right - 1]];
                if let Some(best) = best {
                    let suffix = self.suffix[best];
                    let prefix = if best > 0 { self.prefix[best - 1] } else { suffix };
                    let upper_bound = if right >= n {
                        f64::INFINITY
                    } else if new_level_after {
                        place[ordering[right]] - levels_gap - self.gap[last]
                    } else {
                        place[ordering[right]] - self.gap[last]
                    };
                    let (prefix, suffix) = limit_order(
                        prefix.max(lower_bound),
                        suffix.min(upper_bound),
                        cur_place,
                    );
                    for (k, &node) in self.block.iter().enumerate() {
                        let anchor = if k < best { prefix } else { suffix };
                        place[node] = anchor + self.gap[node];
                    }
                    ordering[left..right].copy_from_slice(&self.block);
                    converged = converged
                        && (prefix - cur_place).abs() < QUAD_PROG_TOL
                        && (suffix - cur_place).abs() < QUAD_PROG_TOL;
                }
                lower_bound = if new_level_after {
                    place[last] + levels_gap
                } else {
                    place[last]
                };
                left = right;
            }
            vector::orthog1(place);
            counter += 1;
        }
        Ok(counter)
    }
}

/// Desired reference place of every prefix (or, with `from_end`, every suffix) of `block`,
/// treating the block's internal edges as rigid.
fn accumulate_desired(
    lap: &DMatrix<f64>,
    block: &[usize],
    desired: &[f64],
    cur_place: f64,
    from_end: bool,
    out: &mut [f64],
) {
    let len = block.len();
    let mut des_place = 0.0;
    let mut block_deg = 0.0;
    for step in 0..len {
        let i = if from_end { len - 1 - step } else { step };
        let node = block[i];
        let others = if from_end { &block[i + 1..] } else { &block[..i] };
        let to_block = 2.0 * others.iter().map(|&j| lap[(node, j)]).sum::<f64>();
        let diag = lap[(node, node)];
        des_place = (block_deg * des_place + diag * desired[node] + to_block * cur_place)
            / (block_deg + diag + to_block);
        out[i] = des_place;
        block_deg += to_block + diag;
    }
}

/// Stress majorization with hierarchy constraints on the y axis (axis 1).
///
/// Falls back to [`stress_majorization_kd_mkernel`] when the graph has no directed edges or
/// the directed edges do not separate any levels. `opts.levels_gap` is the minimum distance
/// between consecutive levels; when positive, target distances are rescaled to the size of the
/// starting layout first. Pinned nodes only fix the starting coordinates.
pub fn stress_majorization_with_hierarchy(
    ctx: &mut LayoutContext,
    graph: &VtxGraph,
    dim: usize,
    x: &mut [f64],
    opts: &StressOptions,
) -> Result<StressReport> {
    let n = graph.len();
    ensure_coords(n, dim, x)?;
    if !graph.has_directions() {
        return stress_majorization_kd_mkernel(ctx, graph, dim, x, opts);
    }
    if dim < 2 {
        return Err(Error::Unsupported {
            reason: format!("hierarchy constraints need at least two dimensions, got {dim}"),
        });
    }
    let pinned = pinned_mask(n, &opts.pinned)?;
    let mut axes = init_layout(ctx, dim, x, opts.random_start, &pinned);
    let hierarchy = compute_hierarchy(ctx, graph, LEVELS_ABS_TOL, LEVELS_REL_TOL, None)?;
    if hierarchy.boundaries.is_empty() {
        debug!("no hierarchy levels found, using unconstrained stress majorization");
        return stress_majorization_kd_mkernel(ctx, graph, dim, x, opts);
    }
    let mut report = StressReport::default();
    if n == 1 || opts.maxiter == 0 {
        write_back(&axes, x);
        return Ok(report);
    }

    let mut dij = distance_matrix(graph, opts.model)?;
    scale_down(&mut axes);
    if opts.levels_gap > 0.0 {
        let pairs = (n * (n - 1) / 2) as f64;
        let mut ratio = 0.0;
        for i in 0..n {
            for j in i + 1..n {
                let d = dij.get(i, j);
                if d > 0.0 {
                    let dist = axes
                        .iter()
                        .map(|a| (a[i] - a[j]) * (a[i] - a[j]))
                        .sum::<f64>()
                        .sqrt();
                    ratio += dist / d;
                }
            }
        }
        vector::scale(dij.data_mut(), ratio / pairs);
    }
    for axis in &mut axes {
        vector::orthog1(axis);
    }
    let y0 = axes[1][0];
    for v in &mut axes[1] {
        *v -= y0;
    }

    let system = StressSystem::new(dij);
    let mut cmaj = ConstrainedMajorization::new(system.laplacian(), hierarchy)?;
    let free = vec![false; n];
    let mut b = vec![vec![0.0; n]; dim];
    let mut old_stress = f64::MAX;
    while report.iterations < opts.maxiter {
        let stress = system.majorize(&axes, &mut b);
        report.stress.push(stress);
        // The first constrained steps may raise the stress.
        let converged = (stress - old_stress).abs() / (old_stress + 1e-10).abs() < opts.epsilon
            || (report.iterations > 1 && stress > old_stress);
        old_stress = stress;
        trace!(iteration = report.iterations, stress, "hierarchy stress iteration");

        for (k, (axis, bk)) in axes.iter_mut().zip(&b).enumerate() {
            if k == 1 {
                cmaj.solve_with_gaps(ctx.rng(), bk, axis, LOCAL_ITERATIONS, opts.levels_gap)?;
            } else if solve_axis(system.laplacian(), axis, bk, &free, opts.cg_tolerance)? {
                report.degenerate_solves += 1;
            }
        }
        report.iterations += 1;
        if converged {
            report.converged = true;
            break;
        }
    }

    write_back(&axes, x);
    debug!(
        n,
        levels = cmaj.hierarchy().num_levels(),
        iterations = report.iterations,
        stress = old_stress,
        "hierarchy stress majorization"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> VtxGraph {
        VtxGraph::from_directed_edges(4, &[(0, 1), (1, 2), (2, 3)], None).unwrap()
    }

    #[test]
    fn tails_sit_above_heads() {
        let mut ctx = LayoutContext::new(3);
        let y = compute_y_coords(&mut ctx, &chain(), 50).unwrap();
        for w in y.windows(2) {
            assert!((w[0] - w[1] - 1.0).abs() < 1e-2, "{y:?}");
        }
    }

    #[test]
    fn chain_levels_are_singletons() {
        let mut ctx = LayoutContext::new(3);
        let h = compute_hierarchy(&mut ctx, &chain(), 1e-2, 1e-1, None).unwrap();
        assert_eq!(h.num_levels(), 4);
        assert_eq!(h.ordering, vec![3, 2, 1, 0]);
        assert_eq!(h.level(0), &[3]);
        assert_eq!(h.levels_by_node(), vec![3, 2, 1, 0]);
    }

    #[test]
    fn given_coordinates_group_close_nodes() {
        let g = VtxGraph::from_edges(4, &[], None).unwrap();
        let y = [0.0, 0.001, 5.0, 5.002];
        let mut ctx = LayoutContext::new(1);
        let h = compute_hierarchy(&mut ctx, &g, 1e-2, 1e-1, Some(&y)).unwrap();
        assert_eq!(h.boundaries, vec![2]);
        let mut first = h.level(0).to_vec();
        first.sort_unstable();
        assert_eq!(first, vec![0, 1]);
    }

    #[test]
    fn block_order_is_kept_apart() {
        assert_eq!(limit_order(1.0, 2.0, 0.0), (1.0, 2.0));
        assert_eq!(limit_order(2.0, -1.0, 0.0), (0.0, 0.0));
        assert_eq!(limit_order(3.0, 1.0, 0.0), (1.0, 1.0));
    }

    #[test]
    fn constrained_layout_respects_levels() {
        let g = chain();
        let mut ctx = LayoutContext::new(11);
        let mut x = vec![0.0; 8];
        let opts = StressOptions {
            levels_gap: 0.5,
            ..StressOptions::default()
        };
        stress_majorization_with_hierarchy(&mut ctx, &g, 2, &mut x, &opts).unwrap();
        for (tail, head) in [(0, 1), (1, 2), (2, 3)] {
            assert!(x[tail * 2 + 1] >= x[head * 2 + 1] + 0.5 - 1e-6, "{x:?}");
        }
    }
}
