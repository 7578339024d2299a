//! Stress majorization (neato).
//!
//! Stress `sum_{i<j} w_ij (|x_i - x_j| - d_ij)^2` with `w_ij = d_ij^-2` is minimized by
//! repeatedly solving `L_w X' = L_X X`, where `L_w` is the weighted Laplacian and `L_X` the
//! Laplacian of `w_ij d_ij / |x_i - x_j|`. Each solve is one conjugate-gradient run per axis and
//! never increases the stress. The hierarchy and separation-constrained variants replace the
//! solve on the vertical axis with a constrained one.

use otter_sparse::VtxGraph;
use otter_sparse::kernels::{CgOptions, PackedSymmetric, conjugate_gradient_packed, vector};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::context::LayoutContext;
use crate::error::{Result, ensure_coords};

mod cola;
mod hierarchy;
mod model;

pub use cola::{
    DirectedConstraints, SeparationConstraint, SeparationSolver, SweepProjection,
    stress_majorization_cola,
};
pub use hierarchy::{
    ConstrainedMajorization, Hierarchy, compute_hierarchy, compute_y_coords,
    stress_majorization_with_hierarchy,
};
pub use model::{DistanceModel, circuit_model, distance_matrix, mds_model};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressOptions {
    pub model: DistanceModel,
    pub maxiter: usize,
    /// Stop once the relative stress change falls below this value.
    pub epsilon: f64,
    /// Residual tolerance of the per-axis conjugate-gradient solves.
    pub cg_tolerance: f64,
    pub random_seed: u64,
    /// Ignore the incoming coordinates of unpinned nodes and start from random ones.
    pub random_start: bool,
    /// Nodes that keep their incoming coordinates.
    pub pinned: Vec<usize>,
    /// Minimum vertical gap between consecutive levels of the hierarchy variant.
    pub levels_gap: f64,
    /// Gap enforced by the separation constraints of the cola variant.
    pub edge_gap: f64,
    pub directed_constraints: DirectedConstraints,
}

impl Default for StressOptions {
    fn default() -> Self {
        Self {
            model: DistanceModel::ShortestPath,
            maxiter: 200,
            epsilon: 1e-4,
            cg_tolerance: 1e-3,
            random_seed: 123,
            random_start: true,
            pinned: Vec::new(),
            levels_gap: 0.0,
            edge_gap: 0.0,
            directed_constraints: DirectedConstraints::None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StressReport {
    pub iterations: usize,
    /// Stress measured at the start of every iteration.
    pub stress: Vec<f64>,
    pub converged: bool,
    /// Number of per-axis solves whose search direction collapsed.
    pub degenerate_solves: usize,
}

impl StressReport {
    pub fn final_stress(&self) -> Option<f64> {
        self.stress.last().copied()
    }
}

/// Weighted Laplacian and constant term of the stress function for fixed targets.
pub(crate) struct StressSystem {
    n: usize,
    dij: PackedSymmetric,
    lap: PackedSymmetric,
    constant: f64,
}

impl StressSystem {
    pub(crate) fn new(dij: PackedSymmetric) -> Self {
        let n = dij.dim();
        let mut lap = PackedSymmetric::zeros(n);
        let mut constant = 0.0;
        for i in 0..n {
            for j in i + 1..n {
                let d = dij.get(i, j);
                if d <= 0.0 {
                    continue;
                }
                let w = 1.0 / (d * d);
                lap.set(i, j, -w);
                lap.add_to(i, i, w);
                lap.add_to(j, j, w);
                constant += 1.0;
            }
        }
        Self {
            n,
            dij,
            lap,
            constant,
        }
    }

    pub(crate) fn laplacian(&self) -> &PackedSymmetric {
        &self.lap
    }

    /// Writes `L_X x_k` into `b[k]` for every axis and returns the stress of `axes`.
    pub(crate) fn majorize(&self, axes: &[Vec<f64>], b: &mut [Vec<f64>]) -> f64 {
        for bk in b.iter_mut() {
            bk.fill(0.0);
        }
        let mut weighted_dist = 0.0;
        let mut weighted_sq = 0.0;
        for i in 0..self.n {
            for j in i + 1..self.n {
                let d = self.dij.get(i, j);
                if d <= 0.0 {
                    continue;
                }
                let dist = axes
                    .iter()
                    .map(|a| (a[i] - a[j]) * (a[i] - a[j]))
                    .sum::<f64>()
                    .sqrt();
                weighted_sq += dist * dist / (d * d);
                let c = 1.0 / (d * dist);
                if !c.is_finite() {
                    continue;
                }
                weighted_dist += dist / d;
                for (a, bk) in axes.iter().zip(b.iter_mut()) {
                    let delta = c * (a[i] - a[j]);
                    bk[i] += delta;
                    bk[j] -= delta;
                }
            }
        }
        weighted_sq - 2.0 * weighted_dist + self.constant
    }
}

/// Boolean mask of the pinned nodes.
pub(crate) fn pinned_mask(n: usize, pinned: &[usize]) -> Result<Vec<bool>> {
    let mut mask = vec![false; n];
    for &i in pinned {
        if i >= n {
            return Err(otter_sparse::Error::InvalidArgument {
                reason: format!("pinned node {i} is out of range for {n} nodes"),
            }
            .into());
        }
        mask[i] = true;
    }
    Ok(mask)
}

/// Per-axis starting coordinates: the caller's for pinned nodes (and for every node without a
/// random start), uniform samples otherwise. Axes are centred unless something is pinned.
pub(crate) fn init_layout(
    ctx: &mut LayoutContext,
    dim: usize,
    x: &[f64],
    random_start: bool,
    pinned: &[bool],
) -> Vec<Vec<f64>> {
    let n = pinned.len();
    let mut axes = vec![vec![0.0; n]; dim];
    for i in 0..n {
        for (k, axis) in axes.iter_mut().enumerate() {
            axis[i] = if random_start && !pinned[i] {
                ctx.uniform()
            } else {
                x[i * dim + k]
            };
        }
    }
    if !pinned.iter().any(|&p| p) {
        for axis in &mut axes {
            vector::orthog1(axis);
        }
    }
    axes
}

pub(crate) fn write_back(axes: &[Vec<f64>], x: &mut [f64]) {
    let dim = axes.len();
    for (k, axis) in axes.iter().enumerate() {
        for (i, &v) in axis.iter().enumerate() {
            x[i * dim + k] = v;
        }
    }
}

/// Rescales the layout so its largest coordinate magnitude is 10 (or leaves it alone when
/// everything already fits in `[-1, 1]`).
pub(crate) fn scale_down(axes: &mut [Vec<f64>]) {
    let max = axes
        .iter()
        .flat_map(|a| a.iter())
        .fold(1.0_f64, |m, v| m.max(v.abs()));
    for axis in axes {
        vector::scale(axis, 10.0 / max);
    }
}

/// Unconstrained per-axis solve of `L_w x = b`; pinned nodes keep their coordinates.
pub(crate) fn solve_axis(
    lap: &PackedSymmetric,
    axis: &mut [f64],
    b: &[f64],
    pinned: &[bool],
    tol: f64,
) -> Result<bool> {
    let has_pinned = pinned.iter().any(|&p| p);
    let cg = CgOptions {
        tol,
        max_iterations: axis.len(),
        orthogonalize: !has_pinned,
    };
    if !has_pinned {
        return Ok(conjugate_gradient_packed(lap, axis, b, &cg)?.degenerate);
    }
    let mut tmp = axis.to_vec();
    let out = conjugate_gradient_packed(lap, &mut tmp, b, &cg)?;
    for ((v, t), &p) in axis.iter_mut().zip(tmp).zip(pinned) {
        if !p {
            *v = t;
        }
    }
    Ok(out.degenerate)
}

/// Stop rule for the unconstrained solver: a small relative change, a near-zero stress, or a
/// stress that went up after the second round.
fn stress_settled(iteration: usize, old_stress: f64, stress: f64, epsilon: f64) -> bool {
    (old_stress - stress).abs() / old_stress < epsilon
        || stress < epsilon
        || (iteration > 1 && stress > old_stress)
}

/// Stress majorization of `graph` into the row-major `n x dim` array `x`.
///
/// Nodes listed in `opts.pinned` keep their incoming coordinates; so do all nodes when
/// `opts.random_start` is off, but only as a starting point. Iteration stops after
/// `opts.maxiter` rounds, once the relative stress change drops below `opts.epsilon`, or as
/// soon as the stress increases past the second round.
pub fn stress_majorization_kd_mkernel(
    ctx: &mut LayoutContext,
    graph: &VtxGraph,
    dim: usize,
    x: &mut [f64],
    opts: &StressOptions,
) -> Result<StressReport> {
    let n = graph.len();
    ensure_coords(n, dim, x)?;
    let pinned = pinned_mask(n, &opts.pinned)?;
    let mut axes = init_layout(ctx, dim, x, opts.random_start, &pinned);
    let mut report = StressReport::default();
    if n <= 1 || opts.maxiter == 0 {
        write_back(&axes, x);
        return Ok(report);
    }

    let system = StressSystem::new(distance_matrix(graph, opts.model)?);
    let mut b = vec![vec![0.0; n]; dim];
    let mut old_stress = f64::MAX;
    while report.iterations < opts.maxiter {
        let stress = system.majorize(&axes, &mut b);
        report.stress.push(stress);
        let converged = stress_settled(report.iterations, old_stress, stress, opts.epsilon);
        old_stress = stress;
        trace!(iteration = report.iterations, stress, "stress iteration");

        for (axis, bk) in axes.iter_mut().zip(&b) {
            if solve_axis(system.laplacian(), axis, bk, &pinned, opts.cg_tolerance)? {
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
        iterations = report.iterations,
        stress = old_stress,
        converged = report.converged,
        "stress majorization"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stress_of_an_exact_embedding_is_zero() {
        let mut d = PackedSymmetric::zeros(3);
        d.set(0, 1, 1.0);
        d.set(1, 2, 1.0);
        d.set(0, 2, 2.0);
        let system = StressSystem::new(d);
        let axes = vec![vec![0.0, 1.0, 2.0], vec![0.0; 3]];
        let mut b = vec![vec![0.0; 3]; 2];
        let stress = system.majorize(&axes, &mut b);
        assert!(stress.abs() < 1e-12);
        // At a zero-stress layout L_X x equals L_w x.
        let mut lx = vec![0.0; 3];
        system.laplacian().mat_vec(&axes[0], &mut lx);
        for (a, b) in lx.iter().zip(&b[0]) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn rising_stress_stops_after_the_second_round() {
        let eps = 1e-4;
        // The first round compares against f64::MAX.
        assert!(!stress_settled(0, f64::MAX, 5.0, eps));
        assert!(!stress_settled(1, 5.0, 6.0, eps));
        assert!(!stress_settled(2, 5.0, 4.0, eps));
        assert!(stress_settled(2, 4.0, 4.2, eps));
        assert!(stress_settled(3, 4.0, 4.0 - 1e-6, eps));
        assert!(stress_settled(1, 1.0, 1e-5, eps));
    }

    #[test]
    fn pinned_indices_are_checked() {
        assert!(pinned_mask(3, &[0, 2]).is_ok());
        assert!(pinned_mask(3, &[3]).is_err());
    }

    #[test]
    fn pinned_nodes_do_not_move() {
        let g = VtxGraph::from_edges(3, &[(0, 1), (1, 2)], None).unwrap();
        let mut ctx = LayoutContext::new(7);
        let mut x = vec![5.0, 5.0, 0.0, 0.0, -3.0, 1.0];
        let opts = StressOptions {
            pinned: vec![0, 2],
            maxiter: 50,
            ..StressOptions::default()
        };
        stress_majorization_kd_mkernel(&mut ctx, &g, 2, &mut x, &opts).unwrap();
        assert_eq!(&x[0..2], &[5.0, 5.0]);
        assert_eq!(&x[4..6], &[-3.0, 1.0]);
    }

    #[test]
    fn single_node_is_left_alone() {
        let g = VtxGraph::from_edges(1, &[], None).unwrap();
        let mut x = vec![0.0, 0.0];
        let mut ctx = LayoutContext::default();
        let report =
            stress_majorization_kd_mkernel(&mut ctx, &g, 2, &mut x, &StressOptions::default())
                .unwrap();
        assert_eq!(report.iterations, 0);
    }
}
