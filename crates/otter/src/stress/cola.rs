//! Stress majorization with separation constraints on the y axis (IPSep-CoLa).
//!
//! The y axis is optimized by gradient projection: a steepest-descent step on the majorizing
//! quadratic, a projection back onto the feasible region by a [`SeparationSolver`], and a
//! line search along the projected move.

use otter_sparse::VtxGraph;
use otter_sparse::kernels::{PackedSymmetric, vector};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::hierarchy::{LEVELS_ABS_TOL, LEVELS_REL_TOL, compute_hierarchy};
use super::{
    StressOptions, StressReport, StressSystem, distance_matrix, init_layout, pinned_mask,
    scale_down, solve_axis, write_back,
};
use crate::context::LayoutContext;
use crate::error::{Error, Result, ensure_coords};

/// Cap on gradient-projection rounds per majorization step. A round is one projected step,
/// far cheaper than a block sweep of the hierarchy solver, and the loop leaves as soon as the
/// total movement falls to `QUAD_PROG_TOL`, so the cap is rarely reached.
const LOCAL_ITERATIONS: usize = 1000;
/// Total movement below which gradient projection stops.
const QUAD_PROG_TOL: f64 = 1e-2;
/// Weight of the boundary variables placed between hierarchy levels.
const BOUNDARY_WEIGHT: f64 = 1e-6;

/// Which separation constraints directed edges generate on the y axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectedConstraints {
    #[default]
    None,
    /// One constraint per directed edge: `y_tail >= y_head + edge_gap`.
    Edges,
    /// Levels from [`compute_hierarchy`], separated by boundary variables.
    Levels,
}

/// `place[right] >= place[left] + gap`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeparationConstraint {
    pub left: usize,
    pub right: usize,
    pub gap: f64,
}

impl SeparationConstraint {
    /// By how much the constraint is violated (non-positive when satisfied).
    pub fn violation(&self, place: &[f64]) -> f64 {
        place[self.left] + self.gap - place[self.right]
    }
}

/// Projection onto a set of separation constraints.
///
/// Implementations receive the desired positions in `place` and must leave a placement that
/// satisfies every constraint while staying close to the desired one; variables with a larger
/// weight should move less. A VPSC solver is the usual choice.
pub trait SeparationSolver {
    fn satisfy(
        &mut self,
        place: &mut [f64],
        weights: &[f64],
        constraints: &[SeparationConstraint],
    ) -> Result<()>;
}

/// Cyclic projection: every violated constraint is resolved on its own by moving both ends
/// apart in inverse proportion to their weights, until a sweep finds nothing to fix.
///
/// The result is feasible but not always the closest feasible placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepProjection {
    pub max_sweeps: usize,
    pub tol: f64,
}

impl Default for SweepProjection {
    fn default() -> Self {
        Self {
            max_sweeps: 1000,
            tol: 1e-9,
        }
    }
}

impl SeparationSolver for SweepProjection {
    fn satisfy(
        &mut self,
        place: &mut [f64],
        weights: &[f64],
        constraints: &[SeparationConstraint],
    ) -> Result<()> {
        if weights.len() != place.len() {
            return Err(otter_sparse::Error::LengthMismatch {
                what: "variable weights",
                expected: place.len(),
                actual: weights.len(),
            }
            .into());
        }
        if let Some(c) = constraints
            .iter()
            .find(|c| c.left >= place.len() || c.right >= place.len())
        {
            return Err(otter_sparse::Error::IndexOutOfRange {
                row: c.left,
                col: c.right,
                rows: place.len(),
                cols: place.len(),
            }
            .into());
        }

        for sweep in 0..self.max_sweeps {
            let mut worst = 0.0_f64;
            for c in constraints {
                let v = c.violation(place);
                if v <= self.tol {
                    continue;
                }
                worst = worst.max(v);
                let (wl, wr) = (weights[c.left], weights[c.right]);
                let total = wl + wr;
                let share = if total > 0.0 { wr / total } else { 0.5 };
                place[c.left] -= v * share;
                place[c.right] += v * (1.0 - share);
            }
            if worst <= self.tol {
                trace!(sweep, "separation constraints satisfied");
                return Ok(());
            }
        }
        debug!(max_sweeps = self.max_sweeps, "separation constraints still violated");
        Ok(())
    }
}

/// One constraint per directed edge, keeping every tail `gap` above its head.
fn edge_constraints(graph: &VtxGraph, gap: f64) -> Vec<SeparationConstraint> {
    let mut out = Vec::new();
    for (i, v) in graph.vertices().iter().enumerate() {
        let Some(ed) = &v.edists else {
            continue;
        };
        for (k, &j) in v.edges.iter().enumerate().skip(1) {
            if ed[k] > 0.0 {
                out.push(SeparationConstraint {
                    left: i,
                    right: j,
                    gap,
                });
            }
        }
    }
    out
}

/// Constraints on the y axis, possibly over extra boundary variables appended after the nodes.
struct VerticalConstraints {
    constraints: Vec<SeparationConstraint>,
    weights: Vec<f64>,
    boundaries: Vec<f64>,
    ext: Vec<f64>,
}

impl VerticalConstraints {
    fn new(
        ctx: &mut LayoutContext,
        graph: &VtxGraph,
        kind: DirectedConstraints,
        gap: f64,
        y: &[f64],
    ) -> Result<Self> {
        let n = graph.len();
        let mut constraints = Vec::new();
        let mut boundaries = Vec::new();
        match kind {
            DirectedConstraints::None => {}
            DirectedConstraints::Edges => constraints = edge_constraints(graph, gap),
            DirectedConstraints::Levels => {
                let h = compute_hierarchy(ctx, graph, LEVELS_ABS_TOL, LEVELS_REL_TOL, None)?;
                let nb = h.boundaries.len();
                for b in 0..nb {
                    let var = n + b;
                    let below = h.level(b);
                    for &node in below {
                        constraints.push(SeparationConstraint {
                            left: node,
                            right: var,
                            gap,
                        });
                    }
                    for &node in h.level(b + 1) {
                        constraints.push(SeparationConstraint {
                            left: var,
                            right: node,
                            gap,
                        });
                    }
                    let top = below.iter().map(|&i| y[i]).fold(f64::NEG_INFINITY, f64::max);
                    boundaries.push(top + gap);
                }
                for b in 1..nb {
                    constraints.push(SeparationConstraint {
                        left: n + b - 1,
                        right: n + b,
                        gap: 0.0,
                    });
                }
            }
        }
        let mut weights = vec![1.0; n];
        weights.resize(n + boundaries.len(), BOUNDARY_WEIGHT);
        Ok(Self {
            constraints,
            weights,
            boundaries,
            ext: Vec::with_capacity(n),
        })
    }

    fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    fn project(&mut self, solver: &mut dyn SeparationSolver, place: &mut [f64]) -> Result<()> {
        self.ext.clear();
        self.ext.extend_from_slice(place);
        self.ext.extend_from_slice(&self.boundaries);
        solver.satisfy(&mut self.ext, &self.weights, &self.constraints)?;
        let (nodes, boundaries) = self.ext.split_at(place.len());
        place.copy_from_slice(nodes);
        self.boundaries.copy_from_slice(boundaries);
        Ok(())
    }

    /// Gradient projection on `min yᵀ L y - 2 bᵀ y`; returns the rounds performed.
    fn solve(
        &mut self,
        solver: &mut dyn SeparationSolver,
        lap: &PackedSymmetric,
        b: &[f64],
        place: &mut [f64],
        max_iterations: usize,
    ) -> Result<usize> {
        if max_iterations == 0 {
            return Ok(0);
        }
        let n = place.len();
        self.project(solver, place)?;
        let mut g = vec![0.0; n];
        let mut old = vec![0.0; n];
        let mut d = vec![0.0; n];
        let mut lv = vec![0.0; n];
        for counter in 0..max_iterations {
            old.copy_from_slice(place);
            lap.mat_vec(place, &mut lv);
            for i in 0..n {
                g[i] = 2.0 * (lv[i] - b[i]);
            }
            lap.mat_vec(&g, &mut lv);
            let denominator = 2.0 * vector::inner_product(&g, &lv);
            let alpha = if denominator != 0.0 {
                vector::inner_product(&g, &g) / denominator
            } else {
                1.0
            };
            vector::axpy(-alpha, &g, place);
            self.project(solver, place)?;

            for i in 0..n {
                d[i] = place[i] - old[i];
            }
            lap.mat_vec(&d, &mut lv);
            let denominator = 2.0 * vector::inner_product(&d, &lv);
            let beta = if denominator != 0.0 {
                -vector::inner_product(&g, &d) / denominator
            } else {
                1.0
            };
            let mut test = 0.0;
            for i in 0..n {
                // Past 1 the step leaves the feasible region.
                if beta > 0.0 && beta < 1.0 {
                    place[i] = old[i] + beta * d[i];
                }
                test += (place[i] - old[i]).abs();
            }
            if test <= QUAD_PROG_TOL {
                return Ok(counter + 1);
            }
        }
        Ok(max_iterations)
    }
}

/// Stress majorization with separation constraints from directed edges on the y axis.
///
/// `opts.directed_constraints` picks the constraints and `opts.edge_gap` their gap; `solver`
/// projects onto them. Without constraints every axis is solved by conjugate gradient.
/// Pinned nodes only fix the starting coordinates.
pub fn stress_majorization_cola(
    ctx: &mut LayoutContext,
    graph: &VtxGraph,
    dim: usize,
    x: &mut [f64],
    opts: &StressOptions,
    solver: &mut dyn SeparationSolver,
) -> Result<StressReport> {
    let n = graph.len();
    ensure_coords(n, dim, x)?;
    if dim < 2 {
        return Err(Error::Unsupported {
            reason: format!("separation constraints need at least two dimensions, got {dim}"),
        });
    }
    let pinned = pinned_mask(n, &opts.pinned)?;
    let mut axes = init_layout(ctx, dim, x, opts.random_start, &pinned);
    let mut report = StressReport::default();
    if n <= 1 || opts.maxiter == 0 {
        write_back(&axes, x);
        return Ok(report);
    }

    let dij = distance_matrix(graph, opts.model)?;
    scale_down(&mut axes);
    for axis in &mut axes {
        vector::orthog1(axis);
    }
    let y0 = axes[1][0];
    for v in &mut axes[1] {
        *v -= y0;
    }

    let system = StressSystem::new(dij);
    let mut vertical =
        VerticalConstraints::new(ctx, graph, opts.directed_constraints, opts.edge_gap, &axes[1])?;
    debug!(n, constraints = vertical.constraints.len(), "separation constraints");
    let free = vec![false; n];
    let mut b = vec![vec![0.0; n]; dim];
    let mut old_stress = f64::MAX;
    while report.iterations < opts.maxiter {
        let stress = system.majorize(&axes, &mut b);
        report.stress.push(stress);
        let converged = stress < old_stress
            && (stress - old_stress).abs() / (old_stress + 1e-10).abs() < opts.epsilon;
        old_stress = stress;
        trace!(iteration = report.iterations, stress, "cola stress iteration");

        for (k, (axis, bk)) in axes.iter_mut().zip(&b).enumerate() {
            if k == 1 && !vertical.is_empty() {
                vertical.solve(solver, system.laplacian(), bk, axis, LOCAL_ITERATIONS)?;
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
        iterations = report.iterations,
        stress = old_stress,
        "separation-constrained stress majorization"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_projection_resolves_a_chain() {
        let constraints = [
            SeparationConstraint {
                left: 0,
                right: 1,
                gap: 1.0,
            },
            SeparationConstraint {
                left: 1,
                right: 2,
                gap: 1.0,
            },
        ];
        let mut place = vec![0.0; 3];
        SweepProjection::default()
            .satisfy(&mut place, &[1.0; 3], &constraints)
            .unwrap();
        for c in &constraints {
            assert!(c.violation(&place) <= 1e-9, "{place:?}");
        }
    }

    #[test]
    fn light_variables_do_the_moving() {
        let c = [SeparationConstraint {
            left: 0,
            right: 1,
            gap: 2.0,
        }];
        let mut place = vec![0.0, 0.0];
        SweepProjection::default()
            .satisfy(&mut place, &[1.0, 1e-6], &c)
            .unwrap();
        assert!(place[0].abs() < 1e-5);
        assert!((place[1] - 2.0).abs() < 1e-5);
    }

    #[test]
    fn gradient_projection_stops_once_settled() {
        let g = VtxGraph::from_directed_edges(2, &[(0, 1)], None).unwrap();
        let mut ctx = LayoutContext::new(1);
        let mut place = vec![1.0, 0.0];
        let mut vertical =
            VerticalConstraints::new(&mut ctx, &g, DirectedConstraints::Edges, 1.0, &place)
                .unwrap();
        let mut lap = PackedSymmetric::zeros(2);
        lap.set(0, 0, 1.0);
        lap.set(1, 1, 1.0);
        lap.set(0, 1, -1.0);
        // Minimizers keep the two nodes 3 apart.
        let b = [3.0, -3.0];
        let mut solver = SweepProjection::default();
        let rounds = vertical
            .solve(&mut solver, &lap, &b, &mut place, LOCAL_ITERATIONS)
            .unwrap();
        assert_eq!(rounds, 2);
        assert!((place[0] - place[1] - 3.0).abs() < 1e-12, "{place:?}");
    }

    #[test]
    fn directed_edges_constrain_tail_above_head() {
        let g = VtxGraph::from_directed_edges(3, &[(0, 1), (2, 1)], None).unwrap();
        let mut c = edge_constraints(&g, 0.5);
        c.sort_by_key(|c| c.right);
        assert_eq!(
            c,
            vec![
                SeparationConstraint {
                    left: 1,
                    right: 0,
                    gap: 0.5
                },
                SeparationConstraint {
                    left: 1,
                    right: 2,
                    gap: 0.5
                },
            ]
        );
    }
}
