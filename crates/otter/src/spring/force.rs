//! Force-directed embeddings: attraction along edges, repulsion between every pair of nodes.

use otter_sparse::SparseMatrix;
use tracing::{debug, trace};

use super::SpringElectricalOptions;
use super::post::beautify_leaves;
use crate::context::LayoutContext;
use crate::error::{Result, ensure_coords};
use crate::geometry::{MINDIST, distance, distance_cropped, node_distance, point};
use crate::quadtree::{QuadTree, RepulsionParams};

/// Deepest quadtree the level optimizer will try.
pub const MAX_QTREE_LEVEL: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Init,
    Up,
    Down,
}

/// Hill climber over the quadtree depth, fed with the cost of each iteration.
#[derive(Debug, Clone)]
pub struct OnedOptimizer {
    i: usize,
    direction: Direction,
    work: [f64; MAX_QTREE_LEVEL + 1],
}

impl OnedOptimizer {
    pub fn new(start: usize) -> Self {
        Self {
            i: start.min(MAX_QTREE_LEVEL),
            direction: Direction::Init,
            work: [0.0; MAX_QTREE_LEVEL + 1],
        }
    }

    pub fn get(&self) -> usize {
        self.i
    }

    /// Records the cost of running at the current level and picks the next level to try.
    pub fn train(&mut self, work: f64) {
        let i = self.i;
        self.work[i] = work;
        match self.direction {
            Direction::Init => {
                if i == MAX_QTREE_LEVEL {
                    self.direction = Direction::Down;
                    self.i = i - 1;
                } else {
                    self.direction = Direction::Up;
                    self.i = (i + 1).min(MAX_QTREE_LEVEL);
                }
            }
            Direction::Up => {
                if i > 0 && self.work[i] < self.work[i - 1] && i < MAX_QTREE_LEVEL {
                    self.i = i + 1;
                } else {
                    self.i = i.saturating_sub(1);
                    self.direction = Direction::Down;
                }
            }
            Direction::Down => {
                if i < MAX_QTREE_LEVEL && self.work[i] < self.work[i + 1] && i > 0 {
                    self.i = i - 1;
                } else {
                    self.i = (i + 1).min(MAX_QTREE_LEVEL);
                    self.direction = Direction::Up;
                }
            }
        }
    }
}

/// Next step length. Without adaptive cooling the step just shrinks by `cool`; otherwise it
/// shrinks when the total force grew, holds when it fell slightly, and grows when it fell a lot.
pub fn update_step(adaptive_cooling: bool, step: f64, fnorm: f64, fnorm0: f64, cool: f64) -> f64 {
    if !adaptive_cooling || fnorm >= fnorm0 {
        cool * step
    } else if fnorm > 0.95 * fnorm0 {
        step
    } else {
        0.99 * step / cool
    }
}

/// Mean length over all stored entries of `a`; 1 for a graph without edges.
pub fn average_edge_length(a: &SparseMatrix<f64>, dim: usize, x: &[f64]) -> f64 {
    if a.nnz() == 0 {
        return 1.0;
    }
    let total: f64 = a
        .triplets()
        .map(|(i, j, _)| node_distance(x, dim, i, j))
        .sum();
    total / a.nnz() as f64
}

/// Outcome of one embedding run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpringReport {
    pub iterations: usize,
    /// Step length when the loop stopped.
    pub step: f64,
    /// Sum of per-node force magnitudes in the last iteration.
    pub fnorm: f64,
}

/// Graph and force constants shared by every variant.
pub(crate) struct Prepared {
    pub(crate) a: SparseMatrix<f64>,
    pub(crate) p: f64,
    pub(crate) kp: f64,
    pub(crate) crk: f64,
}

/// Symmetrizes the pattern, seeds random coordinates and resolves `K`, `C` and `p`, writing
/// the resolved values back into `opts`. `None` for an empty problem.
pub(crate) fn prepare(
    ctx: &mut LayoutContext,
    dim: usize,
    a: &SparseMatrix<f64>,
    opts: &mut SpringElectricalOptions,
    x: &mut [f64],
) -> Result<Option<Prepared>> {
    if !a.is_square() {
        return Err(otter_sparse::Error::NotSquare {
            rows: a.nrows(),
            cols: a.ncols(),
        }
        .into());
    }
    let n = a.nrows();
    ensure_coords(n, dim, x)?;
    if n == 0 {
        return Ok(None);
    }
    let a = a.symmetrize(true)?;
    if opts.random_start {
        ctx.fill_uniform(x);
    }
    if opts.k < 0.0 {
        opts.k = average_edge_length(&a, dim, x);
    }
    if opts.c < 0.0 {
        opts.c = 0.2;
    }
    if opts.p >= 0.0 {
        opts.p = -1.0;
    }
    let p = opts.p;
    Ok(Some(Prepared {
        a,
        p,
        kp: opts.k.powf(1.0 - p),
        crk: opts.c.powf((2.0 - p) / 3.0) / opts.k,
    }))
}

/// Adds `-CRK |x_i - x_j| (x_i - x_j)` for every neighbour `j` of `i`.
pub(crate) fn attraction(a: &SparseMatrix<f64>, x: &[f64], dim: usize, crk: f64, i: usize, f: &mut [f64]) {
    let xi = point(x, dim, i);
    for &j in a.row_indices(i) {
        if j == i {
            continue;
        }
        let xj = point(x, dim, j);
        let dist = distance(xi, xj);
        for k in 0..dim {
            f[k] -= crk * (xi[k] - xj[k]) * dist;
        }
    }
}

/// Exact repulsion on `i` from every other node.
pub(crate) fn exact_repulsion(
    x: &[f64],
    dim: usize,
    i: usize,
    weights: Option<&[f64]>,
    params: &RepulsionParams,
    f: &mut [f64],
) {
    let n = x.len() / dim;
    let xi = point(x, dim, i);
    for j in 0..n {
        if j == i {
            continue;
        }
        let dist = distance_cropped(x, dim, i, j);
        let w = weights.map_or(1.0, |w| w[j]);
        let s = params.magnitude(w, dist);
        let xj = point(x, dim, j);
        for k in 0..dim {
            f[k] += s * (xi[k] - xj[k]);
        }
    }
}

/// Barnes-Hut repulsion on `i`. Returns the number of supernodes and the cells visited.
pub(crate) fn supernode_repulsion(
    qt: &QuadTree,
    x: &[f64],
    dim: usize,
    i: usize,
    params: &RepulsionParams,
    f: &mut [f64],
) -> (usize, usize) {
    let xi = point(x, dim, i);
    let sn = qt.supernodes(params.bh, xi, Some(i));
    for (j, (&w, &d)) in sn.weights.iter().zip(&sn.distances).enumerate() {
        let s = params.magnitude(w, d.max(MINDIST));
        let c = point(&sn.centers, dim, j);
        for k in 0..dim {
            f[k] += s * (xi[k] - c[k]);
        }
    }
    (sn.len(), sn.visits)
}

/// Normalizes `f`, moves node `i` by `step` along it and returns the force magnitude.
pub(crate) fn move_node(x: &mut [f64], dim: usize, i: usize, f: &mut [f64], step: f64) -> f64 {
    let norm = f.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for v in f.iter_mut() {
            *v /= norm;
        }
    }
    for (xk, fk) in x[i * dim..(i + 1) * dim].iter_mut().zip(f.iter()) {
        *xk += step * fk;
    }
    norm
}

/// Shared outer loop: `iterate(step)` runs one sweep and returns its force norm.
pub(crate) fn cooling_loop(
    opts: &SpringElectricalOptions,
    mut iterate: impl FnMut(f64) -> Result<f64>,
) -> Result<SpringReport> {
    let mut step = opts.step;
    let mut fnorm = 0.0;
    let mut iterations = 0;
    loop {
        iterations += 1;
        let fnorm0 = fnorm;
        fnorm = iterate(step)?;
        step = update_step(opts.adaptive_cooling, step, fnorm, fnorm0, opts.cool);
        trace!(iter = iterations, step, fnorm, "spring iteration");
        if !(step > opts.tol && iterations < opts.maxiter) {
            break;
        }
    }
    Ok(SpringReport {
        iterations,
        step,
        fnorm,
    })
}

fn finish(dim: usize, a: &SparseMatrix<f64>, opts: &SpringElectricalOptions, x: &mut [f64]) {
    if opts.beautify_leaves && dim == 2 {
        beautify_leaves(a, x);
    }
}

/// Barnes-Hut repulsion for all nodes at once, then a simultaneous move.
///
/// The quadtree depth is re-tuned every iteration; the last depth used is written back to
/// `opts.max_qtree_level`.
pub fn spring_electrical_embedding_fast(
    ctx: &mut LayoutContext,
    dim: usize,
    a: &SparseMatrix<f64>,
    opts: &mut SpringElectricalOptions,
    node_weights: Option<&[f64]>,
    x: &mut [f64],
) -> Result<SpringReport> {
    let Some(prep) = prepare(ctx, dim, a, opts, x)? else {
        return Ok(SpringReport::default());
    };
    let n = prep.a.nrows();
    let params = RepulsionParams {
        bh: opts.bh,
        p: prep.p,
        kp: prep.kp,
    };
    let weights = if opts.use_node_weights { node_weights } else { None };
    let mut optimizer = OnedOptimizer::new(opts.max_qtree_level);
    let mut max_level = optimizer.get();

    let report = cooling_loop(opts, |step| {
        max_level = optimizer.get();
        let qt = QuadTree::new_from_points(dim, x, weights, max_level)?;
        let (mut force, counts) = qt.repulsive_force(params);
        for i in 0..n {
            attraction(&prep.a, x, dim, prep.crk, i, &mut force[i * dim..(i + 1) * dim]);
        }
        let mut fnorm = 0.0;
        for (i, f) in force.chunks_exact_mut(dim).enumerate() {
            fnorm += move_node(x, dim, i, f, step);
        }
        optimizer.train(counts.cell_cell + 0.85 * counts.point_point + 3.3 * counts.cells);
        Ok(fnorm)
    })?;

    opts.max_qtree_level = max_level;
    finish(dim, &prep.a, opts, x);
    debug!(n, iterations = report.iterations, max_level, "fast spring embedding");
    Ok(report)
}

/// Exact `O(n^2)` repulsion with a simultaneous move. Used as the reference for the
/// approximate variants.
pub fn spring_electrical_embedding_slow(
    ctx: &mut LayoutContext,
    dim: usize,
    a: &SparseMatrix<f64>,
    opts: &mut SpringElectricalOptions,
    node_weights: Option<&[f64]>,
    x: &mut [f64],
) -> Result<SpringReport> {
    let Some(prep) = prepare(ctx, dim, a, opts, x)? else {
        return Ok(SpringReport::default());
    };
    let n = prep.a.nrows();
    let params = RepulsionParams {
        bh: opts.bh,
        p: prep.p,
        kp: prep.kp,
    };
    let weights = if opts.use_node_weights { node_weights } else { None };
    let mut force = vec![0.0; n * dim];

    let report = cooling_loop(opts, |step| {
        force.fill(0.0);
        for (i, f) in force.chunks_exact_mut(dim).enumerate() {
            exact_repulsion(x, dim, i, weights, &params, f);
            attraction(&prep.a, x, dim, prep.crk, i, f);
        }
        let mut fnorm = 0.0;
        for (i, f) in force.chunks_exact_mut(dim).enumerate() {
            fnorm += move_node(x, dim, i, f, step);
        }
        Ok(fnorm)
    })?;

    finish(dim, &prep.a, opts, x);
    debug!(n, iterations = report.iterations, "exact spring embedding");
    Ok(report)
}

/// Node-by-node update: each node moves as soon as its force is known.
///
/// Graphs with at least `opts.quadtree_size` nodes take repulsion from per-node supernode
/// queries against a quadtree rebuilt every iteration.
pub fn spring_electrical_embedding(
    ctx: &mut LayoutContext,
    dim: usize,
    a: &SparseMatrix<f64>,
    opts: &mut SpringElectricalOptions,
    node_weights: Option<&[f64]>,
    x: &mut [f64],
) -> Result<SpringReport> {
    let Some(prep) = prepare(ctx, dim, a, opts, x)? else {
        return Ok(SpringReport::default());
    };
    let n = prep.a.nrows();
    let params = RepulsionParams {
        bh: opts.bh,
        p: prep.p,
        kp: prep.kp,
    };
    let weights = if opts.use_node_weights { node_weights } else { None };
    let use_qt = n >= opts.quadtree_size;
    let mut optimizer = OnedOptimizer::new(opts.max_qtree_level);
    let mut max_level = opts.max_qtree_level;
    let mut f = vec![0.0; dim];

    let report = cooling_loop(opts, |step| {
        let qt = if use_qt {
            max_level = optimizer.get();
            Some(QuadTree::new_from_points(dim, x, weights, max_level)?)
        } else {
            None
        };
        let (mut nsuper, mut visits) = (0usize, 0usize);
        let mut fnorm = 0.0;
        for i in 0..n {
            f.fill(0.0);
            attraction(&prep.a, x, dim, prep.crk, i, &mut f);
            match &qt {
                Some(qt) => {
                    let (s, v) = supernode_repulsion(qt, x, dim, i, &params, &mut f);
                    nsuper += s;
                    visits += v;
                }
                None => exact_repulsion(x, dim, i, weights, &params, &mut f),
            }
            fnorm += move_node(x, dim, i, &mut f, step);
        }
        if qt.is_some() {
            optimizer.train(5.0 * nsuper as f64 / n as f64 + visits as f64 / n as f64);
        }
        Ok(fnorm)
    })?;

    if use_qt {
        opts.max_qtree_level = max_level;
    }
    finish(dim, &prep.a, opts, x);
    debug!(n, iterations = report.iterations, use_qt, "spring embedding");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimizer_climbs_while_work_drops() {
        let mut opt = OnedOptimizer::new(10);
        opt.train(100.0);
        assert_eq!(opt.get(), 11);
        opt.train(90.0);
        assert_eq!(opt.get(), 12);
        opt.train(95.0);
        assert_eq!(opt.get(), 11);
        opt.train(80.0);
        assert_eq!(opt.get(), 10);
    }

    #[test]
    fn optimizer_starting_at_the_cap_goes_down() {
        let mut opt = OnedOptimizer::new(MAX_QTREE_LEVEL);
        opt.train(1.0);
        assert_eq!(opt.get(), MAX_QTREE_LEVEL - 1);
    }

    #[test]
    fn step_schedule() {
        assert_eq!(update_step(false, 1.0, 1.0, 2.0, 0.9), 0.9);
        assert_eq!(update_step(true, 1.0, 3.0, 2.0, 0.9), 0.9);
        assert_eq!(update_step(true, 1.0, 1.96, 2.0, 0.9), 1.0);
        assert!((update_step(true, 0.9, 1.0, 2.0, 0.9) - 0.99).abs() < 1e-12);
    }
}
