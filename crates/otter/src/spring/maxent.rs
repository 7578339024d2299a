//! Stress-driven variants: springs toward target lengths plus an entropy-style repulsion.

use otter_sparse::SparseMatrix;
use tracing::{debug, trace};

use super::SpringElectricalOptions;
use super::force::{
    SpringReport, attraction, cooling_loop, exact_repulsion, move_node, prepare,
    supernode_repulsion,
};
use super::post::beautify_leaves;
use crate::context::LayoutContext;
use crate::error::{Error, Result, ensure_coords};
use crate::geometry::{distance_cropped, point};
use crate::quadtree::{QuadTree, RepulsionParams};

/// Depth of the quadtree used by the stress-driven variants.
const FIXED_QTREE_LEVEL: usize = 10;

/// Target lengths: the stored entries of `D`, or every edge of `A` at length one.
struct Targets<'a> {
    pattern: &'a SparseMatrix<f64>,
    lengths: Option<&'a SparseMatrix<f64>>,
}

impl Targets<'_> {
    fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let m = self.lengths.unwrap_or(self.pattern);
        let unit = self.lengths.is_none();
        m.row(i).map(move |(j, d)| (j, if unit { 1.0 } else { d }))
    }

    fn nnz(&self) -> usize {
        self.lengths.unwrap_or(self.pattern).nnz()
    }

    fn mean(&self) -> f64 {
        match self.lengths {
            Some(d) if d.nnz() > 0 => d.values().iter().sum::<f64>() / d.nnz() as f64,
            _ => 1.0,
        }
    }
}

/// Uniform scale `s` minimizing `sum w_ij (s |x_i - x_j| - d_ij)^2` with `w_ij = 1/d_ij^2`.
fn scale_to_targets(targets: &Targets<'_>, dim: usize, x: &mut [f64]) {
    let n = x.len() / dim;
    let (mut top, mut bottom) = (0.0, 0.0);
    for i in 0..n {
        for (j, d) in targets.row(i) {
            if j == i || d <= 0.0 {
                continue;
            }
            let dist = distance_cropped(x, dim, i, j);
            let w = 1.0 / (d * d);
            top += w * d * dist;
            bottom += w * dist * dist;
        }
    }
    if bottom > 0.0 {
        let s = top / bottom;
        for v in x.iter_mut() {
            *v *= s;
        }
    }
}

/// Stress embedding with entropy repulsion of strength `rho`.
///
/// Minimizes `sum_{ij in D} w_ij (|x_i - x_j| - d_ij)^q` minus `rho` times the repulsion
/// potential over all pairs, with the repulsion between target pairs cancelled. Without `d`
/// every edge of `a` gets target length one. A negative `rho` is rescaled by the density of
/// the target set.
#[allow(clippy::too_many_arguments)]
pub fn spring_maxent_embedding(
    ctx: &mut LayoutContext,
    dim: usize,
    a: &SparseMatrix<f64>,
    d: Option<&SparseMatrix<f64>>,
    opts: &mut SpringElectricalOptions,
    node_weights: Option<&[f64]>,
    x: &mut [f64],
    rho: f64,
) -> Result<SpringReport> {
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
        return Ok(SpringReport::default());
    }
    if let Some(d) = d {
        if d.nrows() != n || d.ncols() != n {
            return Err(otter_sparse::Error::DimensionMismatch {
                op: "maxent distances",
                left: (n, n),
                right: (d.nrows(), d.ncols()),
            }
            .into());
        }
        if let Some(bad) = d.values().iter().find(|&&v| v <= 0.0) {
            return Err(Error::Unsupported {
                reason: format!("target distances must be positive, found {bad}"),
            });
        }
    }

    let a = a.symmetrize(true)?;
    let targets = Targets {
        pattern: &a,
        lengths: d,
    };
    let p = if opts.p >= 0.0 { -1.0 } else { opts.p };
    let mut rho = rho;
    if rho < 0.0 {
        let nz = targets.nnz() as f64;
        let nn = (n * n) as f64;
        rho *= (nz / (nn - nz)) / targets.mean().powf(p + 1.0);
    }

    if opts.random_start {
        ctx.fill_uniform(x);
    }
    scale_to_targets(&targets, dim, x);
    if opts.c < 0.0 {
        opts.c = 0.2;
    }
    opts.p = p;

    let params = RepulsionParams {
        bh: opts.bh,
        p,
        kp: rho,
    };
    let weights = if opts.use_node_weights { node_weights } else { None };
    let use_qt = opts.tscheme != super::QuadTreeScheme::None && n >= opts.quadtree_size;
    let q = opts.q;
    let mut f = vec![0.0; dim];

    let report = cooling_loop(opts, |step| {
        let qt = if use_qt {
            Some(QuadTree::new_from_points(dim, x, weights, FIXED_QTREE_LEVEL)?)
        } else {
            None
        };
        let mut fnorm = 0.0;
        let mut stress = 0.0;
        for i in 0..n {
            f.fill(0.0);
            for (j, dj) in targets.row(i) {
                if j == i {
                    continue;
                }
                let dist = distance_cropped(x, dim, i, j);
                let (xi, xj) = (point(x, dim, i), point(x, dim, j));
                let pull = if q == 2.0 {
                    (dist - dj) * (dist - dj) / (dj * dj * dj)
                } else if q == 1.0 {
                    (dist - dj) / (dj * dj)
                } else {
                    (dist - dj).powf(q) / dj.powf(q + 1.0)
                };
                let cancel = params.magnitude(weights.map_or(1.0, |w| w[j]), dist);
                for k in 0..dim {
                    let delta = xi[k] - xj[k];
                    f[k] -= pull * delta / dist + cancel * delta;
                }
                stress += (dist - dj) * (dist - dj) / (dj * dj);
            }
            match &qt {
                Some(qt) => {
                    supernode_repulsion(qt, x, dim, i, &params, &mut f);
                }
                None => exact_repulsion(x, dim, i, weights, &params, &mut f),
            }
            fnorm += move_node(x, dim, i, &mut f, step);
        }
        trace!(stress = stress / a.nnz().max(1) as f64, "maxent stress");
        Ok(fnorm)
    })?;

    if opts.beautify_leaves && dim == 2 {
        beautify_leaves(&a, x);
    }
    debug!(n, rho, iterations = report.iterations, "maxent embedding");
    Ok(report)
}

/// Spring-electrical forces plus springs pulling every `d` pair toward its target length.
pub fn spring_electrical_spring_embedding(
    ctx: &mut LayoutContext,
    dim: usize,
    a: &SparseMatrix<f64>,
    d: &SparseMatrix<f64>,
    opts: &mut SpringElectricalOptions,
    node_weights: Option<&[f64]>,
    x: &mut [f64],
) -> Result<SpringReport> {
    if d.nrows() != a.nrows() || d.ncols() != a.ncols() {
        return Err(otter_sparse::Error::DimensionMismatch {
            op: "spring distances",
            left: (a.nrows(), a.ncols()),
            right: (d.nrows(), d.ncols()),
        }
        .into());
    }
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
    let spring = 0.2 * prep.crk;
    let mut f = vec![0.0; dim];

    let report = cooling_loop(opts, |step| {
        let qt = if use_qt {
            Some(QuadTree::new_from_points(dim, x, weights, FIXED_QTREE_LEVEL)?)
        } else {
            None
        };
        let mut fnorm = 0.0;
        for i in 0..n {
            f.fill(0.0);
            attraction(&prep.a, x, dim, prep.crk, i, &mut f);
            for (j, dj) in d.row(i) {
                if j == i {
                    continue;
                }
                let dist = distance_cropped(x, dim, i, j);
                let s = spring * (dist - dj) * (dist - dj) / dist;
                let s = if dist < dj { s } else { -s };
                let (xi, xj) = (point(x, dim, i), point(x, dim, j));
                for k in 0..dim {
                    f[k] += s * (xi[k] - xj[k]);
                }
            }
            match &qt {
                Some(qt) => {
                    supernode_repulsion(qt, x, dim, i, &params, &mut f);
                }
                None => exact_repulsion(x, dim, i, weights, &params, &mut f),
            }
            fnorm += move_node(x, dim, i, &mut f, step);
        }
        Ok(fnorm)
    })?;

    if opts.beautify_leaves && dim == 2 {
        beautify_leaves(&prep.a, x);
    }
    debug!(n, iterations = report.iterations, "spring-electrical-spring embedding");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use otter_sparse::SumRepeated;

    #[test]
    fn rescaling_matches_unit_targets() {
        let a = SparseMatrix::from_coordinate_arrays(
            2,
            2,
            &[0, 1],
            &[1, 0],
            &[1.0, 1.0],
            SumRepeated::All,
        )
        .unwrap();
        let targets = Targets {
            pattern: &a,
            lengths: None,
        };
        let mut x = vec![0.0, 0.0, 3.0, 4.0];
        scale_to_targets(&targets, 2, &mut x);
        assert!((x[2] - 0.6).abs() < 1e-12);
        assert!((x[3] - 0.8).abs() < 1e-12);
    }
}
