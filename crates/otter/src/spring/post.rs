//! Helpers around the embeddings: level transfer, rotation, leaf fan-out and edge-label nodes.

use std::f64::consts::PI;

use otter_sparse::{SparseMatrix, SumRepeated};

use crate::context::LayoutContext;
use crate::error::{Error, Result};
use crate::geometry::{centroid, node_distance, point, translate};
use crate::multilevel::CoarsenScheme;

/// Moves every node halfway toward the mean of its neighbours, in node order and in place.
pub fn interpolate_coord(a: &SparseMatrix<f64>, dim: usize, x: &mut [f64]) {
    let mut y = vec![0.0; dim];
    for i in 0..a.nrows() {
        y.fill(0.0);
        let mut nz = 0;
        for &j in a.row_indices(i) {
            if j == i {
                continue;
            }
            nz += 1;
            for (yk, xk) in y.iter_mut().zip(point(x, dim, j)) {
                *yk += xk;
            }
        }
        if nz > 0 {
            let beta = 0.5 / nz as f64;
            for k in 0..dim {
                x[i * dim + k] = 0.5 * x[i * dim + k] + beta * y[k];
            }
        }
    }
}

/// Carries coarse coordinates `xc` to the finer level: `P xc`, then for edge-based coarsening
/// a smoothing pass over the fine graph `a` and a jitter of `delta` on every fine node but the
/// first of each aggregate, so merged nodes do not coincide.
#[allow(clippy::too_many_arguments)]
pub fn prolongate(
    ctx: &mut LayoutContext,
    dim: usize,
    a: &SparseMatrix<f64>,
    p: &SparseMatrix<f64>,
    r: &SparseMatrix<f64>,
    xc: &[f64],
    scheme_used: CoarsenScheme,
    delta: f64,
) -> Result<Vec<f64>> {
    let mut y = p.multiply_dense(false, xc, false, dim, false)?;
    if scheme_used.is_edge_based() {
        interpolate_coord(a, dim, &mut y);
        for c in 0..r.nrows() {
            for &i in r.row_indices(c).iter().skip(1) {
                for k in 0..dim {
                    y[i * dim + k] += delta * (ctx.uniform() - 0.5);
                }
            }
        }
    }
    Ok(y)
}

/// Heuristic check for a heavy-tailed degree distribution: degree-one nodes are the most
/// common degree (within 80% of the mode) and make up over 30% of the graph.
pub fn power_law_graph(a: &SparseMatrix<f64>) -> bool {
    let m = a.nrows();
    let mut histogram = vec![0usize; m + 1];
    for i in 0..m {
        let deg = a.row_indices(i).iter().filter(|&&j| j != i).count();
        histogram[deg] += 1;
    }
    let max = histogram.iter().copied().max().unwrap_or(0);
    let ones = histogram.get(1).copied().unwrap_or(0) as f64;
    ones > 0.8 * max as f64 && ones > 0.3 * m as f64
}

/// Angle of `x_j - x_i` in `[0, 2pi)`.
pub fn get_angle(x: &[f64], dim: usize, i: usize, j: usize) -> f64 {
    let y0 = x[j * dim] - x[i * dim];
    let y1 = x[j * dim + 1] - x[i * dim + 1];
    if y0.abs() <= y1.abs() * 1e-5 {
        return if y1 > 0.0 { 0.5 * PI } else { 1.5 * PI };
    }
    let res = (y1 / y0).atan();
    if y0 > 0.0 {
        if y1 < 0.0 { 2.0 * PI + res } else { res }
    } else {
        res + PI
    }
}

fn recenter(dim: usize, x: &mut [f64]) {
    let c: Vec<f64> = centroid(x, dim).iter().map(|v| -v).collect();
    translate(x, dim, &c);
}

fn apply_axis(dim: usize, x: &mut [f64], axis: [f64; 2]) {
    for pt in x.chunks_exact_mut(dim) {
        let x0 = pt[0] * axis[0] + pt[1] * axis[1];
        let x1 = -pt[0] * axis[1] + pt[1] * axis[0];
        pt[0] = x0;
        pt[1] = x1;
    }
}

/// Centers a 2D layout and turns its principal axis onto the x axis.
pub fn pcp_rotate(dim: usize, x: &mut [f64]) -> Result<()> {
    if dim != 2 {
        return Err(Error::InvalidDimension { dim });
    }
    if x.is_empty() {
        return Ok(());
    }
    recenter(dim, x);
    let mut y = [0.0; 4];
    for pt in x.chunks_exact(dim) {
        for k in 0..2 {
            for l in 0..2 {
                y[2 * k + l] += pt[k] * pt[l];
            }
        }
    }
    let mut axis = if y[1] == 0.0 {
        [0.0, 1.0]
    } else {
        let root = (y[0] * y[0] + 4.0 * y[1] * y[1] - 2.0 * y[0] * y[3] + y[3] * y[3]).sqrt();
        [-(-y[0] + y[3] - root) / (2.0 * y[1]), 1.0]
    };
    let len = (1.0 + axis[0] * axis[0]).sqrt();
    axis[0] /= len;
    axis[1] /= len;
    apply_axis(dim, x, axis);
    Ok(())
}

/// Centers a 2D layout and rotates it counterclockwise by `degrees`.
pub fn rotate(dim: usize, x: &mut [f64], degrees: f64) -> Result<()> {
    if dim != 2 {
        return Err(Error::InvalidDimension { dim });
    }
    if x.is_empty() {
        return Ok(());
    }
    recenter(dim, x);
    let angle = (-degrees).to_radians();
    apply_axis(dim, x, [angle.cos(), angle.sin()]);
    Ok(())
}

/// Fans the leaves of each node out evenly across the widest angular gap left by its other
/// neighbours, at their mean distance. 2D only; `a` must have no diagonal.
pub fn beautify_leaves(a: &SparseMatrix<f64>, x: &mut [f64]) {
    const DIM: usize = 2;
    let m = a.nrows();
    let mut checked = vec![false; m];
    let mut leaves = Vec::new();
    let mut angles = Vec::new();

    for i in 0..m {
        if a.degree(i) != 1 || checked[i] {
            continue;
        }
        let p = a.row_indices(i)[0];
        if checked[p] {
            continue;
        }
        checked[p] = true;
        leaves.clear();
        angles.clear();
        let mut dist = 0.0;
        for &j in a.row_indices(p) {
            if a.degree(j) == 1 {
                checked[j] = true;
                dist += node_distance(x, DIM, p, j);
                leaves.push(j);
            } else {
                angles.push(get_angle(x, DIM, p, j));
            }
        }
        if leaves.is_empty() {
            continue;
        }
        dist /= leaves.len() as f64;

        let (mut ang1, mut ang2, maxang) = if angles.is_empty() {
            (0.0, 2.0 * PI, 2.0 * PI)
        } else {
            angles.sort_by(f64::total_cmp);
            let last = angles[angles.len() - 1];
            let mut best = (last, 2.0 * PI + angles[0], 2.0 * PI + angles[0] - last);
            for w in angles.windows(2) {
                if w[1] - w[0] > best.2 {
                    best = (w[0], w[1], w[1] - w[0]);
                }
            }
            best
        };
        let pad = (maxang - PI * 0.166667 * (leaves.len() - 1) as f64).max(0.0) * 0.5;
        ang1 += pad * 0.95;
        ang2 -= pad * 0.95;

        let step = if leaves.len() > 1 {
            (ang2 - ang1) / (leaves.len() - 1) as f64
        } else {
            0.0
        };
        let (px, py) = (x[p * DIM], x[p * DIM + 1]);
        for &leaf in &leaves {
            x[leaf * DIM] = px + ang1.cos() * dist;
            x[leaf * DIM + 1] = py + ang1.sin() * dist;
            ang1 += step;
        }
    }
}

fn label_mask(n: usize, edge_label_nodes: &[usize]) -> Result<(Vec<Option<usize>>, usize)> {
    let mut is_label = vec![false; n];
    for &l in edge_label_nodes {
        if l >= n {
            return Err(otter_sparse::Error::IndexOutOfRange {
                row: l,
                col: 0,
                rows: n,
                cols: 1,
            }
            .into());
        }
        is_label[l] = true;
    }
    let mut next = 0;
    let mask = is_label
        .iter()
        .map(|&label| {
            (!label).then(|| {
                next += 1;
                next - 1
            })
        })
        .collect();
    Ok((mask, next))
}

/// Graph over the non-label nodes in which every label node is bypassed: an edge through a
/// label node joins its two ends directly. Nodes are renumbered in order.
pub fn shorting_edge_label_nodes(
    a: &SparseMatrix<f64>,
    edge_label_nodes: &[usize],
) -> Result<SparseMatrix<f64>> {
    let (mask, kept) = label_mask(a.nrows(), edge_label_nodes)?;
    let mut irn = Vec::new();
    let mut jcn = Vec::new();
    for i in 0..a.nrows() {
        let Some(mi) = mask[i] else { continue };
        for &j in a.row_indices(i) {
            if let Some(mj) = mask[j] {
                irn.push(mi);
                jcn.push(mj);
                continue;
            }
            for &k in a.row_indices(j) {
                if k == i {
                    continue;
                }
                if let Some(mk) = mask[k] {
                    irn.push(mi);
                    jcn.push(mk);
                }
            }
        }
    }
    let val = vec![1.0; irn.len()];
    let mut b = SparseMatrix::from_coordinate_arrays(kept, kept, &irn, &jcn, &val, SumRepeated::All)?;
    b.apply_fun(|_| 1.0);
    Ok(b)
}

/// Copies the layout `x2` of the shorted graph back and puts every label node at the mean of
/// its neighbours.
pub fn attach_edge_label_coordinates(
    dim: usize,
    a: &SparseMatrix<f64>,
    edge_label_nodes: &[usize],
    x: &mut [f64],
    x2: &[f64],
) -> Result<()> {
    let (mask, _) = label_mask(a.nrows(), edge_label_nodes)?;
    for (i, m) in mask.iter().enumerate() {
        if let Some(m) = m {
            x[i * dim..(i + 1) * dim].copy_from_slice(point(x2, dim, *m));
        }
    }
    for &l in edge_label_nodes {
        let nbrs = a.row_indices(l);
        let mut mean = vec![0.0; dim];
        for &j in nbrs {
            for (mk, xk) in mean.iter_mut().zip(point(x, dim, j)) {
                *mk += xk;
            }
        }
        let len = nbrs.len().max(1) as f64;
        for (k, mk) in mean.into_iter().enumerate() {
            x[l * dim + k] = mk / len;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn undirected(n: usize, edges: &[(usize, usize)]) -> SparseMatrix<f64> {
        let mut irn = Vec::new();
        let mut jcn = Vec::new();
        for &(i, j) in edges {
            irn.extend([i, j]);
            jcn.extend([j, i]);
        }
        let val = vec![1.0; irn.len()];
        SparseMatrix::from_coordinate_arrays(n, n, &irn, &jcn, &val, SumRepeated::All).unwrap()
    }

    #[test]
    fn angles_cover_all_quadrants() {
        let x = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, -1.0, 0.0, 0.0, -1.0, 1.0, -1.0];
        assert_eq!(get_angle(&x, 2, 0, 1), 0.0);
        assert_eq!(get_angle(&x, 2, 0, 2), 0.5 * PI);
        assert!((get_angle(&x, 2, 0, 3) - PI).abs() < 1e-12);
        assert_eq!(get_angle(&x, 2, 0, 4), 1.5 * PI);
        assert!((get_angle(&x, 2, 0, 5) - 1.75 * PI).abs() < 1e-12);
    }

    #[test]
    fn principal_axis_ends_up_horizontal() {
        let mut x: Vec<f64> = (0..10).flat_map(|i| [i as f64, i as f64]).collect();
        pcp_rotate(2, &mut x).unwrap();
        for pt in x.chunks_exact(2) {
            assert!(pt[1].abs() < 1e-9);
        }
        assert!(rotate(3, &mut [0.0; 3], 10.0).is_err());
    }

    #[test]
    fn quarter_turn_is_exact() {
        let mut x = vec![1.0, 0.0, -1.0, 0.0, 0.0, 2.0, 0.0, -2.0];
        rotate(2, &mut x, 90.0).unwrap();
        let want = [0.0, 1.0, 0.0, -1.0, -2.0, 0.0, 2.0, 0.0];
        for (a, b) in x.iter().zip(want) {
            assert!((a - b).abs() < 1e-12, "{x:?}");
        }

        let mut y = vec![3.0, 1.0, -3.0, -1.0];
        rotate(2, &mut y, 180.0).unwrap();
        for (a, b) in y.iter().zip([-3.0, -1.0, 3.0, 1.0]) {
            assert!((a - b).abs() < 1e-12, "{y:?}");
        }
    }

    #[test]
    fn star_leaves_spread_around_the_hub() {
        let a = undirected(4, &[(0, 1), (0, 2), (0, 3)]);
        let mut x = vec![0.0, 0.0, 1.0, 0.0, 1.0, 0.1, 1.0, -0.1];
        beautify_leaves(&a, &mut x);
        for leaf in 1..4 {
            assert!((node_distance(&x, 2, 0, leaf) - node_distance(&x, 2, 0, 1)).abs() < 1e-9);
        }
        assert!(node_distance(&x, 2, 1, 2) > 0.5);
    }

    #[test]
    fn label_nodes_are_shorted_and_reattached() {
        // 0 - 2 - 1 where 2 labels the edge between 0 and 1.
        let a = undirected(3, &[(0, 2), (2, 1)]);
        let b = shorting_edge_label_nodes(&a, &[2]).unwrap();
        assert_eq!(b.nrows(), 2);
        assert_eq!(b.get(0, 1), Some(1.0));
        assert_eq!(b.get(1, 0), Some(1.0));

        let mut x = vec![0.0; 6];
        attach_edge_label_coordinates(2, &a, &[2], &mut x, &[0.0, 0.0, 2.0, 4.0]).unwrap();
        assert_eq!(&x[4..6], &[1.0, 2.0]);
    }

    #[test]
    fn star_is_power_law_but_cycle_is_not() {
        let star = undirected(6, &[(0, 1), (0, 2), (0, 3), (0, 4), (0, 5)]);
        assert!(power_law_graph(&star));
        let cycle = undirected(4, &[(0, 1), (1, 2), (2, 3), (3, 0)]);
        assert!(!power_law_graph(&cycle));
    }
}
