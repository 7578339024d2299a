//! Small coordinate helpers over flat `n x dim` arrays.

/// Floor applied to pairwise distances before they are divided by.
pub const MINDIST: f64 = 1e-15;

pub fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(p, q)| (p - q) * (p - q))
        .sum::<f64>()
        .sqrt()
}

#[inline]
pub fn point(x: &[f64], dim: usize, i: usize) -> &[f64] {
    &x[i * dim..(i + 1) * dim]
}

pub fn node_distance(x: &[f64], dim: usize, i: usize, j: usize) -> f64 {
    distance(point(x, dim, i), point(x, dim, j))
}

pub fn distance_cropped(x: &[f64], dim: usize, i: usize, j: usize) -> f64 {
    node_distance(x, dim, i, j).max(MINDIST)
}

/// Mean of all points.
pub fn centroid(x: &[f64], dim: usize) -> Vec<f64> {
    let n = x.len() / dim;
    let mut c = vec![0.0; dim];
    if n == 0 {
        return c;
    }
    for p in x.chunks_exact(dim) {
        for (ck, pk) in c.iter_mut().zip(p) {
            *ck += pk;
        }
    }
    for ck in &mut c {
        *ck /= n as f64;
    }
    c
}

/// Per-axis `(min, max)` over all points.
pub fn bounding_box(x: &[f64], dim: usize) -> Vec<(f64, f64)> {
    let mut bb = vec![(f64::INFINITY, f64::NEG_INFINITY); dim];
    for p in x.chunks_exact(dim) {
        for (b, &v) in bb.iter_mut().zip(p) {
            b.0 = b.0.min(v);
            b.1 = b.1.max(v);
        }
    }
    bb
}

pub fn translate(x: &mut [f64], dim: usize, offset: &[f64]) {
    for p in x.chunks_exact_mut(dim) {
        for (v, o) in p.iter_mut().zip(offset) {
            *v += o;
        }
    }
}
