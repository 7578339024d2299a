//! Dense vector helpers shared by the iterative solvers.

pub fn inner_product(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn norm(a: &[f64]) -> f64 {
    inner_product(a, a).sqrt()
}

pub fn max_abs(a: &[f64]) -> f64 {
    a.iter().fold(0.0, |m, &x| m.max(x.abs()))
}

/// Removes the component along the all-ones vector (subtracts the mean).
pub fn orthog1(a: &mut [f64]) {
    if a.is_empty() {
        return;
    }
    let mean = a.iter().sum::<f64>() / a.len() as f64;
    for x in a {
        *x -= mean;
    }
}

/// Removes the component of `a` along the unit vector `u`.
pub fn orthogonalize_against(a: &mut [f64], u: &[f64]) {
    let alpha = inner_product(a, u);
    axpy(-alpha, u, a);
}

pub fn scale(a: &mut [f64], s: f64) {
    for x in a {
        *x *= s;
    }
}

/// `y += alpha * x`
pub fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

/// Scales `a` to unit length and returns the previous norm; a zero vector is left alone.
pub fn normalize(a: &mut [f64]) -> f64 {
    let n = norm(a);
    if n > 0.0 {
        scale(a, 1.0 / n);
    }
    n
}

/// Squares every entry.
pub fn square_vec(a: &mut [f64]) {
    for x in a {
        *x *= *x;
    }
}

/// Replaces every non-zero entry by its reciprocal.
pub fn invert_vec(a: &mut [f64]) {
    for x in a {
        if *x != 0.0 {
            *x = 1.0 / *x;
        }
    }
}

/// Replaces every positive entry by `1 / sqrt(x)`.
pub fn invert_sqrt_vec(a: &mut [f64]) {
    for x in a {
        if *x > 0.0 {
            *x = 1.0 / x.sqrt();
        }
    }
}

/// Euclidean distance between points `i` and `j` of a row-major `n x dim` coordinate block.
pub fn point_distance(x: &[f64], dim: usize, i: usize, j: usize) -> f64 {
    let (a, b) = (&x[i * dim..(i + 1) * dim], &x[j * dim..(j + 1) * dim]);
    a.iter()
        .zip(b)
        .map(|(p, q)| (p - q) * (p - q))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orthog1_centres_the_vector() {
        let mut v = vec![1.0, 2.0, 3.0, 6.0];
        orthog1(&mut v);
        assert_eq!(v, vec![-2.0, -1.0, 0.0, 3.0]);
        assert_eq!(max_abs(&v), 3.0);
    }

    #[test]
    fn normalize_reports_the_old_length() {
        let mut v = vec![3.0, 4.0];
        assert_eq!(normalize(&mut v), 5.0);
        assert!((norm(&v) - 1.0).abs() < 1e-12);
        let mut zero = vec![0.0; 3];
        assert_eq!(normalize(&mut zero), 0.0);
    }
}
