use tracing::debug;

use super::matvec::MatVec;
use super::vector::{norm, normalize, orthogonalize_against};
use crate::rng::XorShift64Star;

/// Convergence threshold on `1 - |cos|` between successive iterates.
const ITERATION_THRESHOLD: f64 = 1e-3;
const COLINEAR_EPSILON: f64 = 1e-10;
const MAX_RESEEDS: usize = 100;

/// Top eigenpairs, sorted by decreasing eigenvalue.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerIteration {
    pub vectors: Vec<Vec<f64>>,
    pub values: Vec<f64>,
    /// False when some vector ran out of iterations and later slots were filled randomly.
    pub converged: bool,
}

fn random_unit(
    n: usize,
    found: &[Vec<f64>],
    rng: &mut XorShift64Star,
    reject_colinear: bool,
) -> Vec<f64> {
    let mut v = vec![0.0; n];
    for _ in 0..MAX_RESEEDS {
        for x in v.iter_mut() {
            *x = rng.next_usize(100) as f64;
        }
        for u in found {
            orthogonalize_against(&mut v, u);
        }
        if !reject_colinear || norm(&v) >= COLINEAR_EPSILON {
            break;
        }
    }
    normalize(&mut v);
    v
}

/// Deflated power iteration for the `neigs` dominant eigenvectors of `a`.
///
/// Each new vector is kept orthogonal to the ones already found. When a vector falls into the
/// null space or exhausts `30 n` iterations, the remaining slots get random orthogonal vectors
/// with eigenvalue zero.
pub fn power_iteration<A: MatVec + ?Sized>(
    a: &A,
    neigs: usize,
    rng: &mut XorShift64Star,
) -> PowerIteration {
    let n = a.dim();
    let neigs = neigs.min(n);
    let max_iterations = 30 * n;
    let tol = 1.0 - ITERATION_THRESHOLD;

    let mut vectors: Vec<Vec<f64>> = Vec::with_capacity(neigs);
    let mut values = Vec::with_capacity(neigs);
    let mut converged = true;
    let mut tmp = vec![0.0; n];

    'outer: while vectors.len() < neigs {
        let mut curr = random_unit(n, &vectors, rng, true);
        let mut iteration = 0;
        loop {
            iteration += 1;
            let last = curr.clone();
            a.apply(&curr, &mut tmp);
            curr.copy_from_slice(&tmp);
            for u in &vectors {
                orthogonalize_against(&mut curr, u);
            }
            let len = norm(&curr);
            if len < COLINEAR_EPSILON || iteration > max_iterations {
                if iteration > max_iterations {
                    converged = false;
                }
                break 'outer;
            }
            curr.iter_mut().for_each(|x| *x /= len);
            let angle: f64 = curr.iter().zip(&last).map(|(p, q)| p * q).sum();
            if angle.abs() >= tol {
                values.push(angle * len);
                vectors.push(curr);
                break;
            }
        }
    }

    if vectors.len() < neigs {
        debug!(
            found = vectors.len(),
            wanted = neigs,
            converged,
            "power iteration filling remaining eigenvectors randomly"
        );
    }
    while vectors.len() < neigs {
        let v = random_unit(n, &vectors, rng, false);
        vectors.push(v);
        values.push(0.0);
    }

    let mut order: Vec<usize> = (0..neigs).collect();
    order.sort_by(|&i, &j| values[j].total_cmp(&values[i]));
    PowerIteration {
        vectors: order.iter().map(|&i| vectors[i].clone()).collect(),
        values: order.iter().map(|&i| values[i]).collect(),
        converged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    #[test]
    fn finds_the_dominant_axes_of_a_diagonal_matrix() {
        let a = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![1.0, 5.0, 3.0]));
        let mut rng = XorShift64Star::new(7);
        let out = power_iteration(&a, 2, &mut rng);
        assert!(out.converged);
        assert!((out.values[0] - 5.0).abs() < 0.2);
        assert!((out.values[1] - 3.0).abs() < 0.2);
        assert!(out.vectors[0][1].abs() > 0.95);
        assert!(out.vectors[1][2].abs() > 0.95);
    }
}
