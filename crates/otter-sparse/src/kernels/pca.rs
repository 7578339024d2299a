use nalgebra::DMatrix;

use super::power::power_iteration;
use crate::error::{Error, Result, ensure_len};
use crate::rng::XorShift64Star;

/// Projects `n` points of dimension `dim` (row-major `n x dim`) onto the `new_dim` principal
/// axes of their Gram matrix. Returns row-major `n x new_dim`.
pub fn pca_project(
    coords: &[f64],
    dim: usize,
    new_dim: usize,
    rng: &mut XorShift64Star,
) -> Result<Vec<f64>> {
    if dim == 0 || new_dim > dim {
        return Err(Error::InvalidArgument {
            reason: format!("cannot project {dim}-dimensional points onto {new_dim} axes"),
        });
    }
    let n = coords.len() / dim;
    ensure_len("coordinates", n * dim, coords.len())?;

    let mut gram = DMatrix::zeros(dim, dim);
    for p in coords.chunks_exact(dim) {
        for a in 0..dim {
            for b in a..dim {
                gram[(a, b)] += p[a] * p[b];
            }
        }
    }
    for a in 0..dim {
        for b in 0..a {
            gram[(a, b)] = gram[(b, a)];
        }
    }

    let eig = power_iteration(&gram, new_dim, rng);
    let mut out = vec![0.0; n * new_dim];
    for (i, p) in coords.chunks_exact(dim).enumerate() {
        for (k, axis) in eig.vectors.iter().enumerate() {
            out[i * new_dim + k] = p.iter().zip(axis).map(|(x, e)| x * e).sum();
        }
    }
    Ok(out)
}
