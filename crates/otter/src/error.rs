#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Sparse(#[from] otter_sparse::Error),
    #[error("layout dimension must be at least 1, got {dim}")]
    InvalidDimension { dim: usize },
    #[error("coordinate array has length {actual}, expected {expected}")]
    CoordinateLength { expected: usize, actual: usize },
    #[error("unsupported layout request: {reason}")]
    Unsupported { reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn ensure_dim(dim: usize) -> Result<()> {
    if dim == 0 {
        return Err(Error::InvalidDimension { dim });
    }
    Ok(())
}

pub(crate) fn ensure_coords(n: usize, dim: usize, x: &[f64]) -> Result<()> {
    ensure_dim(dim)?;
    if x.len() != n * dim {
        return Err(Error::CoordinateLength {
            expected: n * dim,
            actual: x.len(),
        });
    }
    Ok(())
}
