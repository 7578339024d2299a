#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("dimension mismatch in {op}: {left:?} vs {right:?}")]
    DimensionMismatch {
        op: &'static str,
        left: (usize, usize),
        right: (usize, usize),
    },
    #[error("matrix must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },
    #[error("entry ({row}, {col}) is outside a {rows}x{cols} matrix")]
    IndexOutOfRange {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },
    #[error("{what} has length {actual}, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn ensure_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(Error::LengthMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

pub(crate) fn ensure_square(rows: usize, cols: usize) -> Result<()> {
    if rows != cols {
        return Err(Error::NotSquare { rows, cols });
    }
    Ok(())
}
