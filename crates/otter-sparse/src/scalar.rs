//! Entry types a [`SparseMatrix`](crate::SparseMatrix) can hold.

use nalgebra::Complex;
use serde::{Deserialize, Serialize};

/// Policy for folding repeated `(row, col)` entries during CSR conversion.
///
/// The partial policies only differ from [`SumRepeated::All`] for complex entries: `RealPart`
/// sums the real parts of entries whose imaginary parts truncate to the same integer (keeping
/// the last imaginary part), `ImaginaryPart` does the converse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SumRepeated {
    None,
    #[default]
    All,
    RealPart,
    ImaginaryPart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixKind {
    Real,
    Complex,
    Integer,
    Pattern,
}

/// Structure-only entry: the matrix stores positions but no values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Pattern;

pub trait Scalar: Copy + std::fmt::Debug + PartialEq + 'static {
    const KIND: MatrixKind;

    fn zero() -> Self;
    fn one() -> Self;
    fn add(self, other: Self) -> Self;
    fn mul(self, other: Self) -> Self;

    /// Non-negative length of the entry when it is read as an edge.
    fn edge_length(self) -> f64;

    /// Real value of the entry; the real part for complex entries, 1 for patterns.
    fn to_real(self) -> f64;

    fn scale(self, s: f64) -> Self;

    fn near(self, other: Self, eps: f64) -> bool;

    /// Secondary key separating repeated entries that must not be merged under `policy`.
    fn repeat_key(self, _policy: SumRepeated) -> i64 {
        0
    }

    /// Fold `later` into `self` under `policy`.
    fn merge_repeated(self, later: Self, _policy: SumRepeated) -> Self {
        self.add(later)
    }
}

impl Scalar for f64 {
    const KIND: MatrixKind = MatrixKind::Real;

    fn zero() -> Self {
        0.0
    }
    fn one() -> Self {
        1.0
    }
    fn add(self, other: Self) -> Self {
        self + other
    }
    fn mul(self, other: Self) -> Self {
        self * other
    }
    fn edge_length(self) -> f64 {
        self.abs()
    }
    fn to_real(self) -> f64 {
        self
    }
    fn scale(self, s: f64) -> Self {
        self * s
    }
    fn near(self, other: Self, eps: f64) -> bool {
        (self - other).abs() <= eps
    }
}

impl Scalar for i64 {
    const KIND: MatrixKind = MatrixKind::Integer;

    fn zero() -> Self {
        0
    }
    fn one() -> Self {
        1
    }
    fn add(self, other: Self) -> Self {
        self.wrapping_add(other)
    }
    fn mul(self, other: Self) -> Self {
        self.wrapping_mul(other)
    }
    fn edge_length(self) -> f64 {
        (self as f64).abs()
    }
    fn to_real(self) -> f64 {
        self as f64
    }
    fn scale(self, s: f64) -> Self {
        ((self as f64) * s).round() as i64
    }
    fn near(self, other: Self, _eps: f64) -> bool {
        self == other
    }
}

impl Scalar for Complex<f64> {
    const KIND: MatrixKind = MatrixKind::Complex;

    fn zero() -> Self {
        Complex::new(0.0, 0.0)
    }
    fn one() -> Self {
        Complex::new(1.0, 0.0)
    }
    fn add(self, other: Self) -> Self {
        self + other
    }
    fn mul(self, other: Self) -> Self {
        self * other
    }
    fn edge_length(self) -> f64 {
        self.re.abs()
    }
    fn to_real(self) -> f64 {
        self.re
    }
    fn scale(self, s: f64) -> Self {
        Complex::new(self.re * s, self.im * s)
    }
    fn near(self, other: Self, eps: f64) -> bool {
        (self.re - other.re).abs() <= eps && (self.im - other.im).abs() <= eps
    }
    fn repeat_key(self, policy: SumRepeated) -> i64 {
        match policy {
            SumRepeated::RealPart => self.im as i64,
            SumRepeated::ImaginaryPart => self.re as i64,
            SumRepeated::None | SumRepeated::All => 0,
        }
    }
    fn merge_repeated(self, later: Self, policy: SumRepeated) -> Self {
        match policy {
            SumRepeated::RealPart => Complex::new(self.re + later.re, later.im),
            SumRepeated::ImaginaryPart => Complex::new(later.re, self.im + later.im),
            SumRepeated::None | SumRepeated::All => self + later,
        }
    }
}

impl Scalar for Pattern {
    const KIND: MatrixKind = MatrixKind::Pattern;

    fn zero() -> Self {
        Pattern
    }
    fn one() -> Self {
        Pattern
    }
    fn add(self, _other: Self) -> Self {
        Pattern
    }
    fn mul(self, _other: Self) -> Self {
        Pattern
    }
    fn edge_length(self) -> f64 {
        1.0
    }
    fn to_real(self) -> f64 {
        1.0
    }
    fn scale(self, _s: f64) -> Self {
        Pattern
    }
    fn near(self, _other: Self, _eps: f64) -> bool {
        true
    }
}
