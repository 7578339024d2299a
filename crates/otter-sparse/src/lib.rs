#![forbid(unsafe_code)]

//! Sparse matrices and the graph and numerical kernels that layout solvers are built on.
//!
//! Matrices live in compressed-row form ([`SparseMatrix`]); duplicate-carrying coordinate data
//! is collected in a [`CoordinateMatrix`] and converted with a [`SumRepeated`] policy. Graph
//! queries read a square matrix as an adjacency structure, while [`VtxGraph`] keeps the
//! per-vertex adjacency lists used by the distance and stress routines.

pub mod distance;
pub mod error;
pub mod graph;
pub mod kernels;
mod matrix;
mod ops;
pub mod paths;
pub mod priority_queue;
pub mod rng;
mod scalar;
pub mod sort;
mod transform;
pub mod vtx;

pub use distance::{Distance, UNREACHABLE_PENALTY, resolve_unreachable};
pub use error::{Error, Result};
pub use graph::{KCenters, LevelSets, Partition, PseudoDiameter, ShortestPaths};
pub use matrix::{CoordinateMatrix, SYMMETRY_EPSILON, SparseMatrix};
pub use ops::dense_transpose;
pub use priority_queue::BucketQueue;
pub use rng::XorShift64Star;
pub use scalar::{MatrixKind, Pattern, Scalar, SumRepeated};
pub use sort::quicksort_place;
pub use vtx::{VertexData, VtxGraph};
