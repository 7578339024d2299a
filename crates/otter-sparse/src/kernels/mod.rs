//! Iterative numerical kernels: vector algebra, conjugate gradient, power iteration, PCA.

mod conjgrad;
mod matvec;
mod packed;
mod pca;
mod power;
pub mod vector;

pub use conjgrad::{
    CgOptions, CgOutcome, conjugate_gradient, conjugate_gradient_dense, conjugate_gradient_kd,
    conjugate_gradient_packed, conjugate_gradient_sparse,
};
pub use matvec::{FnMatVec, MatVec};
pub use packed::PackedSymmetric;
pub use pca::pca_project;
pub use power::{PowerIteration, power_iteration};
