#![forbid(unsafe_code)]

//! Headless force-directed and stress-majorization graph layout (sfdp/neato style).
//!
//! Graphs come in as square [`SparseMatrix`] adjacency matrices (or [`VtxGraph`] lists for the
//! stress solvers) and positions go out as a row-major `n x dim` coordinate array. Every random
//! choice is drawn from a [`LayoutContext`], so a fixed seed reproduces a layout exactly.

pub mod context;
pub mod error;
pub mod geometry;
pub mod multilevel;
pub mod quadtree;
pub mod spring;
pub mod stress;

pub use otter_sparse as sparse;

pub use context::LayoutContext;
pub use error::{Error, Result};
pub use multilevel::{CoarsenMode, CoarsenScheme, Multilevel, MultilevelOptions};
pub use quadtree::QuadTree;
pub use spring::{MultilevelReport, SpringElectricalOptions, multilevel_spring_electrical_embedding};
pub use stress::{
    DistanceModel, SeparationSolver, StressOptions, StressReport, SweepProjection,
    stress_majorization_cola, stress_majorization_kd_mkernel, stress_majorization_with_hierarchy,
};

use otter_sparse::{SparseMatrix, VtxGraph};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum Algorithm {
    /// Multilevel spring-electrical embedding (sfdp).
    SpringElectrical(SpringElectricalOptions),
    /// Stress majorization (neato).
    Stress(StressOptions),
    /// Stress majorization with directed edges sorted into levels on the y axis.
    StressHierarchy(StressOptions),
    /// Stress majorization with separation constraints on the y axis, projected by
    /// [`SweepProjection`].
    StressCola(StressOptions),
}

impl Default for Algorithm {
    fn default() -> Self {
        Algorithm::SpringElectrical(SpringElectricalOptions::default())
    }
}

impl Algorithm {
    pub fn random_seed(&self) -> u64 {
        match self {
            Algorithm::SpringElectrical(o) => o.random_seed,
            Algorithm::Stress(o) | Algorithm::StressHierarchy(o) | Algorithm::StressCola(o) => {
                o.random_seed
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayoutReport {
    Multilevel(MultilevelReport),
    Stress(StressReport),
}

/// Lays out the graph with adjacency matrix `a` into the row-major `n x dim` array `x`.
///
/// Stored entries of `a` are edge lengths for the stress algorithms; a nonsymmetric `a` reads
/// each entry `a_ij` as a directed edge `i -> j`, which only the constrained stress variants
/// take into account. The run is seeded from the options' `random_seed`.
pub fn layout(
    a: &SparseMatrix<f64>,
    dim: usize,
    algorithm: &Algorithm,
    x: &mut [f64],
) -> Result<LayoutReport> {
    let mut ctx = LayoutContext::new(algorithm.random_seed());
    match algorithm {
        Algorithm::SpringElectrical(opts) => {
            multilevel_spring_electrical_embedding(&mut ctx, dim, a, None, opts, None, x, &[])
                .map(LayoutReport::Multilevel)
        }
        Algorithm::Stress(opts) => {
            let graph = VtxGraph::from_matrix(a, true)?;
            stress_majorization_kd_mkernel(&mut ctx, &graph, dim, x, opts).map(LayoutReport::Stress)
        }
        Algorithm::StressHierarchy(opts) => {
            let graph = directed_graph(a)?;
            stress_majorization_with_hierarchy(&mut ctx, &graph, dim, x, opts)
                .map(LayoutReport::Stress)
        }
        Algorithm::StressCola(opts) => {
            let graph = directed_graph(a)?;
            let mut solver = SweepProjection::default();
            stress_majorization_cola(&mut ctx, &graph, dim, x, opts, &mut solver)
                .map(LayoutReport::Stress)
        }
    }
}

fn directed_graph(a: &SparseMatrix<f64>) -> Result<VtxGraph> {
    if !a.is_square() {
        return Err(otter_sparse::Error::NotSquare {
            rows: a.nrows(),
            cols: a.ncols(),
        }
        .into());
    }
    if a.is_symmetric(false) {
        return Ok(VtxGraph::from_matrix(a, true)?);
    }
    let (edges, lengths): (Vec<_>, Vec<_>) = a
        .triplets()
        .filter(|&(i, j, _)| i != j)
        .map(|(i, j, v)| ((i, j), v.abs()))
        .unzip();
    Ok(VtxGraph::from_directed_edges(
        a.nrows(),
        &edges,
        Some(&lengths),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_comes_from_the_options() {
        let algo = Algorithm::Stress(StressOptions {
            random_seed: 9,
            ..StressOptions::default()
        });
        assert_eq!(algo.random_seed(), 9);
        assert_eq!(Algorithm::default().random_seed(), 123);
    }
}
