//! Multilevel spring-electrical layout (sfdp).
//!
//! Nodes attract along edges with force `C^((2-p)/3) / K * |x_i - x_j|^2` and repel each other
//! with `K^(1-p) / |x_i - x_j|^(-p)`. The driver coarsens the graph, lays out the coarsest level
//! from random coordinates and refines level by level.

use otter_sparse::SparseMatrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::LayoutContext;
use crate::error::{Result, ensure_coords};
use crate::multilevel::{CoarsenMode, CoarsenScheme, Multilevel, MultilevelOptions};

mod force;
mod maxent;
mod post;

pub use force::{
    MAX_QTREE_LEVEL, OnedOptimizer, SpringReport, average_edge_length,
    spring_electrical_embedding, spring_electrical_embedding_fast,
    spring_electrical_embedding_slow, update_step,
};
pub use maxent::{spring_electrical_spring_embedding, spring_maxent_embedding};
pub use post::{
    attach_edge_label_coordinates, beautify_leaves, get_angle, interpolate_coord, pcp_rotate,
    power_law_graph, prolongate, rotate, shorting_edge_label_nodes,
};

/// Repulsive exponent placeholder: the driver replaces it with -1, or -1.8 for graphs whose
/// degree distribution looks heavy-tailed.
pub const AUTOP: f64 = -1.0001234;

/// With [`QuadTreeScheme::Hybrid`], levels with more nodes than this use the fast embedding.
pub const QUAD_TREE_HYBRID_SIZE: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuadTreeScheme {
    /// Exact repulsion.
    None,
    /// Per-node supernode queries.
    Normal,
    /// One tree walk for all nodes.
    Fast,
    #[default]
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    #[default]
    SpringElectrical,
    SpringMaxent,
}

/// How nodes standing for edge labels are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeLabelScheme {
    #[default]
    None,
    Penalty,
    Penalty2,
    /// Lay out the graph without label nodes, then put each label at its edge's midpoint.
    StraightLinePenalty,
    StraightLinePenalty2,
}

impl EdgeLabelScheme {
    fn shorts_label_nodes(self) -> bool {
        matches!(
            self,
            EdgeLabelScheme::StraightLinePenalty | EdgeLabelScheme::StraightLinePenalty2
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpringElectricalOptions {
    /// Repulsive exponent; non-negative values are replaced by -1.
    pub p: f64,
    /// Stress exponent of the maxent spring term.
    pub q: f64,
    pub random_start: bool,
    /// Natural edge length; negative means the average edge length of the start layout.
    pub k: f64,
    pub c: f64,
    /// Maximum number of levels, the input graph included.
    pub multilevels: usize,
    pub coarsen_scheme: CoarsenScheme,
    pub coarsen_mode: CoarsenMode,
    /// Minimum node count for quadtree repulsion in the node-by-node variants.
    pub quadtree_size: usize,
    pub max_qtree_level: usize,
    /// Barnes-Hut opening threshold.
    pub bh: f64,
    pub tol: f64,
    pub maxiter: usize,
    pub cool: f64,
    pub step: f64,
    pub adaptive_cooling: bool,
    pub random_seed: u64,
    pub beautify_leaves: bool,
    pub use_node_weights: bool,
    pub tscheme: QuadTreeScheme,
    pub method: Method,
    /// Final rotation in degrees (2D only).
    pub rotation: f64,
    pub edge_labeling_scheme: EdgeLabelScheme,
}

impl Default for SpringElectricalOptions {
    fn default() -> Self {
        Self {
            p: AUTOP,
            q: 1.0,
            random_start: true,
            k: -1.0,
            c: 0.2,
            multilevels: usize::MAX,
            coarsen_scheme: CoarsenScheme::HeaviestEdgePerNodeSupernodesFirst,
            coarsen_mode: CoarsenMode::Forceful,
            quadtree_size: 45,
            max_qtree_level: 10,
            bh: 0.6,
            tol: 0.001,
            maxiter: 500,
            cool: 0.9,
            step: 0.1,
            adaptive_cooling: true,
            random_seed: 123,
            beautify_leaves: false,
            use_node_weights: false,
            tscheme: QuadTreeScheme::Hybrid,
            method: Method::SpringElectrical,
            rotation: 0.0,
            edge_labeling_scheme: EdgeLabelScheme::None,
        }
    }
}

/// Summary of a multilevel run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MultilevelReport {
    pub levels: usize,
    /// Repulsive exponent actually used.
    pub p: f64,
    /// Embedding iterations summed over all levels.
    pub iterations: usize,
}

/// Multilevel layout of `a` into the row-major `n x dim` array `x`.
///
/// `opts` is not modified; per-level adjustments (shrinking `K`, cooling schedule, tuned
/// quadtree depth) happen on a private copy. `d` holds target distances for the maxent
/// method. `edge_label_nodes` lists nodes that stand for edge labels; with a straight-line
/// labelling scheme they are left out of the layout and placed afterwards.
#[allow(clippy::too_many_arguments)]
pub fn multilevel_spring_electrical_embedding(
    ctx: &mut LayoutContext,
    dim: usize,
    a: &SparseMatrix<f64>,
    d: Option<&SparseMatrix<f64>>,
    opts: &SpringElectricalOptions,
    node_weights: Option<&[f64]>,
    x: &mut [f64],
    edge_label_nodes: &[usize],
) -> Result<MultilevelReport> {
    let n = a.nrows();
    if n == 0 || dim == 0 {
        return Ok(MultilevelReport::default());
    }
    if !a.is_square() {
        return Err(otter_sparse::Error::NotSquare {
            rows: a.nrows(),
            cols: a.ncols(),
        }
        .into());
    }
    ensure_coords(n, dim, x)?;

    let maxent = opts.method == Method::SpringMaxent;
    let (a, d) = if !a.is_symmetric(false) {
        if maxent {
            let d = d.map(|d| d.symmetrize_nodiag(false)).transpose()?;
            (a.symmetrize_nodiag(false)?, d)
        } else {
            (a.to_real_adjacency_symmetrized()?, d.cloned())
        }
    } else {
        let mut a = a.clone();
        a.remove_diagonal();
        let d = if maxent {
            d.map(|d| {
                let mut d = d.clone();
                d.remove_diagonal();
                d
            })
        } else {
            d.cloned()
        };
        (a, d)
    };

    if opts.edge_labeling_scheme.shorts_label_nodes() && !edge_label_nodes.is_empty() {
        let a2 = shorting_edge_label_nodes(&a, edge_label_nodes)?;
        let mut x2 = vec![0.0; a2.nrows() * dim];
        let report =
            multilevel_spring_electrical_embedding(ctx, dim, &a2, None, opts, None, &mut x2, &[])?;
        attach_edge_label_coordinates(dim, &a, edge_label_nodes, x, &x2)?;
        return Ok(report);
    }

    let mopts = MultilevelOptions {
        max_level: opts.multilevels,
        scheme: opts.coarsen_scheme,
        mode: opts.coarsen_mode,
        ..MultilevelOptions::default()
    };
    let ml = Multilevel::new(&a, d.as_ref(), node_weights, &mopts, ctx)?;
    let coarsest = ml.coarsest();

    let mut o = opts.clone();
    if o.p == AUTOP {
        o.p = if power_law_graph(&a) { -1.8 } else { -1.0 };
    }
    let p = o.p;

    // Coarse levels start from the caller's coordinates carried down by the restrictions.
    let mut xc = x.to_vec();
    for level in 1..=coarsest {
        if let Some(c) = ml.coarse_level(level) {
            xc = c.restriction.multiply_dense(false, &xc, false, dim, false)?;
        }
    }

    let mut iterations = 0;
    let mut level = coarsest;
    loop {
        let al = ml.matrix(level);
        let wl = ml.node_weights(level);
        debug!(level, n = al.nrows(), coarsest = level == coarsest, "spring level");
        match o.method {
            Method::SpringElectrical => {
                let report = match o.tscheme {
                    QuadTreeScheme::None => {
                        spring_electrical_embedding_slow(ctx, dim, al, &mut o, wl, &mut xc)?
                    }
                    QuadTreeScheme::Fast => {
                        spring_electrical_embedding_fast(ctx, dim, al, &mut o, wl, &mut xc)?
                    }
                    QuadTreeScheme::Hybrid if al.nrows() > QUAD_TREE_HYBRID_SIZE => {
                        spring_electrical_embedding_fast(ctx, dim, al, &mut o, wl, &mut xc)?
                    }
                    QuadTreeScheme::Normal | QuadTreeScheme::Hybrid => {
                        spring_electrical_embedding(ctx, dim, al, &mut o, wl, &mut xc)?
                    }
                };
                iterations += report.iterations;
            }
            Method::SpringMaxent => {
                let dl = ml.distances(level);
                o.step = 1.0;
                o.adaptive_cooling = true;
                let rho = if level == coarsest {
                    o.maxiter = 500;
                    0.5
                } else {
                    o.maxiter = 100;
                    0.05
                };
                let r = spring_maxent_embedding(ctx, dim, al, dl, &mut o, wl, &mut xc, rho)?;
                iterations += r.iterations;
                if level == 0 {
                    // Fade the entropy term out on the finest level.
                    o.random_start = false;
                    o.step = 0.05;
                    o.adaptive_cooling = false;
                    for scale in [2.0, 8.0, 32.0] {
                        let r = spring_maxent_embedding(
                            ctx,
                            dim,
                            al,
                            dl,
                            &mut o,
                            wl,
                            &mut xc,
                            rho / scale,
                        )?;
                        iterations += r.iterations;
                    }
                }
            }
        }
        if level == 0 {
            break;
        }

        let Some(c) = ml.coarse_level(level) else {
            break;
        };
        xc = prolongate(
            ctx,
            dim,
            ml.matrix(level - 1),
            &c.prolongation,
            &c.restriction,
            &xc,
            c.scheme_used,
            o.k * 0.001,
        )?;
        o.random_start = false;
        o.k *= 0.75;
        o.adaptive_cooling = false;
        o.step = if c.scheme_used.is_vertex_based() { 1.0 } else { 0.1 };
        level -= 1;
    }

    x.copy_from_slice(&xc);
    if dim == 2 {
        pcp_rotate(dim, x)?;
    }
    if o.rotation != 0.0 {
        rotate(dim, x, o.rotation)?;
    }
    debug!(levels = ml.len(), p, iterations, "multilevel spring layout");
    Ok(MultilevelReport {
        levels: ml.len(),
        p,
        iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_label_shorting_is_limited_to_straight_line_schemes() {
        assert!(EdgeLabelScheme::StraightLinePenalty.shorts_label_nodes());
        assert!(EdgeLabelScheme::StraightLinePenalty2.shorts_label_nodes());
        assert!(!EdgeLabelScheme::Penalty.shorts_label_nodes());
        assert!(!EdgeLabelScheme::None.shorts_label_nodes());
    }
}
