//! Multilevel graph hierarchies built by repeated coarsening.
//!
//! Level 0 is the input graph. Each coarser level carries the Galerkin product `R A P` of the
//! level above it together with the prolongation `P` (fine x coarse) and the row-normalized
//! restriction `R` (coarse x fine) that link the two.

use std::borrow::Cow;

use otter_sparse::{SparseMatrix, SumRepeated, XorShift64Star};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::context::LayoutContext;
use crate::error::{Error, Result};

mod select;

use select::{MAX_CLUSTER_SIZE, Selection};

/// How one coarsening step chooses the nodes that merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoarsenScheme {
    IndependentEdgeSet,
    HeaviestEdgePerNode,
    HeaviestEdgePerNodeDegreeScaled,
    HeaviestEdgePerNodeLeavesFirst,
    HeaviestEdgePerNodeSupernodesFirst,
    HeaviestClusterPerNodeLeavesFirst,
    IndependentVertexSet,
    IndependentVertexSetRs,
    /// Tries [`CoarsenScheme::HYBRID_ORDER`] in turn and keeps the first that coarsens.
    Hybrid,
}

impl CoarsenScheme {
    pub const HYBRID_ORDER: [CoarsenScheme; 5] = [
        CoarsenScheme::HeaviestEdgePerNodeLeavesFirst,
        CoarsenScheme::HeaviestEdgePerNodeSupernodesFirst,
        CoarsenScheme::HeaviestClusterPerNodeLeavesFirst,
        CoarsenScheme::IndependentVertexSet,
        CoarsenScheme::HeaviestEdgePerNode,
    ];

    /// Schemes whose coarse nodes are unions of fine nodes.
    pub fn is_edge_based(self) -> bool {
        !matches!(
            self,
            CoarsenScheme::IndependentVertexSet
                | CoarsenScheme::IndependentVertexSetRs
                | CoarsenScheme::Hybrid
        )
    }

    /// Schemes whose coarse nodes are a subset of the fine nodes.
    pub fn is_vertex_based(self) -> bool {
        matches!(
            self,
            CoarsenScheme::IndependentVertexSet | CoarsenScheme::IndependentVertexSetRs
        )
    }
}

/// `Gentle` accepts a step only if it shrinks the graph enough. `Forceful` keeps stepping
/// until it does (or no further step is possible).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoarsenMode {
    Gentle,
    #[default]
    Forceful,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultilevelOptions {
    /// Stop once a level would have fewer nodes than this.
    pub min_size: usize,
    /// A level must have at most this fraction of its parent's nodes.
    pub min_coarsen_factor: f64,
    /// Upper bound on the number of levels, the input graph included.
    pub max_level: usize,
    pub scheme: CoarsenScheme,
    pub mode: CoarsenMode,
    pub randomize: bool,
}

impl Default for MultilevelOptions {
    fn default() -> Self {
        Self {
            min_size: 4,
            min_coarsen_factor: 0.75,
            max_level: usize::MAX,
            scheme: CoarsenScheme::Hybrid,
            mode: CoarsenMode::Forceful,
            randomize: true,
        }
    }
}

/// A level below the top of the hierarchy.
#[derive(Debug, Clone)]
pub struct CoarseLevel {
    pub matrix: SparseMatrix<f64>,
    /// Maps coordinates of this level onto the finer one: `x_fine = P x`.
    pub prolongation: SparseMatrix<f64>,
    /// Row-normalized map from the finer level onto this one.
    pub restriction: SparseMatrix<f64>,
    /// Summed fine node weights.
    pub node_weights: Vec<f64>,
    /// Scheme that produced this level; never [`CoarsenScheme::Hybrid`].
    pub scheme_used: CoarsenScheme,
}

/// Result of coarsening one matrix, possibly through several composed steps.
#[derive(Debug, Clone)]
struct Coarsening {
    matrix: SparseMatrix<f64>,
    prolongation: SparseMatrix<f64>,
    restriction: SparseMatrix<f64>,
    node_weights: Vec<f64>,
    scheme_used: CoarsenScheme,
}

/// A coarsening hierarchy.
///
/// The top matrix is borrowed when the input is already a symmetric real matrix and owned
/// when it had to be symmetrized first.
#[derive(Debug, Clone)]
pub struct Multilevel<'a> {
    top: Cow<'a, SparseMatrix<f64>>,
    distances: Option<Cow<'a, SparseMatrix<f64>>>,
    top_weights: Option<Cow<'a, [f64]>>,
    coarse: Vec<CoarseLevel>,
}

impl<'a> Multilevel<'a> {
    /// Builds the whole hierarchy for `a`.
    ///
    /// A non-symmetric `a` is replaced by its symmetric unit-weight adjacency; `distances`
    /// is then symmetrized with its diagonal dropped. `node_weights`, when given, must have
    /// one entry per node.
    pub fn new(
        a: &'a SparseMatrix<f64>,
        distances: Option<&'a SparseMatrix<f64>>,
        node_weights: Option<&'a [f64]>,
        opts: &MultilevelOptions,
        ctx: &mut LayoutContext,
    ) -> Result<Self> {
        if !a.is_square() {
            return Err(otter_sparse::Error::NotSquare {
                rows: a.nrows(),
                cols: a.ncols(),
            }
            .into());
        }
        if let Some(w) = node_weights {
            if w.len() != a.nrows() {
                return Err(otter_sparse::Error::LengthMismatch {
                    what: "node weights",
                    expected: a.nrows(),
                    actual: w.len(),
                }
                .into());
            }
        }
        if opts.min_coarsen_factor <= 0.0 || opts.min_coarsen_factor > 1.0 {
            return Err(Error::Unsupported {
                reason: format!(
                    "coarsening factor must lie in (0, 1], got {}",
                    opts.min_coarsen_factor
                ),
            });
        }

        let (top, distances) = if a.is_symmetric(false) {
            (Cow::Borrowed(a), distances.map(Cow::Borrowed))
        } else {
            let sym = a.to_real_adjacency_symmetrized()?;
            let d = distances
                .map(|d| d.symmetrize_nodiag(false).map(Cow::Owned))
                .transpose()?;
            (Cow::Owned(sym), d)
        };

        let mut ml = Self {
            top,
            distances,
            top_weights: node_weights.map(Cow::Borrowed),
            coarse: Vec::new(),
        };
        ml.establish(opts, ctx.rng())?;
        debug!(
            levels = ml.len(),
            top = ml.top.nrows(),
            coarsest = ml.matrix(ml.coarsest()).nrows(),
            "multilevel hierarchy"
        );
        Ok(ml)
    }

    fn establish(&mut self, opts: &MultilevelOptions, rng: &mut XorShift64Star) -> Result<()> {
        loop {
            let level = self.coarse.len();
            if level + 1 >= opts.max_level {
                return Ok(());
            }
            let Some(c) = coarsen(self.matrix(level), self.node_weights(level), opts, rng)? else {
                return Ok(());
            };
            trace!(
                level = level + 1,
                n = c.matrix.nrows(),
                scheme = ?c.scheme_used,
                "coarse level"
            );
            self.coarse.push(CoarseLevel {
                matrix: c.matrix,
                prolongation: c.prolongation,
                restriction: c.restriction,
                node_weights: c.node_weights,
                scheme_used: c.scheme_used,
            });
        }
    }

    /// Number of levels, the input graph included.
    pub fn len(&self) -> usize {
        1 + self.coarse.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn coarsest(&self) -> usize {
        self.coarse.len()
    }

    /// `true` when the top matrix is a symmetrized copy rather than the caller's matrix.
    pub fn top_is_owned(&self) -> bool {
        matches!(self.top, Cow::Owned(_))
    }

    pub fn matrix(&self, level: usize) -> &SparseMatrix<f64> {
        if level == 0 {
            &self.top
        } else {
            &self.coarse[level - 1].matrix
        }
    }

    /// Ideal distances; only the top level has them.
    pub fn distances(&self, level: usize) -> Option<&SparseMatrix<f64>> {
        if level == 0 {
            self.distances.as_deref()
        } else {
            None
        }
    }

    pub fn node_weights(&self, level: usize) -> Option<&[f64]> {
        if level == 0 {
            self.top_weights.as_deref()
        } else {
            Some(&self.coarse[level - 1].node_weights)
        }
    }

    /// `None` for the top level.
    pub fn coarse_level(&self, level: usize) -> Option<&CoarseLevel> {
        level.checked_sub(1).map(|l| &self.coarse[l])
    }
}

/// One coarsening step with a concrete scheme. `None` means the scheme made no acceptable
/// progress.
fn coarsen_step(
    a: &SparseMatrix<f64>,
    node_weights: Option<&[f64]>,
    scheme: CoarsenScheme,
    opts: &MultilevelOptions,
    n_reference: usize,
    rng: &mut XorShift64Star,
) -> Result<Option<Coarsening>> {
    let n = a.nrows();
    let randomize = opts.randomize;
    let selection = match scheme {
        CoarsenScheme::IndependentEdgeSet => select::independent_edge_set(a, randomize, rng),
        CoarsenScheme::HeaviestEdgePerNode => {
            select::heaviest_edge_per_node(a, randomize, false, rng)
        }
        CoarsenScheme::HeaviestEdgePerNodeDegreeScaled => {
            select::heaviest_edge_per_node(a, randomize, true, rng)
        }
        CoarsenScheme::HeaviestEdgePerNodeLeavesFirst => select::leaves_first(a, randomize, rng),
        CoarsenScheme::HeaviestEdgePerNodeSupernodesFirst => {
            select::supernodes_first(a, randomize, rng)
        }
        CoarsenScheme::HeaviestClusterPerNodeLeavesFirst => {
            select::cluster_leaves_first(a, MAX_CLUSTER_SIZE, rng)
        }
        CoarsenScheme::IndependentVertexSet => select::independent_vertex_set(a, randomize, rng),
        CoarsenScheme::IndependentVertexSetRs => {
            select::independent_vertex_set_rs(a, randomize, rng)
        }
        CoarsenScheme::Hybrid => {
            for s in CoarsenScheme::HYBRID_ORDER {
                if let Some(c) = coarsen_step(a, node_weights, s, opts, n_reference, rng)? {
                    return Ok(Some(c));
                }
            }
            return Ok(None);
        }
    };

    let nc = selection.coarse_len();
    let too_gentle =
        opts.mode == CoarsenMode::Gentle && nc as f64 > opts.min_coarsen_factor * n_reference as f64;
    if too_gentle || nc == n || nc < opts.min_size {
        trace!(?scheme, n, nc, "coarsening rejected");
        return Ok(None);
    }

    let p = prolongation(n, &selection, a)?;
    let mut r = p.transpose();
    let mut matrix = r.multiply3(a, &p)?;
    matrix.remove_diagonal();
    matrix.set_symmetric();
    matrix.set_pattern_symmetric();
    let node_weights = match node_weights {
        Some(w) => r.multiply_vector(w, false)?,
        None => r.multiply_ones(false),
    };
    r.normalize_to_rowsum1();

    Ok(Some(Coarsening {
        matrix,
        prolongation: p,
        restriction: r,
        node_weights,
        scheme_used: scheme,
    }))
}

/// `P[i][k]` is one when fine node `i` lies in cluster `k`. A fine node outside an
/// independent set spreads evenly over the set members next to it.
fn prolongation(
    n: usize,
    selection: &Selection,
    a: &SparseMatrix<f64>,
) -> Result<SparseMatrix<f64>> {
    let nc = selection.coarse_len();
    let mut irn = Vec::with_capacity(n);
    let mut jcn = Vec::with_capacity(n);
    let mut val = Vec::with_capacity(n);
    match selection {
        Selection::Clusters(clusters) => {
            for (k, c) in clusters.iter().enumerate() {
                for &i in c {
                    irn.push(i);
                    jcn.push(k);
                    val.push(1.0);
                }
            }
        }
        Selection::VertexSet { coarse, .. } => {
            for i in 0..n {
                if let Some(k) = coarse[i] {
                    irn.push(i);
                    jcn.push(k);
                    val.push(1.0);
                    continue;
                }
                let covers: Vec<usize> = a
                    .row_indices(i)
                    .iter()
                    .filter(|&&j| j != i)
                    .filter_map(|&j| coarse[j])
                    .collect();
                let share = 1.0 / covers.len().max(1) as f64;
                for k in covers {
                    irn.push(i);
                    jcn.push(k);
                    val.push(share);
                }
            }
        }
    }
    Ok(SparseMatrix::from_coordinate_arrays(
        n,
        nc,
        &irn,
        &jcn,
        &val,
        SumRepeated::All,
    )?)
}

/// Coarsens `a` once, or repeatedly in forceful mode until the size target is met.
fn coarsen(
    a: &SparseMatrix<f64>,
    node_weights: Option<&[f64]>,
    opts: &MultilevelOptions,
    rng: &mut XorShift64Star,
) -> Result<Option<Coarsening>> {
    let n = a.nrows();
    let Some(mut acc) = coarsen_step(a, node_weights, opts.scheme, opts, n, rng)? else {
        return Ok(None);
    };
    if opts.mode == CoarsenMode::Gentle {
        return Ok(Some(acc));
    }
    let target = opts.min_coarsen_factor * n as f64;
    while acc.matrix.nrows() as f64 > target {
        let Some(next) = coarsen_step(
            &acc.matrix,
            Some(&acc.node_weights),
            opts.scheme,
            opts,
            n,
            rng,
        )?
        else {
            break;
        };
        acc = Coarsening {
            prolongation: acc.prolongation.multiply(&next.prolongation)?,
            restriction: next.restriction.multiply(&acc.restriction)?,
            matrix: next.matrix,
            node_weights: next.node_weights,
            scheme_used: next.scheme_used,
        };
    }
    Ok(Some(acc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cycle(n: usize) -> SparseMatrix<f64> {
        let mut irn = Vec::new();
        let mut jcn = Vec::new();
        for i in 0..n {
            let j = (i + 1) % n;
            irn.extend([i, j]);
            jcn.extend([j, i]);
        }
        let val = vec![1.0; irn.len()];
        SparseMatrix::from_coordinate_arrays(n, n, &irn, &jcn, &val, SumRepeated::All).unwrap()
    }

    #[test]
    fn edge_and_vertex_schemes_are_disjoint() {
        for s in CoarsenScheme::HYBRID_ORDER {
            assert_ne!(s.is_edge_based(), s.is_vertex_based());
        }
        assert!(!CoarsenScheme::Hybrid.is_edge_based());
        assert!(!CoarsenScheme::Hybrid.is_vertex_based());
    }

    #[test]
    fn symmetric_input_is_borrowed() {
        let a = cycle(12);
        let mut ctx = LayoutContext::new(5);
        let ml = Multilevel::new(&a, None, None, &MultilevelOptions::default(), &mut ctx).unwrap();
        assert!(!ml.top_is_owned());
        assert!(ml.len() >= 2);
    }

    #[test]
    fn gentle_mode_rejects_a_tiny_graph() {
        let a = cycle(3);
        let mut ctx = LayoutContext::new(5);
        let opts = MultilevelOptions {
            mode: CoarsenMode::Gentle,
            ..MultilevelOptions::default()
        };
        let ml = Multilevel::new(&a, None, None, &opts, &mut ctx).unwrap();
        assert_eq!(ml.len(), 1);
        assert!(ml.coarse_level(0).is_none());
    }

    #[test]
    fn max_level_one_keeps_only_the_input() {
        let a = cycle(40);
        let mut ctx = LayoutContext::new(5);
        let opts = MultilevelOptions {
            max_level: 1,
            ..MultilevelOptions::default()
        };
        let ml = Multilevel::new(&a, None, None, &opts, &mut ctx).unwrap();
        assert_eq!(ml.len(), 1);
    }

    #[test]
    fn coarse_weights_add_up() {
        let a = cycle(30);
        let mut ctx = LayoutContext::new(9);
        let ml = Multilevel::new(&a, None, None, &MultilevelOptions::default(), &mut ctx).unwrap();
        for level in 1..ml.len() {
            let w = ml.node_weights(level).unwrap();
            assert!((w.iter().sum::<f64>() - 30.0).abs() < 1e-9);
            let c = ml.coarse_level(level).unwrap();
            assert_ne!(c.scheme_used, CoarsenScheme::Hybrid);
            assert!(!c.matrix.has_diagonal());
        }
    }
}
