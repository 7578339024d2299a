use otter::LayoutContext;
use otter::multilevel::{CoarsenMode, CoarsenScheme, Multilevel, MultilevelOptions};
use otter_sparse::{SparseMatrix, SumRepeated};

fn grid(w: usize, h: usize) -> SparseMatrix<f64> {
    let (mut irn, mut jcn) = (Vec::new(), Vec::new());
    for r in 0..h {
        for c in 0..w {
            let i = r * w + c;
            if c + 1 < w {
                irn.push(i);
                jcn.push(i + 1);
            }
            if r + 1 < h {
                irn.push(i);
                jcn.push(i + w);
            }
        }
    }
    let val = vec![1.0; irn.len()];
    let n = w * h;
    SparseMatrix::from_coordinate_arrays(n, n, &irn, &jcn, &val, SumRepeated::All)
        .unwrap()
        .symmetrize(false)
        .unwrap()
}

fn options(scheme: CoarsenScheme) -> MultilevelOptions {
    MultilevelOptions {
        scheme,
        ..MultilevelOptions::default()
    }
}

#[test]
fn independent_edge_set_shrinks_a_hundred_nodes() {
    let a = grid(10, 10);
    let opts = options(CoarsenScheme::IndependentEdgeSet);
    let mut ctx = LayoutContext::new(1);
    let ml = Multilevel::new(&a, None, None, &opts, &mut ctx).unwrap();
    assert!(ml.len() > 1);

    let mut prev = 100;
    for level in 1..=ml.coarsest() {
        let nc = ml.matrix(level).nrows();
        assert!(nc < prev && nc >= opts.min_size, "level {level}: {nc} nodes");
        prev = nc;
    }

    // A constant survives prolongation followed by restriction.
    let c = ml.coarse_level(1).unwrap();
    let nc = c.matrix.nrows();
    let fine = c.prolongation.multiply_vector(&vec![1.0; nc], false).unwrap();
    assert!(fine.iter().all(|v| (v - 1.0).abs() < 1e-12));
    let back = c.restriction.multiply_vector(&fine, false).unwrap();
    assert!(back.iter().all(|v| (v - 1.0).abs() < 1e-12));
}

#[test]
fn coarse_graphs_stay_symmetric_without_self_loops() {
    let a = grid(8, 6);
    for scheme in [
        CoarsenScheme::IndependentEdgeSet,
        CoarsenScheme::HeaviestEdgePerNodeLeavesFirst,
        CoarsenScheme::IndependentVertexSet,
        CoarsenScheme::Hybrid,
    ] {
        let mut ctx = LayoutContext::new(2);
        let ml = Multilevel::new(&a, None, None, &options(scheme), &mut ctx).unwrap();
        for level in 1..=ml.coarsest() {
            let m = ml.matrix(level);
            assert!(m.is_symmetric(false), "{scheme:?} level {level}");
            assert!(m.triplets().all(|(i, j, _)| i != j), "{scheme:?} level {level}");
        }
    }
}

#[test]
fn node_weights_are_conserved() {
    let a = grid(7, 7);
    let weights: Vec<f64> = (0..49).map(|i| 1.0 + (i % 3) as f64).collect();
    let total: f64 = weights.iter().sum();
    let mut ctx = LayoutContext::new(3);
    let opts = options(CoarsenScheme::HeaviestEdgePerNode);
    let ml = Multilevel::new(&a, None, Some(&weights), &opts, &mut ctx).unwrap();
    for level in 1..=ml.coarsest() {
        let sum: f64 = ml.node_weights(level).unwrap().iter().sum();
        assert!((sum - total).abs() < 1e-9, "level {level}: {sum}");
    }
}

#[test]
fn gentle_mode_takes_single_steps() {
    let a = grid(10, 10);
    let opts = MultilevelOptions {
        mode: CoarsenMode::Gentle,
        min_coarsen_factor: 1.0,
        ..options(CoarsenScheme::IndependentEdgeSet)
    };
    let mut ctx = LayoutContext::new(4);
    let ml = Multilevel::new(&a, None, None, &opts, &mut ctx).unwrap();
    // A matching at most halves the node count.
    assert!(ml.matrix(1).nrows() >= 50);
}

#[test]
fn same_seed_same_hierarchy() {
    let a = grid(9, 9);
    let opts = options(CoarsenScheme::Hybrid);
    let sizes = |seed| {
        let mut ctx = LayoutContext::new(seed);
        let ml = Multilevel::new(&a, None, None, &opts, &mut ctx).unwrap();
        (0..ml.len()).map(|l| ml.matrix(l).nrows()).collect::<Vec<_>>()
    };
    assert_eq!(sizes(7), sizes(7));
}
