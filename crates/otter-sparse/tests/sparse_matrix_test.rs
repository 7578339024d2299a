use otter_sparse::{CoordinateMatrix, Error, Pattern, SparseMatrix, SumRepeated, XorShift64Star};

fn random_triples(
    rows: usize,
    cols: usize,
    nz: usize,
    seed: u64,
) -> (Vec<usize>, Vec<usize>, Vec<f64>) {
    let mut rng = XorShift64Star::new(seed);
    let mut irn = Vec::with_capacity(nz);
    let mut jcn = Vec::with_capacity(nz);
    let mut val = Vec::with_capacity(nz);
    for _ in 0..nz {
        irn.push(rng.next_usize(rows));
        jcn.push(rng.next_usize(cols));
        val.push((rng.next_usize(9) + 1) as f64);
    }
    (irn, jcn, val)
}

fn sorted_triplets(a: &SparseMatrix<f64>) -> Vec<(usize, usize, f64)> {
    let mut t: Vec<_> = a.triplets().collect();
    t.sort_by(|x, y| (x.0, x.1).cmp(&(y.0, y.1)));
    t
}

fn assert_same_entries(a: &SparseMatrix<f64>, b: &SparseMatrix<f64>, eps: f64) {
    assert_eq!((a.nrows(), a.ncols()), (b.nrows(), b.ncols()));
    let (ta, tb) = (sorted_triplets(a), sorted_triplets(b));
    assert_eq!(ta.len(), tb.len());
    for ((i, j, x), (k, l, y)) in ta.into_iter().zip(tb) {
        assert_eq!((i, j), (k, l));
        assert!((x - y).abs() <= eps, "({i}, {j}): {x} vs {y}");
    }
}

#[test]
fn coordinate_round_trip_sums_duplicates() {
    for seed in 1..6 {
        let (irn, jcn, val) = random_triples(7, 5, 40, seed);
        let a = SparseMatrix::from_coordinate_arrays(7, 5, &irn, &jcn, &val, SumRepeated::All)
            .unwrap();

        let mut expected = std::collections::BTreeMap::new();
        for k in 0..irn.len() {
            *expected.entry((irn[k], jcn[k])).or_insert(0.0) += val[k];
        }
        let got: Vec<_> = sorted_triplets(&a);
        let want: Vec<_> = expected.into_iter().map(|((i, j), v)| (i, j, v)).collect();
        assert_eq!(got, want);
    }
}

#[test]
fn keeping_repeats_preserves_every_triple() {
    let a = SparseMatrix::from_coordinate_arrays(
        2,
        2,
        &[0, 0, 1],
        &[1, 1, 0],
        &[1.0, 2.0, 3.0],
        SumRepeated::None,
    )
    .unwrap();
    assert_eq!(a.nnz(), 3);
}

#[test]
fn out_of_range_triples_are_rejected() {
    let err =
        SparseMatrix::from_coordinate_arrays(2, 2, &[0, 2], &[0, 0], &[1.0, 1.0], SumRepeated::All)
            .unwrap_err();
    assert!(matches!(err, Error::IndexOutOfRange { row: 2, .. }));
}

#[test]
fn coordinate_form_grows_and_converts() {
    let mut c = CoordinateMatrix::new(3, 3);
    c.extend([(0, 1, 1.0), (1, 0, 1.0), (0, 1, 4.0)]).unwrap();
    c.push(2, 2, 7.0).unwrap();
    assert!(c.push(3, 0, 1.0).is_err());
    let a = c.into_csr(SumRepeated::All).unwrap();
    assert_eq!(a.get(0, 1), Some(5.0));
    assert_eq!(a.get(2, 2), Some(7.0));
    assert_eq!(a.nnz(), 3);
}

#[test]
fn symmetrize_is_idempotent() {
    for seed in 1..6 {
        let (irn, jcn, val) = random_triples(8, 8, 20, seed);
        let a = SparseMatrix::from_coordinate_arrays(8, 8, &irn, &jcn, &val, SumRepeated::All)
            .unwrap();
        let once = a.symmetrize(false).unwrap();
        let twice = once.symmetrize(false).unwrap();
        assert!(once.is_symmetric(false));
        assert_same_entries(&once, &twice, 0.0);
    }
}

#[test]
fn transpose_is_an_involution() {
    for seed in 1..6 {
        let (irn, jcn, val) = random_triples(6, 9, 25, seed);
        let a = SparseMatrix::from_coordinate_arrays(6, 9, &irn, &jcn, &val, SumRepeated::All)
            .unwrap();
        let t = a.transpose();
        assert_eq!((t.nrows(), t.ncols()), (9, 6));
        assert_same_entries(&a, &t.transpose(), 0.0);
    }
}

#[test]
fn fused_triple_product_matches_two_products() {
    for seed in 1..6 {
        let (ri, rj, rv) = random_triples(4, 10, 12, seed);
        let (ai, aj, av) = random_triples(10, 10, 30, seed + 100);
        let r = SparseMatrix::from_coordinate_arrays(4, 10, &ri, &rj, &rv, SumRepeated::All)
            .unwrap();
        let a = SparseMatrix::from_coordinate_arrays(10, 10, &ai, &aj, &av, SumRepeated::All)
            .unwrap();
        let p = r.transpose();
        let fused = r.multiply3(&a, &p).unwrap();
        let stepwise = r.multiply(&a).unwrap().multiply(&p).unwrap();
        assert_same_entries(&fused, &stepwise, 1e-9);
    }
}

#[test]
fn multiply_reports_the_offending_shapes() {
    let a = SparseMatrix::<f64>::identity(3);
    let b = SparseMatrix::<f64>::zeros(2, 2);
    match a.multiply(&b) {
        Err(Error::DimensionMismatch { op, left, right }) => {
            assert_eq!(op, "multiply");
            assert_eq!(left, (3, 3));
            assert_eq!(right, (2, 2));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn graph_queries_require_square_matrices() {
    let a = SparseMatrix::<f64>::zeros(2, 3);
    assert!(matches!(
        a.weakly_connected_components(),
        Err(Error::NotSquare { rows: 2, cols: 3 })
    ));
}

#[test]
fn pattern_matrices_support_the_same_algebra() {
    let a: SparseMatrix<Pattern> = SparseMatrix::from_coordinate_arrays(
        3,
        3,
        &[0, 1],
        &[1, 2],
        &[Pattern, Pattern],
        SumRepeated::All,
    )
    .unwrap();
    let s = a.symmetrize(true).unwrap();
    assert_eq!(s.nnz(), 4);
    assert!(s.is_symmetric(true));
    let adj = a.to_real_adjacency_symmetrized().unwrap();
    assert_eq!(adj.get(2, 1), Some(1.0));
}

#[test]
fn two_triangles_are_two_components() {
    let edges = [(0, 1), (1, 2), (2, 0), (3, 4), (4, 5), (5, 3)];
    let irn: Vec<usize> = edges.iter().map(|e| e.0).collect();
    let jcn: Vec<usize> = edges.iter().map(|e| e.1).collect();
    let a = SparseMatrix::from_coordinate_arrays(6, 6, &irn, &jcn, &[1.0; 6], SumRepeated::All)
        .unwrap();
    let comps = a.weakly_connected_components().unwrap();
    assert_eq!(comps.len(), 2);
    assert!(!a.connected().unwrap());

    let sym = a.symmetrize(false).unwrap();
    let paths = sym.dijkstra(0).unwrap();
    assert!(!paths.complete);
    assert!(!paths.dist[4].is_reachable());
    assert!(paths.dist[2].is_reachable());

    let full = sym.distance_matrix(false).unwrap();
    let resolved = otter_sparse::resolve_unreachable(&full[0..6]);
    assert_eq!(resolved[3], 1.0 + otter_sparse::UNREACHABLE_PENALTY);
}
