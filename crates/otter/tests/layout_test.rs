use otter::stress::DirectedConstraints;
use otter::{Algorithm, LayoutReport, SpringElectricalOptions, StressOptions, layout};
use otter_sparse::{SparseMatrix, SumRepeated};

fn matrix(n: usize, edges: &[(usize, usize)], symmetric: bool) -> SparseMatrix<f64> {
    let irn: Vec<usize> = edges.iter().map(|e| e.0).collect();
    let jcn: Vec<usize> = edges.iter().map(|e| e.1).collect();
    let val = vec![1.0; edges.len()];
    let a =
        SparseMatrix::from_coordinate_arrays(n, n, &irn, &jcn, &val, SumRepeated::All).unwrap();
    if symmetric {
        a.symmetrize(false).unwrap()
    } else {
        a
    }
}

fn grid_edges(w: usize, h: usize) -> Vec<(usize, usize)> {
    let mut edges = Vec::new();
    for r in 0..h {
        for c in 0..w {
            let i = r * w + c;
            if c + 1 < w {
                edges.push((i, i + 1));
            }
            if r + 1 < h {
                edges.push((i, i + w));
            }
        }
    }
    edges
}

fn distance(x: &[f64], i: usize, j: usize) -> f64 {
    ((x[2 * i] - x[2 * j]).powi(2) + (x[2 * i + 1] - x[2 * j + 1]).powi(2)).sqrt()
}

fn mean_edge_length(x: &[f64], edges: &[(usize, usize)]) -> f64 {
    edges
        .iter()
        .map(|&(i, j)| distance(x, i, j))
        .sum::<f64>()
        / edges.len() as f64
}

#[test]
fn spring_electrical_lays_out_a_grid() {
    let edges = grid_edges(12, 12);
    let a = matrix(144, &edges, true);
    let mut x = vec![0.0; 288];
    let report = layout(&a, 2, &Algorithm::default(), &mut x).unwrap();
    let LayoutReport::Multilevel(report) = report else {
        panic!("expected a multilevel report");
    };
    assert!(report.levels > 1);
    assert!(report.iterations > 0);
    assert!(x.iter().all(|v| v.is_finite()));

    // Neighbours end up closer than the average pair.
    let mut all = 0.0;
    for i in 0..144 {
        for j in i + 1..144 {
            all += distance(&x, i, j);
        }
    }
    all /= (144 * 143 / 2) as f64;
    assert!(mean_edge_length(&x, &edges) < 0.5 * all);
}

#[test]
fn spring_electrical_is_reproducible() {
    let edges = grid_edges(6, 5);
    let a = matrix(30, &edges, true);
    let algo = Algorithm::SpringElectrical(SpringElectricalOptions {
        random_seed: 77,
        ..SpringElectricalOptions::default()
    });
    let run = || {
        let mut x = vec![0.0; 60];
        layout(&a, 2, &algo, &mut x).unwrap();
        x
    };
    assert_eq!(run(), run());
}

#[test]
fn directed_input_is_symmetrized_for_spring_electrical() {
    let edges: Vec<(usize, usize)> = (0..9).map(|i| (i, i + 1)).collect();
    let a = matrix(10, &edges, false);
    let mut x = vec![0.0; 20];
    layout(&a, 2, &Algorithm::default(), &mut x).unwrap();
    assert!(x.iter().all(|v| v.is_finite()));
}

#[test]
fn stress_honours_edge_lengths() {
    // A triangle with one long side.
    let irn = [0, 1, 0];
    let jcn = [1, 2, 2];
    let val = [1.0, 1.0, 1.5];
    let a = SparseMatrix::from_coordinate_arrays(3, 3, &irn, &jcn, &val, SumRepeated::All)
        .unwrap()
        .symmetrize(false)
        .unwrap();
    let mut x = vec![0.0; 6];
    let algo = Algorithm::Stress(StressOptions {
        epsilon: 1e-10,
        cg_tolerance: 1e-10,
        ..StressOptions::default()
    });
    let LayoutReport::Stress(report) = layout(&a, 2, &algo, &mut x).unwrap() else {
        panic!("expected a stress report");
    };
    assert!(report.final_stress().unwrap() < 1e-6);
    assert!((distance(&x, 0, 2) - 1.5).abs() < 1e-3, "{x:?}");
}

#[test]
fn cola_reads_matrix_entries_as_directed_edges() {
    let a = matrix(4, &[(0, 1), (1, 2), (1, 3)], false);
    let mut x = vec![0.0; 8];
    let algo = Algorithm::StressCola(StressOptions {
        directed_constraints: DirectedConstraints::Edges,
        edge_gap: 0.5,
        ..StressOptions::default()
    });
    layout(&a, 2, &algo, &mut x).unwrap();
    for (tail, head) in [(0, 1), (1, 2), (1, 3)] {
        assert!(x[2 * tail + 1] >= x[2 * head + 1] + 0.5 - 1e-6, "{x:?}");
    }
}

#[test]
fn hierarchy_reads_matrix_entries_as_directed_edges() {
    let a = matrix(3, &[(0, 1), (1, 2)], false);
    let mut x = vec![0.0; 6];
    let algo = Algorithm::StressHierarchy(StressOptions {
        levels_gap: 0.5,
        ..StressOptions::default()
    });
    layout(&a, 2, &algo, &mut x).unwrap();
    assert!(x[1] >= x[3] + 0.5 - 1e-6 && x[3] >= x[5] + 0.5 - 1e-6, "{x:?}");
}

#[test]
fn non_square_matrix_is_rejected() {
    let a = SparseMatrix::<f64>::zeros(3, 4);
    let mut x = vec![0.0; 6];
    for algo in [
        Algorithm::default(),
        Algorithm::Stress(StressOptions::default()),
        Algorithm::StressCola(StressOptions::default()),
    ] {
        assert!(layout(&a, 2, &algo, &mut x).is_err(), "{algo:?}");
    }
}

#[test]
fn options_deserialize_from_partial_json() {
    let algo: Algorithm = serde_json::from_str(
        r#"{ "algorithm": "stress_cola", "maxiter": 50, "edge_gap": 2.0,
             "directed_constraints": "levels", "model": "circuit" }"#,
    )
    .unwrap();
    let Algorithm::StressCola(opts) = &algo else {
        panic!("wrong variant: {algo:?}");
    };
    assert_eq!(opts.maxiter, 50);
    assert_eq!(opts.edge_gap, 2.0);
    assert_eq!(opts.directed_constraints, DirectedConstraints::Levels);
    assert_eq!(opts.model, otter::DistanceModel::Circuit);
    assert_eq!(opts.random_seed, 123);

    let algo: Algorithm = serde_json::from_str(
        r#"{ "algorithm": "spring_electrical", "coarsen_scheme": "independent_edge_set" }"#,
    )
    .unwrap();
    let Algorithm::SpringElectrical(opts) = algo else {
        panic!("wrong variant");
    };
    assert_eq!(opts.coarsen_scheme, otter::CoarsenScheme::IndependentEdgeSet);
    assert_eq!(opts.maxiter, SpringElectricalOptions::default().maxiter);
}

#[test]
fn options_round_trip_through_json() {
    let algo = Algorithm::StressHierarchy(StressOptions {
        pinned: vec![1, 4],
        levels_gap: 3.0,
        ..StressOptions::default()
    });
    let text = serde_json::to_string(&algo).unwrap();
    assert_eq!(serde_json::from_str::<Algorithm>(&text).unwrap(), algo);
}
