use otter::LayoutContext;
use otter::quadtree::{QuadTree, RepulsionParams};

fn random_points(n: usize, dim: usize, seed: u64) -> Vec<f64> {
    let mut ctx = LayoutContext::new(seed);
    let mut x = vec![0.0; n * dim];
    ctx.fill_uniform(&mut x);
    x
}

/// `KP (x_i - x_j) / |x_i - x_j|^(1 - p)` summed over every other point.
fn brute_force(x: &[f64], dim: usize, params: RepulsionParams) -> Vec<f64> {
    let n = x.len() / dim;
    let mut f = vec![0.0; n * dim];
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            let dist = (0..dim)
                .map(|k| (x[i * dim + k] - x[j * dim + k]).powi(2))
                .sum::<f64>()
                .sqrt();
            let m = params.kp / dist.powf(1.0 - params.p);
            for k in 0..dim {
                f[i * dim + k] += m * (x[i * dim + k] - x[j * dim + k]);
            }
        }
    }
    f
}

fn assert_close(a: &[f64], b: &[f64]) {
    assert_eq!(a.len(), b.len());
    for (u, v) in a.iter().zip(b) {
        assert!((u - v).abs() <= 1e-9 * v.abs().max(1.0), "{u} vs {v}");
    }
}

#[test]
fn zero_threshold_matches_brute_force_in_2d() {
    let x = random_points(20, 2, 5);
    let params = RepulsionParams {
        bh: 0.0,
        p: -1.0,
        kp: 0.7,
    };
    let qt = QuadTree::new_from_points(2, &x, None, 10).unwrap();
    let (f, counts) = qt.repulsive_force(params);
    assert_eq!(counts.cell_cell, 0.0);
    assert_close(&f, &brute_force(&x, 2, params));
}

#[test]
fn zero_threshold_matches_brute_force_in_3d_with_other_exponent() {
    let x = random_points(17, 3, 9);
    let params = RepulsionParams {
        bh: 0.0,
        p: -1.8,
        kp: 1.3,
    };
    let qt = QuadTree::new_from_points(3, &x, None, 10).unwrap();
    let (f, _) = qt.repulsive_force(params);
    assert_close(&f, &brute_force(&x, 3, params));
}

#[test]
fn barnes_hut_stays_near_the_exact_force() {
    let x = random_points(200, 2, 21);
    let exact = brute_force(
        &x,
        2,
        RepulsionParams {
            bh: 0.0,
            p: -1.0,
            kp: 1.0,
        },
    );
    let qt = QuadTree::new_from_points(2, &x, None, 10).unwrap();
    let (f, counts) = qt.repulsive_force(RepulsionParams {
        bh: 0.6,
        p: -1.0,
        kp: 1.0,
    });
    assert!(counts.cell_cell > 0.0);
    let err: f64 = f.iter().zip(&exact).map(|(a, b)| (a - b).powi(2)).sum();
    let norm: f64 = exact.iter().map(|b| b * b).sum();
    assert!(err.sqrt() < 0.1 * norm.sqrt(), "relative error {}", (err / norm).sqrt());
}

#[test]
fn forces_sum_to_zero() {
    let x = random_points(50, 2, 3);
    let qt = QuadTree::new_from_points(2, &x, None, 10).unwrap();
    let (f, _) = qt.repulsive_force(RepulsionParams {
        bh: 0.6,
        p: -1.0,
        kp: 1.0,
    });
    let sx: f64 = f.iter().step_by(2).sum();
    let sy: f64 = f.iter().skip(1).step_by(2).sum();
    let scale: f64 = f.iter().map(|v| v.abs()).sum();
    assert!(sx.abs() < 1e-9 * scale && sy.abs() < 1e-9 * scale);
}
