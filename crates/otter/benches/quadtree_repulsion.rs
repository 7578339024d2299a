use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use otter::LayoutContext;
use otter::quadtree::{QuadTree, RepulsionParams};
use otter::stress::{StressOptions, stress_majorization_kd_mkernel};
use otter_sparse::VtxGraph;
use std::hint::black_box;
use std::time::Duration;

fn random_points(n: usize, seed: u64) -> Vec<f64> {
    let mut ctx = LayoutContext::new(seed);
    let mut x = vec![0.0; 2 * n];
    ctx.fill_uniform(&mut x);
    x
}

fn bench_repulsion(c: &mut Criterion) {
    let mut group = c.benchmark_group("quadtree_repulsion");
    group.measurement_time(Duration::from_secs(10));

    for n in [1_000usize, 10_000, 50_000] {
        let x = random_points(n, 42);
        group.bench_with_input(BenchmarkId::new("build", n), &n, |b, _| {
            b.iter(|| {
                black_box(QuadTree::new_from_points(2, black_box(&x), None, 10).expect("dim"))
            })
        });
        let qt = QuadTree::new_from_points(2, &x, None, 10).expect("dim");
        for bh in [0.6, 1.2] {
            let params = RepulsionParams {
                bh,
                p: -1.0,
                kp: 1.0,
            };
            group.bench_with_input(BenchmarkId::new(format!("force_bh{bh}"), n), &n, |b, _| {
                b.iter(|| black_box(qt.repulsive_force(black_box(params))))
            });
        }
    }

    group.finish();
}

fn bench_stress(c: &mut Criterion) {
    let mut group = c.benchmark_group("stress_majorization");
    group.sample_size(10);

    for side in [10usize, 20] {
        let n = side * side;
        let mut edges = Vec::new();
        for i in 0..n {
            if i % side + 1 < side {
                edges.push((i, i + 1));
            }
            if i + side < n {
                edges.push((i, i + side));
            }
        }
        let g = VtxGraph::from_edges(n, &edges, None).expect("valid edges");
        let opts = StressOptions {
            maxiter: 50,
            ..StressOptions::default()
        };
        group.bench_with_input(BenchmarkId::new("grid", n), &n, |b, _| {
            b.iter(|| {
                let mut x = vec![0.0; 2 * n];
                let mut ctx = LayoutContext::new(1);
                let report = stress_majorization_kd_mkernel(&mut ctx, &g, 2, &mut x, &opts);
                black_box(report.expect("layout"))
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_repulsion, bench_stress);
criterion_main!(benches);
