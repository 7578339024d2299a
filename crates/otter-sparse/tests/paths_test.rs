use otter_sparse::paths::{
    bfs, compute_apsp, compute_apsp_artificial_weights, compute_apsp_packed, dijkstra,
    dijkstra_bounded,
};
use otter_sparse::{Distance, UNREACHABLE_PENALTY, VtxGraph, XorShift64Star};

fn random_graph(n: usize, m: usize, seed: u64) -> Vec<(usize, usize)> {
    let mut rng = XorShift64Star::new(seed);
    let mut edges: Vec<(usize, usize)> = (1..n).map(|i| (rng.next_usize(i), i)).collect();
    for _ in 0..m {
        edges.push((rng.next_usize(n), rng.next_usize(n)));
    }
    edges
}

#[test]
fn dijkstra_agrees_with_bfs_on_unit_lengths() {
    for seed in 1..8 {
        let g = VtxGraph::from_edges(30, &random_graph(30, 20, seed), None).unwrap();
        for source in [0, 7, 29] {
            assert_eq!(bfs(&g, source), dijkstra(&g, source));
        }
    }
}

#[test]
fn dijkstra_takes_the_short_way_round() {
    // 0 -5- 1, 0 -1- 2 -1- 1
    let g = VtxGraph::from_edges(3, &[(0, 1), (0, 2), (2, 1)], Some(&[5.0, 1.0, 1.0])).unwrap();
    assert_eq!(dijkstra(&g, 0)[1], Distance::Finite(2.0));
    let d = compute_apsp(&g);
    assert_eq!(d[(1, 0)], 2.0);
    assert_eq!(d[(0, 2)], 1.0);
}

#[test]
fn disconnected_pairs_get_the_penalty() {
    let edges = [(0, 1), (1, 2), (2, 0), (3, 4), (4, 5), (5, 3)];
    let g = VtxGraph::from_edges(6, &edges, None).unwrap();
    let d = bfs(&g, 0);
    assert_eq!(d[4], Distance::Unreachable);

    let apsp = compute_apsp(&g);
    assert_eq!(apsp[(0, 4)], 1.0 + UNREACHABLE_PENALTY);
    assert!(apsp.iter().all(|x| x.is_finite()));

    let packed = compute_apsp_packed(&g);
    assert_eq!(packed.get(4, 0), apsp[(0, 4)]);
    assert_eq!(packed.get(1, 2), 1.0);
}

#[test]
fn bounded_dijkstra_sees_only_the_neighbourhood() {
    let edges: Vec<(usize, usize)> = (0..9).map(|i| (i, i + 1)).collect();
    let g = VtxGraph::from_edges(10, &edges, Some(&[2.0; 9])).unwrap();
    let near = dijkstra_bounded(&g, 5, 1);
    let mut nodes: Vec<usize> = near.iter().map(|&(v, _)| v).collect();
    nodes.sort_unstable();
    assert_eq!(nodes, vec![4, 5, 6]);
    assert!(near.iter().all(|&(v, d)| d == if v == 5 { 0.0 } else { 2.0 }));
}

#[test]
fn artificial_weights_stretch_hub_edges() {
    // A star: every leaf-hub edge gets deg(hub) + 1.
    let edges = [(0, 1), (0, 2), (0, 3), (0, 4)];
    let g = VtxGraph::from_edges(5, &edges, None).unwrap();
    let d = compute_apsp_artificial_weights(&g).unwrap();
    assert_eq!(d[(0, 1)], 5.0);
    assert_eq!(d[(1, 2)], 10.0);
}
