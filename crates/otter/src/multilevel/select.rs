//! Node selection for one coarsening step: which fine nodes collapse into which coarse node.
//!
//! Edge schemes emit disjoint clusters that cover every node. Vertex schemes pick a maximal
//! independent set whose members become the coarse nodes.

use otter_sparse::{BucketQueue, SparseMatrix, XorShift64Star};

/// Upper bound on how many fine nodes a leaf or supernode cluster may hold.
pub(crate) const MAX_CLUSTER_SIZE: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Selection {
    /// Disjoint groups covering all nodes; group `k` becomes coarse node `k`.
    Clusters(Vec<Vec<usize>>),
    /// `coarse[i]` is the coarse id of an independent-set node and `None` for the rest.
    VertexSet {
        coarse: Vec<Option<usize>>,
        count: usize,
    },
}

impl Selection {
    pub(crate) fn coarse_len(&self) -> usize {
        match self {
            Selection::Clusters(c) => c.len(),
            Selection::VertexSet { count, .. } => *count,
        }
    }
}

fn visit_order(n: usize, randomize: bool, rng: &mut XorShift64Star) -> Vec<usize> {
    if randomize {
        rng.permutation(n)
    } else {
        (0..n).collect()
    }
}

/// Turns a matching (`mate[i] == i` for unmatched nodes) into clusters numbered by their
/// smallest member.
fn matching_to_clusters(mate: &[usize]) -> Vec<Vec<usize>> {
    let mut done = vec![false; mate.len()];
    let mut clusters = Vec::new();
    for i in 0..mate.len() {
        if done[i] {
            continue;
        }
        done[i] = true;
        let m = mate[i];
        if m != i {
            done[m] = true;
            clusters.push(vec![i, m]);
        } else {
            clusters.push(vec![i]);
        }
    }
    clusters
}

/// Pairs each node with its first unmatched neighbour.
pub(crate) fn independent_edge_set(
    a: &SparseMatrix<f64>,
    randomize: bool,
    rng: &mut XorShift64Star,
) -> Selection {
    let n = a.nrows();
    let mut mate: Vec<usize> = (0..n).collect();
    for i in visit_order(n, randomize, rng) {
        if mate[i] != i {
            continue;
        }
        if let Some(&j) = a
            .row_indices(i)
            .iter()
            .find(|&&j| j != i && mate[j] == j)
        {
            mate[i] = j;
            mate[j] = i;
        }
    }
    Selection::Clusters(matching_to_clusters(&mate))
}

/// Strength of the edge `i -> j` for heaviest-edge matching.
fn edge_strength(a: &SparseMatrix<f64>, i: usize, j: usize, w: f64, scaled: bool) -> f64 {
    if scaled {
        w / a.degree(i).max(1) as f64 / a.degree(j).max(1) as f64
    } else {
        w
    }
}

/// Matches every still-unmatched node in `order` with its heaviest unmatched neighbour.
/// Ties go to the first neighbour in storage order.
fn heaviest_edge_pass(
    a: &SparseMatrix<f64>,
    order: &[usize],
    matched: &mut [bool],
    scaled: bool,
) -> Vec<Vec<usize>> {
    let mut pairs = Vec::new();
    for &i in order {
        if matched[i] {
            continue;
        }
        let mut best: Option<(usize, f64)> = None;
        for (j, w) in a.row(i) {
            if j == i || matched[j] {
                continue;
            }
            let s = edge_strength(a, i, j, w, scaled);
            if best.is_none_or(|(_, b)| s > b) {
                best = Some((j, s));
            }
        }
        if let Some((j, _)) = best {
            matched[i] = true;
            matched[j] = true;
            pairs.push(vec![i, j]);
        }
    }
    pairs
}

fn singletons(matched: &[bool], clusters: &mut Vec<Vec<usize>>) {
    clusters.extend(
        matched
            .iter()
            .enumerate()
            .filter(|&(_, m)| !m)
            .map(|(i, _)| vec![i]),
    );
}

pub(crate) fn heaviest_edge_per_node(
    a: &SparseMatrix<f64>,
    randomize: bool,
    scaled: bool,
    rng: &mut XorShift64Star,
) -> Selection {
    let n = a.nrows();
    let order = visit_order(n, randomize, rng);
    let mut matched = vec![false; n];
    let pairs = heaviest_edge_pass(a, &order, &mut matched, scaled);

    let mut mate: Vec<usize> = (0..n).collect();
    for p in &pairs {
        mate[p[0]] = p[1];
        mate[p[1]] = p[0];
    }
    Selection::Clusters(matching_to_clusters(&mate))
}

/// Groups every degree-one node with its neighbour and that neighbour's other leaves.
///
/// A hub with more than `MAX_CLUSTER_SIZE - 1` leaves gets a cluster of its own and its leaves
/// are chunked into groups of `MAX_CLUSTER_SIZE - 1`.
fn leaf_clusters(a: &SparseMatrix<f64>, order: &[usize], matched: &mut [bool]) -> Vec<Vec<usize>> {
    let mut clusters = Vec::new();
    for &i in order {
        if matched[i] || a.degree(i) != 1 {
            continue;
        }
        let hub = a.row_indices(i)[0];
        if hub == i || matched[hub] {
            continue;
        }
        matched[hub] = true;
        let mut leaves = Vec::new();
        for &j in a.row_indices(hub) {
            if j != hub && !matched[j] && a.degree(j) == 1 {
                matched[j] = true;
                leaves.push(j);
            }
        }
        if leaves.len() < MAX_CLUSTER_SIZE {
            let mut c = Vec::with_capacity(leaves.len() + 1);
            c.push(hub);
            c.extend(leaves);
            clusters.push(c);
        } else {
            clusters.push(vec![hub]);
            clusters.extend(leaves.chunks(MAX_CLUSTER_SIZE - 1).map(<[usize]>::to_vec));
        }
    }
    clusters
}

pub(crate) fn leaves_first(
    a: &SparseMatrix<f64>,
    randomize: bool,
    rng: &mut XorShift64Star,
) -> Selection {
    let n = a.nrows();
    let order = visit_order(n, randomize, rng);
    let mut matched = vec![false; n];
    let mut clusters = leaf_clusters(a, &order, &mut matched);
    clusters.extend(heaviest_edge_pass(a, &order, &mut matched, false));
    singletons(&matched, &mut clusters);
    Selection::Clusters(clusters)
}

/// Nodes with identical neighbourhoods are merged first, at most `MAX_CLUSTER_SIZE` at a time.
pub(crate) fn supernodes_first(
    a: &SparseMatrix<f64>,
    randomize: bool,
    rng: &mut XorShift64Star,
) -> Selection {
    let n = a.nrows();
    let mut matched = vec![false; n];
    let mut clusters = Vec::new();
    for group in a.decompose_to_supervariables().groups() {
        if group.len() <= 1 {
            continue;
        }
        for chunk in group.chunks(MAX_CLUSTER_SIZE) {
            for &i in chunk {
                matched[i] = true;
            }
            clusters.push(chunk.to_vec());
        }
    }
    let order = visit_order(n, randomize, rng);
    clusters.extend(heaviest_edge_pass(a, &order, &mut matched, false));
    singletons(&matched, &mut clusters);
    Selection::Clusters(clusters)
}

/// Leaves first, then each node with up to `csize - 1` of its heaviest free neighbours.
/// Always visits nodes in random order.
pub(crate) fn cluster_leaves_first(
    a: &SparseMatrix<f64>,
    csize: usize,
    rng: &mut XorShift64Star,
) -> Selection {
    let n = a.nrows();
    let order = rng.permutation(n);
    let mut matched = vec![false; n];
    let mut clusters = leaf_clusters(a, &order, &mut matched);

    let mut candidates: Vec<(usize, f64)> = Vec::new();
    for &i in &order {
        if matched[i] {
            continue;
        }
        candidates.clear();
        candidates.extend(a.row(i).filter(|&(j, _)| j != i && !matched[j]));
        if candidates.is_empty() {
            continue;
        }
        candidates.sort_by(|x, y| y.1.total_cmp(&x.1));
        let mut c: Vec<usize> = candidates
            .iter()
            .take(csize.saturating_sub(1))
            .map(|&(j, _)| j)
            .collect();
        c.push(i);
        for &j in &c {
            matched[j] = true;
        }
        clusters.push(c);
    }
    singletons(&matched, &mut clusters);
    Selection::Clusters(clusters)
}

/// Greedy maximal independent set: an unassigned node joins, its neighbours are excluded.
pub(crate) fn independent_vertex_set(
    a: &SparseMatrix<f64>,
    randomize: bool,
    rng: &mut XorShift64Star,
) -> Selection {
    let n = a.nrows();
    let mut coarse: Vec<Option<usize>> = vec![None; n];
    let mut assigned = vec![false; n];
    let mut count = 0;
    for i in visit_order(n, randomize, rng) {
        if assigned[i] {
            continue;
        }
        assigned[i] = true;
        coarse[i] = Some(count);
        count += 1;
        for &j in a.row_indices(i) {
            if j != i {
                assigned[j] = true;
            }
        }
    }
    Selection::VertexSet { coarse, count }
}

/// Maximal independent set that repeatedly takes the node with the most unassigned neighbours.
///
/// Excluding a node raises the priority of its unassigned neighbours, so the set prefers nodes
/// that sit next to freshly excluded ones.
pub(crate) fn independent_vertex_set_rs(
    a: &SparseMatrix<f64>,
    randomize: bool,
    rng: &mut XorShift64Star,
) -> Selection {
    let n = a.nrows();
    let mut queue = BucketQueue::new(n);
    for i in visit_order(n, randomize, rng) {
        queue.push(i, a.degree(i));
    }
    let mut coarse: Vec<Option<usize>> = vec![None; n];
    let mut assigned = vec![false; n];
    let mut count = 0;
    while let Some((i, _)) = queue.pop_max() {
        assigned[i] = true;
        coarse[i] = Some(count);
        count += 1;
        for &j in a.row_indices(i) {
            if j == i || assigned[j] {
                continue;
            }
            assigned[j] = true;
            queue.remove(j);
            for &k in a.row_indices(j) {
                if k != j && !assigned[k] {
                    queue.increase(k, 1);
                }
            }
        }
    }
    Selection::VertexSet { coarse, count }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otter_sparse::SumRepeated;

    fn undirected(n: usize, edges: &[(usize, usize)]) -> SparseMatrix<f64> {
        let mut irn = Vec::new();
        let mut jcn = Vec::new();
        for &(i, j) in edges {
            irn.extend([i, j]);
            jcn.extend([j, i]);
        }
        let val = vec![1.0; irn.len()];
        SparseMatrix::from_coordinate_arrays(n, n, &irn, &jcn, &val, SumRepeated::All).unwrap()
    }

    fn covers_once(clusters: &[Vec<usize>], n: usize) -> bool {
        let mut seen = vec![0; n];
        for c in clusters {
            for &i in c {
                seen[i] += 1;
            }
        }
        seen.iter().all(|&s| s == 1)
    }

    #[test]
    fn star_hub_is_split_from_its_leaves() {
        let a = undirected(8, &[(0, 1), (0, 2), (0, 3), (0, 4), (0, 5), (0, 6), (0, 7)]);
        let mut rng = XorShift64Star::new(1);
        let Selection::Clusters(c) = leaves_first(&a, false, &mut rng) else {
            panic!("expected clusters");
        };
        assert_eq!(c, vec![vec![0], vec![1, 2, 3], vec![4, 5, 6], vec![7]]);
    }

    #[test]
    fn path_matching_is_deterministic_in_order() {
        let a = undirected(5, &[(0, 1), (1, 2), (2, 3), (3, 4)]);
        let mut rng = XorShift64Star::new(1);
        let s = independent_edge_set(&a, false, &mut rng);
        assert_eq!(
            s,
            Selection::Clusters(vec![vec![0, 1], vec![2, 3], vec![4]])
        );
    }

    #[test]
    fn heaviest_edge_wins() {
        let mut a = undirected(3, &[(0, 1), (0, 2)]);
        for (k, (i, j, _)) in a.triplets().collect::<Vec<_>>().into_iter().enumerate() {
            if (i, j) == (0, 2) || (i, j) == (2, 0) {
                a.values_mut()[k] = 5.0;
            }
        }
        let mut rng = XorShift64Star::new(1);
        let Selection::Clusters(c) = heaviest_edge_per_node(&a, false, false, &mut rng) else {
            panic!("expected clusters");
        };
        assert_eq!(c, vec![vec![0, 2], vec![1]]);
    }

    #[test]
    fn vertex_sets_are_independent_and_maximal() {
        let mut rng = XorShift64Star::new(7);
        let edges: Vec<(usize, usize)> = (0..30).map(|i| (i, (i * 7 + 3) % 31)).collect();
        let a = undirected(31, &edges);
        for s in [
            independent_vertex_set(&a, true, &mut rng),
            independent_vertex_set_rs(&a, true, &mut rng),
        ] {
            let Selection::VertexSet { coarse, count } = s else {
                panic!("expected a vertex set");
            };
            assert_eq!(coarse.iter().flatten().count(), count);
            for (i, j, _) in a.triplets() {
                if i != j {
                    assert!(coarse[i].is_none() || coarse[j].is_none());
                }
            }
            for i in 0..31 {
                if coarse[i].is_none() {
                    assert!(a.row_indices(i).iter().any(|&j| coarse[j].is_some()));
                }
            }
        }
    }

    #[test]
    fn cluster_schemes_partition_the_nodes() {
        let mut rng = XorShift64Star::new(3);
        let edges: Vec<(usize, usize)> = (1..40).map(|i| (i, i / 3)).collect();
        let a = undirected(40, &edges);
        for s in [
            supernodes_first(&a, true, &mut rng),
            cluster_leaves_first(&a, MAX_CLUSTER_SIZE, &mut rng),
            leaves_first(&a, true, &mut rng),
        ] {
            let Selection::Clusters(c) = s else {
                panic!("expected clusters");
            };
            assert!(covers_once(&c, 40));
            assert!(c.iter().all(|g| g.len() <= MAX_CLUSTER_SIZE));
        }
    }
}
