//! Barnes-Hut space partition (a quadtree in 2D, an octree in 3D, `2^dim` children in general).
//!
//! The tree is rebuilt from scratch on every force evaluation. Cells live in one arena and refer
//! to their children by index; a cell is either internal (children, no points) or a leaf that
//! lists the points it holds. Leaves only hold more than one point once `max_level` is reached.

use crate::error::{Result, ensure_dim};
use crate::geometry::{MINDIST, distance, distance_cropped, point};

#[derive(Debug, Clone)]
struct Cell {
    center: Vec<f64>,
    /// Half the side length.
    width: f64,
    n: usize,
    total_weight: f64,
    average: Vec<f64>,
    children: Vec<Option<usize>>,
    points: Vec<usize>,
}

impl Cell {
    fn new(center: Vec<f64>, width: f64) -> Self {
        let dim = center.len();
        Self {
            center,
            width,
            n: 0,
            total_weight: 0.0,
            average: vec![0.0; dim],
            children: Vec::new(),
            points: Vec::new(),
        }
    }

    fn is_leaf(&self) -> bool {
        !self.points.is_empty()
    }
}

/// Aggregated far-field contributors for one query point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Supernodes {
    /// Row-major `len x dim` positions (a point, or a cell's centroid).
    pub centers: Vec<f64>,
    pub weights: Vec<f64>,
    pub distances: Vec<f64>,
    /// Number of cells visited.
    pub visits: usize,
}

impl Supernodes {
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Work done by one [`QuadTree::repulsive_force`] pass, each divided by the number of points.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RepulsionCounts {
    pub cell_cell: f64,
    pub point_point: f64,
    pub cells: f64,
}

/// Parameters of the repulsive force `w_i w_j KP (x_i - x_j) / |x_i - x_j|^(1 - p)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepulsionParams {
    /// Barnes-Hut opening threshold: two cells interact as wholes once
    /// `width_1 + width_2 < bh * dist`.
    pub bh: f64,
    pub p: f64,
    pub kp: f64,
}

impl RepulsionParams {
    #[inline]
    pub(crate) fn magnitude(&self, w: f64, dist: f64) -> f64 {
        if self.p == -1.0 {
            w * self.kp / (dist * dist)
        } else {
            w * self.kp / dist.powf(1.0 - self.p)
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuadTree {
    dim: usize,
    max_level: usize,
    cells: Vec<Cell>,
    coords: Vec<f64>,
    weights: Option<Vec<f64>>,
}

struct ForcePass<'a> {
    params: RepulsionParams,
    cell_force: &'a mut [f64],
    node_force: &'a mut [f64],
    counts: RepulsionCounts,
}

impl QuadTree {
    /// Builds a tree over the row-major `n x dim` points. `weights` defaults to unit weights.
    pub fn new_from_points(
        dim: usize,
        coords: &[f64],
        weights: Option<&[f64]>,
        max_level: usize,
    ) -> Result<Self> {
        ensure_dim(dim)?;
        let n = coords.len() / dim;
        crate::error::ensure_coords(n, dim, coords)?;
        if let Some(w) = weights {
            if w.len() != n {
                return Err(otter_sparse::Error::LengthMismatch {
                    what: "node weights",
                    expected: n,
                    actual: w.len(),
                }
                .into());
            }
        }

        let bb = crate::geometry::bounding_box(coords, dim);
        let (center, width) = if n == 0 {
            (vec![0.0; dim], 1.0)
        } else {
            let extent = bb.iter().fold(0.0_f64, |m, (lo, hi)| m.max(hi - lo));
            let center = bb.iter().map(|(lo, hi)| (lo + hi) * 0.5).collect();
            let width = extent * 0.52;
            (center, if width > 0.0 { width } else { 1.0 })
        };

        let mut qt = Self {
            dim,
            max_level,
            cells: vec![Cell::new(center, width)],
            coords: coords.to_vec(),
            weights: weights.map(<[f64]>::to_vec),
        };
        for i in 0..n {
            qt.insert(0, i, 0);
        }
        Ok(qt)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn max_level(&self) -> usize {
        self.max_level
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.cells[0].n
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn total_weight(&self) -> f64 {
        self.cells[0].total_weight
    }

    /// Centroid of all points. Weights only enter through [`QuadTree::total_weight`].
    pub fn average(&self) -> &[f64] {
        &self.cells[0].average
    }

    fn weight(&self, i: usize) -> f64 {
        self.weights.as_ref().map_or(1.0, |w| w[i])
    }

    fn quadrant(center: &[f64], coord: &[f64]) -> usize {
        let mut d = 0;
        for k in (0..center.len()).rev() {
            d = 2 * d + usize::from(coord[k] - center[k] >= 0.0);
        }
        d
    }

    fn insert(&mut self, cell: usize, id: usize, level: usize) {
        let dim = self.dim;
        let weight = self.weight(id);
        let coord = &self.coords[id * dim..(id + 1) * dim];
        let c = &mut self.cells[cell];

        if c.n == 0 {
            c.n = 1;
            c.total_weight = weight;
            c.average.copy_from_slice(coord);
            c.points.push(id);
            return;
        }

        let n = c.n as f64;
        c.total_weight += weight;
        for (a, &v) in c.average.iter_mut().zip(coord) {
            *a = (*a * n + v) / (n + 1.0);
        }
        c.n += 1;

        if level >= self.max_level {
            c.points.push(id);
            return;
        }

        if c.children.is_empty() {
            c.children = vec![None; 1 << dim];
        }
        let displaced = std::mem::take(&mut c.points);
        self.insert_into_child(cell, id, level);
        for old in displaced {
            self.insert_into_child(cell, old, level);
        }
    }

    fn insert_into_child(&mut self, cell: usize, id: usize, level: usize) {
        let dim = self.dim;
        let q = Self::quadrant(&self.cells[cell].center, point(&self.coords, dim, id));
        let child = match self.cells[cell].children[q] {
            Some(c) => c,
            None => {
                let parent = &self.cells[cell];
                let width = parent.width / 2.0;
                let center = (0..dim)
                    .map(|k| {
                        if (q >> k) & 1 == 1 {
                            parent.center[k] + width
                        } else {
                            parent.center[k] - width
                        }
                    })
                    .collect();
                self.cells.push(Cell::new(center, width));
                let c = self.cells.len() - 1;
                self.cells[cell].children[q] = Some(c);
                c
            }
        };
        self.insert(child, id, level + 1);
    }

    /// Collects the points and aggregated cells that stand in for the whole point set when
    /// computing forces on `target`. Point `exclude` (usually the query node) is skipped.
    pub fn supernodes(&self, bh: f64, target: &[f64], exclude: Option<usize>) -> Supernodes {
        let mut out = Supernodes::default();
        if !self.is_empty() {
            self.supernodes_from(0, bh, target, exclude, &mut out);
        }
        out
    }

    fn supernodes_from(
        &self,
        cell: usize,
        bh: f64,
        target: &[f64],
        exclude: Option<usize>,
        out: &mut Supernodes,
    ) {
        out.visits += 1;
        let c = &self.cells[cell];
        for &i in &c.points {
            if Some(i) == exclude {
                continue;
            }
            let coord = point(&self.coords, self.dim, i);
            out.centers.extend_from_slice(coord);
            out.weights.push(self.weight(i));
            out.distances.push(distance(target, coord));
        }
        if c.children.is_empty() {
            return;
        }
        if c.width < bh * distance(&c.center, target) {
            out.centers.extend_from_slice(&c.average);
            out.weights.push(c.total_weight);
            out.distances.push(distance(&c.average, target));
        } else {
            for child in c.children.iter().flatten() {
                self.supernodes_from(*child, bh, target, exclude, out);
            }
        }
    }

    /// Approximate repulsive force on every point, row-major `n x dim`.
    ///
    /// Well separated cell pairs interact through their centroids; the accumulated cell forces
    /// are then pushed down to the points in proportion to their weight.
    pub fn repulsive_force(&self, params: RepulsionParams) -> (Vec<f64>, RepulsionCounts) {
        let n = self.len();
        let mut node_force = vec![0.0; n * self.dim];
        if n == 0 {
            return (node_force, RepulsionCounts::default());
        }
        let mut cell_force = vec![0.0; self.cells.len() * self.dim];
        let mut pass = ForcePass {
            params,
            cell_force: &mut cell_force,
            node_force: &mut node_force,
            counts: RepulsionCounts::default(),
        };
        self.interact(0, 0, &mut pass);
        self.accumulate(0, &mut pass);

        let mut counts = pass.counts;
        counts.cell_cell /= n as f64;
        counts.point_point /= n as f64;
        counts.cells /= n as f64;
        (node_force, counts)
    }

    fn interact(&self, a: usize, b: usize, pass: &mut ForcePass<'_>) {
        let dim = self.dim;
        let (c1, c2) = (&self.cells[a], &self.cells[b]);

        let dist = distance(&c1.average, &c2.average);
        if c1.width + c2.width < pass.params.bh * dist {
            pass.counts.cell_cell += 1.0;
            let dist = dist.max(MINDIST);
            let f = pass.params.magnitude(c1.total_weight * c2.total_weight, dist);
            for k in 0..dim {
                let fk = f * (c1.average[k] - c2.average[k]);
                pass.cell_force[a * dim + k] += fk;
                pass.cell_force[b * dim + k] -= fk;
            }
            return;
        }

        if c1.is_leaf() && c2.is_leaf() {
            for &i in &c1.points {
                let wi = self.weight(i);
                for &j in &c2.points {
                    if i == j || (a == b && j < i) {
                        continue;
                    }
                    pass.counts.point_point += 1.0;
                    let dist = distance_cropped(&self.coords, dim, i, j);
                    let f = pass.params.magnitude(wi * self.weight(j), dist);
                    for k in 0..dim {
                        let fk = f * (self.coords[i * dim + k] - self.coords[j * dim + k]);
                        pass.node_force[i * dim + k] += fk;
                        pass.node_force[j * dim + k] -= fk;
                    }
                }
            }
            return;
        }

        if a == b {
            let kids = &c1.children;
            for (s, ka) in kids.iter().enumerate() {
                let Some(ka) = *ka else { continue };
                for kb in kids[s..].iter().flatten() {
                    self.interact(ka, *kb, pass);
                }
            }
            return;
        }

        let split = if c1.width > c2.width && !c1.is_leaf() {
            (a, b)
        } else if c2.width > c1.width && !c2.is_leaf() {
            (b, a)
        } else if !c1.is_leaf() {
            (a, b)
        } else {
            (b, a)
        };
        for child in self.cells[split.0].children.iter().flatten() {
            self.interact(*child, split.1, pass);
        }
    }

    fn accumulate(&self, cell: usize, pass: &mut ForcePass<'_>) {
        let dim = self.dim;
        let c = &self.cells[cell];
        pass.counts.cells += 1.0;
        let wgt = c.total_weight;
        if wgt <= 0.0 {
            return;
        }
        let f: Vec<f64> = pass.cell_force[cell * dim..(cell + 1) * dim].to_vec();

        if c.is_leaf() {
            for &i in &c.points {
                let share = self.weight(i) / wgt;
                for k in 0..dim {
                    pass.node_force[i * dim + k] += share * f[k];
                }
            }
            return;
        }
        for &child in c.children.iter().flatten() {
            let share = self.cells[child].total_weight / wgt;
            for k in 0..dim {
                pass.cell_force[child * dim + k] += share * f[k];
            }
            self.accumulate(child, pass);
        }
    }

    /// Nearest stored point to `target`, with its distance.
    pub fn nearest_point(&self, target: &[f64]) -> Option<(usize, f64)> {
        if self.is_empty() {
            return None;
        }
        let mut best: Option<(usize, f64)> = None;
        self.nearest_from(0, target, true, &mut best);
        self.nearest_from(0, target, false, &mut best);
        best
    }

    fn nearest_from(
        &self,
        cell: usize,
        target: &[f64],
        tentative: bool,
        best: &mut Option<(usize, f64)>,
    ) {
        let c = &self.cells[cell];
        for &i in &c.points {
            let d = distance(target, point(&self.coords, self.dim, i));
            if best.is_none_or(|(_, m)| d < m) {
                *best = Some((i, d));
            }
        }
        if c.children.is_empty() {
            return;
        }
        if let Some((_, m)) = *best {
            let reach = (self.dim as f64).sqrt() * c.width;
            if distance(&c.center, target) - reach > m {
                return;
            }
        }
        if tentative {
            let closest = c.children.iter().flatten().min_by(|&&p, &&q| {
                let dp = distance(&self.cells[p].average, target);
                let dq = distance(&self.cells[q].average, target);
                dp.total_cmp(&dq)
            });
            if let Some(&child) = closest {
                self.nearest_from(child, target, true, best);
            }
        } else {
            for &child in c.children.iter().flatten() {
                self.nearest_from(child, target, false, best);
            }
        }
    }
}
