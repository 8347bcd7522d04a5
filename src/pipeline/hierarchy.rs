//! Complete-linkage agglomerative clustering and flat cuts.
//!
//! # Algorithm Overview
//!
//! 1. **Distance matrix**: condensed upper triangle of pairwise distances
//! 2. **Agglomeration**: nearest-neighbour chain with the complete-linkage
//!    update `d(k, a ∪ b) = max(d(k, a), d(k, b))`, O(n²) time and memory
//! 3. **Cut**: union every merge whose height is at or below the threshold
//!
//! Complete linkage propagates the maximum, so a single
//! [`NEVER_MERGE`](super::distance::NEVER_MERGE) pair anywhere inside two
//! clusters keeps those clusters apart at every finite threshold.

use tracing::trace;

use crate::error::ClusteringError;
use crate::schema::Point;

use super::distance::DistanceMetric;

/// Symmetric pairwise distances stored as the condensed upper triangle.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    size: usize,
    values: Vec<f64>,
}

impl DistanceMatrix {
    #[must_use]
    pub fn build(points: &[Point], metric: &dyn DistanceMetric) -> Self {
        let size = points.len();
        let mut values = Vec::with_capacity(size * size.saturating_sub(1) / 2);
        for (i, a) in points.iter().enumerate() {
            for b in &points[i + 1..] {
                values.push(metric.distance(a, b));
            }
        }
        Self { size, values }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Distance between points `i` and `j`. The diagonal is zero.
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        if i == j {
            return 0.0;
        }
        self.values[self.index(i, j)]
    }

    fn set(&mut self, i: usize, j: usize, value: f64) {
        let index = self.index(i, j);
        self.values[index] = value;
    }

    fn index(&self, i: usize, j: usize) -> usize {
        let (i, j) = if i < j { (i, j) } else { (j, i) };
        // Row i starts after the rows above it: sum of (n - 1 - r) for r < i.
        i * (2 * self.size - i - 1) / 2 + (j - i - 1)
    }
}

/// One internal dendrogram node. Leaves are `0..n`, the node created by the
/// `k`-th merge is `n + k`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    pub distance: f64,
    pub size: usize,
}

/// Merge tree over a point set, ordered by non-decreasing height.
#[derive(Debug, Clone)]
pub struct Dendrogram {
    leaves: usize,
    merges: Vec<Merge>,
}

impl Dendrogram {
    /// Runs complete-linkage agglomeration over `matrix`.
    ///
    /// # Errors
    /// Returns [`ClusteringError::InsufficientData`] for fewer than two points.
    pub fn build(matrix: DistanceMatrix) -> Result<Self, ClusteringError> {
        let leaves = matrix.len();
        if leaves < 2 {
            return Err(ClusteringError::InsufficientData { points: leaves });
        }

        let mut raw = nn_chain(matrix);
        // Stable sort keeps chain order for equal heights, so runs are reproducible.
        raw.sort_by(|a, b| a.2.total_cmp(&b.2));

        Ok(Self {
            leaves,
            merges: label_merges(leaves, &raw),
        })
    }

    #[must_use]
    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    /// Flat clusters: two leaves share a cluster iff they are joined at a
    /// height `<= threshold`. Ids are dense and start at 1, numbered by the
    /// first leaf of each cluster.
    #[must_use]
    pub fn cut(&self, threshold: f64) -> ClusterAssignment {
        let mut sets = DisjointSet::new(self.leaves);
        // Any leaf below a node stands in for the whole subtree.
        let mut representative: Vec<usize> = (0..self.leaves).collect();

        for merge in &self.merges {
            let left = representative[merge.left];
            let right = representative[merge.right];
            if merge.distance <= threshold {
                sets.union(left, right);
            }
            representative.push(left);
        }

        let mut ids = vec![0_u32; self.leaves];
        let mut root_ids: Vec<Option<u32>> = vec![None; self.leaves];
        let mut next = 0_u32;
        for (leaf, id) in ids.iter_mut().enumerate() {
            let root = sets.find(leaf);
            *id = *root_ids[root].get_or_insert_with(|| {
                next += 1;
                next
            });
        }

        ClusterAssignment { ids }
    }
}

/// Cluster-local id per point, aligned with the input order. Ids are `1..=k`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterAssignment {
    ids: Vec<u32>,
}

impl ClusterAssignment {
    #[must_use]
    pub fn empty() -> Self {
        Self { ids: Vec::new() }
    }

    #[must_use]
    pub fn singleton() -> Self {
        Self { ids: vec![1] }
    }

    #[cfg(test)]
    pub(crate) fn from_ids(ids: Vec<u32>) -> Self {
        Self { ids }
    }

    #[must_use]
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of distinct clusters.
    #[must_use]
    pub fn cluster_count(&self) -> usize {
        self.ids.iter().copied().max().unwrap_or(0) as usize
    }
}

/// Builds and cuts the dendrogram for one category.
#[derive(Debug, Clone, Copy, Default)]
pub struct Clusterer;

impl Clusterer {
    /// Partitions `points` into flat clusters at `threshold` kilometers.
    ///
    /// # Errors
    /// Only fails if dendrogram construction does, which the size dispatch
    /// below rules out.
    pub fn cluster(
        &self,
        points: &[Point],
        metric: &dyn DistanceMetric,
        threshold: f64,
    ) -> Result<ClusterAssignment, ClusteringError> {
        match points.len() {
            0 => Ok(ClusterAssignment::empty()),
            1 => Ok(ClusterAssignment::singleton()),
            n => {
                let dendrogram = Dendrogram::build(DistanceMatrix::build(points, metric))?;
                let assignment = dendrogram.cut(threshold);
                trace!(
                    points = n,
                    clusters = assignment.cluster_count(),
                    threshold_km = threshold,
                    "dendrogram cut"
                );
                Ok(assignment)
            }
        }
    }
}

/// Nearest-neighbour chain. Returns `(a, b, height)` with `a`, `b` the leaf
/// slots that represented the merged clusters at the time of the merge.
fn nn_chain(mut matrix: DistanceMatrix) -> Vec<(usize, usize, f64)> {
    let n = matrix.len();
    let mut active = vec![true; n];
    let mut chain: Vec<usize> = Vec::with_capacity(n);
    let mut merges = Vec::with_capacity(n - 1);

    'merging: while merges.len() < n - 1 {
        if chain.is_empty() {
            if let Some(first) = active.iter().position(|alive| *alive) {
                chain.push(first);
            }
        }

        let (a, b, height) = loop {
            let x = chain[chain.len() - 1];
            let previous = chain.len().checked_sub(2).map(|i| chain[i]);

            // Prefer the previous chain element on ties so the chain terminates.
            let mut best = previous;
            let mut best_distance = previous.map_or(f64::INFINITY, |p| matrix.get(x, p));
            for (candidate, alive) in active.iter().enumerate() {
                if !*alive || candidate == x {
                    continue;
                }
                let distance = matrix.get(x, candidate);
                if distance < best_distance {
                    best = Some(candidate);
                    best_distance = distance;
                }
            }

            // Two clusters stay active while merges remain.
            let Some(y) = best else {
                break 'merging;
            };
            if Some(y) == previous {
                chain.truncate(chain.len() - 2);
                break (x, y, best_distance);
            }
            chain.push(y);
        };

        // Keep the merged cluster in slot `b`, retire slot `a`.
        for k in 0..n {
            if active[k] && k != a && k != b {
                let merged = matrix.get(a, k).max(matrix.get(b, k));
                matrix.set(b, k, merged);
            }
        }
        active[a] = false;
        merges.push((a, b, height));
    }

    merges
}

/// Converts slot-based merges into dendrogram node ids.
fn label_merges(leaves: usize, raw: &[(usize, usize, f64)]) -> Vec<Merge> {
    let mut sets = DisjointSet::new(leaves);
    // Node id currently standing for each set root.
    let mut node_of_root: Vec<usize> = (0..leaves).collect();
    let mut size_of_root = vec![1_usize; leaves];

    raw.iter()
        .enumerate()
        .map(|(step, &(a, b, distance))| {
            let root_a = sets.find(a);
            let root_b = sets.find(b);
            let (left, right) = {
                let (na, nb) = (node_of_root[root_a], node_of_root[root_b]);
                if na < nb { (na, nb) } else { (nb, na) }
            };
            let size = size_of_root[root_a] + size_of_root[root_b];
            let root = sets.union(root_a, root_b);
            node_of_root[root] = leaves + step;
            size_of_root[root] = size;
            Merge {
                left,
                right,
                distance,
                size,
            }
        })
        .collect()
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Joins the two sets and returns the surviving root.
    fn union(&mut self, a: usize, b: usize) -> usize {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            self.parent[root_b] = root_a;
        }
        root_a
    }
}
