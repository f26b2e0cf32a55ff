//! Mutable clustering context shared by the segmentation stages

use ndarray::Array2;

/// Label of a pixel no cluster has claimed yet
pub const UNASSIGNED: i32 = -1;

/// Representative record of one cluster.
///
/// `row`/`col` are in pixel-index coordinates: pixel `(r, c)` sits at
/// `(r as f64, c as f64)`, so the centroid of a 2×2 block at the origin is
/// `(0.5, 0.5)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterCenter {
    /// Mean time series of the member pixels, one value per band
    pub series: Vec<f64>,
    pub row: f64,
    pub col: f64,
    /// Member pixels after the last update (0 right after initialization)
    pub count: usize,
}

impl ClusterCenter {
    /// Euclidean norm of the change between two records (series + position)
    pub fn shift(&self, other: &ClusterCenter) -> f64 {
        let series: f64 = self
            .series
            .iter()
            .zip(&other.series)
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        let dr = self.row - other.row;
        let dc = self.col - other.col;
        (series + dr * dr + dc * dc).sqrt()
    }
}

/// Fixed-size, index-addressed table of cluster records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterTable {
    centers: Vec<ClusterCenter>,
}

impl ClusterTable {
    pub fn new(centers: Vec<ClusterCenter>) -> Self {
        Self { centers }
    }

    pub fn len(&self) -> usize {
        self.centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ClusterCenter> {
        self.centers.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClusterCenter> {
        self.centers.iter()
    }

    pub fn as_slice(&self) -> &[ClusterCenter] {
        &self.centers
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [ClusterCenter] {
        &mut self.centers
    }
}

/// Row/column extent of a cluster's search window, upper bounds exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub row_min: usize,
    pub row_max: usize,
    pub col_min: usize,
    pub col_max: usize,
}

impl Window {
    /// Window of half-width `spacing` around a centroid, clamped to the raster
    pub fn around(row: f64, col: f64, spacing: usize, rows: usize, cols: usize) -> Self {
        let s = spacing as f64;
        let clamp = |center: f64, size: usize| -> (usize, usize) {
            let lo = (center - s).max(0.0).floor() as usize;
            let hi = ((center + s).min(size as f64).floor() as usize + 1).min(size);
            (lo.min(size), hi)
        };
        let (row_min, row_max) = clamp(row, rows);
        let (col_min, col_max) = clamp(col, cols);
        Self {
            row_min,
            row_max,
            col_min,
            col_max,
        }
    }

    pub fn rows(&self) -> usize {
        self.row_max.saturating_sub(self.row_min)
    }

    pub fn cols(&self) -> usize {
        self.col_max.saturating_sub(self.col_min)
    }

    pub fn is_empty(&self) -> bool {
        self.rows() == 0 || self.cols() == 0
    }
}

/// Combined distances from one cluster to every pixel of its window
#[derive(Debug, Clone)]
pub struct DistanceField {
    pub cluster: usize,
    pub window: Window,
    /// `window.rows() × window.cols()` distances, local coordinates
    pub values: Array2<f64>,
}

/// Everything the assignment and update stages read and write.
///
/// Invariant: `distances[(r, c)]` is the smallest distance offered to pixel
/// `(r, c)` so far and `labels[(r, c)]` the cluster that offered it. Equal
/// distances offered within one round resolve to the lower cluster index; a
/// distance carried over from an earlier round is only replaced by a strictly
/// smaller one.
#[derive(Debug, Clone)]
pub struct SegmentationState {
    pub clusters: ClusterTable,
    pub labels: Array2<i32>,
    pub distances: Array2<f64>,
    /// Half-width of the search window, in pixels (S)
    pub spacing: usize,
    round: u32,
    /// Round in which each pixel's distance was last written
    written: Array2<u32>,
}

impl SegmentationState {
    /// Fresh state: every pixel unassigned at infinite distance
    pub fn new(clusters: ClusterTable, spacing: usize, rows: usize, cols: usize) -> Self {
        Self {
            clusters,
            labels: Array2::from_elem((rows, cols), UNASSIGNED),
            distances: Array2::from_elem((rows, cols), f64::INFINITY),
            spacing,
            round: 0,
            written: Array2::zeros((rows, cols)),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.labels.dim()
    }

    /// Search window of cluster `index`
    pub fn window(&self, index: usize) -> Option<Window> {
        let (rows, cols) = self.shape();
        self.clusters
            .get(index)
            .map(|c| Window::around(c.row, c.col, self.spacing, rows, cols))
    }

    /// Start a new assignment round. Offers made from now on no longer tie
    /// with distances recorded in earlier rounds.
    pub fn begin_round(&mut self) {
        self.round += 1;
    }

    /// Record `distance` from `cluster` to pixel (row, col) if it beats the
    /// current best. Returns whether the pixel changed hands.
    pub fn offer(&mut self, row: usize, col: usize, distance: f64, cluster: usize) -> bool {
        let best = self.distances[(row, col)];
        let owner = self.labels[(row, col)];
        let cluster_label = cluster as i32;
        let same_round = self.written[(row, col)] == self.round;
        let wins = distance < best
            || (distance == best
                && same_round
                && owner != UNASSIGNED
                && cluster_label < owner);
        if wins {
            self.distances[(row, col)] = distance;
            self.labels[(row, col)] = cluster_label;
            self.written[(row, col)] = self.round;
        }
        wins
    }

    /// Fold a cluster's distance field into the shared arrays.
    /// Returns the number of pixels whose label changed.
    pub fn merge(&mut self, field: &DistanceField) -> usize {
        let w = field.window;
        let mut changed = 0;
        for ((u, v), &d) in field.values.indexed_iter() {
            let (r, c) = (w.row_min + u, w.col_min + v);
            let before = self.labels[(r, c)];
            if self.offer(r, c, d, field.cluster) && before != field.cluster as i32 {
                changed += 1;
            }
        }
        changed
    }

    /// Forget every distance recorded so far, keeping labels
    pub fn reset_distances(&mut self) {
        self.distances.fill(f64::INFINITY);
    }
}
