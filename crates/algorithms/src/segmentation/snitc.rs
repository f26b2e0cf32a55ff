//! Iterative local-search clustering of image time series
//!
//! Each round computes, for every cluster, the distance field over its
//! search window and folds it into the shared label/distance arrays, then
//! refreshes every cluster from its members. Rounds are barriers: the update
//! only runs once all assignments of the round are in.

use super::distance::{distance_field, DistanceMode};
use super::lattice::{initialize, Lattice};
use super::state::{ClusterTable, DistanceField, SegmentationState, Window};
use super::update::update_clusters;
use crate::maybe_rayon::*;
use chronoseg_core::{Error, Normalization, Raster, RasterStack, Result};
use ndarray::ArrayView3;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// What to do when a cluster ends a round without pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyClusterPolicy {
    /// Keep the previous center, report it and carry on
    #[default]
    Keep,
    /// Abort with [`Error::DegenerateCluster`]
    Fail,
}

/// Parameters for the time series superpixel segmentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnitcParams {
    /// Requested number of superpixels
    pub k: usize,
    /// Compactness m; larger values give more regular, less temporally driven clusters
    pub compactness: f64,
    /// Assignment/update rounds (default: 10)
    pub rounds: usize,
    pub lattice: Lattice,
    pub normalization: Normalization,
    pub empty_cluster: EmptyClusterPolicy,
    /// Stop early once the residual error drops below this value
    pub convergence: Option<f64>,
    /// Start every round from infinite distances instead of the previous
    /// round's best (default: false, distances carry over)
    pub reset_distances: bool,
    pub distance_mode: DistanceMode,
}

impl Default for SnitcParams {
    fn default() -> Self {
        Self {
            k: 100,
            compactness: 1.0,
            rounds: 10,
            lattice: Lattice::Hexagonal,
            normalization: Normalization::default(),
            empty_cluster: EmptyClusterPolicy::Keep,
            convergence: None,
            reset_distances: false,
            distance_mode: DistanceMode::Auto,
        }
    }
}

impl SnitcParams {
    /// Check ranges that do not depend on the raster
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(Error::invalid_parameter("k", self.k, "must be > 0"));
        }
        if !(self.compactness.is_finite() && self.compactness > 0.0) {
            return Err(Error::invalid_parameter(
                "compactness",
                self.compactness,
                "must be a finite value > 0",
            ));
        }
        if self.rounds == 0 {
            return Err(Error::invalid_parameter("rounds", self.rounds, "must be > 0"));
        }
        if let Some(threshold) = self.convergence {
            if threshold.is_nan() || threshold < 0.0 {
                return Err(Error::invalid_parameter(
                    "convergence",
                    threshold,
                    "must be >= 0",
                ));
            }
        }
        Ok(())
    }
}

/// Result of a segmentation run, before connectivity repair.
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// Cluster index per pixel, georeferenced like the input stack
    pub labels: Raster<i32>,
    /// Best combined distance per pixel
    pub distances: Raster<f64>,
    pub clusters: ClusterTable,
    /// Search half-width S in pixels
    pub spacing: usize,
    pub requested_k: usize,
    pub rounds_completed: usize,
    /// Whether the run stopped on the convergence threshold
    pub converged: bool,
    /// Residual error after each round
    pub residuals: Vec<f64>,
    /// (round, cluster) pairs that ended a round empty
    pub empty_clusters: Vec<(usize, usize)>,
}

/// Segment `stack` into spatially compact clusters of similar time series.
pub fn snitc(stack: &RasterStack, params: &SnitcParams) -> Result<Segmentation> {
    snitc_with_cancel(stack, params, &AtomicBool::new(false))
}

/// Like [`snitc`], checking `cancel` before every round.
///
/// Cancellation never yields a partial segmentation: the call returns
/// [`Error::Incomplete`] instead.
pub fn snitc_with_cancel(
    stack: &RasterStack,
    params: &SnitcParams,
    cancel: &AtomicBool,
) -> Result<Segmentation> {
    params.validate()?;

    let normalized = stack.normalized(params.normalization);
    let view = normalized.view();
    let mut state = initialize(&normalized, params.k, params.lattice)?;
    info!(
        "{:?} lattice: {} clusters (requested {}), spacing {}",
        params.lattice,
        state.clusters.len(),
        params.k,
        state.spacing
    );

    let mut residuals = Vec::with_capacity(params.rounds);
    let mut empty = Vec::new();
    let mut converged = false;

    for round in 0..params.rounds {
        if cancel.load(Ordering::Relaxed) {
            return Err(Error::Incomplete {
                completed: round,
                requested: params.rounds,
            });
        }

        if params.reset_distances {
            state.reset_distances();
        }
        let changed = assignment_round(view, &mut state, params.compactness, params.distance_mode)?;

        let report = update_clusters(view, &state.labels, &mut state.clusters);
        for &cluster in &report.empty_clusters {
            if params.empty_cluster == EmptyClusterPolicy::Fail {
                return Err(Error::DegenerateCluster { cluster, round });
            }
            warn!("cluster {} has no pixels after round {}, keeping its previous center", cluster, round);
            empty.push((round, cluster));
        }

        debug!(
            "round {}: {} label changes, residual error {:.6}",
            round, changed, report.residual_error
        );
        residuals.push(report.residual_error);

        if params
            .convergence
            .is_some_and(|threshold| report.residual_error <= threshold)
        {
            converged = true;
            break;
        }
    }

    Ok(Segmentation {
        labels: normalized.raster_like(state.labels),
        distances: normalized.raster_like(state.distances),
        clusters: state.clusters,
        spacing: state.spacing,
        requested_k: params.k,
        rounds_completed: residuals.len(),
        converged,
        residuals,
        empty_clusters: empty,
    })
}

/// One assignment pass over every cluster.
///
/// Distance fields only read the cluster table, which is frozen for the
/// round, so they are computed in parallel; they are then folded into the
/// shared arrays in cluster order. Because ties within the round resolve to
/// the lower cluster index, the result equals a sequential pass in any
/// visiting order; a distance kept from an earlier round is only replaced by a
/// strictly smaller one.
/// Returns the number of label changes.
pub fn assignment_round(
    stack: ArrayView3<'_, f64>,
    state: &mut SegmentationState,
    compactness: f64,
    mode: DistanceMode,
) -> Result<usize> {
    let fields = distance_fields(stack, state, compactness, mode)?;
    state.begin_round();
    Ok(fields.iter().map(|field| state.merge(field)).sum())
}

/// Distance fields of every cluster against the current table
pub fn distance_fields(
    stack: ArrayView3<'_, f64>,
    state: &SegmentationState,
    compactness: f64,
    mode: DistanceMode,
) -> Result<Vec<DistanceField>> {
    let (rows, cols) = state.shape();
    let spacing = state.spacing;

    state
        .clusters
        .as_slice()
        .par_iter()
        .enumerate()
        .map(|(kk, center)| {
            let window = Window::around(center.row, center.col, spacing, rows, cols);
            distance_field(stack, center, kk, window, spacing, compactness, mode)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::state::UNASSIGNED;
    use ndarray::Array3;

    fn constant_stack(rows: usize, cols: usize) -> RasterStack {
        RasterStack::from_array(Array3::from_elem((1, rows, cols), 0.5))
    }

    #[test]
    fn test_quadrants_after_one_round() {
        let params = SnitcParams {
            k: 4,
            compactness: 1.0,
            rounds: 1,
            lattice: Lattice::Square,
            ..Default::default()
        };
        let seg = snitc(&constant_stack(4, 4), &params).unwrap();

        let expected = ndarray::array![[0, 0, 1, 1], [0, 0, 1, 1], [2, 2, 3, 3], [2, 2, 3, 3]];
        assert_eq!(seg.labels.data(), &expected);
        assert_eq!(seg.rounds_completed, 1);
        for c in seg.clusters.iter() {
            assert_eq!(c.count, 4);
        }
    }

    #[test]
    fn test_all_pixels_assigned() {
        let stack = RasterStack::from_array(Array3::from_shape_fn((4, 20, 24), |(b, r, c)| {
            let field = if c < 12 { b as f64 * 0.1 } else { 0.9 - b as f64 * 0.1 };
            field + (r % 3) as f64 * 0.01
        }));
        let seg = snitc(&stack, &SnitcParams { k: 12, ..Default::default() }).unwrap();
        assert!(seg.labels.data().iter().all(|&l| l != UNASSIGNED));
        assert!(seg.distances.data().iter().all(|d| d.is_finite()));
        assert_eq!(seg.residuals.len(), 10);
    }

    #[test]
    fn test_k_larger_than_raster_fails() {
        let params = SnitcParams { k: 17, ..Default::default() };
        assert!(matches!(
            snitc(&constant_stack(4, 4), &params),
            Err(Error::InvalidParameter { name: "k", .. })
        ));
    }

    #[test]
    fn test_invalid_compactness() {
        for m in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let params = SnitcParams { k: 2, compactness: m, ..Default::default() };
            assert!(matches!(
                params.validate(),
                Err(Error::InvalidParameter { name: "compactness", .. })
            ));
        }
    }

    #[test]
    fn test_cancelled_run_is_incomplete() {
        let cancel = AtomicBool::new(true);
        let params = SnitcParams { k: 4, ..Default::default() };
        let err = snitc_with_cancel(&constant_stack(8, 8), &params, &cancel).unwrap_err();
        assert!(matches!(err, Error::Incomplete { completed: 0, requested: 10 }));
    }

    #[test]
    fn test_convergence_stops_early() {
        let params = SnitcParams {
            k: 4,
            lattice: Lattice::Square,
            convergence: Some(1e-9),
            ..Default::default()
        };
        let seg = snitc(&constant_stack(4, 4), &params).unwrap();
        assert!(seg.converged);
        assert!(seg.rounds_completed < params.rounds);
    }

    #[test]
    fn test_modes_agree() {
        let stack = RasterStack::from_array(Array3::from_shape_fn((3, 12, 12), |(b, r, c)| {
            ((b * 7 + r * 3 + c * 5) % 11) as f64 / 11.0
        }));
        let base = SnitcParams { k: 9, rounds: 3, ..Default::default() };
        let batch = snitc(&stack, &SnitcParams { distance_mode: DistanceMode::Batch, ..base.clone() })
            .unwrap();
        let scalar = snitc(&stack, &SnitcParams { distance_mode: DistanceMode::Scalar, ..base })
            .unwrap();
        assert_eq!(batch.labels.data(), scalar.labels.data());
    }

    #[test]
    fn test_params_from_json() {
        let params: SnitcParams =
            serde_json::from_str(r#"{"k": 250, "compactness": 0.5, "lattice": "square"}"#).unwrap();
        assert_eq!(params.k, 250);
        assert_eq!(params.lattice, Lattice::Square);
        assert_eq!(params.rounds, 10);
    }
}
