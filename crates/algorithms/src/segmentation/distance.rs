//! Spatio-temporal distance between a cluster and the pixels of its window
//!
//! ```text
//! D = sqrt( dtw(pixel, center) / m  +  ||(u, v) - (ic, jc)|| / S )
//! ```
//!
//! The temporal term tolerates lag between series of the same phenomenon;
//! the spatial term is the Euclidean distance to the centroid in window
//! coordinates. Larger compactness `m` favors spatially regular clusters.

use super::dtw::dtw_distance;
use super::state::{ClusterCenter, DistanceField, Window};
use crate::maybe_rayon::*;
use chronoseg_core::{Error, Result};
use ndarray::{s, Array2, ArrayView3};
use serde::{Deserialize, Serialize};

/// How the per-pixel alignments of a window are evaluated.
///
/// Every mode runs the same DTW on the same inputs, so all of them produce
/// bit-identical fields; they differ only in scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMode {
    /// Batch when built with the `parallel` feature, scalar otherwise
    #[default]
    Auto,
    /// Gather the window's series into one buffer and align them in parallel
    Batch,
    /// Align pixel by pixel in a nested loop
    Scalar,
}

impl DistanceMode {
    fn resolve(self) -> DistanceMode {
        match self {
            DistanceMode::Auto if cfg!(feature = "parallel") => DistanceMode::Batch,
            DistanceMode::Auto => DistanceMode::Scalar,
            other => other,
        }
    }
}

/// Combine a temporal and a spatial term into the final distance
#[inline]
pub fn combine(temporal: f64, spatial: f64, compactness: f64, spacing: f64) -> f64 {
    (temporal / compactness + spatial / spacing).sqrt()
}

/// Distance field of cluster `cluster` over `window`.
///
/// `stack` is the full (normalized) band × row × column array. Fails with
/// [`Error::DistanceComputation`] if the center's series length does not
/// match the band count.
pub fn distance_field(
    stack: ArrayView3<'_, f64>,
    center: &ClusterCenter,
    cluster: usize,
    window: Window,
    spacing: usize,
    compactness: f64,
    mode: DistanceMode,
) -> Result<DistanceField> {
    let bands = stack.len_of(ndarray::Axis(0));
    if center.series.len() != bands {
        return Err(Error::DistanceComputation {
            cluster,
            row: center.row.max(0.0) as usize,
            col: center.col.max(0.0) as usize,
            reason: format!(
                "center series has {} values, raster has {} bands",
                center.series.len(),
                bands
            ),
        });
    }

    let sub = stack.slice(s![.., window.row_min..window.row_max, window.col_min..window.col_max]);
    let (h, w) = (window.rows(), window.cols());
    let ic = center.row - window.row_min as f64;
    let jc = center.col - window.col_min as f64;
    let spacing = spacing as f64;
    let reference = center.series.as_slice();

    let spatial = |u: usize, v: usize| -> f64 {
        let du = u as f64 - ic;
        let dv = v as f64 - jc;
        (du * du + dv * dv).sqrt()
    };

    let values = match mode.resolve() {
        DistanceMode::Batch => {
            // pixel-major copy: one contiguous series per pixel
            let linear: Vec<f64> = sub.permuted_axes([1, 2, 0]).iter().copied().collect();
            let temporal: Vec<f64> = if bands == 0 {
                vec![0.0; h * w]
            } else {
                linear
                    .par_chunks(bands)
                    .map(|series| dtw_distance(series, reference))
                    .collect()
            };
            Array2::from_shape_fn((h, w), |(u, v)| {
                combine(temporal[u * w + v], spatial(u, v), compactness, spacing)
            })
        }
        _ => {
            let mut values = Array2::zeros((h, w));
            let mut series = vec![0.0; bands];
            for u in 0..h {
                for v in 0..w {
                    for (b, slot) in series.iter_mut().enumerate() {
                        *slot = sub[(b, u, v)];
                    }
                    let temporal = dtw_distance(&series, reference);
                    values[(u, v)] = combine(temporal, spatial(u, v), compactness, spacing);
                }
            }
            values
        }
    };

    Ok(DistanceField {
        cluster,
        window,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array3;

    fn ramp_stack() -> Array3<f64> {
        Array3::from_shape_fn((5, 7, 6), |(b, r, c)| {
            ((b as f64) * 0.3 + (r as f64) * 0.11 + (c as f64) * 0.07).sin().abs()
        })
    }

    fn center_at(stack: &Array3<f64>, row: usize, col: usize) -> ClusterCenter {
        ClusterCenter {
            series: stack.slice(s![.., row, col]).to_vec(),
            row: row as f64,
            col: col as f64,
            count: 0,
        }
    }

    #[test]
    fn test_batch_and_scalar_agree() {
        let stack = ramp_stack();
        let center = center_at(&stack, 3, 2);
        let window = Window::around(3.0, 2.0, 2, 7, 6);

        let batch =
            distance_field(stack.view(), &center, 0, window, 2, 0.7, DistanceMode::Batch).unwrap();
        let scalar =
            distance_field(stack.view(), &center, 0, window, 2, 0.7, DistanceMode::Scalar).unwrap();

        assert_eq!(batch.values.dim(), (window.rows(), window.cols()));
        for (a, b) in batch.values.iter().zip(scalar.values.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_center_pixel_is_zero() {
        let stack = ramp_stack();
        let center = center_at(&stack, 3, 2);
        let window = Window::around(3.0, 2.0, 2, 7, 6);
        let field =
            distance_field(stack.view(), &center, 0, window, 2, 1.0, DistanceMode::Scalar).unwrap();
        assert_eq!(field.values[(3 - window.row_min, 2 - window.col_min)], 0.0);
    }

    #[test]
    fn test_constant_series_is_purely_spatial() {
        let stack = Array3::from_elem((3, 5, 5), 0.4);
        let center = center_at(&stack, 2, 2);
        let window = Window::around(2.0, 2.0, 4, 5, 5);
        let field =
            distance_field(stack.view(), &center, 0, window, 4, 1.0, DistanceMode::Auto).unwrap();

        // pixel (2, 4): two columns away
        assert_relative_eq!(field.values[(2, 4)], (2.0_f64 / 4.0).sqrt(), epsilon = 1e-12);
        // pixel (0, 0): diagonal
        assert_relative_eq!(
            field.values[(0, 0)],
            (8.0_f64.sqrt() / 4.0).sqrt(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_compactness_scales_temporal_term() {
        let mut stack = Array3::from_elem((2, 1, 2), 0.0);
        stack[(0, 0, 1)] = 1.0;
        let center = center_at(&stack, 0, 0);
        let window = Window::around(0.0, 0.0, 1, 1, 2);

        let loose =
            distance_field(stack.view(), &center, 0, window, 1, 1.0, DistanceMode::Scalar).unwrap();
        let tight =
            distance_field(stack.view(), &center, 0, window, 1, 4.0, DistanceMode::Scalar).unwrap();

        // dtw = 1, spatial = 1
        assert_relative_eq!(loose.values[(0, 1)], 2f64.sqrt());
        assert_relative_eq!(tight.values[(0, 1)], 1.25f64.sqrt());
    }

    #[test]
    fn test_series_length_mismatch_is_fatal() {
        let stack = ramp_stack();
        let mut center = center_at(&stack, 1, 1);
        center.series.pop();
        let window = Window::around(1.0, 1.0, 2, 7, 6);
        let err = distance_field(stack.view(), &center, 7, window, 2, 1.0, DistanceMode::Batch)
            .unwrap_err();
        assert!(matches!(err, Error::DistanceComputation { cluster: 7, .. }));
    }
}
