//! Initial cluster layout on a regular lattice
//!
//! Lattice positions are computed on the continuous pixel grid (pixel `r`
//! spans `[r, r + 1)`), then shifted by half a pixel into pixel-index
//! coordinates for the cluster table. Each center takes its initial series
//! from the pixel the position falls in.

use super::state::{ClusterCenter, ClusterTable, SegmentationState};
use chronoseg_core::{Error, RasterStack, Result};
use ndarray::{s, ArrayView3};
use serde::{Deserialize, Serialize};

const HEX_ROW_FACTOR: f64 = 0.866_025_403_784_438_6; // sqrt(3) / 2

/// Arrangement of the initial cluster centers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lattice {
    /// Rows of centers offset by half a spacing on alternate rows
    #[default]
    Hexagonal,
    /// Aligned rows and columns of centers
    Square,
}

/// Lay out roughly `k` centers over `stack` and build the initial state.
///
/// The lattice is fitted to the raster, so the number of clusters actually
/// created can differ from `k`; use `state.clusters.len()`.
pub fn initialize(stack: &RasterStack, k: usize, lattice: Lattice) -> Result<SegmentationState> {
    let (bands, rows, cols) = stack.shape();
    if rows == 0 || cols == 0 {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }
    if bands == 0 {
        return Err(Error::invalid_parameter("bands", 0, "the stack has no time steps"));
    }
    let n = rows * cols;
    if k == 0 || k > n {
        return Err(Error::invalid_parameter(
            "k",
            k,
            format!("must be between 1 and the pixel count ({})", n),
        ));
    }

    let (positions, spacing) = match lattice {
        Lattice::Hexagonal => hexagonal(rows, cols, k),
        Lattice::Square => square(rows, cols, k),
    };

    let view = stack.view();
    let centers = positions
        .into_iter()
        .map(|(r, c)| sample_center(view, r, c))
        .collect();

    Ok(SegmentationState::new(
        ClusterTable::new(centers),
        spacing,
        rows,
        cols,
    ))
}

fn sample_center(stack: ArrayView3<'_, f64>, r: f64, c: f64) -> ClusterCenter {
    let (_, rows, cols) = stack.dim();
    let pr = (r.floor().max(0.0) as usize).min(rows - 1);
    let pc = (c.floor().max(0.0) as usize).min(cols - 1);
    ClusterCenter {
        series: stack.slice(s![.., pr, pc]).to_vec(),
        row: r - 0.5,
        col: c - 0.5,
        count: 0,
    }
}

fn round_spacing(s: f64) -> usize {
    (s.round() as usize).max(1)
}

/// Hexagonal layout: spacing S chosen so hexagons of area `S² · √3/2` tile
/// the raster with about `k` cells, then snapped to an integer node count.
fn hexagonal(rows: usize, cols: usize, k: usize) -> (Vec<(f64, f64)>, usize) {
    let (rows_f, cols_f) = (rows as f64, cols as f64);
    let s = (rows_f * cols_f / (k as f64 * HEX_ROW_FACTOR)).sqrt();

    // half a column of margin at one end, alternating between rows
    let node_cols = ((cols_f / s - 0.5).round() as usize).clamp(1, cols);
    let s = cols_f / (node_cols as f64 + 0.5);

    let node_rows = ((rows_f / (HEX_ROW_FACTOR * s)).round() as usize).clamp(1, rows);
    let v_spacing = rows_f / node_rows as f64;

    let mut positions = Vec::with_capacity(node_rows * node_cols);
    for ri in 0..node_rows {
        let r = v_spacing / 2.0 + ri as f64 * v_spacing;
        let first = if ri % 2 == 1 { s / 2.0 } else { s };
        for ci in 0..node_cols {
            positions.push((r, first + ci as f64 * s));
        }
    }

    (positions, round_spacing(s))
}

/// Square layout: one center in the middle of each cell of a near-uniform grid
fn square(rows: usize, cols: usize, k: usize) -> (Vec<(f64, f64)>, usize) {
    let (rows_f, cols_f) = (rows as f64, cols as f64);
    let s = (rows_f * cols_f / k as f64).sqrt();

    let node_rows = ((rows_f / s).round() as usize).clamp(1, rows);
    let node_cols = ((cols_f / s).round() as usize).clamp(1, cols);
    let v_step = rows_f / node_rows as f64;
    let h_step = cols_f / node_cols as f64;

    let mut positions = Vec::with_capacity(node_rows * node_cols);
    for ri in 0..node_rows {
        for ci in 0..node_cols {
            positions.push(((ri as f64 + 0.5) * v_step, (ci as f64 + 0.5) * h_step));
        }
    }

    (positions, round_spacing(s))
}
