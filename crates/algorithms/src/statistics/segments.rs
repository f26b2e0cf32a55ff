//! Per-segment statistics
//!
//! Summarizes every band of a time series stack inside each region of a
//! label raster, together with the region's area and boundary length in map
//! units. Regions are keyed by label value.

use chronoseg_core::{Error, Raster, RasterStack, Result};
use std::collections::BTreeMap;

/// Statistics of one segment
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentStatistics {
    pub label: i32,
    /// Pixels in the segment
    pub count: usize,
    /// `count` times the cell area
    pub area: f64,
    /// Length of the boundary between the segment and everything else
    /// (other labels, no-data and the raster edge), holes included
    pub length: f64,
    /// Per-band mean; NaN values are skipped
    pub mean: Vec<f64>,
    /// Per-band population standard deviation
    pub std_dev: Vec<f64>,
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

#[derive(Clone)]
struct BandAccumulator {
    n: usize,
    sum: f64,
    sum_sq: f64,
    min: f64,
    max: f64,
}

impl BandAccumulator {
    fn new() -> Self {
        Self {
            n: 0,
            sum: 0.0,
            sum_sq: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    fn push(&mut self, v: f64) {
        if v.is_nan() {
            return;
        }
        self.n += 1;
        self.sum += v;
        self.sum_sq += v * v;
        self.min = self.min.min(v);
        self.max = self.max.max(v);
    }

    fn finish(&self) -> (f64, f64, f64, f64) {
        if self.n == 0 {
            return (f64::NAN, f64::NAN, f64::NAN, f64::NAN);
        }
        let n = self.n as f64;
        let mean = self.sum / n;
        let var = (self.sum_sq / n - mean * mean).max(0.0);
        (mean, var.sqrt(), self.min, self.max)
    }
}

/// Compute [`SegmentStatistics`] for every label of `labels`.
///
/// Pixels whose label is the raster's no-data value are skipped. Bands with
/// no valid value inside a segment report NaN.
pub fn segment_statistics(
    stack: &RasterStack,
    labels: &Raster<i32>,
) -> Result<BTreeMap<i32, SegmentStatistics>> {
    let (bands, rows, cols) = stack.shape();
    let (lr, lc) = labels.shape();
    if rows != lr || cols != lc {
        return Err(Error::SizeMismatch {
            er: rows,
            ec: cols,
            ar: lr,
            ac: lc,
        });
    }

    let transform = labels.transform();
    let (edge_x, edge_y) = (transform.pixel_width.abs(), transform.pixel_height.abs());
    let data = stack.view();
    let grid = labels.data();

    let mut acc: BTreeMap<i32, (usize, f64, Vec<BandAccumulator>)> = BTreeMap::new();

    for ((r, c), &label) in grid.indexed_iter() {
        if labels.is_nodata(label) {
            continue;
        }
        let entry = acc
            .entry(label)
            .or_insert_with(|| (0, 0.0, vec![BandAccumulator::new(); bands]));
        entry.0 += 1;
        for (b, band) in entry.2.iter_mut().enumerate() {
            band.push(data[(b, r, c)]);
        }

        // boundary: top/bottom edges run along x, left/right along y
        let differs = |nr: Option<usize>, nc: Option<usize>| match (nr, nc) {
            (Some(nr), Some(nc)) if nr < rows && nc < cols => grid[(nr, nc)] != label,
            _ => true,
        };
        let mut length = 0.0;
        if differs(r.checked_sub(1), Some(c)) {
            length += edge_x;
        }
        if differs(Some(r + 1), Some(c)) {
            length += edge_x;
        }
        if differs(Some(r), c.checked_sub(1)) {
            length += edge_y;
        }
        if differs(Some(r), Some(c + 1)) {
            length += edge_y;
        }
        entry.1 += length;
    }

    let cell_area = transform.cell_area();
    Ok(acc
        .into_iter()
        .map(|(label, (count, length, bands))| {
            let mut stats = SegmentStatistics {
                label,
                count,
                area: count as f64 * cell_area,
                length,
                mean: Vec::with_capacity(bands.len()),
                std_dev: Vec::with_capacity(bands.len()),
                min: Vec::with_capacity(bands.len()),
                max: Vec::with_capacity(bands.len()),
            };
            for band in &bands {
                let (mean, std_dev, min, max) = band.finish();
                stats.mean.push(mean);
                stats.std_dev.push(std_dev);
                stats.min.push(min);
                stats.max.push(max);
            }
            (label, stats)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chronoseg_core::GeoTransform;
    use ndarray::{array, Array3};

    fn labels() -> Raster<i32> {
        let mut r = Raster::from_array(array![[1, 1, 2], [1, 1, 2], [0, 0, 2]]);
        r.set_nodata(Some(0));
        r.set_transform(GeoTransform::new(100.0, 200.0, 10.0, -10.0));
        r
    }

    #[test]
    fn test_band_statistics() {
        let stack = RasterStack::from_array(Array3::from_shape_fn((2, 3, 3), |(b, r, c)| {
            (b * 100 + r * 3 + c) as f64
        }));
        let stats = segment_statistics(&stack, &labels()).unwrap();
        assert_eq!(stats.len(), 2);

        let s1 = &stats[&1];
        assert_eq!(s1.count, 4);
        // band 0 values 0, 1, 3, 4
        assert_relative_eq!(s1.mean[0], 2.0);
        assert_relative_eq!(s1.std_dev[0], 2.5f64.sqrt());
        assert_eq!((s1.min[0], s1.max[0]), (0.0, 4.0));
        assert_relative_eq!(s1.mean[1], 102.0);

        let s2 = &stats[&2];
        assert_eq!(s2.count, 3);
        assert_eq!((s2.min[0], s2.max[0]), (2.0, 8.0));
    }

    #[test]
    fn test_area_and_length() {
        let stack = RasterStack::from_array(Array3::zeros((1, 3, 3)));
        let stats = segment_statistics(&stack, &labels()).unwrap();

        assert_relative_eq!(stats[&1].area, 400.0);
        assert_relative_eq!(stats[&1].length, 80.0);
        assert_relative_eq!(stats[&2].area, 300.0);
        assert_relative_eq!(stats[&2].length, 80.0);
    }

    #[test]
    fn test_nan_values_are_skipped() {
        let mut data = Array3::from_elem((1, 3, 3), 5.0);
        data[(0, 0, 0)] = f64::NAN;
        let stats = segment_statistics(&RasterStack::from_array(data), &labels()).unwrap();
        assert_eq!(stats[&1].count, 4);
        assert_relative_eq!(stats[&1].mean[0], 5.0);
        assert_relative_eq!(stats[&1].std_dev[0], 0.0);
    }

    #[test]
    fn test_size_mismatch() {
        let stack = RasterStack::from_array(Array3::zeros((1, 4, 4)));
        assert!(matches!(
            segment_statistics(&stack, &labels()),
            Err(Error::SizeMismatch { .. })
        ));
    }
}
