//! Recompute cluster centers from the current assignment

use super::state::ClusterTable;
use ndarray::{Array2, ArrayView3};

/// Outcome of one update pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateReport {
    /// Mean over clusters of how far each record moved (series + position)
    pub residual_error: f64,
    /// Clusters with no member pixels; their previous record was kept
    pub empty_clusters: Vec<usize>,
}

/// Replace each center by the mean series and mean position of its pixels.
///
/// Pixels that are unassigned or carry an index outside the table are
/// ignored. A cluster without pixels keeps its previous series and position
/// (with `count` set to 0) and is listed in the report rather than being
/// divided by zero.
pub fn update_clusters(
    stack: ArrayView3<'_, f64>,
    labels: &Array2<i32>,
    clusters: &mut ClusterTable,
) -> UpdateReport {
    let k = clusters.len();
    let bands = stack.dim().0;

    let mut series_sum = Array2::<f64>::zeros((k, bands));
    let mut pos_sum = vec![(0.0_f64, 0.0_f64); k];
    let mut counts = vec![0usize; k];

    for ((r, c), &label) in labels.indexed_iter() {
        let Ok(kk) = usize::try_from(label) else {
            continue;
        };
        if kk >= k {
            continue;
        }
        for b in 0..bands {
            series_sum[(kk, b)] += stack[(b, r, c)];
        }
        pos_sum[kk].0 += r as f64;
        pos_sum[kk].1 += c as f64;
        counts[kk] += 1;
    }

    let mut report = UpdateReport::default();
    let mut total_shift = 0.0;

    for (kk, center) in clusters.as_mut_slice().iter_mut().enumerate() {
        let count = counts[kk];
        if count == 0 {
            center.count = 0;
            report.empty_clusters.push(kk);
            continue;
        }

        let n = count as f64;
        let previous = center.clone();
        for (b, value) in center.series.iter_mut().enumerate() {
            *value = series_sum[(kk, b)] / n;
        }
        center.row = pos_sum[kk].0 / n;
        center.col = pos_sum[kk].1 / n;
        center.count = count;

        total_shift += previous.shift(center);
    }

    report.residual_error = if k > 0 { total_shift / k as f64 } else { 0.0 };
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::state::{ClusterCenter, UNASSIGNED};
    use approx::assert_relative_eq;
    use ndarray::{array, Array3};

    fn center(row: f64, col: f64, bands: usize) -> ClusterCenter {
        ClusterCenter {
            series: vec![0.0; bands],
            row,
            col,
            count: 0,
        }
    }

    #[test]
    fn test_means() {
        let stack = Array3::from_shape_fn((2, 2, 2), |(b, r, c)| (b * 10 + r * 2 + c) as f64);
        let labels = array![[0, 0], [1, 1]];
        let mut table = ClusterTable::new(vec![center(0.0, 0.0, 2), center(1.0, 1.0, 2)]);

        let report = update_clusters(stack.view(), &labels, &mut table);
        assert!(report.empty_clusters.is_empty());

        let c0 = table.get(0).unwrap();
        assert_eq!(c0.series, vec![0.5, 10.5]);
        assert_eq!((c0.row, c0.col, c0.count), (0.0, 0.5, 2));

        let c1 = table.get(1).unwrap();
        assert_eq!(c1.series, vec![2.5, 12.5]);
        assert_eq!((c1.row, c1.col, c1.count), (1.0, 0.5, 2));
    }

    #[test]
    fn test_empty_cluster_keeps_previous_center() {
        let stack = Array3::from_elem((1, 2, 2), 1.0);
        let labels = array![[0, 0], [0, UNASSIGNED]];
        let mut table = ClusterTable::new(vec![center(0.0, 0.0, 1), center(1.5, 1.5, 1)]);

        let report = update_clusters(stack.view(), &labels, &mut table);

        assert_eq!(report.empty_clusters, vec![1]);
        let c1 = table.get(1).unwrap();
        assert_eq!((c1.row, c1.col, c1.count), (1.5, 1.5, 0));
        assert!(c1.series.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_residual_error() {
        let stack = Array3::from_elem((1, 1, 2), 0.0);
        let labels = array![[0, 0]];
        let mut table = ClusterTable::new(vec![center(3.0, 0.5, 1), center(0.0, 0.0, 1)]);

        let report = update_clusters(stack.view(), &labels, &mut table);
        // cluster 0 moves 3 rows, cluster 1 is empty and does not move
        assert_relative_eq!(report.residual_error, 1.5);
    }

    #[test]
    fn test_idempotent() {
        let stack = Array3::from_shape_fn((3, 4, 4), |(b, r, c)| ((b + r * c) % 5) as f64 * 0.2);
        let labels = array![[0, 0, 1, 1], [0, 0, 1, 1], [2, 2, 3, 3], [2, 2, 3, 3]];
        let mut table = ClusterTable::new((0..4).map(|i| center(i as f64, 0.0, 3)).collect());

        update_clusters(stack.view(), &labels, &mut table);
        let once = table.clone();
        let report = update_clusters(stack.view(), &labels, &mut table);

        assert_eq!(once, table);
        assert_eq!(report.residual_error, 0.0);
    }
}
