//! Connectivity repair of a segmentation
//!
//! Same-label fragments that are not spatially connected are split into
//! separate regions, and regions smaller than a threshold are merged into
//! their largest neighbor. After repair, label values identify connected
//! regions `1..=n` and no longer match cluster indices.

use super::state::UNASSIGNED;
use chronoseg_core::{Connectivity, Error, Raster, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Parameters for [`enforce_connectivity`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairParams {
    /// Label-then-sieve passes (default: 2)
    pub passes: usize,
    /// Neighborhood used to split fragments into components
    pub labeling: Connectivity,
    /// Neighborhood used to find merge targets for small regions
    pub sieve: Connectivity,
    /// Smallest surviving region in pixels; `None` derives it from the spacing
    pub min_size: Option<usize>,
}

impl Default for RepairParams {
    fn default() -> Self {
        Self {
            passes: 2,
            labeling: Connectivity::Four,
            sieve: Connectivity::Four,
            min_size: None,
        }
    }
}

/// Minimum region size for a search half-width `spacing`: `floor(S² / 2)`
pub fn min_region_size(spacing: usize) -> usize {
    spacing * spacing / 2
}

/// Connected components of a label array.
#[derive(Debug, Clone)]
pub struct Components {
    /// Component id per pixel, `1..=count`; 0 marks background
    pub ids: Array2<i32>,
    pub count: usize,
    /// Pixel count per id (index 0 is the background)
    pub sizes: Vec<usize>,
    /// Source label per id (index 0 is the background value, or 0)
    pub values: Vec<i32>,
}

/// Label maximal sets of equal, adjacent pixels.
///
/// Pixels equal to `background` get id 0 and never join a component.
/// Ids are assigned in row-major order of each component's first pixel.
pub fn label_components(
    labels: &Array2<i32>,
    connectivity: Connectivity,
    background: Option<i32>,
) -> Components {
    let (rows, cols) = labels.dim();
    let mut ids = Array2::<i32>::zeros((rows, cols));
    let mut sizes = vec![0usize];
    let mut values = vec![background.unwrap_or(0)];
    let mut stack = Vec::new();

    for r in 0..rows {
        for c in 0..cols {
            let value = labels[(r, c)];
            if Some(value) == background {
                sizes[0] += 1;
                continue;
            }
            if ids[(r, c)] != 0 {
                continue;
            }

            let id = sizes.len() as i32;
            let mut size = 0;
            ids[(r, c)] = id;
            stack.push((r, c));
            while let Some((cr, cc)) = stack.pop() {
                size += 1;
                for (nr, nc) in connectivity.neighbors(cr, cc, rows, cols) {
                    if ids[(nr, nc)] == 0 && labels[(nr, nc)] == value {
                        ids[(nr, nc)] = id;
                        stack.push((nr, nc));
                    }
                }
            }
            sizes.push(size);
            values.push(value);
        }
    }

    Components {
        count: sizes.len() - 1,
        ids,
        sizes,
        values,
    }
}

/// Merge every region smaller than `min_size` into its largest neighbor.
///
/// Regions are the `connectivity`-connected components of `labels`; the
/// smallest regions are merged first and the sweep repeats until nothing
/// changes. Ties between neighbors go to the lower region id. Background
/// pixels are never merged and never absorb anything, so a small region
/// whose only neighbors are background survives. The result is relabeled
/// consecutively `1..=n` with 0 for background.
pub fn sieve(
    labels: &Array2<i32>,
    min_size: usize,
    connectivity: Connectivity,
    background: Option<i32>,
) -> Array2<i32> {
    let comps = label_components(labels, connectivity, background);
    let (rows, cols) = labels.dim();
    let n = comps.count + 1;

    let mut adjacency: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    for r in 0..rows {
        for c in 0..cols {
            let a = comps.ids[(r, c)] as usize;
            if a == 0 {
                continue;
            }
            for (nr, nc) in connectivity.neighbors(r, c, rows, cols) {
                let b = comps.ids[(nr, nc)] as usize;
                if b != 0 && b != a {
                    adjacency[a].insert(b);
                }
            }
        }
    }

    let mut parent: Vec<usize> = (0..n).collect();
    let mut sizes = comps.sizes.clone();
    let mut merges = 0usize;

    loop {
        let mut order: Vec<usize> = (1..n).filter(|&id| parent[id] == id).collect();
        order.sort_by_key(|&id| (sizes[id], id));

        let mut changed = false;
        for id in order {
            if parent[id] != id || sizes[id] >= min_size {
                continue;
            }
            let target = adjacency[id]
                .iter()
                .copied()
                .max_by(|&a, &b| sizes[a].cmp(&sizes[b]).then(b.cmp(&a)));
            let Some(target) = target else {
                continue;
            };

            parent[id] = target;
            sizes[target] += sizes[id];
            sizes[id] = 0;

            let absorbed = std::mem::take(&mut adjacency[id]);
            for &other in &absorbed {
                adjacency[other].remove(&id);
                if other != target {
                    adjacency[other].insert(target);
                    adjacency[target].insert(other);
                }
            }
            adjacency[target].remove(&target);
            merges += 1;
            changed = true;
        }

        if !changed {
            break;
        }
    }
    debug!(
        "sieve: {} regions, {} merged below {} pixels",
        comps.count, merges, min_size
    );

    let mut relabel = vec![0i32; n];
    let mut next = 1;
    let mut out = Array2::<i32>::zeros((rows, cols));
    for ((r, c), &id) in comps.ids.indexed_iter() {
        if id == 0 {
            continue;
        }
        let root = find(&mut parent, id as usize);
        if relabel[root] == 0 {
            relabel[root] = next;
            next += 1;
        }
        out[(r, c)] = relabel[root];
    }
    out
}

fn find(parent: &mut [usize], mut id: usize) -> usize {
    while parent[id] != id {
        parent[id] = parent[parent[id]];
        id = parent[id];
    }
    id
}

/// Make every label of a segmentation a single connected region of at
/// least the minimum size.
///
/// The first pass treats unassigned pixels as background, later passes
/// treat 0 as background. The result has region ids `1..=n` and nodata 0.
pub fn enforce_connectivity(
    labels: &Raster<i32>,
    spacing: usize,
    params: &RepairParams,
) -> Result<Raster<i32>> {
    if params.passes == 0 {
        return Err(Error::invalid_parameter("passes", 0, "must be > 0"));
    }
    let min_size = params.min_size.unwrap_or_else(|| min_region_size(spacing));

    let mut current = labels.data().clone();
    let mut background = Some(UNASSIGNED);
    for pass in 0..params.passes {
        let split = label_components(&current, params.labeling, background);
        current = sieve(&split.ids, min_size, params.sieve, Some(0));
        background = Some(0);
        debug!("repair pass {}: {} components", pass, split.count);
    }

    let mut repaired = labels.with_same_meta(current);
    repaired.set_nodata(Some(0));
    info!(
        "connectivity repair: {} regions (min size {} px)",
        repaired.distinct_values().iter().filter(|&&v| v != 0).count(),
        min_size
    );
    Ok(repaired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_min_region_size() {
        assert_eq!(min_region_size(4), 8);
        assert_eq!(min_region_size(3), 4);
        assert_eq!(min_region_size(1), 0);
    }

    #[test]
    fn test_fragments_are_split() {
        let labels = array![[1, 2, 1], [1, 2, 1]];
        let comps = label_components(&labels, Connectivity::Four, None);
        assert_eq!(comps.count, 3);
        assert_eq!(comps.ids, array![[1, 2, 3], [1, 2, 3]]);
        assert_eq!(comps.sizes, vec![0, 2, 2, 2]);
        assert_eq!(comps.values, vec![0, 1, 2, 1]);
    }

    #[test]
    fn test_diagonal_contact() {
        let labels = array![[5, 0], [0, 5]];
        let four = label_components(&labels, Connectivity::Four, Some(0));
        let eight = label_components(&labels, Connectivity::Eight, Some(0));
        assert_eq!(four.count, 2);
        assert_eq!(eight.count, 1);
        assert_eq!(four.sizes[0], 2);
    }

    #[test]
    fn test_island_is_merged() {
        let mut labels = Array2::from_elem((6, 6), 3);
        labels[(2, 3)] = 7;
        let out = sieve(&labels, min_region_size(4), Connectivity::Four, None);
        assert!(out.iter().all(|&v| v == 1));
    }

    #[test]
    fn test_merges_into_largest_neighbor() {
        // region 2 (one pixel) touches region 1 (3 px) and region 3 (5 px)
        let labels = array![[1, 1, 1], [2, 3, 3], [3, 3, 3]];
        let out = sieve(&labels, 2, Connectivity::Four, None);
        assert_eq!(out, array![[1, 1, 1], [2, 2, 2], [2, 2, 2]]);
    }

    #[test]
    fn test_background_is_untouched() {
        let labels = array![[0, 0, 0], [0, 4, 0], [0, 0, 0]];
        let out = sieve(&labels, 8, Connectivity::Four, Some(0));
        assert_eq!(out, array![[0, 0, 0], [0, 1, 0], [0, 0, 0]]);
    }

    #[test]
    fn test_enforce_connectivity_quadrants() {
        let labels = Raster::from_array(array![
            [0, 0, 1, 1],
            [0, 0, 1, 1],
            [2, 2, 3, 3],
            [2, 2, 3, 3]
        ]);
        let out = enforce_connectivity(&labels, 2, &RepairParams::default()).unwrap();
        assert_eq!(
            out.data(),
            &array![[1, 1, 2, 2], [1, 1, 2, 2], [3, 3, 4, 4], [3, 3, 4, 4]]
        );
        assert_eq!(out.nodata(), Some(0));
    }

    #[test]
    fn test_enforce_connectivity_splits_cluster() {
        // cluster 0 appears twice, separated by cluster 1
        let labels = Raster::from_array(array![
            [0, 0, 1, 1, 0, 0],
            [0, 0, 1, 1, 0, 0],
        ]);
        let params = RepairParams {
            min_size: Some(1),
            ..Default::default()
        };
        let out = enforce_connectivity(&labels, 2, &params).unwrap();
        assert_eq!(out.distinct_values(), vec![1, 2, 3]);
    }

    #[test]
    fn test_zero_passes_rejected() {
        let labels = Raster::from_array(array![[0]]);
        let params = RepairParams {
            passes: 0,
            ..Default::default()
        };
        assert!(matches!(
            enforce_connectivity(&labels, 2, &params),
            Err(Error::InvalidParameter { name: "passes", .. })
        ));
    }
}
