//! Pixel adjacency rules for region labeling

use serde::{Deserialize, Serialize};

const ROOK: [(isize, isize); 4] = [(-1, 0), (0, -1), (0, 1), (1, 0)];

const QUEEN: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Which neighbors of a pixel count as touching it.
///
/// A face-connected ("6-connected") labeling of a single-slice volume only
/// links pixels that share an edge, which is [`Connectivity::Four`] in 2D.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// Edge neighbors only (N, S, E, W)
    #[default]
    Four,
    /// Edge and corner neighbors
    Eight,
}

impl Connectivity {
    /// Relative (row, col) offsets of the neighbors
    pub fn offsets(&self) -> &'static [(isize, isize)] {
        match self {
            Connectivity::Four => &ROOK,
            Connectivity::Eight => &QUEEN,
        }
    }

    /// In-bounds neighbors of `(row, col)` in a `rows × cols` grid
    pub fn neighbors(
        &self,
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    ) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.offsets().iter().filter_map(move |&(dr, dc)| {
            let r = row as isize + dr;
            let c = col as isize + dc;
            if r < 0 || c < 0 || r >= rows as isize || c >= cols as isize {
                None
            } else {
                Some((r as usize, c as usize))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighbor_counts() {
        assert_eq!(Connectivity::Four.neighbors(1, 1, 3, 3).count(), 4);
        assert_eq!(Connectivity::Eight.neighbors(1, 1, 3, 3).count(), 8);
    }

    #[test]
    fn test_corner_is_clipped() {
        let n: Vec<_> = Connectivity::Four.neighbors(0, 0, 3, 3).collect();
        assert_eq!(n, vec![(0, 1), (1, 0)]);
        assert_eq!(Connectivity::Eight.neighbors(0, 0, 3, 3).count(), 3);
    }
}
