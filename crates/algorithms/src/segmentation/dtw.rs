//! Dynamic time warping between two time series
//!
//! The cost of an alignment is the sum of squared differences along the
//! warping path; the reported distance is the square root of the cheapest
//! alignment. Two series that differ only by a lag of a few steps therefore
//! come out much closer than their pointwise difference suggests.

/// DTW distance between `a` and `b`.
///
/// Unconstrained warping window, O(len(a) · len(b)) time, O(len(b)) memory.
/// Two empty series are at distance 0; an empty and a non-empty series are
/// infinitely far apart.
pub fn dtw_distance(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return if a.len() == b.len() { 0.0 } else { f64::INFINITY };
    }

    let m = b.len();
    let mut prev = vec![f64::INFINITY; m + 1];
    let mut curr = vec![f64::INFINITY; m + 1];
    prev[0] = 0.0;

    for &x in a {
        curr[0] = f64::INFINITY;
        for j in 1..=m {
            let d = x - b[j - 1];
            let best = prev[j - 1].min(prev[j]).min(curr[j - 1]);
            curr[j] = d * d + best;
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[m].sqrt()
}
