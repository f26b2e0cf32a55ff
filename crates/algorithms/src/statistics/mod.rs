//! Statistics over segmented rasters
//!
//! - **segments**: per-segment band statistics, area and boundary length

mod segments;

pub use segments::{segment_statistics, SegmentStatistics};
