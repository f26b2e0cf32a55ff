//! # chronoseg algorithms
//!
//! Superpixel segmentation of satellite image time series.
//!
//! ## Modules
//!
//! - **segmentation**: lattice initialization, DTW-based spatio-temporal
//!   distance, the assignment/update loop and connectivity repair
//! - **statistics**: per-segment band statistics
//! - **vector**: polygon tracing and export through a vector sink
//!
//! ```no_run
//! use chronoseg_algorithms::prelude::*;
//! use ndarray::Array3;
//!
//! let stack = RasterStack::from_array(Array3::from_elem((12, 200, 200), 0.3));
//! let params = SnitcParams { k: 100, compactness: 1.0, ..Default::default() };
//! let seg = snitc(&stack, &params)?;
//! let labels = enforce_connectivity(&seg.labels, seg.spacing, &RepairParams::default())?;
//! let polygons = polygonize(&labels, &PolygonizeParams::default())?;
//! # Ok::<(), chronoseg_core::Error>(())
//! ```

pub(crate) mod maybe_rayon;

pub mod segmentation;
pub mod statistics;
pub mod vector;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::segmentation::{
        enforce_connectivity, snitc, snitc_with_cancel, EmptyClusterPolicy, Lattice,
        RepairParams, Segmentation, SnitcParams,
    };
    pub use crate::statistics::{segment_statistics, SegmentStatistics};
    pub use crate::vector::{export_segments, polygonize, PolygonizeParams};
    pub use chronoseg_core::prelude::*;
}
