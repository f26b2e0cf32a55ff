//! Spatio-temporal superpixel segmentation
//!
//! Clusters the pixels of an image time series into spatially compact
//! regions of similar temporal behavior:
//! - **lattice**: initial centers on a hexagonal or square grid
//! - **distance**: DTW + spatial distance over a cluster's search window
//! - **update**: mean series/position of each cluster's pixels
//! - **snitc**: the assignment/update loop
//! - **connectivity**: split disconnected fragments, sieve small regions

mod connectivity;
mod distance;
mod dtw;
mod lattice;
mod snitc;
mod state;
mod update;

pub use connectivity::{
    enforce_connectivity, label_components, min_region_size, sieve, Components, RepairParams,
};
pub use distance::{combine, distance_field, DistanceMode};
pub use dtw::dtw_distance;
pub use lattice::{initialize, Lattice};
pub use snitc::{
    assignment_round, distance_fields, snitc, snitc_with_cancel, EmptyClusterPolicy,
    Segmentation, SnitcParams,
};
pub use state::{
    ClusterCenter, ClusterTable, DistanceField, SegmentationState, Window, UNASSIGNED,
};
pub use update::{update_clusters, UpdateReport};
