//! Vector output of segmentations
//!
//! - **polygonize**: trace label regions into multipolygons and hand them,
//!   with optional per-segment attributes, to a [`VectorSink`](chronoseg_core::VectorSink)

mod polygonize;

pub use polygonize::{
    export_segments, polygonize, segment_schema, segments_to_features, PolygonizeParams,
    LABEL_FIELD,
};
