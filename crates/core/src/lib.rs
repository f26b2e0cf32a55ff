//! # chronoseg core
//!
//! Core types and I/O for spatio-temporal segmentation of image time series.
//!
//! This crate provides:
//! - `Raster<T>`: single-band georeferenced grid (label rasters, distances)
//! - `RasterStack`: band × row × column time series stack
//! - `GeoTransform` and `CRS` pass-through metadata
//! - `Feature`/`FeatureCollection` and the `VectorSink` trait
//! - GeoTIFF reading/writing and a GeoJSON vector sink

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod vector;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{Connectivity, GeoTransform, Normalization, Raster, RasterElement, RasterStack};
pub use vector::{AttributeValue, Feature, FeatureCollection, VectorSink};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{
        Connectivity, GeoTransform, Normalization, Raster, RasterElement, RasterStack,
    };
    pub use crate::vector::{AttributeValue, Feature, FeatureCollection, VectorSink};
}

/// Build the `<name>_<k>_<m>` stem shared by every output of a segmentation run.
///
/// Both the requested cluster count and the compactness end up in the file
/// name so results from different parameter sweeps never overwrite each other.
/// The compactness always keeps its decimal point (`1.0`, not `1`).
pub fn output_stem(name: &str, k: usize, compactness: f64) -> String {
    format!("{}_{}_{:?}", name, k, compactness)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_stem() {
        assert_eq!(output_stem("area", 100, 1.0), "area_100_1.0");
        assert_eq!(output_stem("area", 100, 2.0), "area_100_2.0");
        assert_eq!(output_stem("out/tile", 250, 0.5), "out/tile_250_0.5");
    }

    #[test]
    fn test_vector_types_at_root() {
        use crate::vector::{FieldKind, GeometryKind, Schema};
        use geo_types::polygon;

        let mut sink: Box<dyn VectorSink> = Box::new(FeatureCollection::new());
        let square = geo_types::polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)];
        let mut feature = Feature::new(geo_types::Geometry::Polygon(square));
        feature.set_property("pixelvalue", AttributeValue::Int(7));

        let mut layer = FeatureCollection::new();
        layer.push(feature);
        let schema = Schema::new(GeometryKind::Polygon).with_field("pixelvalue", FieldKind::Int);
        sink.write_all(&schema, None, &layer).unwrap();
        assert_eq!(layer.len(), 1);
    }
}
