//! I/O collaborators: GeoTIFF stacks and label rasters, GeoJSON layers

mod geojson;
mod native;

pub use geojson::GeoJsonWriter;
pub use native::{
    read_geotiff, read_stack, read_stack_from_buffer, write_label_geotiff,
    write_label_geotiff_to_buffer, write_stack,
};
