//! Streaming GeoJSON vector sink

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::vector::{AttributeValue, Feature, Field, Schema, VectorSink};
use geo_types::{Coord, Geometry, LineString, Polygon};
use serde_json::{json, Map, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes features as a GeoJSON `FeatureCollection`, one feature at a time.
///
/// Properties are emitted in schema column order. When the CRS has an EPSG
/// code it is recorded in a named `crs` member.
pub struct GeoJsonWriter<W: Write> {
    writer: W,
    fields: Vec<Field>,
    written: usize,
    open: bool,
}

impl GeoJsonWriter<BufWriter<File>> {
    /// Create (or truncate) a `.geojson` file
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path.as_ref()).map_err(write_err)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> GeoJsonWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            fields: Vec::new(),
            written: 0,
            open: false,
        }
    }

    /// Number of features written so far
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> VectorSink for GeoJsonWriter<W> {
    fn begin(&mut self, schema: &Schema, crs: Option<&CRS>) -> Result<()> {
        if self.open {
            return Err(Error::VectorWrite("layer already started".into()));
        }
        self.fields = schema.fields.clone();
        self.written = 0;

        write!(self.writer, "{{\"type\":\"FeatureCollection\",").map_err(write_err)?;
        if let Some(urn) = crs.and_then(|c| c.urn()) {
            let member = json!({ "type": "name", "properties": { "name": urn } });
            write!(self.writer, "\"crs\":{},", member).map_err(write_err)?;
        }
        write!(self.writer, "\"features\":[").map_err(write_err)?;
        self.open = true;
        Ok(())
    }

    fn write_feature(&mut self, feature: &Feature) -> Result<()> {
        if !self.open {
            return Err(Error::VectorWrite("write_feature called before begin".into()));
        }

        let geometry = match &feature.geometry {
            Some(g) => geometry_to_json(g)?,
            None => Value::Null,
        };
        let mut properties = Map::new();
        for field in &self.fields {
            let value = match feature.get_property(&field.name) {
                Some(AttributeValue::Int(v)) => json!(v),
                Some(AttributeValue::Float(v)) => json!(v),
                Some(AttributeValue::String(v)) => json!(v),
                Some(AttributeValue::Null) | None => Value::Null,
            };
            properties.insert(field.name.clone(), value);
        }
        let record = json!({
            "type": "Feature",
            "properties": properties,
            "geometry": geometry,
        });

        if self.written > 0 {
            write!(self.writer, ",").map_err(write_err)?;
        }
        serde_json::to_writer(&mut self.writer, &record)
            .map_err(|e| Error::VectorWrite(e.to_string()))?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if !self.open {
            return Err(Error::VectorWrite("finish called before begin".into()));
        }
        write!(self.writer, "]}}").map_err(write_err)?;
        self.writer.flush().map_err(write_err)?;
        self.open = false;
        Ok(())
    }
}

fn write_err(e: std::io::Error) -> Error {
    Error::VectorWrite(e.to_string())
}

fn ring(ls: &LineString<f64>) -> Value {
    Value::Array(ls.coords().map(|c: &Coord<f64>| json!([c.x, c.y])).collect())
}

fn polygon_rings(p: &Polygon<f64>) -> Value {
    let mut rings = vec![ring(p.exterior())];
    rings.extend(p.interiors().iter().map(ring));
    Value::Array(rings)
}

fn geometry_to_json(geometry: &Geometry<f64>) -> Result<Value> {
    let value = match geometry {
        Geometry::Point(p) => json!({ "type": "Point", "coordinates": [p.x(), p.y()] }),
        Geometry::Polygon(p) => json!({ "type": "Polygon", "coordinates": polygon_rings(p) }),
        Geometry::MultiPolygon(mp) => json!({
            "type": "MultiPolygon",
            "coordinates": mp.0.iter().map(polygon_rings).collect::<Vec<_>>(),
        }),
        other => {
            return Err(Error::VectorWrite(format!(
                "unsupported geometry for GeoJSON output: {:?}",
                other
            )))
        }
    };
    Ok(value)
}
