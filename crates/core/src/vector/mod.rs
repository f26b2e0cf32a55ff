//! Vector features and the sink interface polygon writers implement

use crate::crs::CRS;
use crate::error::{Error, Result};
use geo_types::Geometry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Int(i64),
    Float(f64),
    String(String),
}

/// Geometry kinds a layer can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryKind {
    Polygon,
    MultiPolygon,
}

/// Attribute column types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Float,
}

/// One attribute column of a layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Geometry type plus ordered attribute columns of a layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub geometry: GeometryKind,
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(geometry: GeometryKind) -> Self {
        Self {
            geometry,
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(Field::new(name, kind));
        self
    }

    /// Check a feature carries a value of the right kind for every column
    pub fn validate(&self, feature: &Feature) -> Result<()> {
        for field in &self.fields {
            let ok = match (feature.get_property(&field.name), field.kind) {
                (Some(AttributeValue::Int(_)), FieldKind::Int) => true,
                (Some(AttributeValue::Float(_)), FieldKind::Float) => true,
                (Some(AttributeValue::Null), _) => true,
                _ => false,
            };
            if !ok {
                return Err(Error::VectorWrite(format!(
                    "feature is missing a {:?} value for field '{}'",
                    field.kind, field.name
                )));
            }
        }
        Ok(())
    }
}

/// A geographic feature with geometry and attributes
#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: Option<Geometry<f64>>,
    pub properties: HashMap<String, AttributeValue>,
}

impl Feature {
    /// Create a new feature with geometry
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry: Some(geometry),
            properties: HashMap::new(),
        }
    }

    /// Set an attribute
    pub fn set_property(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.properties.insert(key.into(), value);
    }

    /// Get an attribute
    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }
}

/// Collection of features
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self { features: Vec::new() }
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }
}

impl IntoIterator for FeatureCollection {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}

/// Destination for a layer of features.
///
/// Writers are driven as `begin` → `write_feature`* → `finish`; the CRS is
/// passed through from the raster the features were derived from.
pub trait VectorSink {
    fn begin(&mut self, schema: &Schema, crs: Option<&CRS>) -> Result<()>;

    fn write_feature(&mut self, feature: &Feature) -> Result<()>;

    fn finish(&mut self) -> Result<()>;

    /// Write a whole collection under one schema
    fn write_all(
        &mut self,
        schema: &Schema,
        crs: Option<&CRS>,
        features: &FeatureCollection,
    ) -> Result<()> {
        self.begin(schema, crs)?;
        for feature in features.iter() {
            schema.validate(feature)?;
            self.write_feature(feature)?;
        }
        self.finish()
    }
}

/// Collecting sink, keeps features in memory
impl VectorSink for FeatureCollection {
    fn begin(&mut self, _schema: &Schema, _crs: Option<&CRS>) -> Result<()> {
        self.features.clear();
        Ok(())
    }

    fn write_feature(&mut self, feature: &Feature) -> Result<()> {
        self.features.push(feature.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{point, Point};

    fn labelled(value: i64) -> Feature {
        let p: Point<f64> = point!(x: 1.0, y: 2.0);
        let mut f = Feature::new(Geometry::Point(p));
        f.set_property("pixelvalue", AttributeValue::Int(value));
        f
    }

    #[test]
    fn test_schema_validation() {
        let schema = Schema::new(GeometryKind::MultiPolygon).with_field("pixelvalue", FieldKind::Int);
        assert!(schema.validate(&labelled(3)).is_ok());

        let mut wrong = labelled(3);
        wrong.set_property("pixelvalue", AttributeValue::Float(3.0));
        assert!(matches!(schema.validate(&wrong), Err(Error::VectorWrite(_))));
    }

    #[test]
    fn test_collecting_sink() {
        let schema = Schema::new(GeometryKind::MultiPolygon).with_field("pixelvalue", FieldKind::Int);
        let mut input = FeatureCollection::new();
        input.push(labelled(1));
        input.push(labelled(2));

        let mut sink = FeatureCollection::new();
        sink.write_all(&schema, None, &input).unwrap();
        assert_eq!(sink.len(), 2);
        assert_eq!(
            sink.features[1].get_property("pixelvalue"),
            Some(&AttributeValue::Int(2))
        );
    }
}
