//! Label raster to polygons
//!
//! Each 4-connected region is traced along pixel edges into one exterior
//! ring plus its holes; regions sharing a label are grouped into a
//! multipolygon. Vertices sit on the pixel-corner lattice and are mapped to
//! map coordinates through the raster's geotransform.

use crate::segmentation::label_components;
use crate::statistics::SegmentStatistics;
use chronoseg_core::vector::{FieldKind, GeometryKind, Schema};
use chronoseg_core::{
    AttributeValue, Connectivity, Feature, FeatureCollection, GeoTransform, Raster, Result,
    VectorSink,
};
use geo::{Coord, Geometry, LineString, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Attribute holding the label value of each feature
pub const LABEL_FIELD: &str = "pixelvalue";

/// Parameters for [`polygonize`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolygonizeParams {
    /// Label value that produces no polygon (default: 0)
    pub background: Option<i32>,
}

impl Default for PolygonizeParams {
    fn default() -> Self {
        Self {
            background: Some(0),
        }
    }
}

// Edge directions on the corner lattice, x = column, y = row (downwards)
const EAST: u8 = 0;
const SOUTH: u8 = 1;
const WEST: u8 = 2;
const NORTH: u8 = 3;

fn step((x, y): (usize, usize), dir: u8) -> (usize, usize) {
    match dir {
        EAST => (x + 1, y),
        SOUTH => (x, y + 1),
        WEST => (x - 1, y),
        _ => (x, y - 1),
    }
}

/// Trace every region of `labels` and group the polygons by label.
///
/// Skips the background label and the raster's no-data value. Returns one
/// multipolygon per remaining label, in ascending label order.
pub fn polygonize(
    labels: &Raster<i32>,
    params: &PolygonizeParams,
) -> Result<Vec<(i32, MultiPolygon<f64>)>> {
    let comps = label_components(labels.data(), Connectivity::Four, None);

    let mut pixels: Vec<Vec<(usize, usize)>> = vec![Vec::new(); comps.count + 1];
    for ((r, c), &id) in comps.ids.indexed_iter() {
        pixels[id as usize].push((r, c));
    }

    let transform = labels.transform();
    let mut grouped: BTreeMap<i32, Vec<Polygon<f64>>> = BTreeMap::new();
    for id in 1..=comps.count {
        let value = comps.values[id];
        if Some(value) == params.background || labels.is_nodata(value) {
            continue;
        }
        let polygon = trace_region(&comps.ids, id as i32, &pixels[id], transform);
        grouped.entry(value).or_default().push(polygon);
    }

    debug!(
        "polygonize: {} regions into {} labels",
        comps.count,
        grouped.len()
    );
    Ok(grouped
        .into_iter()
        .map(|(label, polygons)| (label, MultiPolygon::new(polygons)))
        .collect())
}

/// Boundary of one 4-connected region as a polygon with holes.
fn trace_region(
    ids: &ndarray::Array2<i32>,
    id: i32,
    pixels: &[(usize, usize)],
    transform: &GeoTransform,
) -> Polygon<f64> {
    let (rows, cols) = ids.dim();
    let inside = |r: Option<usize>, c: Option<usize>| match (r, c) {
        (Some(r), Some(c)) if r < rows && c < cols => ids[(r, c)] == id,
        _ => false,
    };

    // outgoing boundary edges per start vertex, one bit per direction;
    // the region is always on the right-hand side of an edge
    let mut edges: BTreeMap<(usize, usize), u8> = BTreeMap::new();
    let mut add = |v: (usize, usize), dir: u8| *edges.entry(v).or_insert(0) |= 1 << dir;
    for &(r, c) in pixels {
        if !inside(r.checked_sub(1), Some(c)) {
            add((c, r), EAST);
        }
        if !inside(Some(r), Some(c + 1)) {
            add((c + 1, r), SOUTH);
        }
        if !inside(Some(r + 1), Some(c)) {
            add((c + 1, r + 1), WEST);
        }
        if !inside(Some(r), c.checked_sub(1)) {
            add((c, r + 1), NORTH);
        }
    }

    let mut exterior: Option<Vec<(usize, usize)>> = None;
    let mut holes = Vec::new();
    while let Some(walk) = next_walk(&mut edges) {
        for ring in split_loops(walk).iter().map(|l| corners(l)) {
            if signed_area(&ring) > 0.0 && exterior.is_none() {
                exterior = Some(ring);
            } else {
                holes.push(ring);
            }
        }
    }

    let to_line = |ring: Vec<(usize, usize)>| -> LineString<f64> {
        ring.into_iter()
            .map(|(x, y)| {
                let (gx, gy) = transform.apply(x as f64, y as f64);
                Coord { x: gx, y: gy }
            })
            .collect::<Vec<_>>()
            .into()
    };

    Polygon::new(
        to_line(exterior.unwrap_or_default()),
        holes.into_iter().map(to_line).collect(),
    )
}

/// Consume one closed walk of edges, as (start vertex, direction) pairs.
///
/// At a vertex with several outgoing edges the walk turns right first, then
/// goes straight, then left, which keeps diagonal-only contacts apart.
fn next_walk(edges: &mut BTreeMap<(usize, usize), u8>) -> Option<Vec<((usize, usize), u8)>> {
    let (&start, &bits) = edges.iter().next()?;
    let start_dir = bits.trailing_zeros() as u8;

    let mut walk: Vec<((usize, usize), u8)> = Vec::new();
    let (mut v, mut d) = (start, start_dir);
    loop {
        take_edge(edges, v, d);
        walk.push((v, d));
        let next = step(v, d);

        let mut chosen = None;
        for turn in [(d + 1) % 4, d, (d + 3) % 4] {
            if next == start && turn == start_dir {
                break;
            }
            if edges.get(&next).is_some_and(|b| b & (1 << turn) != 0) {
                chosen = Some(turn);
                break;
            }
        }
        match chosen {
            Some(turn) => {
                v = next;
                d = turn;
            }
            None => break,
        }
    }
    Some(walk)
}

/// Split a closed walk wherever it passes a vertex twice, so every returned
/// loop is simple. Holes that touch at a corner become separate rings.
fn split_loops(walk: Vec<((usize, usize), u8)>) -> Vec<Vec<((usize, usize), u8)>> {
    let mut loops = Vec::new();
    let mut path: Vec<((usize, usize), u8)> = Vec::with_capacity(walk.len());
    let mut seen: BTreeMap<(usize, usize), usize> = BTreeMap::new();

    for (v, d) in walk {
        if let Some(&at) = seen.get(&v) {
            let sub = path.split_off(at);
            for (u, _) in &sub {
                seen.remove(u);
            }
            loops.push(sub);
        }
        seen.insert(v, path.len());
        path.push((v, d));
    }
    if !path.is_empty() {
        loops.push(path);
    }
    loops
}

/// Corner vertices of a closed loop (where the direction changes), closed
fn corners(walk: &[((usize, usize), u8)]) -> Vec<(usize, usize)> {
    let n = walk.len();
    let mut ring: Vec<(usize, usize)> = (0..n)
        .filter(|&i| walk[i].1 != walk[(i + n - 1) % n].1)
        .map(|i| walk[i].0)
        .collect();
    if let Some(&first) = ring.first() {
        ring.push(first);
    }
    ring
}

fn take_edge(edges: &mut BTreeMap<(usize, usize), u8>, v: (usize, usize), d: u8) {
    if let Some(bits) = edges.get_mut(&v) {
        *bits &= !(1 << d);
        if *bits == 0 {
            edges.remove(&v);
        }
    }
}

/// Shoelace area in corner-lattice coordinates; positive for exteriors
fn signed_area(ring: &[(usize, usize)]) -> f64 {
    ring.windows(2)
        .map(|w| {
            let (x0, y0) = (w[0].0 as f64, w[0].1 as f64);
            let (x1, y1) = (w[1].0 as f64, w[1].1 as f64);
            x0 * y1 - x1 * y0
        })
        .sum::<f64>()
        / 2.0
}

/// Layer schema for exported segments: the label plus, for `bands` bands,
/// the statistics columns added by [`segments_to_features`].
pub fn segment_schema(bands: Option<usize>) -> Schema {
    let mut schema = Schema::new(GeometryKind::MultiPolygon).with_field(LABEL_FIELD, FieldKind::Int);
    if let Some(bands) = bands {
        for prefix in ["mean", "std", "min", "max"] {
            for b in 1..=bands {
                schema = schema.with_field(format!("{}_{}", prefix, b), FieldKind::Float);
            }
        }
        schema = schema
            .with_field("area", FieldKind::Float)
            .with_field("length", FieldKind::Float);
    }
    schema
}

fn float(v: f64) -> AttributeValue {
    if v.is_finite() {
        AttributeValue::Float(v)
    } else {
        AttributeValue::Null
    }
}

/// Turn polygonized segments into features, attaching statistics when given.
pub fn segments_to_features(
    segments: Vec<(i32, MultiPolygon<f64>)>,
    statistics: Option<&BTreeMap<i32, SegmentStatistics>>,
) -> FeatureCollection {
    let mut collection = FeatureCollection::new();
    for (label, geometry) in segments {
        let mut feature = Feature::new(Geometry::MultiPolygon(geometry));
        feature.set_property(LABEL_FIELD, AttributeValue::Int(label as i64));

        if let Some(stats) = statistics.and_then(|s| s.get(&label)) {
            let columns = [
                ("mean", &stats.mean),
                ("std", &stats.std_dev),
                ("min", &stats.min),
                ("max", &stats.max),
            ];
            for (prefix, values) in columns {
                for (b, &v) in values.iter().enumerate() {
                    feature.set_property(format!("{}_{}", prefix, b + 1), float(v));
                }
            }
            feature.set_property("area", float(stats.area));
            feature.set_property("length", float(stats.length));
        }
        collection.push(feature);
    }
    collection
}

/// Polygonize `labels` and stream one feature per label into `sink`.
///
/// With `statistics`, every feature also carries the per-band and shape
/// columns of [`segment_schema`]. Returns the number of features written.
pub fn export_segments(
    labels: &Raster<i32>,
    params: &PolygonizeParams,
    statistics: Option<&BTreeMap<i32, SegmentStatistics>>,
    sink: &mut dyn VectorSink,
) -> Result<usize> {
    let bands = statistics.and_then(|s| s.values().next().map(|st| st.mean.len()));
    let schema = segment_schema(bands);
    let features = segments_to_features(polygonize(labels, params)?, statistics);

    sink.write_all(&schema, labels.crs(), &features)?;
    Ok(features.len())
}
