//! Tile-local feature records and their reconstruction into GeoJSON features.
//!
//! A tile index emits one compact record per feature and tile. The record
//! carries a numeric family tag instead of a GeoJSON geometry type, and its
//! coordinates are nested by family: point records hold a flat list of
//! positions, line and polygon records hold a list of parts. [`reconstruct`]
//! turns a record back into a standard `Feature` in tile pixel space.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A position in tile pixel space (`0..extent` on both axes inside the tile).
pub type TilePoint = [f64; 2];

pub const TAG_POINT: u32 = 1;
pub const TAG_LINE: u32 = 2;
pub const TAG_POLYGON: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawGeometry {
    Points(Vec<TilePoint>),
    Parts(Vec<Vec<TilePoint>>),
}

impl RawGeometry {
    pub fn part_count(&self) -> usize {
        match self {
            RawGeometry::Points(points) => points.len(),
            RawGeometry::Parts(parts) => parts.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTileFeature {
    #[serde(rename = "type")]
    pub tag: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<RawGeometry>,
    /// Opaque properties bag, forwarded untouched.
    #[serde(default)]
    pub tags: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum TileGeometry {
    Point(TilePoint),
    MultiPoint(Vec<TilePoint>),
    LineString(Vec<TilePoint>),
    MultiLineString(Vec<Vec<TilePoint>>),
    Polygon(Vec<Vec<TilePoint>>),
    MultiPolygon(Vec<Vec<Vec<TilePoint>>>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Feature")]
pub struct TileFeature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub geometry: TileGeometry,
    pub properties: Map<String, Value>,
}

/// One entry of a synthesized tile: a reconstructed feature, or the raw record
/// when its tag (or shape) has no GeoJSON counterpart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TileItem {
    Feature(TileFeature),
    Raw(RawTileFeature),
}

impl TileItem {
    pub fn as_feature(&self) -> Option<&TileFeature> {
        match self {
            TileItem::Feature(f) => Some(f),
            TileItem::Raw(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename = "FeatureCollection")]
pub struct TileFeatureCollection {
    pub features: Vec<TileItem>,
}

impl TileFeatureCollection {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn to_geojson_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_geojson_string_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Rebuild a GeoJSON feature from a compact tile record.
///
/// Point and line families collapse to their single-part type when exactly one
/// part is present. A polygon family record with more than one ring group is
/// wrapped one level deeper and becomes a `MultiPolygon`. Unknown tags, records
/// without geometry, and records whose nesting does not match their tag are
/// returned unchanged.
pub fn reconstruct(record: RawTileFeature) -> TileItem {
    let geometry = match (record.tag, &record.geometry) {
        (TAG_POINT, Some(RawGeometry::Points(points))) => {
            if points.len() == 1 {
                TileGeometry::Point(points[0])
            } else {
                TileGeometry::MultiPoint(points.clone())
            }
        }
        (TAG_LINE | TAG_POLYGON, Some(RawGeometry::Points(points))) if points.is_empty() => {
            empty_parts_geometry(record.tag)
        }
        (TAG_LINE, Some(RawGeometry::Parts(parts))) => {
            if parts.len() == 1 {
                TileGeometry::LineString(parts[0].clone())
            } else {
                TileGeometry::MultiLineString(parts.clone())
            }
        }
        (TAG_POLYGON, Some(RawGeometry::Parts(parts))) => {
            if parts.len() > 1 {
                TileGeometry::MultiPolygon(vec![parts.clone()])
            } else {
                TileGeometry::Polygon(parts.clone())
            }
        }
        _ => return TileItem::Raw(record),
    };

    TileItem::Feature(TileFeature {
        id: record.id,
        geometry,
        properties: record.tags,
    })
}

fn empty_parts_geometry(tag: u32) -> TileGeometry {
    if tag == TAG_LINE {
        TileGeometry::MultiLineString(Vec::new())
    } else {
        TileGeometry::Polygon(Vec::new())
    }
}
