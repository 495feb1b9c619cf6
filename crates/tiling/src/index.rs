//! In-memory spatial tile index.
//!
//! Features are projected once into the unit mercator square. Tiles up to
//! `index_max_zoom` are materialized at build time; deeper tiles are derived on
//! request from the projected features without touching the index, so lookups
//! only ever need `&self`.
//!
//! A feature belongs to a tile when its geometry intersects the buffered tile
//! extent: points are tested one by one, lines segment by segment, and polygons
//! also claim tiles lying entirely inside them. Coverage is found by walking
//! the quadtree down from the root, so only touched tiles are ever visited.
//! There is no clipping or simplification: a member feature is carried whole,
//! in tile pixel units, and line and polygon coordinates may fall outside
//! `0..extent`, which renderers clip anyway.

use std::borrow::Cow;
use std::collections::BTreeMap;

use formats::{
    GeoDocument, GeoGeometry, GeoPoint, RawGeometry, RawTileFeature, TAG_LINE, TAG_POINT,
    TAG_POLYGON, TilePoint,
};
use foundation::Aabb2;
use foundation::math::lon_lat_to_unit;
use geo::{Coord, Intersects, LineString, Polygon, Rect};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::address::TileAddress;
use crate::options::TileIndexOptions;

/// Compact records for one tile.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawTile {
    pub features: Vec<RawTileFeature>,
}

/// Anything that can answer a tile lookup with compact records.
///
/// `None` means the tile holds no geometry.
pub trait TileSource {
    fn tile(&self, address: TileAddress) -> Option<Cow<'_, RawTile>>;
}

impl TileSource for BTreeMap<TileAddress, RawTile> {
    fn tile(&self, address: TileAddress) -> Option<Cow<'_, RawTile>> {
        self.get(&address).map(Cow::Borrowed)
    }
}

/// Geometry used for tile membership tests.
#[derive(Debug, Clone, PartialEq)]
enum Shape {
    /// Tested per position in `ProjectedFeature::parts`.
    Points,
    Lines(Vec<LineString<f64>>),
    Polygons(Vec<Polygon<f64>>),
}

#[derive(Debug, Clone, PartialEq)]
struct ProjectedFeature {
    tag: u32,
    /// Unit-square coordinates; point features keep all positions in one part,
    /// multipolygons keep their rings in one flat list.
    parts: Vec<Vec<[f64; 2]>>,
    shape: Shape,
    bounds: Aabb2,
    tags: Map<String, Value>,
    id: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileIndexStats {
    pub features: usize,
    pub points: usize,
    pub eager_tiles: usize,
}

#[derive(Debug, Clone)]
pub struct TileIndex {
    options: TileIndexOptions,
    features: Vec<ProjectedFeature>,
    tiles: BTreeMap<TileAddress, RawTile>,
    /// Zoom levels `0..=eager_max_zoom` are fully materialized in `tiles`.
    eager_max_zoom: Option<u8>,
    stats: TileIndexStats,
}

impl TileIndex {
    pub fn build(doc: &GeoDocument, options: TileIndexOptions) -> Self {
        let options = options.normalized();

        let mut features = Vec::new();
        for feature in &doc.features {
            if let Some(geometry) = &feature.geometry {
                project_geometry(geometry, &feature.properties, &feature.id, &mut features);
            }
        }
        let points: usize = features
            .iter()
            .map(|f| f.parts.iter().map(Vec::len).sum::<usize>())
            .sum();

        let mut index = Self {
            options,
            stats: TileIndexStats {
                features: features.len(),
                points,
                eager_tiles: 0,
            },
            features,
            tiles: BTreeMap::new(),
            eager_max_zoom: None,
        };

        if points <= index.options.index_max_points {
            index.materialize();
        } else if index.options.debug > 0 {
            debug!(
                points,
                limit = index.options.index_max_points,
                "skipping eager tiles"
            );
        }

        if index.options.debug > 0 {
            info!(
                features = index.stats.features,
                points = index.stats.points,
                eager_tiles = index.stats.eager_tiles,
                max_zoom = index.options.max_zoom,
                "tile index built"
            );
        }
        index
    }

    pub fn options(&self) -> &TileIndexOptions {
        &self.options
    }

    pub fn stats(&self) -> TileIndexStats {
        self.stats
    }

    /// Every address at zoom `z` that holds geometry, with its record count.
    pub fn occupied_tiles(&self, z: u8) -> Vec<(TileAddress, usize)> {
        if z > self.options.max_zoom {
            return Vec::new();
        }
        let mut counts: BTreeMap<TileAddress, usize> = BTreeMap::new();
        for feature in &self.features {
            self.walk(feature, z, |address| {
                if address.z == z {
                    *counts.entry(address).or_default() += 1;
                }
            });
        }
        counts.into_iter().collect()
    }

    fn materialize(&mut self) {
        let max_z = self.options.index_max_zoom;
        let mut tiles: BTreeMap<TileAddress, RawTile> = BTreeMap::new();
        for feature in &self.features {
            self.walk(feature, max_z, |address| {
                tiles
                    .entry(address)
                    .or_default()
                    .features
                    .push(self.slice(feature, address));
            });
        }
        if self.options.debug > 1 {
            debug!(max_z, tiles = tiles.len(), "materialized eager tiles");
        }
        self.stats.eager_tiles = tiles.len();
        self.tiles = tiles;
        self.eager_max_zoom = Some(max_z);
    }

    /// Tile extent grown by the buffer, in unit-square coordinates.
    fn buffered_box(&self, address: TileAddress) -> Aabb2 {
        let margin = self.options.buffer_ratio() / TileAddress::tiles_per_axis(address.z) as f64;
        address.unit_bounds().expanded(margin)
    }

    /// Visit every tile down to `max_z` that the feature touches.
    ///
    /// A child's buffered box lies inside its parent's, so a tile the feature
    /// misses never has touched descendants.
    fn walk(&self, feature: &ProjectedFeature, max_z: u8, mut visit: impl FnMut(TileAddress)) {
        let mut stack = vec![TileAddress::new(0, 0, 0)];
        while let Some(address) = stack.pop() {
            if !self.touches(feature, address) {
                continue;
            }
            visit(address);
            if address.z < max_z {
                let (z, x, y) = (address.z + 1, address.x * 2, address.y * 2);
                stack.extend([
                    TileAddress::new(z, x, y),
                    TileAddress::new(z, x + 1, y),
                    TileAddress::new(z, x, y + 1),
                    TileAddress::new(z, x + 1, y + 1),
                ]);
            }
        }
    }

    fn touches(&self, feature: &ProjectedFeature, address: TileAddress) -> bool {
        let tile_box = self.buffered_box(address);
        if !tile_box.intersects(&feature.bounds) {
            return false;
        }
        let rect = Rect::new(
            Coord {
                x: tile_box.min[0],
                y: tile_box.min[1],
            },
            Coord {
                x: tile_box.max[0],
                y: tile_box.max[1],
            },
        );
        match &feature.shape {
            Shape::Points => feature
                .parts
                .iter()
                .flatten()
                .any(|p| tile_box.contains(*p)),
            Shape::Lines(lines) => lines.iter().any(|line| match line.0.as_slice() {
                [only] => rect.intersects(only),
                _ => line.intersects(&rect),
            }),
            Shape::Polygons(polygons) => polygons.iter().any(|polygon| polygon.intersects(&rect)),
        }
    }

    /// Express a member feature in the pixel space of one tile.
    fn slice(&self, feature: &ProjectedFeature, address: TileAddress) -> RawTileFeature {
        let n = TileAddress::tiles_per_axis(address.z) as f64;
        let extent = f64::from(self.options.extent);
        let to_pixels = |p: &[f64; 2]| -> TilePoint {
            [
                ((p[0] * n - f64::from(address.x)) * extent).round(),
                ((p[1] * n - f64::from(address.y)) * extent).round(),
            ]
        };

        let geometry = if feature.tag == TAG_POINT {
            let tile_box = self.buffered_box(address);
            RawGeometry::Points(
                feature
                    .parts
                    .iter()
                    .flatten()
                    .filter(|p| tile_box.contains(**p))
                    .map(to_pixels)
                    .collect(),
            )
        } else {
            RawGeometry::Parts(
                feature
                    .parts
                    .iter()
                    .map(|part| part.iter().map(to_pixels).collect())
                    .collect(),
            )
        };

        RawTileFeature {
            tag: feature.tag,
            geometry: Some(geometry),
            tags: feature.tags.clone(),
            id: feature.id.clone(),
        }
    }
}

impl TileSource for TileIndex {
    fn tile(&self, address: TileAddress) -> Option<Cow<'_, RawTile>> {
        if address.z > self.options.max_zoom {
            return None;
        }
        let address = address.wrapped();
        if !address.is_valid() {
            return None;
        }

        if self.eager_max_zoom.is_some_and(|max_z| address.z <= max_z) {
            return self.tiles.get(&address).map(Cow::Borrowed);
        }

        let features: Vec<RawTileFeature> = self
            .features
            .iter()
            .filter(|feature| self.touches(feature, address))
            .map(|feature| self.slice(feature, address))
            .collect();
        if features.is_empty() {
            return None;
        }
        Some(Cow::Owned(RawTile { features }))
    }
}

fn project_geometry(
    geometry: &GeoGeometry,
    tags: &Map<String, Value>,
    id: &Option<Value>,
    out: &mut Vec<ProjectedFeature>,
) {
    let (tag, parts, shape) = match geometry {
        GeoGeometry::Point(p) => (
            TAG_POINT,
            vec![project(std::slice::from_ref(p))],
            Shape::Points,
        ),
        GeoGeometry::MultiPoint(points) => (TAG_POINT, vec![project(points)], Shape::Points),
        GeoGeometry::LineString(points) => {
            let parts = vec![project(points)];
            let shape = Shape::Lines(parts.iter().map(|p| line_string(p)).collect());
            (TAG_LINE, parts, shape)
        }
        GeoGeometry::MultiLineString(lines) => {
            let parts: Vec<_> = lines.iter().map(|l| project(l)).collect();
            let shape = Shape::Lines(parts.iter().map(|p| line_string(p)).collect());
            (TAG_LINE, parts, shape)
        }
        GeoGeometry::Polygon(rings) => {
            let parts: Vec<_> = rings.iter().map(|r| project(r)).collect();
            let shape = Shape::Polygons(vec![polygon(&parts)]);
            (TAG_POLYGON, parts, shape)
        }
        GeoGeometry::MultiPolygon(polygons) => {
            let grouped: Vec<Vec<Vec<[f64; 2]>>> = polygons
                .iter()
                .map(|rings| rings.iter().map(|r| project(r)).collect())
                .collect();
            let shape = Shape::Polygons(grouped.iter().map(|rings| polygon(rings)).collect());
            (TAG_POLYGON, grouped.into_iter().flatten().collect(), shape)
        }
        GeoGeometry::GeometryCollection(members) => {
            for member in members {
                project_geometry(member, tags, id, out);
            }
            return;
        }
    };

    let mut bounds = Aabb2::empty();
    for p in parts.iter().flatten() {
        bounds.extend(*p);
    }
    if bounds.is_empty() {
        return;
    }

    out.push(ProjectedFeature {
        tag,
        parts,
        shape,
        bounds,
        tags: tags.clone(),
        id: id.clone(),
    });
}

fn project(points: &[GeoPoint]) -> Vec<[f64; 2]> {
    points
        .iter()
        .map(|p| lon_lat_to_unit(p.lon_deg, p.lat_deg))
        .collect()
}

fn line_string(points: &[[f64; 2]]) -> LineString<f64> {
    points.iter().map(|p| Coord { x: p[0], y: p[1] }).collect()
}

/// First ring is the shell, the rest are holes.
fn polygon(rings: &[Vec<[f64; 2]>]) -> Polygon<f64> {
    let mut rings = rings.iter().map(|r| line_string(r));
    let exterior = rings.next().unwrap_or_else(|| LineString::new(Vec::new()));
    Polygon::new(exterior, rings.collect())
}
