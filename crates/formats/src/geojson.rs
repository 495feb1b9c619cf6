use foundation::Aabb2;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lon_deg: f64,
    pub lat_deg: f64,
}

impl GeoPoint {
    pub fn new(lon_deg: f64, lat_deg: f64) -> Self {
        Self { lon_deg, lat_deg }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeoGeometry {
    Point(GeoPoint),
    MultiPoint(Vec<GeoPoint>),
    LineString(Vec<GeoPoint>),
    MultiLineString(Vec<Vec<GeoPoint>>),
    Polygon(Vec<Vec<GeoPoint>>),
    MultiPolygon(Vec<Vec<Vec<GeoPoint>>>),
    GeometryCollection(Vec<GeoGeometry>),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GeometryKind {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
    GeometryCollection,
}

impl GeometryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GeometryKind::Point => "Point",
            GeometryKind::MultiPoint => "MultiPoint",
            GeometryKind::LineString => "LineString",
            GeometryKind::MultiLineString => "MultiLineString",
            GeometryKind::Polygon => "Polygon",
            GeometryKind::MultiPolygon => "MultiPolygon",
            GeometryKind::GeometryCollection => "GeometryCollection",
        }
    }
}

impl GeoGeometry {
    pub fn kind(&self) -> GeometryKind {
        match self {
            GeoGeometry::Point(_) => GeometryKind::Point,
            GeoGeometry::MultiPoint(_) => GeometryKind::MultiPoint,
            GeoGeometry::LineString(_) => GeometryKind::LineString,
            GeoGeometry::MultiLineString(_) => GeometryKind::MultiLineString,
            GeoGeometry::Polygon(_) => GeometryKind::Polygon,
            GeoGeometry::MultiPolygon(_) => GeometryKind::MultiPolygon,
            GeoGeometry::GeometryCollection(_) => GeometryKind::GeometryCollection,
        }
    }

    /// Visit every position in document order.
    pub fn for_each_point(&self, f: &mut impl FnMut(&GeoPoint)) {
        match self {
            GeoGeometry::Point(p) => f(p),
            GeoGeometry::MultiPoint(ps) | GeoGeometry::LineString(ps) => ps.iter().for_each(f),
            GeoGeometry::MultiLineString(parts) | GeoGeometry::Polygon(parts) => {
                parts.iter().flatten().for_each(f)
            }
            GeoGeometry::MultiPolygon(polys) => polys.iter().flatten().flatten().for_each(f),
            GeoGeometry::GeometryCollection(members) => {
                for member in members {
                    member.for_each_point(&mut *f);
                }
            }
        }
    }

    pub fn point_count(&self) -> usize {
        let mut n = 0;
        self.for_each_point(&mut |_| n += 1);
        n
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeoFeature {
    pub id: Option<Value>,
    pub properties: Map<String, Value>,
    /// `None` for features whose geometry is `null`.
    pub geometry: Option<GeoGeometry>,
}

/// A parsed GeoJSON upload, normalized to a feature collection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeoDocument {
    pub features: Vec<GeoFeature>,
    /// BLAKE3 hex digest of the source text, when parsed from text.
    pub content_hash: Option<String>,
}

#[derive(Debug)]
pub enum GeoJsonError {
    Json(String),
    NotGeoJson(String),
    InvalidFeature { index: usize, reason: String },
}

impl std::fmt::Display for GeoJsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeoJsonError::Json(e) => write!(f, "JSON parse error: {e}"),
            GeoJsonError::NotGeoJson(reason) => write!(f, "not a GeoJSON object: {reason}"),
            GeoJsonError::InvalidFeature { index, reason } => {
                write!(f, "invalid feature at index {index}: {reason}")
            }
        }
    }
}

impl std::error::Error for GeoJsonError {}

impl GeoDocument {
    pub fn from_geojson_str(payload: &str) -> Result<Self, GeoJsonError> {
        let value: Value =
            serde_json::from_str(payload).map_err(|e| GeoJsonError::Json(e.to_string()))?;
        let mut doc = Self::from_geojson_value(value)?;
        doc.content_hash = Some(blake3::hash(payload.as_bytes()).to_hex().to_string());
        Ok(doc)
    }

    /// Accepts a FeatureCollection, a single Feature, or a bare geometry.
    pub fn from_geojson_value(value: Value) -> Result<Self, GeoJsonError> {
        let obj = value
            .as_object()
            .ok_or_else(|| GeoJsonError::NotGeoJson("expected a JSON object".to_string()))?;
        let ty = obj
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GeoJsonError::NotGeoJson("missing \"type\"".to_string()))?;

        let features = match ty {
            "FeatureCollection" => {
                let features_val = obj.get("features").and_then(|v| v.as_array()).ok_or_else(
                    || GeoJsonError::NotGeoJson("FeatureCollection without features".to_string()),
                )?;
                let mut features = Vec::with_capacity(features_val.len());
                for (index, feat_val) in features_val.iter().enumerate() {
                    features.push(parse_feature(feat_val, index)?);
                }
                features
            }
            "Feature" => vec![parse_feature(&value, 0)?],
            _ => {
                let geometry = parse_geometry(&value)
                    .map_err(|reason| GeoJsonError::InvalidFeature { index: 0, reason })?;
                vec![GeoFeature {
                    id: None,
                    properties: Map::new(),
                    geometry: Some(geometry),
                }]
            }
        };

        Ok(Self {
            features,
            content_hash: None,
        })
    }

    /// Longitude/latitude extent of every position, `None` when there are none.
    pub fn extent(&self) -> Option<Aabb2> {
        let mut bounds = Aabb2::empty();
        for geom in self.features.iter().filter_map(|f| f.geometry.as_ref()) {
            geom.for_each_point(&mut |p| bounds.extend([p.lon_deg, p.lat_deg]));
        }
        (!bounds.is_empty()).then_some(bounds)
    }

    pub fn point_count(&self) -> usize {
        self.features
            .iter()
            .filter_map(|f| f.geometry.as_ref())
            .map(GeoGeometry::point_count)
            .sum()
    }

    /// Emits a GeoJSON FeatureCollection. Property ordering follows `serde_json::Map`.
    pub fn to_geojson_value(&self) -> Value {
        let mut root = Map::new();
        root.insert(
            "type".to_string(),
            Value::String("FeatureCollection".to_string()),
        );

        let features = self
            .features
            .iter()
            .map(|feat| {
                let mut fobj = Map::new();
                fobj.insert("type".to_string(), Value::String("Feature".to_string()));
                if let Some(id) = &feat.id {
                    fobj.insert("id".to_string(), id.clone());
                }
                fobj.insert(
                    "properties".to_string(),
                    Value::Object(feat.properties.clone()),
                );
                fobj.insert(
                    "geometry".to_string(),
                    feat.geometry
                        .as_ref()
                        .map(geometry_to_geojson_value)
                        .unwrap_or(Value::Null),
                );
                Value::Object(fobj)
            })
            .collect();

        root.insert("features".to_string(), Value::Array(features));
        Value::Object(root)
    }

    pub fn to_geojson_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_geojson_value())
    }
}

fn parse_feature(value: &Value, index: usize) -> Result<GeoFeature, GeoJsonError> {
    let invalid = |reason: String| GeoJsonError::InvalidFeature { index, reason };

    let feat_obj = value
        .as_object()
        .ok_or_else(|| invalid("feature must be an object".to_string()))?;
    let feat_type = feat_obj
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| invalid("feature missing type".to_string()))?;
    if feat_type != "Feature" {
        return Err(invalid(format!("unexpected feature type: {feat_type}")));
    }

    let id = match feat_obj.get("id") {
        Some(v @ (Value::String(_) | Value::Number(_))) => Some(v.clone()),
        _ => None,
    };

    let properties = feat_obj
        .get("properties")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();

    let geometry = match feat_obj.get("geometry") {
        None => return Err(invalid("feature missing geometry".to_string())),
        Some(Value::Null) => None,
        Some(g) => Some(parse_geometry(g).map_err(invalid)?),
    };

    Ok(GeoFeature {
        id,
        properties,
        geometry,
    })
}

fn parse_geometry(value: &Value) -> Result<GeoGeometry, String> {
    let obj = value
        .as_object()
        .ok_or("geometry must be an object".to_string())?;
    let ty = obj
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or("geometry missing type".to_string())?;

    if ty == "GeometryCollection" {
        let members = obj
            .get("geometries")
            .and_then(|v| v.as_array())
            .ok_or("GeometryCollection missing geometries".to_string())?;
        let mut out = Vec::with_capacity(members.len());
        for member in members {
            out.push(parse_geometry(member)?);
        }
        return Ok(GeoGeometry::GeometryCollection(out));
    }

    let coords = obj
        .get("coordinates")
        .ok_or("geometry missing coordinates".to_string())?;

    match ty {
        "Point" => Ok(GeoGeometry::Point(parse_point(coords)?)),
        "MultiPoint" => Ok(GeoGeometry::MultiPoint(parse_points(coords)?)),
        "LineString" => Ok(GeoGeometry::LineString(parse_points(coords)?)),
        "MultiLineString" => Ok(GeoGeometry::MultiLineString(parse_parts(coords)?)),
        "Polygon" => Ok(GeoGeometry::Polygon(parse_parts(coords)?)),
        "MultiPolygon" => Ok(GeoGeometry::MultiPolygon(parse_multi_polygon(coords)?)),
        other => Err(format!("unsupported geometry type: {other}")),
    }
}

fn parse_point(coords: &Value) -> Result<GeoPoint, String> {
    let arr = coords
        .as_array()
        .ok_or("position must be an array".to_string())?;
    if arr.len() < 2 {
        return Err("position must have [lon, lat]".to_string());
    }
    let lon = arr[0].as_f64().ok_or("lon must be a number".to_string())?;
    let lat = arr[1].as_f64().ok_or("lat must be a number".to_string())?;
    Ok(GeoPoint::new(lon, lat))
}

fn parse_points(coords: &Value) -> Result<Vec<GeoPoint>, String> {
    let arr = coords
        .as_array()
        .ok_or("coordinates must be an array".to_string())?;
    arr.iter().map(parse_point).collect()
}

fn parse_parts(coords: &Value) -> Result<Vec<Vec<GeoPoint>>, String> {
    let arr = coords
        .as_array()
        .ok_or("coordinates must be an array of parts".to_string())?;
    arr.iter().map(parse_points).collect()
}

fn parse_multi_polygon(coords: &Value) -> Result<Vec<Vec<Vec<GeoPoint>>>, String> {
    let polys = coords
        .as_array()
        .ok_or("MultiPolygon coordinates must be an array of polygons".to_string())?;
    polys.iter().map(parse_parts).collect()
}

fn geometry_to_geojson_value(geom: &GeoGeometry) -> Value {
    let mut obj = Map::new();
    obj.insert(
        "type".to_string(),
        Value::String(geom.kind().as_str().to_string()),
    );
    let coords = match geom {
        GeoGeometry::Point(p) => point_coords(p),
        GeoGeometry::MultiPoint(ps) | GeoGeometry::LineString(ps) => points_coords(ps),
        GeoGeometry::MultiLineString(parts) | GeoGeometry::Polygon(parts) => {
            Value::Array(parts.iter().map(|part| points_coords(part)).collect())
        }
        GeoGeometry::MultiPolygon(polys) => Value::Array(
            polys
                .iter()
                .map(|poly| Value::Array(poly.iter().map(|ring| points_coords(ring)).collect()))
                .collect(),
        ),
        GeoGeometry::GeometryCollection(members) => {
            obj.insert(
                "geometries".to_string(),
                Value::Array(members.iter().map(geometry_to_geojson_value).collect()),
            );
            return Value::Object(obj);
        }
    };
    obj.insert("coordinates".to_string(), coords);
    Value::Object(obj)
}

fn points_coords(ps: &[GeoPoint]) -> Value {
    Value::Array(ps.iter().map(point_coords).collect())
}

fn point_coords(p: &GeoPoint) -> Value {
    Value::Array(vec![Value::from(p.lon_deg), Value::from(p.lat_deg)])
}

#[cfg(test)]
mod tests {
    use super::{GeoDocument, GeoGeometry, GeoJsonError, GeoPoint, GeometryKind};
    use serde_json::json;

    #[test]
    fn parses_feature_collection_with_mixed_geometry() {
        let payload = json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "id": 7, "properties": {"name": "A"},
                 "geometry": {"type": "Point", "coordinates": [10.0, 20.0]}},
                {"type": "Feature", "properties": null,
                 "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]}},
                {"type": "Feature", "properties": {},
                 "geometry": null}
            ]
        })
        .to_string();
        let doc = GeoDocument::from_geojson_str(&payload).expect("parse document");
        assert_eq!(doc.features.len(), 3);
        assert_eq!(doc.features[0].id, Some(json!(7)));
        assert_eq!(doc.features[0].properties["name"], json!("A"));
        assert_eq!(
            doc.features[0].geometry,
            Some(GeoGeometry::Point(GeoPoint::new(10.0, 20.0)))
        );
        assert!(doc.features[1].properties.is_empty());
        assert!(doc.features[2].geometry.is_none());
        assert_eq!(doc.point_count(), 3);
        assert_eq!(doc.content_hash.as_deref().map(str::len), Some(64));
    }

    #[test]
    fn accepts_bare_feature_and_geometry() {
        let feature = json!({"type": "Feature", "properties": {},
            "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]]}});
        let doc = GeoDocument::from_geojson_value(feature).expect("feature");
        assert_eq!(doc.features.len(), 1);

        let geometry = json!({"type": "GeometryCollection", "geometries": [
            {"type": "Point", "coordinates": [1, 2]},
            {"type": "MultiPoint", "coordinates": [[3, 4], [5, 6]]}
        ]});
        let doc = GeoDocument::from_geojson_value(geometry).expect("geometry");
        let kind = doc.features[0].geometry.as_ref().map(GeoGeometry::kind);
        assert_eq!(kind, Some(GeometryKind::GeometryCollection));
        assert_eq!(doc.point_count(), 3);
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(matches!(
            GeoDocument::from_geojson_str("{not json"),
            Err(GeoJsonError::Json(_))
        ));
        assert!(matches!(
            GeoDocument::from_geojson_str("[1, 2, 3]"),
            Err(GeoJsonError::NotGeoJson(_))
        ));
        let bad = json!({"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [1]}}
        ]});
        match GeoDocument::from_geojson_value(bad) {
            Err(GeoJsonError::InvalidFeature { index, .. }) => assert_eq!(index, 0),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn extent_covers_all_positions() {
        let doc = GeoDocument::from_geojson_value(json!({"type": "MultiLineString",
            "coordinates": [[[-10, 5], [3, 7]], [[2, -4], [8, 1]]]}))
        .expect("parse");
        let extent = doc.extent().expect("extent");
        assert_eq!(extent.min, [-10.0, -4.0]);
        assert_eq!(extent.max, [8.0, 7.0]);

        let empty = GeoDocument::from_geojson_value(
            json!({"type": "FeatureCollection", "features": []}),
        )
        .expect("parse");
        assert!(empty.extent().is_none());
    }

    #[test]
    fn exported_collection_reparses_to_same_features() {
        let doc = GeoDocument::from_geojson_value(json!({"type": "Feature", "id": "a",
            "properties": {"k": [1, 2]},
            "geometry": {"type": "MultiPolygon", "coordinates": [[[[0, 0], [1, 0], [0, 1], [0, 0]]]]}}))
        .expect("parse");
        let again = GeoDocument::from_geojson_value(doc.to_geojson_value()).expect("reparse");
        assert_eq!(doc.features, again.features);
    }

    #[test]
    fn bare_geometry_exports_as_feature_collection_text() {
        let doc = GeoDocument::from_geojson_str(r#"{"type": "Point", "coordinates": [1.5, 2]}"#)
            .expect("parse");
        let text = doc.to_geojson_string().expect("export");
        let value: serde_json::Value = serde_json::from_str(&text).expect("reparse text");
        assert_eq!(
            value,
            json!({"type": "FeatureCollection", "features": [{
                "type": "Feature",
                "properties": {},
                "geometry": {"type": "Point", "coordinates": [1.5, 2.0]}
            }]})
        );
    }
}
