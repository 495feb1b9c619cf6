use formats::{TileFeatureCollection, reconstruct};
use tracing::debug;

use crate::address::{TileAddress, TileKeyError};
use crate::index::TileSource;

/// Build the GeoJSON feature collection for one tile.
///
/// Coordinates stay in tile pixel space; mapping them back onto the map is the
/// reader's job. A tile the source does not know is an empty collection.
pub fn synthesize_tile<S>(source: &S, address: TileAddress) -> TileFeatureCollection
where
    S: TileSource + ?Sized,
{
    let Some(tile) = source.tile(address) else {
        debug!(%address, "tile miss");
        return TileFeatureCollection::default();
    };

    let features: Vec<_> = tile.into_owned().features.into_iter().map(reconstruct).collect();
    debug!(%address, features = features.len(), "tile synthesized");
    TileFeatureCollection { features }
}

/// Same as [`synthesize_tile`], addressed by a `[z,x,y]` cache key.
pub fn synthesize_tile_key<S>(source: &S, key: &str) -> Result<TileFeatureCollection, TileKeyError>
where
    S: TileSource + ?Sized,
{
    let address = TileAddress::from_cache_key(key)?;
    Ok(synthesize_tile(source, address))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{synthesize_tile, synthesize_tile_key};
    use crate::address::TileAddress;
    use crate::index::{RawTile, TileIndex};
    use crate::options::TileIndexOptions;
    use formats::{GeoDocument, RawGeometry, RawTileFeature, TileGeometry, TileItem};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn single_point_index() -> TileIndex {
        let doc = GeoDocument::from_geojson_value(json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {"name": "A"},
                "geometry": {"type": "Point", "coordinates": [-45.0, 30.0]}
            }]
        }))
        .expect("document");
        TileIndex::build(&doc, TileIndexOptions::default())
    }

    #[test]
    fn single_point_document_end_to_end() {
        let index = single_point_index();

        let tile = synthesize_tile(&index, TileAddress::new(0, 0, 0));
        assert_eq!(tile.len(), 1);
        let feature = tile.features[0].as_feature().expect("feature");
        assert!(matches!(feature.geometry, TileGeometry::Point(_)));
        assert_eq!(
            serde_json::Value::Object(feature.properties.clone()),
            json!({"name": "A"})
        );

        assert!(synthesize_tile(&index, TileAddress::new(0, 1, 0)).is_empty());
    }

    #[test]
    fn two_part_line_record_becomes_multilinestring() {
        let parts = vec![
            vec![[0.0, 0.0], [100.0, 100.0]],
            vec![[200.0, 50.0], [300.0, 75.0], [400.0, 0.0]],
        ];
        let mut tiles = BTreeMap::new();
        tiles.insert(
            TileAddress::new(4, 3, 5),
            RawTile {
                features: vec![RawTileFeature {
                    tag: 2,
                    geometry: Some(RawGeometry::Parts(parts.clone())),
                    tags: Default::default(),
                    id: None,
                }],
            },
        );

        let tile = synthesize_tile(&tiles, TileAddress::new(4, 3, 5));
        assert_eq!(tile.len(), 1);
        let feature = tile.features[0].as_feature().expect("feature");
        assert_eq!(feature.geometry, TileGeometry::MultiLineString(parts));
    }

    #[test]
    fn repeated_synthesis_is_identical() {
        let index = single_point_index();
        for z in 0..=7 {
            for (address, _) in index.occupied_tiles(z) {
                let first = synthesize_tile(&index, address);
                let second = synthesize_tile(&index, address);
                assert_eq!(first, second);
                assert_eq!(
                    first.to_geojson_string().expect("json"),
                    second.to_geojson_string().expect("json")
                );
            }
        }
    }

    #[test]
    fn missing_tile_is_an_empty_collection() {
        let index = single_point_index();
        let empty = synthesize_tile(&index, TileAddress::new(3, 7, 7));
        assert!(empty.is_empty());
        assert_eq!(
            serde_json::to_value(&empty).expect("json"),
            json!({"type": "FeatureCollection", "features": []})
        );
    }

    #[test]
    fn unknown_tags_survive_synthesis() {
        let record = RawTileFeature {
            tag: 0,
            geometry: None,
            tags: Default::default(),
            id: Some(json!("x")),
        };
        let mut tiles = BTreeMap::new();
        tiles.insert(
            TileAddress::new(0, 0, 0),
            RawTile {
                features: vec![record.clone()],
            },
        );
        let tile = synthesize_tile(&tiles, TileAddress::new(0, 0, 0));
        assert_eq!(tile.features, vec![TileItem::Raw(record)]);
    }

    #[test]
    fn cache_keys_address_tiles() {
        let index = single_point_index();
        let by_key = synthesize_tile_key(&index, "[0,0,0]").expect("valid key");
        assert_eq!(by_key, synthesize_tile(&index, TileAddress::new(0, 0, 0)));
        assert!(synthesize_tile_key(&index, "0/0/0").is_err());
    }

    #[test]
    fn synthesis_runs_from_other_threads() {
        let index = std::sync::Arc::new(single_point_index());
        let handles: Vec<_> = (0..4)
            .map(|x| {
                let index = index.clone();
                std::thread::spawn(move || synthesize_tile(&*index, TileAddress::new(2, x, 1)).len())
            })
            .collect();
        let counts: Vec<usize> = handles
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .collect();
        assert_eq!(counts.iter().sum::<usize>(), 1);
    }
}
