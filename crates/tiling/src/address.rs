//! Tile addresses in the ZXY scheme and their cache key encoding.
//!
//! The cache key is the address serialized as a three element JSON array,
//! `[z,x,y]`. Renderers hand it back verbatim when they request the tile, so
//! it doubles as a deduplication key.

use foundation::Aabb2;
use serde::{Deserialize, Serialize};

/// Deepest zoom level an address may carry.
pub const MAX_ZOOM: u8 = 30;

/// Tile coordinate in ZXY scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileAddress {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileKeyError {
    pub key: String,
    pub reason: String,
}

impl std::fmt::Display for TileKeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid tile key {:?}: {}", self.key, self.reason)
    }
}

impl std::error::Error for TileKeyError {}

impl TileAddress {
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Number of tiles along one axis at zoom `z` (2^z).
    pub fn tiles_per_axis(z: u8) -> u64 {
        1u64 << z.min(MAX_ZOOM)
    }

    /// True when the zoom is supported and x/y lie inside the pyramid.
    pub fn is_valid(&self) -> bool {
        let n = Self::tiles_per_axis(self.z);
        self.z <= MAX_ZOOM && u64::from(self.x) < n && u64::from(self.y) < n
    }

    /// Wrap the column around the antimeridian.
    pub fn wrapped(&self) -> Self {
        let n = Self::tiles_per_axis(self.z);
        Self {
            z: self.z,
            x: (u64::from(self.x) % n) as u32,
            y: self.y,
        }
    }

    pub fn cache_key(&self) -> String {
        format!("[{},{},{}]", self.z, self.x, self.y)
    }

    pub fn from_cache_key(key: &str) -> Result<Self, TileKeyError> {
        let err = |reason: String| TileKeyError {
            key: key.to_string(),
            reason,
        };
        let (z, x, y): (u64, u64, u64) =
            serde_json::from_str(key).map_err(|e| err(e.to_string()))?;
        if z > u64::from(MAX_ZOOM) {
            return Err(err(format!("zoom {z} exceeds {MAX_ZOOM}")));
        }
        let address = Self {
            z: z as u8,
            x: u32::try_from(x).map_err(|_| err(format!("column {x} out of range")))?,
            y: u32::try_from(y).map_err(|_| err(format!("row {y} out of range")))?,
        };
        Ok(address)
    }

    /// Extent of the tile in the unit mercator square.
    pub fn unit_bounds(&self) -> Aabb2 {
        let n = Self::tiles_per_axis(self.z) as f64;
        Aabb2::new(
            [self.x as f64 / n, self.y as f64 / n],
            [(self.x as f64 + 1.0) / n, (self.y as f64 + 1.0) / n],
        )
    }

    /// Geographic bounds of this tile in WGS84 (lon_min, lat_min, lon_max, lat_max).
    pub fn bounds_wgs84(&self) -> (f64, f64, f64, f64) {
        let b = self.unit_bounds();
        (
            foundation::math::unit_x_to_lon(b.min[0]),
            foundation::math::unit_y_to_lat(b.max[1]),
            foundation::math::unit_x_to_lon(b.max[0]),
            foundation::math::unit_y_to_lat(b.min[1]),
        )
    }
}

impl std::fmt::Display for TileAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::TileAddress;

    #[test]
    fn cache_key_is_a_json_triple() {
        let address = TileAddress::new(3, 5, 2);
        assert_eq!(address.cache_key(), "[3,5,2]");
        assert_eq!(TileAddress::from_cache_key("[3,5,2]"), Ok(address));
        assert_eq!(TileAddress::from_cache_key(" [3, 5, 2] "), Ok(address));
    }

    #[test]
    fn malformed_keys_are_rejected() {
        for key in ["", "[1,2]", "[1,2,3,4]", "[-1,0,0]", "[31,0,0]", "{\"z\":1}", "[1,2,\"3\"]"] {
            assert!(TileAddress::from_cache_key(key).is_err(), "accepted {key:?}");
        }
    }

    #[test]
    fn validity_and_wrapping() {
        assert!(TileAddress::new(0, 0, 0).is_valid());
        assert!(!TileAddress::new(0, 1, 0).is_valid());
        assert!(!TileAddress::new(2, 0, 4).is_valid());
        assert_eq!(TileAddress::new(2, 5, 1).wrapped(), TileAddress::new(2, 1, 1));
    }

    #[test]
    fn world_tile_spans_mercator_limits() {
        let (lon_min, lat_min, lon_max, lat_max) = TileAddress::new(0, 0, 0).bounds_wgs84();
        assert_eq!((lon_min, lon_max), (-180.0, 180.0));
        assert!((lat_max - 85.0511).abs() < 1e-3);
        assert!((lat_min + 85.0511).abs() < 1e-3);
    }
}
