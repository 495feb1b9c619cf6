use serde::{Deserialize, Serialize};

use crate::address::MAX_ZOOM;

/// Tile index configuration. Field names follow the usual geojson-vt options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileIndexOptions {
    /// Deepest zoom that can be requested.
    pub max_zoom: u8,
    /// Tiles up to this zoom are materialized when the index is built.
    pub index_max_zoom: u8,
    /// Skip eager materialization for documents with more positions than this.
    pub index_max_points: usize,
    /// Tile edge length in pixel units.
    pub extent: u32,
    /// Margin around each tile, in pixel units.
    pub buffer: u32,
    /// 0 = quiet, 1 = build summary, 2 = per-zoom statistics.
    pub debug: u8,
}

impl Default for TileIndexOptions {
    fn default() -> Self {
        Self {
            max_zoom: 14,
            index_max_zoom: 5,
            index_max_points: 100_000,
            extent: 4096,
            buffer: 64,
            debug: 0,
        }
    }
}

impl TileIndexOptions {
    pub fn from_json_str(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Clamp the options into a usable range.
    pub fn normalized(mut self) -> Self {
        self.max_zoom = self.max_zoom.min(MAX_ZOOM);
        self.index_max_zoom = self.index_max_zoom.min(self.max_zoom);
        self.extent = self.extent.max(1);
        self
    }

    /// Buffer as a fraction of one tile edge.
    pub fn buffer_ratio(&self) -> f64 {
        f64::from(self.buffer) / f64::from(self.extent.max(1))
    }
}
