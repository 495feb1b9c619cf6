use std::collections::BTreeMap;
use std::sync::Arc;

use formats::TileFeatureCollection;
use tracing::debug;

use crate::address::TileAddress;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileCacheKey {
    pub dataset_id: String,
    /// The tile's `[z,x,y]` key.
    pub tile_key: String,
}

impl TileCacheKey {
    pub fn new(dataset_id: impl Into<String>, tile_key: impl Into<String>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            tile_key: tile_key.into(),
        }
    }

    pub fn for_address(dataset_id: impl Into<String>, address: TileAddress) -> Self {
        Self::new(dataset_id, address.cache_key())
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    tile: Arc<TileFeatureCollection>,
    last_used_tick: u64,
    dataset_version: Option<String>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct TileCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Deterministic cache of synthesized tiles.
///
/// Notes on determinism:
/// - Entries are keyed in a `BTreeMap` for stable traversal order.
/// - Eviction is LRU by `last_used_tick`, with a tie-break by key ordering.
/// - Entries recorded under an older dataset version are never served.
#[derive(Debug)]
pub struct TileCache {
    max_entries: usize,
    tick: u64,
    entries: BTreeMap<TileCacheKey, CacheEntry>,
    pinned_versions: BTreeMap<String, String>,
    stats: TileCacheStats,
}

impl TileCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            tick: 0,
            entries: BTreeMap::new(),
            pinned_versions: BTreeMap::new(),
            stats: TileCacheStats::default(),
        }
    }

    /// Pin a dataset to a specific immutable version (typically a content hash).
    ///
    /// Entries cached under any other version are evicted and returned.
    pub fn pin_dataset_version(
        &mut self,
        dataset_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Vec<TileCacheKey> {
        let dataset_id = dataset_id.into();
        let version = version.into();

        let stale: Vec<TileCacheKey> = self
            .entries
            .iter()
            .filter(|(k, e)| {
                k.dataset_id == dataset_id && e.dataset_version.as_deref() != Some(version.as_str())
            })
            .map(|(k, _)| k.clone())
            .collect();
        for k in &stale {
            self.entries.remove(k);
        }
        self.stats.evictions += stale.len() as u64;

        self.pinned_versions.insert(dataset_id, version);
        stale
    }

    pub fn pinned_dataset_version(&self, dataset_id: &str) -> Option<&str> {
        self.pinned_versions.get(dataset_id).map(|s| s.as_str())
    }

    /// Drop every entry and the version pin of a dataset.
    pub fn remove_dataset(&mut self, dataset_id: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, _| k.dataset_id != dataset_id);
        self.pinned_versions.remove(dataset_id);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> TileCacheStats {
        self.stats
    }

    pub fn get(&mut self, key: &TileCacheKey) -> Option<Arc<TileFeatureCollection>> {
        self.tick += 1;
        let pinned = self.pinned_versions.get(&key.dataset_id);
        let fresh = match self.entries.get(key) {
            Some(entry) => entry.dataset_version.as_ref() == pinned,
            None => {
                self.stats.misses += 1;
                return None;
            }
        };
        if !fresh {
            self.entries.remove(key);
            self.stats.evictions += 1;
            self.stats.misses += 1;
            return None;
        }

        let entry = self.entries.get_mut(key)?;
        entry.last_used_tick = self.tick;
        self.stats.hits += 1;
        Some(entry.tile.clone())
    }

    pub fn insert(
        &mut self,
        key: TileCacheKey,
        tile: TileFeatureCollection,
    ) -> Arc<TileFeatureCollection> {
        self.tick += 1;
        let tile = Arc::new(tile);
        let dataset_version = self.pinned_versions.get(&key.dataset_id).cloned();
        self.entries.insert(
            key,
            CacheEntry {
                tile: tile.clone(),
                last_used_tick: self.tick,
                dataset_version,
            },
        );
        while self.entries.len() > self.max_entries {
            if self.evict_lru().is_none() {
                break;
            }
        }
        tile
    }

    /// Return the cached tile or build, store and return it.
    pub fn get_or_insert_with(
        &mut self,
        key: TileCacheKey,
        build: impl FnOnce() -> TileFeatureCollection,
    ) -> Arc<TileFeatureCollection> {
        if let Some(tile) = self.get(&key) {
            return tile;
        }
        self.insert(key, build())
    }

    fn evict_lru(&mut self) -> Option<TileCacheKey> {
        let key = self
            .entries
            .iter()
            .min_by(|(ka, a), (kb, b)| {
                a.last_used_tick
                    .cmp(&b.last_used_tick)
                    .then_with(|| ka.cmp(kb))
            })
            .map(|(k, _)| k.clone())?;
        self.entries.remove(&key);
        self.stats.evictions += 1;
        debug!(dataset = %key.dataset_id, tile = %key.tile_key, "evicted cached tile");
        Some(key)
    }
}
