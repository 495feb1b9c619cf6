//! The map page: uploads, layer list, hover info and tile requests.
//!
//! A page owns its documents, tile indexes and cached tiles; dropping the page
//! releases all of them. Rendering, hit testing and view animation belong to
//! the host, which reports pointer hits back through [`MapPage::pointer_moved`]
//! and applies the [`ViewFit`] requests returned from uploads.

use std::collections::BTreeMap;
use std::sync::Arc;

use formats::{GeoDocument, GeoJsonError, TileFeatureCollection};
use foundation::Aabb2;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tiling::{
    TileAddress, TileCache, TileCacheKey, TileIndexOptions, TileKeyError, synthesize_tile,
};
use tracing::{debug, info, warn};

use crate::backend::{
    Interaction, PageStrategy, RenderBackend, RenderLayer, RenderStrategy, UploadMode,
};
use crate::layer::{LayerEntry, LayerId, LayerList};

/// Page settings. Missing JSON fields fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    pub tile_options: TileIndexOptions,
    pub tile_cache_entries: usize,
    /// Padding around a fitted extent: top, right, bottom, left (pixels).
    pub fit_padding: [f64; 4],
    pub fit_duration_ms: u32,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            tile_options: TileIndexOptions::default(),
            tile_cache_entries: 512,
            fit_padding: [100.0; 4],
            fit_duration_ms: 1000,
        }
    }
}

impl PageConfig {
    /// Defaults for one page variant; tile pages log index build statistics.
    pub fn for_backend(backend: RenderBackend) -> Self {
        let mut config = Self::default();
        if backend == RenderBackend::VectorTile {
            config.tile_options.debug = 1;
        }
        config
    }
}

/// A file handed over by the upload control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub name: String,
    pub mime: Option<String>,
    pub contents: String,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mime: None,
            contents: contents.into(),
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    /// `.geojson`/`.json` files or anything declared as `application/json`.
    pub fn is_accepted(&self) -> bool {
        let name = self.name.to_ascii_lowercase();
        name.ends_with(".geojson")
            || name.ends_with(".json")
            || self.mime.as_deref() == Some("application/json")
    }
}

#[derive(Debug)]
pub enum PageError {
    UnsupportedFile { name: String },
    InvalidFile { name: String, source: GeoJsonError },
    UnknownLayer(LayerId),
    NotTiled(LayerId),
    InvalidTileKey(TileKeyError),
}

impl std::fmt::Display for PageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageError::UnsupportedFile { name } => {
                write!(f, "Unsupported file ({name}). Please choose a GeoJSON file.")
            }
            PageError::InvalidFile { name, .. } => {
                write!(f, "Invalid GeoJSON file ({name}). Please check the format.")
            }
            PageError::UnknownLayer(id) => write!(f, "unknown layer {id}"),
            PageError::NotTiled(id) => write!(f, "layer {id} is not a tile layer"),
            PageError::InvalidTileKey(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PageError::InvalidFile { source, .. } => Some(source),
            PageError::InvalidTileKey(e) => Some(e),
            _ => None,
        }
    }
}

/// Ask the host to animate the view onto an extent (lon/lat degrees).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewFit {
    pub extent: Aabb2,
    pub padding: [f64; 4],
    pub duration_ms: u32,
}

#[derive(Debug, Default)]
pub struct UploadOutcome {
    pub added: Vec<LayerId>,
    pub removed: Vec<LayerId>,
    pub fit: Option<ViewFit>,
    /// One entry per rejected file; each is shown to the user.
    pub errors: Vec<PageError>,
}

/// A feature the host found under the pointer.
#[derive(Debug, Clone, PartialEq)]
pub struct FeaturePick {
    pub layer: LayerId,
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HoverInfo {
    pub layer: LayerId,
    pub properties: Map<String, Value>,
    /// Map coordinate under the pointer.
    pub position: [f64; 2],
    /// Tooltip placement in screen pixels.
    pub overlay_offset: [f64; 2],
}

impl HoverInfo {
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.properties {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out.push_str(&format!("{key}: {value}\n"));
        }
        out.push_str(&format_xy(self.position, 2));
        out
    }
}

/// `"x, y"` with a fixed number of decimals.
pub fn format_xy(position: [f64; 2], decimals: usize) -> String {
    format!(
        "{:.prec$}, {:.prec$}",
        position[0],
        position[1],
        prec = decimals
    )
}

const OVERLAY_OFFSET_PX: f64 = 10.0;

pub struct MapPage<S = PageStrategy> {
    strategy: S,
    config: PageConfig,
    layers: LayerList,
    render_layers: BTreeMap<LayerId, RenderLayer>,
    tile_cache: TileCache,
    show_info: bool,
    hover: Option<HoverInfo>,
}

impl<S: RenderStrategy> MapPage<S> {
    pub fn new(strategy: S) -> Self {
        let config = PageConfig::for_backend(strategy.backend());
        Self::with_config(strategy, config)
    }

    pub fn with_config(strategy: S, config: PageConfig) -> Self {
        Self {
            show_info: strategy.show_info_default(),
            tile_cache: TileCache::new(config.tile_cache_entries),
            strategy,
            config,
            layers: LayerList::new(),
            render_layers: BTreeMap::new(),
            hover: None,
        }
    }

    pub fn interactions(&self) -> &'static [Interaction] {
        self.strategy.interactions()
    }

    /// Only multi-upload pages show the layer list.
    pub fn shows_layer_list(&self) -> bool {
        self.strategy.upload_mode() == UploadMode::Multi
    }

    pub fn layers(&self) -> &[LayerEntry] {
        self.layers.entries()
    }

    pub fn render_layer(&self, id: LayerId) -> Option<&RenderLayer> {
        self.render_layers.get(&id)
    }

    /// Render layers in stacking order (oldest first).
    pub fn render_layers(&self) -> impl Iterator<Item = &RenderLayer> {
        self.render_layers.values()
    }

    /// Parse and add uploaded files.
    ///
    /// Each file stands alone: a rejected file leaves the page as it was and
    /// shows up in `errors`, while the other files are still added. Single
    /// upload pages only look at the first file and replace their layer.
    pub fn upload(&mut self, files: &[UploadedFile]) -> UploadOutcome {
        let mut outcome = UploadOutcome::default();
        let files = match self.strategy.upload_mode() {
            UploadMode::Single => &files[..files.len().min(1)],
            UploadMode::Multi => files,
        };

        for file in files {
            let doc = match parse_upload(file) {
                Ok(doc) => doc,
                Err(err) => {
                    warn!(file = %file.name, "rejected upload: {err}");
                    outcome.errors.push(err);
                    continue;
                }
            };

            if self.strategy.upload_mode() == UploadMode::Single {
                let previous: Vec<LayerId> = self.layers.entries().iter().map(|e| e.id).collect();
                for id in previous {
                    if self.detach(id).is_some() {
                        outcome.removed.push(id);
                    }
                }
            }

            let extent = doc.extent().filter(Aabb2::is_finite);
            let id = self.attach(&file.name, doc);
            outcome.added.push(id);
            if let Some(extent) = extent {
                outcome.fit = Some(ViewFit {
                    extent,
                    padding: self.config.fit_padding,
                    duration_ms: self.config.fit_duration_ms,
                });
            }
        }
        outcome
    }

    /// Flip a layer's visibility; returns the new state.
    pub fn toggle_visibility(&mut self, id: LayerId) -> Result<bool, PageError> {
        let visible = self.layers.toggle(id).ok_or(PageError::UnknownLayer(id))?;
        if let Some(layer) = self.render_layers.get_mut(&id) {
            layer.visible = visible;
        }
        if !visible && self.hover.as_ref().is_some_and(|h| h.layer == id) {
            self.hover = None;
        }
        debug!(layer = %id, visible, "layer visibility changed");
        Ok(visible)
    }

    pub fn remove_layer(&mut self, id: LayerId) -> Result<LayerEntry, PageError> {
        self.detach(id).ok_or(PageError::UnknownLayer(id))
    }

    pub fn show_info(&self) -> bool {
        self.show_info
    }

    pub fn set_show_info(&mut self, show: bool) {
        self.show_info = show;
    }

    /// Record what is under the pointer. Picks on hidden or unknown layers
    /// count as a miss.
    pub fn pointer_moved(&mut self, pick: Option<FeaturePick>, coordinate: [f64; 2], pixel: [f64; 2]) {
        let visible = |layer: LayerId| self.layers.get(layer).is_some_and(|e| e.visible);
        self.hover = pick.filter(|p| visible(p.layer)).map(|p| {
            let mut properties = p.properties;
            properties.remove("geometry");
            HoverInfo {
                layer: p.layer,
                properties,
                position: coordinate,
                overlay_offset: [pixel[0] + OVERLAY_OFFSET_PX, pixel[1] + OVERLAY_OFFSET_PX],
            }
        });
    }

    /// The tooltip content, if the tooltip is enabled and something is hovered.
    pub fn hover(&self) -> Option<&HoverInfo> {
        self.hover.as_ref().filter(|_| self.show_info)
    }

    /// Synthesized tile of a tile layer, served from the page cache when possible.
    pub fn request_tile(
        &mut self,
        id: LayerId,
        address: TileAddress,
    ) -> Result<Arc<TileFeatureCollection>, PageError> {
        let layer = self.render_layers.get(&id).ok_or(PageError::UnknownLayer(id))?;
        let index = layer.tile_index().ok_or(PageError::NotTiled(id))?;
        let key = TileCacheKey::for_address(dataset_id(id), address);
        Ok(self
            .tile_cache
            .get_or_insert_with(key, || synthesize_tile(&**index, address)))
    }

    /// [`MapPage::request_tile`] addressed by a `[z,x,y]` key.
    pub fn request_tile_key(
        &mut self,
        id: LayerId,
        key: &str,
    ) -> Result<Arc<TileFeatureCollection>, PageError> {
        let address = TileAddress::from_cache_key(key).map_err(PageError::InvalidTileKey)?;
        self.request_tile(id, address)
    }

    pub fn cached_tiles(&self) -> usize {
        self.tile_cache.len()
    }

    fn attach(&mut self, name: &str, doc: GeoDocument) -> LayerId {
        let version = doc.content_hash.clone();
        let id = self.layers.push(name);
        let Some(entry) = self.layers.get(id).cloned() else {
            return id;
        };
        let layer = self
            .strategy
            .build_layer(&entry, doc, &self.config.tile_options);
        if layer.tile_index().is_some()
            && let Some(version) = version
        {
            self.tile_cache.pin_dataset_version(dataset_id(id), version);
        }
        self.render_layers.insert(id, layer);
        info!(layer = %id, name, backend = ?self.strategy.backend(), "layer added");
        id
    }

    fn detach(&mut self, id: LayerId) -> Option<LayerEntry> {
        let entry = self.layers.remove(id)?;
        self.render_layers.remove(&id);
        let dropped = self.tile_cache.remove_dataset(&dataset_id(id));
        if self.hover.as_ref().is_some_and(|h| h.layer == id) {
            self.hover = None;
        }
        info!(layer = %id, name = %entry.name, cached_tiles = dropped, "layer removed");
        Some(entry)
    }
}

fn dataset_id(id: LayerId) -> String {
    format!("layer-{id}")
}

fn parse_upload(file: &UploadedFile) -> Result<GeoDocument, PageError> {
    if !file.is_accepted() {
        return Err(PageError::UnsupportedFile {
            name: file.name.clone(),
        });
    }
    GeoDocument::from_geojson_str(&file.contents).map_err(|source| PageError::InvalidFile {
        name: file.name.clone(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LayerSource, RenderBackend};
    use formats::TileGeometry;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn point_file(name: &str, lon: f64, lat: f64) -> UploadedFile {
        UploadedFile::new(
            name,
            json!({"type": "FeatureCollection", "features": [{
                "type": "Feature",
                "properties": {"name": name, "geometry": "shadowed"},
                "geometry": {"type": "Point", "coordinates": [lon, lat]}
            }]})
            .to_string(),
        )
    }

    #[test]
    fn multi_upload_keeps_good_files_and_reports_bad_ones() {
        let mut page = MapPage::new(PageStrategy::image());
        let outcome = page.upload(&[
            point_file("a.geojson", 1.0, 2.0),
            UploadedFile::new("broken.geojson", "{\"type\": \"Feature"),
            point_file("b.geojson", 3.0, 4.0),
            UploadedFile::new("notes.txt", "hello"),
        ]);

        assert_eq!(outcome.added, vec![LayerId(1), LayerId(2)]);
        assert_eq!(outcome.errors.len(), 2);
        assert_eq!(
            outcome.errors[0].to_string(),
            "Invalid GeoJSON file (broken.geojson). Please check the format."
        );
        assert!(matches!(
            &outcome.errors[1],
            PageError::UnsupportedFile { name } if name == "notes.txt"
        ));

        let names: Vec<&str> = page.layers().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.geojson", "b.geojson"]);
        assert_eq!(page.render_layers().count(), 2);
        let fit = outcome.fit.expect("fit");
        assert_eq!(fit.extent, Aabb2::new([3.0, 4.0], [3.0, 4.0]));
        assert_eq!(fit.padding, [100.0; 4]);
        assert_eq!(fit.duration_ms, 1000);
    }

    #[test]
    fn failed_upload_leaves_page_unchanged() {
        let mut page = MapPage::new(PageStrategy::webgl());
        page.upload(&[point_file("a.geojson", 0.0, 0.0)]);
        let before: Vec<LayerEntry> = page.layers().to_vec();

        let outcome = page.upload(&[UploadedFile::new("b.geojson", "[1, 2]")]);
        assert!(outcome.added.is_empty());
        assert!(outcome.removed.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(page.layers(), before.as_slice());
        assert!(page.render_layer(LayerId(1)).is_some());
    }

    #[test]
    fn single_upload_replaces_previous_layer() {
        let mut page = MapPage::new(PageStrategy::webgl());
        assert!(!page.shows_layer_list());
        page.upload(&[point_file("a.geojson", 0.0, 0.0)]);
        let outcome = page.upload(&[
            point_file("b.geojson", 5.0, 5.0),
            point_file("ignored.geojson", 9.0, 9.0),
        ]);

        assert_eq!(outcome.removed, vec![LayerId(1)]);
        assert_eq!(outcome.added, vec![LayerId(2)]);
        assert_eq!(page.layers().len(), 1);
        assert!(page.render_layer(LayerId(1)).is_none());
        let layer = page.render_layer(LayerId(2)).expect("layer");
        assert_eq!(layer.backend, RenderBackend::WebGl);
        assert!(matches!(layer.source, LayerSource::Vector(_)));
    }

    #[test]
    fn visibility_and_removal_track_render_layers() {
        let mut page = MapPage::new(PageStrategy::canvas());
        page.upload(&[point_file("a.geojson", 0.0, 0.0), point_file("b.geojson", 1.0, 1.0)]);

        assert_eq!(page.toggle_visibility(LayerId(1)).ok(), Some(false));
        assert_eq!(page.render_layer(LayerId(1)).map(|l| l.visible), Some(false));
        assert!(matches!(
            page.toggle_visibility(LayerId(7)),
            Err(PageError::UnknownLayer(LayerId(7)))
        ));

        let removed = page.remove_layer(LayerId(1)).expect("remove");
        assert_eq!(removed.name, "a.geojson");
        assert!(page.render_layer(LayerId(1)).is_none());
        assert!(page.remove_layer(LayerId(1)).is_err());

        page.upload(&[point_file("c.geojson", 2.0, 2.0)]);
        let ids: Vec<LayerId> = page.layers().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![LayerId(2), LayerId(3)]);
    }

    #[test]
    fn hover_hides_geometry_and_respects_show_info() {
        let mut page = MapPage::new(PageStrategy::canvas());
        page.upload(&[point_file("a.geojson", 0.0, 0.0)]);
        let properties = json!({"name": "A", "pop": 1200, "geometry": {"type": "Point"}})
            .as_object()
            .cloned()
            .unwrap_or_default();
        let pick = FeaturePick {
            layer: LayerId(1),
            properties,
        };

        page.pointer_moved(Some(pick.clone()), [12.3456, -4.0], [100.0, 50.0]);
        assert!(page.hover().is_none());

        page.set_show_info(true);
        let hover = page.hover().expect("hover");
        assert!(!hover.properties.contains_key("geometry"));
        assert_eq!(hover.overlay_offset, [110.0, 60.0]);
        assert_eq!(hover.to_text(), "name: A\npop: 1200\n12.35, -4.00");

        page.pointer_moved(None, [0.0, 0.0], [0.0, 0.0]);
        assert!(page.hover().is_none());

        page.pointer_moved(Some(pick), [0.0, 0.0], [0.0, 0.0]);
        page.toggle_visibility(LayerId(1)).expect("toggle");
        assert!(page.hover().is_none());
    }

    #[test]
    fn tile_page_serves_cached_tiles() {
        let mut page = MapPage::new(PageStrategy::vector_tile());
        assert_eq!(page.interactions(), &[Interaction::Select, Interaction::Modify]);
        let outcome = page.upload(&[point_file("pts.geojson", -45.0, 30.0)]);
        let id = outcome.added[0];

        let first = page.request_tile_key(id, "[0,0,0]").expect("tile");
        assert_eq!(first.len(), 1);
        let feature = first.features[0].as_feature().expect("feature");
        assert!(matches!(feature.geometry, TileGeometry::Point(_)));
        assert_eq!(feature.properties["name"], json!("pts.geojson"));

        let again = page.request_tile(id, TileAddress::new(0, 0, 0)).expect("tile");
        assert!(Arc::ptr_eq(&first, &again));
        assert!(page.request_tile(id, TileAddress::new(0, 1, 0)).expect("miss").is_empty());
        assert_eq!(page.cached_tiles(), 2);
        assert!(matches!(
            page.request_tile_key(id, "zero"),
            Err(PageError::InvalidTileKey(_))
        ));

        page.upload(&[point_file("next.geojson", 10.0, 10.0)]);
        assert_eq!(page.cached_tiles(), 0);
        assert!(matches!(
            page.request_tile(id, TileAddress::new(0, 0, 0)),
            Err(PageError::UnknownLayer(_))
        ));
    }

    #[test]
    fn declared_json_mime_is_accepted() {
        let mut file = point_file("export", 0.0, 0.0);
        assert!(!file.is_accepted());
        file = file.with_mime("application/json");
        assert!(file.is_accepted());
        assert!(UploadedFile::new("Cities.GEOJSON", "").is_accepted());
    }

    #[test]
    fn vector_layers_are_not_tiled() {
        let mut page = MapPage::new(PageStrategy::webgl_multi());
        page.upload(&[point_file("a.json", 0.0, 0.0)]);
        assert!(matches!(
            page.request_tile(LayerId(1), TileAddress::new(0, 0, 0)),
            Err(PageError::NotTiled(LayerId(1)))
        ));
    }

    #[test]
    fn config_loads_from_partial_json() {
        let config: PageConfig =
            serde_json::from_str(r#"{"tile_cache_entries": 4, "tile_options": {"extent": 256}}"#)
                .expect("config");
        assert_eq!(config.tile_cache_entries, 4);
        assert_eq!(config.tile_options.extent, 256);
        assert_eq!(config.tile_options.buffer, 64);
        assert_eq!(config.fit_duration_ms, 1000);
    }

    #[test]
    fn tile_page_indexes_with_debug_statistics() {
        let mut page = MapPage::new(PageStrategy::vector_tile());
        let id = page.upload(&[point_file("pts.geojson", 1.0, 1.0)]).added[0];
        let index = page
            .render_layer(id)
            .and_then(RenderLayer::tile_index)
            .expect("tile index");
        assert_eq!(index.options().debug, 1);

        let quiet = PageConfig::default();
        let mut page = MapPage::with_config(PageStrategy::vector_tile(), quiet);
        let id = page.upload(&[point_file("pts.geojson", 1.0, 1.0)]).added[0];
        let index = page
            .render_layer(id)
            .and_then(RenderLayer::tile_index)
            .expect("tile index");
        assert_eq!(index.options().debug, 0);
        assert_eq!(PageConfig::for_backend(RenderBackend::Canvas), PageConfig::default());
    }
}
