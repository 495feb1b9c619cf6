//! Rendering strategies for the map page.
//!
//! Every page variant shares the same upload/hover/layer-list behavior and
//! differs only in how a parsed document is styled and turned into a render
//! layer. That difference lives behind [`RenderStrategy`].

use std::sync::Arc;

use formats::GeoDocument;
use serde::{Deserialize, Serialize};
use tiling::{TileIndex, TileIndexOptions};

use crate::layer::{LayerEntry, LayerId};
use crate::symbology::LayerStyle;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderBackend {
    /// GPU point/line/polygon rendering.
    WebGl,
    /// Canvas vector rendering.
    Canvas,
    /// Vector rendering composited into an image.
    Image,
    /// Tile pyramid sliced from the document on demand.
    VectorTile,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UploadMode {
    /// A new upload replaces the current layer.
    Single,
    /// Every uploaded file becomes its own layer.
    Multi,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interaction {
    Select,
    Modify,
}

/// Data behind a render layer.
#[derive(Debug, Clone)]
pub enum LayerSource {
    Vector(Arc<GeoDocument>),
    Tiled(Arc<TileIndex>),
}

#[derive(Debug, Clone)]
pub struct RenderLayer {
    pub id: LayerId,
    pub backend: RenderBackend,
    pub style: LayerStyle,
    pub visible: bool,
    pub source: LayerSource,
    /// Render-to-image oversampling, only set for image-composited layers.
    pub image_ratio: Option<f32>,
}

impl RenderLayer {
    pub fn tile_index(&self) -> Option<&Arc<TileIndex>> {
        match &self.source {
            LayerSource::Tiled(index) => Some(index),
            LayerSource::Vector(_) => None,
        }
    }
}

/// How a page styles and builds its layers.
pub trait RenderStrategy {
    fn backend(&self) -> RenderBackend;

    fn upload_mode(&self) -> UploadMode;

    fn interactions(&self) -> &'static [Interaction] {
        &[]
    }

    /// Whether the hover tooltip starts enabled.
    fn show_info_default(&self) -> bool {
        false
    }

    fn build_style(&self, entry: &LayerEntry) -> LayerStyle;

    fn build_layer(
        &self,
        entry: &LayerEntry,
        doc: GeoDocument,
        tile_options: &TileIndexOptions,
    ) -> RenderLayer;
}

/// The stock page variants.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageStrategy {
    pub backend: RenderBackend,
    pub upload_mode: UploadMode,
}

impl PageStrategy {
    pub const fn new(backend: RenderBackend, upload_mode: UploadMode) -> Self {
        Self {
            backend,
            upload_mode,
        }
    }

    pub const fn webgl() -> Self {
        Self::new(RenderBackend::WebGl, UploadMode::Single)
    }

    pub const fn webgl_multi() -> Self {
        Self::new(RenderBackend::WebGl, UploadMode::Multi)
    }

    pub const fn canvas() -> Self {
        Self::new(RenderBackend::Canvas, UploadMode::Multi)
    }

    pub const fn image() -> Self {
        Self::new(RenderBackend::Image, UploadMode::Multi)
    }

    pub const fn vector_tile() -> Self {
        Self::new(RenderBackend::VectorTile, UploadMode::Single)
    }
}

const EDIT_INTERACTIONS: &[Interaction] = &[Interaction::Select, Interaction::Modify];

pub const IMAGE_RATIO: f32 = 2.0;

impl RenderStrategy for PageStrategy {
    fn backend(&self) -> RenderBackend {
        self.backend
    }

    fn upload_mode(&self) -> UploadMode {
        self.upload_mode
    }

    fn interactions(&self) -> &'static [Interaction] {
        match self.backend {
            RenderBackend::WebGl | RenderBackend::VectorTile => EDIT_INTERACTIONS,
            RenderBackend::Canvas | RenderBackend::Image => &[],
        }
    }

    fn show_info_default(&self) -> bool {
        self.backend == RenderBackend::WebGl
    }

    fn build_style(&self, entry: &LayerEntry) -> LayerStyle {
        match self.backend {
            RenderBackend::WebGl => LayerStyle::webgl(),
            RenderBackend::Canvas | RenderBackend::Image => {
                LayerStyle::palette(&entry.name, entry.id.0)
            }
            RenderBackend::VectorTile => LayerStyle::default(),
        }
    }

    fn build_layer(
        &self,
        entry: &LayerEntry,
        doc: GeoDocument,
        tile_options: &TileIndexOptions,
    ) -> RenderLayer {
        let source = match self.backend {
            RenderBackend::VectorTile => {
                LayerSource::Tiled(Arc::new(TileIndex::build(&doc, tile_options.clone())))
            }
            _ => LayerSource::Vector(Arc::new(doc)),
        };
        RenderLayer {
            id: entry.id,
            backend: self.backend,
            style: self.build_style(entry),
            visible: entry.visible,
            source,
            image_ratio: (self.backend == RenderBackend::Image).then_some(IMAGE_RATIO),
        }
    }
}
