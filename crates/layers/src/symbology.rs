use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 1.0)
    }

    pub const fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }

    pub fn to_css(&self) -> String {
        format!("rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
    }
}

/// Fill, stroke and point-marker settings for one render layer.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerStyle {
    pub fill: Rgba,
    pub stroke: Rgba,
    pub stroke_width: f32,
    pub circle_radius: f32,
    pub circle_fill: Rgba,
}

impl LayerStyle {
    /// Fixed purple/orange style of the WebGL pages.
    pub const fn webgl() -> Self {
        Self {
            fill: Rgba::new(150, 50, 150, 0.3),
            stroke: Rgba::opaque(128, 0, 128),
            stroke_width: 2.0,
            circle_radius: 6.0,
            circle_fill: Rgba::opaque(255, 165, 0),
        }
    }

    /// Single-color style: translucent fill, solid stroke and markers.
    pub const fn from_color(color: Rgba) -> Self {
        Self {
            fill: color.with_alpha(0.3),
            stroke: color.with_alpha(1.0),
            stroke_width: 2.0,
            circle_radius: 6.0,
            circle_fill: color.with_alpha(1.0),
        }
    }

    /// Per-layer color picked from the layer's name and id.
    ///
    /// Each channel lands in `55..=254`, bright enough to read over a basemap.
    pub fn palette(name: &str, id: u64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(name.as_bytes());
        hasher.update(&id.to_le_bytes());
        let hash = hasher.finalize();
        let bytes = hash.as_bytes();
        let channel = |b: u8| 55 + b % 200;
        Self::from_color(Rgba::opaque(
            channel(bytes[0]),
            channel(bytes[1]),
            channel(bytes[2]),
        ))
    }
}

impl Default for LayerStyle {
    fn default() -> Self {
        Self {
            fill: Rgba::new(255, 255, 255, 0.4),
            stroke: Rgba::opaque(51, 153, 204),
            stroke_width: 1.25,
            circle_radius: 5.0,
            circle_fill: Rgba::new(255, 255, 255, 0.4),
        }
    }
}
