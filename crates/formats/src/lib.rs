pub mod geojson;
pub mod tile_feature;

pub use geojson::*;
pub use tile_feature::*;
