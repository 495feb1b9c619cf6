//! Spherical Web Mercator mapped onto the unit square.
//!
//! `u` grows eastwards from the antimeridian, `v` grows southwards from the
//! northern mercator limit; both span `[0, 1]` for the whole world. Tile
//! pyramids are built on top of this space: at zoom `z` the square is split
//! into `2^z x 2^z` tiles.

use core::f64::consts::PI;

/// Latitude where Web Mercator is cut off (degrees).
pub const MERCATOR_MAX_LAT_DEG: f64 = 85.051_128_779_806_59;

/// Longitude in degrees to `u` in `[0, 1]` (values outside +-180 fall outside).
pub fn lon_to_unit_x(lon_deg: f64) -> f64 {
    lon_deg / 360.0 + 0.5
}

/// Latitude in degrees to `v`, clamped to `[0, 1]`.
pub fn lat_to_unit_y(lat_deg: f64) -> f64 {
    let sin = lat_deg.to_radians().sin();
    let y = 0.5 - 0.25 * ((1.0 + sin) / (1.0 - sin)).ln() / PI;
    y.clamp(0.0, 1.0)
}

pub fn lon_lat_to_unit(lon_deg: f64, lat_deg: f64) -> [f64; 2] {
    [lon_to_unit_x(lon_deg), lat_to_unit_y(lat_deg)]
}

pub fn unit_x_to_lon(u: f64) -> f64 {
    (u - 0.5) * 360.0
}

pub fn unit_y_to_lat(v: f64) -> f64 {
    let n = PI - 2.0 * PI * v;
    n.sinh().atan().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_maps_to_center() {
        let [u, v] = lon_lat_to_unit(0.0, 0.0);
        assert!((u - 0.5).abs() < 1e-12);
        assert!((v - 0.5).abs() < 1e-12);
    }

    #[test]
    fn poles_clamp_to_edges() {
        assert_eq!(lat_to_unit_y(90.0), 0.0);
        assert_eq!(lat_to_unit_y(-90.0), 1.0);
        assert!(lat_to_unit_y(MERCATOR_MAX_LAT_DEG) < 1e-9);
    }

    #[test]
    fn inverse_recovers_lon_lat() {
        let [u, v] = lon_lat_to_unit(-73.98, 40.75);
        assert!((unit_x_to_lon(u) + 73.98).abs() < 1e-9);
        assert!((unit_y_to_lat(v) - 40.75).abs() < 1e-9);
    }
}
