//! XYZ tile grid over Web Mercator (EPSG:3857).
//!
//! Rows count down from the top of the square (`y = 0` at the northern edge),
//! matching slippy-map tile URLs.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Vec2, WEB_MERCATOR_HALF_EXTENT, lon_lat_to_web_mercator, web_mercator_to_lon_lat};
use crate::bounds::Aabb2;

/// One grid cell at one level of detail.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub const fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Number of tiles along one axis at this zoom.
    pub fn tiles_per_axis(&self) -> u32 {
        1u32 << self.z
    }

    /// Neighbor at `(x + dx, y + dy)`, or `None` outside the grid.
    pub fn offset(&self, dx: i64, dy: i64) -> Option<TileCoord> {
        let n = i64::from(self.tiles_per_axis());
        let x = i64::from(self.x) + dx;
        let y = i64::from(self.y) + dy;
        if !(0..n).contains(&x) || !(0..n).contains(&y) {
            return None;
        }
        Some(TileCoord::new(self.z, x as u32, y as u32))
    }

    /// Record key, `z_x_y`.
    pub fn key(&self) -> String {
        format!("{}_{}_{}", self.z, self.x, self.y)
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Stateless grid arithmetic. Zoom levels above `max_zoom` are clamped.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TileGrid {
    max_zoom: u8,
}

impl Default for TileGrid {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ZOOM)
    }
}

impl TileGrid {
    pub const DEFAULT_MAX_ZOOM: u8 = 22;

    pub fn new(max_zoom: u8) -> Self {
        // Keep `1 << z` within u32.
        Self {
            max_zoom: max_zoom.min(31),
        }
    }

    pub fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    pub fn clamp_zoom(&self, zoom: u8) -> u8 {
        zoom.min(self.max_zoom)
    }

    /// Edge length of one tile at `zoom`, in Web Mercator meters.
    pub fn resolution(&self, zoom: u8) -> f64 {
        let n = f64::from(1u32 << self.clamp_zoom(zoom));
        2.0 * WEB_MERCATOR_HALF_EXTENT / n
    }

    /// Tile containing the WGS84 point (`x` = lon, `y` = lat, degrees).
    pub fn coordinate_for_point(&self, lon_lat: Vec2, zoom: u8) -> TileCoord {
        let z = self.clamp_zoom(zoom);
        let m = lon_lat_to_web_mercator(lon_lat);
        let size = self.resolution(z);
        let last = f64::from((1u32 << z) - 1);

        let fx = ((m.x + WEB_MERCATOR_HALF_EXTENT) / size).floor().clamp(0.0, last);
        let fy = ((WEB_MERCATOR_HALF_EXTENT - m.y) / size).floor().clamp(0.0, last);
        TileCoord::new(z, fx as u32, fy as u32)
    }

    /// Extent of a tile in Web Mercator meters.
    pub fn extent_of(&self, coord: TileCoord) -> Aabb2 {
        let size = self.resolution(coord.z);
        let min_x = -WEB_MERCATOR_HALF_EXTENT + f64::from(coord.x) * size;
        let max_y = WEB_MERCATOR_HALF_EXTENT - f64::from(coord.y) * size;
        Aabb2::new([min_x, max_y - size], [min_x + size, max_y])
    }

    /// Tile center as WGS84 lon/lat (degrees).
    pub fn center_of(&self, coord: TileCoord) -> Vec2 {
        web_mercator_to_lon_lat(self.extent_of(coord).center())
    }

    /// Tile corners (bottom-left, top-right) as WGS84 lon/lat (degrees).
    pub fn lon_lat_corners(&self, coord: TileCoord) -> (Vec2, Vec2) {
        let extent = self.extent_of(coord);
        (
            web_mercator_to_lon_lat(extent.bottom_left()),
            web_mercator_to_lon_lat(extent.top_right()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{TileCoord, TileGrid};
    use crate::math::{Vec2, WEB_MERCATOR_HALF_EXTENT};

    #[test]
    fn zoom_zero_is_one_tile() {
        let grid = TileGrid::default();
        let c = grid.coordinate_for_point(Vec2::new(12.0, 45.0), 0);
        assert_eq!(c, TileCoord::new(0, 0, 0));
        let e = grid.extent_of(c);
        assert!((e.width() - 2.0 * WEB_MERCATOR_HALF_EXTENT).abs() < 1e-6);
    }

    #[test]
    fn rows_count_from_the_north() {
        let grid = TileGrid::default();
        assert_eq!(
            grid.coordinate_for_point(Vec2::new(-90.0, 45.0), 1),
            TileCoord::new(1, 0, 0)
        );
        assert_eq!(
            grid.coordinate_for_point(Vec2::new(90.0, -45.0), 1),
            TileCoord::new(1, 1, 1)
        );
    }

    #[test]
    fn center_falls_back_into_its_tile() {
        let grid = TileGrid::default();
        let coord = grid.coordinate_for_point(Vec2::new(-8.723, 42.238), 17);
        assert_eq!(coord.z, 17);
        let center = grid.center_of(coord);
        assert_eq!(grid.coordinate_for_point(center, 17), coord);
    }

    #[test]
    fn poles_and_antimeridian_clamp_into_grid() {
        let grid = TileGrid::default();
        let c = grid.coordinate_for_point(Vec2::new(180.0, 89.9), 3);
        assert_eq!(c, TileCoord::new(3, 7, 0));
        let c = grid.coordinate_for_point(Vec2::new(-180.0, -89.9), 3);
        assert_eq!(c, TileCoord::new(3, 0, 7));
    }

    #[test]
    fn zoom_above_max_is_clamped() {
        let grid = TileGrid::new(18);
        let c = grid.coordinate_for_point(Vec2::new(0.5, 0.5), 25);
        assert_eq!(c.z, 18);
        assert_eq!(grid.resolution(25), grid.resolution(18));
    }

    #[test]
    fn offsets_stay_inside_the_grid() {
        let c = TileCoord::new(2, 0, 3);
        assert_eq!(c.offset(1, -1), Some(TileCoord::new(2, 1, 2)));
        assert_eq!(c.offset(-1, 0), None);
        assert_eq!(c.offset(0, 1), None);
    }

    #[test]
    fn display_and_key() {
        let c = TileCoord::new(17, 100, 200);
        assert_eq!(c.to_string(), "17/100/200");
        assert_eq!(c.key(), "17_100_200");
    }
}
