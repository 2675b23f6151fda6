//! Geographic projections.
//!
//! Two projections meet in the tile pipeline:
//! - Web Mercator (EPSG:3857) meters, the space the tile grid is defined in.
//! - A scene-local projection mapping WGS84 lon/lat (degrees) to scene `x`/`z`.
//!
//! The scene-local projection is a collaborator: renderers may supply their own
//! through [`Projection`]. [`LocalTangentProjection`] is the default.

use super::{EnuFrame, Geodetic, Vec2, WGS84_A};

/// Half the width of the Web Mercator square, in meters.
pub const WEB_MERCATOR_HALF_EXTENT: f64 = std::f64::consts::PI * WGS84_A;

/// Latitude limit of the Web Mercator square, in degrees.
pub const WEB_MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// WGS84 lon/lat (degrees) → Web Mercator meters.
pub fn lon_lat_to_web_mercator(lon_lat: Vec2) -> Vec2 {
    let lat = lon_lat.y.clamp(-WEB_MERCATOR_MAX_LAT, WEB_MERCATOR_MAX_LAT);
    let x = WGS84_A * lon_lat.x.to_radians();
    let y = WGS84_A * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
    Vec2::new(x, y)
}

/// Web Mercator meters → WGS84 lon/lat (degrees).
pub fn web_mercator_to_lon_lat(m: Vec2) -> Vec2 {
    let lon = (m.x / WGS84_A).to_degrees();
    let lat = (2.0 * (m.y / WGS84_A).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    Vec2::new(lon, lat)
}

/// Geographic ↔ scene-local conversion.
///
/// `forward` maps WGS84 lon/lat (degrees) to scene ground coordinates where
/// the returned `x` is scene `x` (east) and `y` is scene `z` (north).
pub trait Projection {
    fn forward(&self, lon_lat: Vec2) -> Vec2;
    fn inverse(&self, local: Vec2) -> Vec2;
}

/// East-North tangent plane anchored at a WGS84 origin.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LocalTangentProjection {
    frame: EnuFrame,
}

impl LocalTangentProjection {
    /// `origin` in degrees (lon, lat).
    pub fn new(origin: Vec2) -> Self {
        Self {
            frame: EnuFrame::new(Geodetic::from_degrees(origin.x, origin.y)),
        }
    }

    pub fn origin_lon_lat(&self) -> Vec2 {
        let o = self.frame.origin();
        Vec2::new(o.lon_rad.to_degrees(), o.lat_rad.to_degrees())
    }
}

impl Projection for LocalTangentProjection {
    fn forward(&self, lon_lat: Vec2) -> Vec2 {
        let geo = Geodetic::from_degrees(lon_lat.x, lon_lat.y);
        let [east, north, _up] = self.frame.to_enu(geo.to_ecef());
        Vec2::new(east, north)
    }

    fn inverse(&self, local: Vec2) -> Vec2 {
        let geo = self.frame.to_ecef([local.x, local.y, 0.0]).to_geodetic();
        Vec2::new(geo.lon_rad.to_degrees(), geo.lat_rad.to_degrees())
    }
}
