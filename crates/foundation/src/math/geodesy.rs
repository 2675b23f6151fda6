//! WGS84 geodesy: geodetic ↔ ECEF, and east-north-up frames.

/// WGS84 semi-major axis (meters).
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening.
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// WGS84 semi-minor axis (meters).
pub const WGS84_B: f64 = WGS84_A * (1.0 - WGS84_F);
/// WGS84 first eccentricity squared.
pub const WGS84_E2: f64 = WGS84_F * (2.0 - WGS84_F);
/// WGS84 second eccentricity squared.
pub const WGS84_EP2: f64 = (WGS84_A * WGS84_A - WGS84_B * WGS84_B) / (WGS84_B * WGS84_B);

/// Earth-centered, Earth-fixed Cartesian coordinates (meters).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ecef {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Geodetic coordinates in radians and meters.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Geodetic {
    pub lat_rad: f64,
    pub lon_rad: f64,
    pub alt_m: f64,
}

impl Geodetic {
    pub fn new(lat_rad: f64, lon_rad: f64, alt_m: f64) -> Self {
        Self {
            lat_rad,
            lon_rad,
            alt_m,
        }
    }

    pub fn from_degrees(lon_deg: f64, lat_deg: f64) -> Self {
        Self::new(lat_deg.to_radians(), lon_deg.to_radians(), 0.0)
    }

    pub fn to_ecef(self) -> Ecef {
        let (sin_lat, cos_lat) = self.lat_rad.sin_cos();
        let (sin_lon, cos_lon) = self.lon_rad.sin_cos();

        let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
        Ecef {
            x: (n + self.alt_m) * cos_lat * cos_lon,
            y: (n + self.alt_m) * cos_lat * sin_lon,
            z: (n * (1.0 - WGS84_E2) + self.alt_m) * sin_lat,
        }
    }
}

impl Ecef {
    /// Bowring's closed-form approximation; sub-millimeter near the surface.
    pub fn to_geodetic(self) -> Geodetic {
        let p = (self.x * self.x + self.y * self.y).sqrt();
        let lon = self.y.atan2(self.x);

        let theta = (self.z * WGS84_A).atan2(p * WGS84_B);
        let (sin_theta, cos_theta) = theta.sin_cos();

        let lat = (self.z + WGS84_EP2 * WGS84_B * sin_theta.powi(3))
            .atan2(p - WGS84_E2 * WGS84_A * cos_theta.powi(3));

        let sin_lat = lat.sin();
        let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
        Geodetic::new(lat, lon, p / lat.cos() - n)
    }
}

/// East-north-up tangent frame at a fixed origin, with the origin's
/// trigonometry cached for repeated conversions.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct EnuFrame {
    origin: Geodetic,
    origin_ecef: Ecef,
    sin_lat: f64,
    cos_lat: f64,
    sin_lon: f64,
    cos_lon: f64,
}

impl EnuFrame {
    pub fn new(origin: Geodetic) -> Self {
        let (sin_lat, cos_lat) = origin.lat_rad.sin_cos();
        let (sin_lon, cos_lon) = origin.lon_rad.sin_cos();
        Self {
            origin,
            origin_ecef: origin.to_ecef(),
            sin_lat,
            cos_lat,
            sin_lon,
            cos_lon,
        }
    }

    pub fn origin(&self) -> Geodetic {
        self.origin
    }

    /// ECEF point → `[east, north, up]` meters.
    pub fn to_enu(&self, p: Ecef) -> [f64; 3] {
        let dx = p.x - self.origin_ecef.x;
        let dy = p.y - self.origin_ecef.y;
        let dz = p.z - self.origin_ecef.z;

        let east = -self.sin_lon * dx + self.cos_lon * dy;
        let north = -self.sin_lat * self.cos_lon * dx - self.sin_lat * self.sin_lon * dy
            + self.cos_lat * dz;
        let up = self.cos_lat * self.cos_lon * dx + self.cos_lat * self.sin_lon * dy
            + self.sin_lat * dz;
        [east, north, up]
    }

    /// `[east, north, up]` meters → ECEF point.
    pub fn to_ecef(&self, enu: [f64; 3]) -> Ecef {
        let [e, n, u] = enu;
        let dx = -self.sin_lon * e - self.sin_lat * self.cos_lon * n + self.cos_lat * self.cos_lon * u;
        let dy = self.cos_lon * e - self.sin_lat * self.sin_lon * n + self.cos_lat * self.sin_lon * u;
        let dz = self.cos_lat * n + self.sin_lat * u;
        Ecef {
            x: self.origin_ecef.x + dx,
            y: self.origin_ecef.y + dy,
            z: self.origin_ecef.z + dz,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EnuFrame, Geodetic, WGS84_A};

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn equator_prime_meridian_is_on_x_axis() {
        let ecef = Geodetic::new(0.0, 0.0, 0.0).to_ecef();
        assert_close(ecef.x, WGS84_A, 1e-6);
        assert_close(ecef.y, 0.0, 1e-6);
        assert_close(ecef.z, 0.0, 1e-6);
    }

    #[test]
    fn geodetic_survives_ecef_round_trip() {
        let geo = Geodetic::new(
            std::f64::consts::FRAC_PI_6,
            -std::f64::consts::FRAC_PI_3,
            120.0,
        );
        let rt = geo.to_ecef().to_geodetic();
        assert_close(rt.lat_rad, geo.lat_rad, 1e-9);
        assert_close(rt.lon_rad, geo.lon_rad, 1e-9);
        assert_close(rt.alt_m, geo.alt_m, 1e-6);
    }

    #[test]
    fn enu_frame_round_trip() {
        let frame = EnuFrame::new(Geodetic::from_degrees(-8.72, 42.24));
        let enu = [15.0, -8.0, 2.5];
        let back = frame.to_enu(frame.to_ecef(enu));
        for (a, b) in back.iter().zip(enu) {
            assert_close(*a, b, 1e-8);
        }
        let origin = frame.to_enu(frame.origin().to_ecef());
        assert_close(origin[0], 0.0, 1e-9);
    }
}
