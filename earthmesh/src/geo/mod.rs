//! Geodetic coordinate conversion.
//!
//! Converts geographic coordinates (longitude, latitude, ellipsoidal height)
//! into Earth-Centered, Earth-Fixed (ECEF) cartesian coordinates on the WGS84
//! reference ellipsoid. Tileset bounding volumes are expressed in ECEF, so the
//! region of interest has to be converted before it can be culled against them.

use glam::DVec3;

/// WGS84 semi-major axis in meters.
pub const WGS84_SEMI_MAJOR_AXIS: f64 = 6_378_137.0;

/// WGS84 flattening.
pub const WGS84_FLATTENING: f64 = 1.0 / 298.257_223_563;

/// First eccentricity squared, derived from the flattening.
pub const WGS84_ECCENTRICITY_SQ: f64 = WGS84_FLATTENING * (2.0 - WGS84_FLATTENING);

/// Converts geographic coordinates to ECEF.
///
/// # Arguments
///
/// * `lon_deg` - Longitude in degrees
/// * `lat_deg` - Latitude in degrees
/// * `height` - Height above the ellipsoid in meters (0 when unknown)
#[inline]
pub fn ecef_from_degrees(lon_deg: f64, lat_deg: f64, height: f64) -> DVec3 {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();

    // Prime vertical radius of curvature
    let n = WGS84_SEMI_MAJOR_AXIS / (1.0 - WGS84_ECCENTRICITY_SQ * sin_lat * sin_lat).sqrt();

    DVec3::new(
        (n + height) * cos_lat * cos_lon,
        (n + height) * cos_lat * sin_lon,
        (n * (1.0 - WGS84_ECCENTRICITY_SQ) + height) * sin_lat,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    #[test]
    fn test_equator_prime_meridian() {
        let p = ecef_from_degrees(0.0, 0.0, 0.0);
        assert!((p.x - WGS84_SEMI_MAJOR_AXIS).abs() < EPS);
        assert!(p.y.abs() < EPS);
        assert!(p.z.abs() < EPS);
    }

    #[test]
    fn test_equator_ninety_east() {
        let p = ecef_from_degrees(90.0, 0.0, 0.0);
        assert!(p.x.abs() < 1e-3);
        assert!((p.y - WGS84_SEMI_MAJOR_AXIS).abs() < EPS);
    }

    #[test]
    fn test_north_pole_is_semi_minor_axis() {
        let p = ecef_from_degrees(0.0, 90.0, 0.0);
        let semi_minor = WGS84_SEMI_MAJOR_AXIS * (1.0 - WGS84_FLATTENING);
        assert!(p.x.abs() < 1e-3);
        assert!((p.z - semi_minor).abs() < 1e-3);
    }

    #[test]
    fn test_height_extends_along_normal_at_equator() {
        let ground = ecef_from_degrees(0.0, 0.0, 0.0);
        let raised = ecef_from_degrees(0.0, 0.0, 100.0);
        assert!(((raised - ground).length() - 100.0).abs() < EPS);
    }

    #[test]
    fn test_known_point_new_york() {
        // 40.7128°N, 74.0060°W at sea level
        let p = ecef_from_degrees(-74.0060, 40.7128, 0.0);
        assert!((p.x - 1_333_998.5).abs() < 1.0, "x = {}", p.x);
        assert!((p.y - (-4_654_044.8)).abs() < 1.0, "y = {}", p.y);
        assert!((p.z - 4_138_300.2).abs() < 1.0, "z = {}", p.z);
    }
}
