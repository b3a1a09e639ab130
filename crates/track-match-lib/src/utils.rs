//! Utility functions for coordinate conversions between geographic and metric planes

use geo::{Coord, Point};

/// Web Mercator bounds in meters (EPSG:3857)
pub const EARTH_MERCATOR_MAX: f64 = 20037508.34;

/// Maximum latitude that can be represented in Web Mercator
pub const MAX_LATITUDE: f64 = 85.05112878;

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6371000.0;

/// Precomputed constant: EARTH_MERCATOR_MAX / 180.0
const LON_TO_X_FACTOR: f64 = EARTH_MERCATOR_MAX / 180.0;

/// Precomputed constant: EARTH_MERCATOR_MAX / PI
const Y_FACTOR: f64 = EARTH_MERCATOR_MAX / std::f64::consts::PI;

/// Precomputed constant: 180.0 / EARTH_MERCATOR_MAX
const X_TO_LON_FACTOR: f64 = 180.0 / EARTH_MERCATOR_MAX;

/// Precomputed constant: PI / EARTH_MERCATOR_MAX
const Y_TO_LAT_FACTOR: f64 = std::f64::consts::PI / EARTH_MERCATOR_MAX;

/// Convert WGS84 (lat, lon) to Web Mercator (x, y) in meters
///
/// # Arguments
/// * `lat` - Latitude in degrees (-85.05 to 85.05)
/// * `lon` - Longitude in degrees (-180 to 180)
///
/// # Returns
/// A `Point<f64>` with x (easting) and y (northing) in meters
#[inline(always)]
pub fn wgs84_to_mercator(lat: f64, lon: f64) -> Point<f64> {
    // Clamp latitude to valid Web Mercator range
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);

    let x = lon * LON_TO_X_FACTOR;
    let lat_rad = lat.to_radians();
    let y = (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() * Y_FACTOR;

    Point::new(x, y)
}

/// Convert Web Mercator (x, y) in meters to WGS84 (lat, lon)
#[inline(always)]
pub fn mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon = x * X_TO_LON_FACTOR;
    let lat =
        (std::f64::consts::PI / 2.0 - 2.0 * ((-y * Y_TO_LAT_FACTOR).exp()).atan()).to_degrees();
    (lat, lon)
}

/// Finite and within ±90°
#[inline]
pub fn is_valid_latitude(lat: f64) -> bool {
    lat.is_finite() && (-90.0..=90.0).contains(&lat)
}

/// Finite and within ±180°
#[inline]
pub fn is_valid_longitude(lon: f64) -> bool {
    lon.is_finite() && (-180.0..=180.0).contains(&lon)
}

/// Check whether a latitude/longitude pair is usable as a GPS fix
#[inline]
pub fn is_valid_wgs84(lat: f64, lon: f64) -> bool {
    is_valid_latitude(lat) && is_valid_longitude(lon)
}

/// Equirectangular projection around a fixed reference latitude.
///
/// Road graphs for a single track cover a few kilometres at most, where this
/// projection keeps distances within a fraction of a percent of the
/// great-circle value while staying trivially invertible. Unlike Web
/// Mercator, one metric unit is one metre at every latitude of the extent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalProjection {
    ref_lat: f64,
    ref_lon: f64,
    cos_ref: f64,
}

impl LocalProjection {
    /// Create a projection centred on the given reference point (degrees)
    pub fn new(ref_lat: f64, ref_lon: f64) -> Self {
        Self {
            ref_lat,
            ref_lon,
            cos_ref: ref_lat.to_radians().cos(),
        }
    }

    /// Project geographic coordinates (x = lon, y = lat) to metres
    #[inline]
    pub fn to_metric(&self, geographic: Coord<f64>) -> Coord<f64> {
        Coord {
            x: (geographic.x - self.ref_lon).to_radians() * EARTH_RADIUS_M * self.cos_ref,
            y: (geographic.y - self.ref_lat).to_radians() * EARTH_RADIUS_M,
        }
    }

    /// Inverse of [`LocalProjection::to_metric`]
    #[inline]
    pub fn to_geographic(&self, metric: Coord<f64>) -> Coord<f64> {
        Coord {
            x: self.ref_lon + (metric.x / (EARTH_RADIUS_M * self.cos_ref)).to_degrees(),
            y: self.ref_lat + (metric.y / EARTH_RADIUS_M).to_degrees(),
        }
    }
}

/// Calculate the Haversine distance between two geographic points in meters
#[inline]
pub fn haversine_distance(p1: Point<f64>, p2: Point<f64>) -> f64 {
    let lat1 = p1.y().to_radians();
    let lat2 = p2.y().to_radians();
    let delta_lat = (p2.y() - p1.y()).to_radians();
    let delta_lon = (p2.x() - p1.x()).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}
