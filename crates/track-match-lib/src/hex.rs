//! Hexagonal spatial index over a metric plane
//!
//! Corrected points are reprojected into a planar CRS and bucketed into a
//! pointy-top hexagonal grid with axial coordinates `(q, r)`. The third cube
//! coordinate is implied as `s = -q - r`.

use crate::utils;
use crate::{MatchError, Result};
use geo::{Coord, Point};
use std::fmt;

const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// An EPSG coordinate reference system code
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Epsg(pub u32);

impl Epsg {
    /// Geographic latitude/longitude
    pub const WGS84: Epsg = Epsg(4326);
    /// Spherical Web Mercator, in meters
    pub const WEB_MERCATOR: Epsg = Epsg(3857);
}

impl fmt::Display for Epsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

/// Converts coordinates between reference systems
///
/// Geographic coordinates use x = longitude, y = latitude.
pub trait Reproject: Send + Sync {
    fn reproject(&self, coord: Coord<f64>, source: Epsg, target: Epsg) -> Result<Coord<f64>>;
}

/// Reprojection between WGS84 and Web Mercator
#[derive(Clone, Copy, Debug, Default)]
pub struct WebMercator;

impl Reproject for WebMercator {
    fn reproject(&self, coord: Coord<f64>, source: Epsg, target: Epsg) -> Result<Coord<f64>> {
        match (source, target) {
            (s, t) if s == t => Ok(coord),
            (Epsg::WGS84, Epsg::WEB_MERCATOR) => Ok(utils::wgs84_to_mercator(coord.y, coord.x).0),
            (Epsg::WEB_MERCATOR, Epsg::WGS84) => {
                let (lat, lon) = utils::mercator_to_wgs84(coord.x, coord.y);
                Ok(Coord { x: lon, y: lat })
            }
            (from, to) => Err(MatchError::UnsupportedCrs { from, to }),
        }
    }
}

/// Hex grid parameters
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct HexConfig {
    /// Side length of a cell in metric units.
    /// Default: 15.0
    pub side_length: f64,
    /// Grid anchor in the metric CRS.
    /// Default: (0, 0)
    pub origin: Coord<f64>,
    /// CRS of the input points.
    /// Default: EPSG:4326
    pub source: Epsg,
    /// Planar CRS the grid is laid out in.
    /// Default: EPSG:3857
    pub metric: Epsg,
}

impl Default for HexConfig {
    fn default() -> Self {
        Self {
            side_length: 15.0,
            origin: Coord { x: 0.0, y: 0.0 },
            source: Epsg::WGS84,
            metric: Epsg::WEB_MERCATOR,
        }
    }
}

impl HexConfig {
    /// Builder-style setter for the side length
    pub fn with_side_length(mut self, side_length: f64) -> Self {
        self.side_length = side_length;
        self
    }

    /// Builder-style setter for the grid origin
    pub fn with_origin(mut self, origin: Coord<f64>) -> Self {
        self.origin = origin;
        self
    }
}

/// Axial coordinates of a hex cell
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HexCell {
    pub q: i64,
    pub r: i64,
}

impl HexCell {
    pub fn new(q: i64, r: i64) -> Self {
        Self { q, r }
    }

    /// Third cube coordinate
    #[inline]
    pub fn s(&self) -> i64 {
        -self.q - self.r
    }
}

impl fmt::Display for HexCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.q, self.r)
    }
}

/// A pointy-top hex grid bound to a reprojection
#[derive(Clone, Debug)]
pub struct HexGrid<R = WebMercator> {
    side_length: f64,
    origin: Coord<f64>,
    source: Epsg,
    metric: Epsg,
    reproject: R,
}

impl HexGrid<WebMercator> {
    /// Grid with the bundled Web Mercator reprojection
    pub fn new(config: &HexConfig) -> Result<Self> {
        Self::with_reprojection(config, WebMercator)
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<R: Reproject> HexGrid<R> {
    /// Grid with a custom reprojection
    ///
    /// # Errors
    /// [`MatchError::InvalidConfig`] for a non-positive side length or a
    /// non-finite origin.
    pub fn with_reprojection(config: &HexConfig, reproject: R) -> Result<Self> {
        if !(config.side_length.is_finite() && config.side_length > 0.0) {
            return Err(MatchError::InvalidConfig(format!(
                "hex side length must be positive, got {}",
                config.side_length
            )));
        }
        if !(config.origin.x.is_finite() && config.origin.y.is_finite()) {
            return Err(MatchError::InvalidConfig(
                "hex origin must be finite".to_string(),
            ));
        }
        Ok(Self {
            side_length: config.side_length,
            origin: config.origin,
            source: config.source,
            metric: config.metric,
            reproject,
        })
    }

    /// Cell of a point given in the source CRS
    pub fn hex_of(&self, point: Point<f64>) -> Result<HexCell> {
        let metric = self.reproject.reproject(point.0, self.source, self.metric)?;
        Ok(self.cell_of_metric(metric))
    }

    /// Cell of a point already in the metric CRS
    pub fn cell_of_metric(&self, metric: Coord<f64>) -> HexCell {
        let x = (metric.x - self.origin.x) / self.side_length;
        let y = (metric.y - self.origin.y) / self.side_length;
        let q = SQRT_3 / 3.0 * x - y / 3.0;
        let r = 2.0 / 3.0 * y;
        cube_round(q, r)
    }

    /// Center of a cell in the metric CRS
    pub fn center(&self, cell: HexCell) -> Coord<f64> {
        let (q, r) = (cell.q as f64, cell.r as f64);
        Coord {
            x: self.origin.x + self.side_length * (SQRT_3 * q + SQRT_3 / 2.0 * r),
            y: self.origin.y + self.side_length * 1.5 * r,
        }
    }
}

/// Round fractional axial coordinates to the containing cell.
///
/// All three cube components are rounded; the one with the largest rounding
/// error is rebuilt from the other two so that `q + r + s = 0` holds.
fn cube_round(q: f64, r: f64) -> HexCell {
    let s = -q - r;
    let (mut rq, mut rr, rs) = (q.round(), r.round(), s.round());
    let dq = (rq - q).abs();
    let dr = (rr - r).abs();
    let ds = (rs - s).abs();

    if dq > dr && dq > ds {
        rq = -rr - rs;
    } else if dr > ds {
        rr = -rq - rs;
    }

    HexCell::new(rq as i64, rr as i64)
}

/// Cell of a single point with the bundled reprojection
pub fn hex_of(
    point: Point<f64>,
    side_length: f64,
    origin: Coord<f64>,
    source: Epsg,
    metric: Epsg,
) -> Result<HexCell> {
    let config = HexConfig {
        side_length,
        origin,
        source,
        metric,
    };
    HexGrid::new(&config)?.hex_of(point)
}
